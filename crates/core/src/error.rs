use crate::intake::FormErrors;

#[derive(Debug, thiserror::Error)]
pub enum CarePlanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("order form is invalid")]
    InvalidForm(FormErrors),
    #[error("{0}")]
    DuplicateBlocked(String),
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    ProtectedDelete(String),
    #[error("Care plan content cannot be empty.")]
    EmptyCarePlanContent,
    #[error("No care plan exists for this order.")]
    MissingCarePlan,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
    #[error("corrupt {field} value in database: {value}")]
    CorruptRow { field: &'static str, value: String },
    #[error("failed to serialize list column: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize list column: {0}")]
    Deserialization(serde_json::Error),

    #[error(
        "ANTHROPIC_API_KEY is not configured. Set it in your environment or enable LLM_MOCK_MODE"
    )]
    LlmNotConfigured,
    #[error("could not reach language model endpoint at {0}")]
    LlmConnection(String),
    #[error("language model request timed out after {0}s")]
    LlmTimeout(u64),
    #[error("language model HTTP client error: {0}")]
    LlmHttp(String),
    #[error("language model returned status {status}: {body}")]
    LlmApi { status: u16, body: String },
    #[error("failed to parse language model response: {0}")]
    LlmResponse(String),
}

impl CarePlanError {
    /// True for failures of the outbound model call.
    pub fn is_llm_failure(&self) -> bool {
        matches!(
            self,
            CarePlanError::LlmNotConfigured
                | CarePlanError::LlmConnection(_)
                | CarePlanError::LlmTimeout(_)
                | CarePlanError::LlmHttp(_)
                | CarePlanError::LlmApi { .. }
                | CarePlanError::LlmResponse(_)
        )
    }
}

pub type CarePlanResult<T> = std::result::Result<T, CarePlanError>;
