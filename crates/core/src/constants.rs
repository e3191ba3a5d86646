//! Constants used throughout the care plan core crate.
//!
//! Defaults for configuration live here so the binaries and tests agree on them.

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "careplan.sqlite3";

/// Default hosted model used for care plan generation.
pub const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Default base URL for the Anthropic Messages API.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// API version header sent with every Messages API request.
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Model identifier recorded for care plans produced in mock mode.
pub const MOCK_LLM_MODEL: &str = "mock-claude-model";

/// Outbound model call timeout. Care plans are long; five minutes.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;

/// Maximum tokens requested from the model.
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 4096;

/// Number of recent care plans included as few-shot examples.
pub const DEFAULT_FEW_SHOT_LIMIT: usize = 3;

/// Look-back window for the order duplicate check.
pub const DEFAULT_ORDER_DUPLICATE_WINDOW_DAYS: i64 = 30;

/// Longest accepted look-back window, ten years.
pub const MAX_ORDER_DUPLICATE_WINDOW_DAYS: i64 = 3650;

/// Maximum characters of a single few-shot example before truncation.
pub const MAX_EXAMPLE_LENGTH: usize = 3000;

/// Marker appended to truncated few-shot examples.
pub const TRUNCATION_MARKER: &str = "\n\n[... truncated for brevity ...]";

/// Number of orders shown on the order list.
pub const ORDER_LIST_LIMIT: usize = 50;

/// Maximum similar providers returned by the provider duplicate check.
pub const SIMILAR_PROVIDER_LIMIT: usize = 5;

/// Courtesy prefixes ignored when matching provider names.
pub const NAME_PREFIXES: &[&str] = &["dr", "mr", "mrs", "ms", "prof"];

/// Field length limits, mirrored by the database schema.
pub const MAX_PROVIDER_NAME_LEN: usize = 255;
pub const MAX_PATIENT_NAME_LEN: usize = 100;
pub const MAX_DIAGNOSIS_CODE_LEN: usize = 10;
pub const MAX_DIAGNOSIS_DESCRIPTION_LEN: usize = 255;
pub const MAX_MEDICATION_NAME_LEN: usize = 255;
pub const MAX_MODEL_USED_LEN: usize = 50;
