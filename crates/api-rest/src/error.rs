//! HTTP mapping for core errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use careplan_core::intake::FormErrors;
use careplan_core::CarePlanError;
use serde::Serialize;
use utoipa::ToSchema;

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// Field-level messages, present only for order form failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FormErrors>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CarePlanError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(detail: impl Into<String>) -> Self {
        ApiError::Internal(detail.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, errors) = match self {
            ApiError::Core(err) => match err {
                CarePlanError::InvalidForm(errors) => (
                    StatusCode::BAD_REQUEST,
                    "Please correct the errors in the order form.".to_string(),
                    Some(errors),
                ),
                CarePlanError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
                CarePlanError::EmptyCarePlanContent => {
                    (StatusCode::BAD_REQUEST, err.to_string(), None)
                }
                CarePlanError::DuplicateBlocked(msg) | CarePlanError::ProtectedDelete(msg) => {
                    (StatusCode::CONFLICT, msg, None)
                }
                CarePlanError::NotFound { .. } | CarePlanError::MissingCarePlan => {
                    (StatusCode::NOT_FOUND, err.to_string(), None)
                }
                err if err.is_llm_failure() => {
                    tracing::error!("Care plan generation error: {:?}", err);
                    (
                        StatusCode::BAD_GATEWAY,
                        "Error generating care plan. Please try again.".to_string(),
                        None,
                    )
                }
                err => {
                    tracing::error!("Core error: {:?}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None)
                }
            },
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None)
            }
        };

        (status, Json(ErrorRes { error, errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CarePlanError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_core_errors_map_to_status_codes() {
        assert_eq!(status_of(CarePlanError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(CarePlanError::InvalidForm(FormErrors::default())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CarePlanError::DuplicateBlocked("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(CarePlanError::ProtectedDelete("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CarePlanError::NotFound { entity: "order", id: 1 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(CarePlanError::MissingCarePlan), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CarePlanError::EmptyCarePlanContent), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CarePlanError::LlmTimeout(300)), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(CarePlanError::LlmNotConfigured), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(CarePlanError::CorruptRow { field: "npi", value: "x".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
