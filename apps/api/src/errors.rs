use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Compilation failures are not errors here: they travel inside a successful response
/// as a `CompilationOutcome` so the caller sees the diagnostics.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Llm(LlmError::Timeout { secs }) => {
                tracing::error!("LLM call timed out after {secs}s");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "LLM_TIMEOUT",
                    "The AI model did not respond in time".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let validation = AppError::Validation("message is required".to_string()).into_response();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let timeout = AppError::Llm(LlmError::Timeout { secs: 120 }).into_response();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let empty = AppError::Llm(LlmError::EmptyContent).into_response();
        assert_eq!(empty.status(), StatusCode::BAD_GATEWAY);
    }
}
