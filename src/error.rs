use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("model failed to load: {0}")]
    ModelUnavailable(String),
    #[error("model load error: {0}")]
    ModelLoad(String),
    #[error("failed to generate: {0}")]
    Generation(String),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation cancelled")]
    Cancelled,
    #[error("no results were generated")]
    NoResults,
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl ServiceError {
    /// Message shown to end users; the underlying cause stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::ModelUnavailable(_) | ServiceError::ModelLoad(_) => {
                "model failed to load".to_string()
            }
            ServiceError::Generation(_)
            | ServiceError::Tokenizer(_)
            | ServiceError::Cancelled
            | ServiceError::NoResults => "failed to generate".to_string(),
            ServiceError::Timeout(limit) => {
                format!("generation timed out after {}s", limit.as_secs())
            }
            ServiceError::BadRequest(reason) => format!("invalid request: {reason}"),
            ServiceError::Io(_) | ServiceError::Other(_) => "internal error".to_string(),
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::ModelUnavailable(_) | ServiceError::ModelLoad(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Generation(_)
            | ServiceError::Tokenizer(_)
            | ServiceError::Cancelled
            | ServiceError::NoResults => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.user_message(),
        });

        (status, axum::Json(body)).into_response()
    }
}
