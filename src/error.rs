use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Crate-wide error type. Service functions return `Result<T, CoreError>`;
/// HTTP handlers convert it to a response without ever leaking internals.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external service error: {0}")]
    External(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Queue(format!("payload (de)serialization failed: {e}"))
    }
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidState(_) => StatusCode::CONFLICT,
            CoreError::Database(_) | CoreError::Queue(_) | CoreError::Template(_) | CoreError::External(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => json!({ "error": "internal error" }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
