use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::users::{repo::StoreError, validation::Violation};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {} violation(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("User with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("{0}")]
    NotFound(String),

    /// Request body that could not be read as JSON at all.
    #[error("invalid request body: {message}")]
    InvalidBody { status: StatusCode, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("password hashing error: {0}")]
    Hashing(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidBody { status, .. } => *status,
            AppError::Storage(_) | AppError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(violations) => json!({
                "error": {
                    "type": "validation_error",
                    "message": "Validation failed",
                    "violations": violations,
                }
            }),
            AppError::DuplicateEmail(_) => json!({
                "error": { "type": "duplicate", "message": "Email already exists" }
            }),
            AppError::InvalidFilter(msg) => json!({
                "error": { "type": "invalid_filter", "message": msg }
            }),
            AppError::NotFound(msg) => json!({
                "error": { "type": "not_found", "message": msg }
            }),
            AppError::InvalidBody { message, .. } => json!({
                "error": { "type": "invalid_body", "message": message }
            }),
            AppError::Storage(_) | AppError::Hashing(_) => {
                tracing::error!(error = %self, "request failed");
                json!({
                    "error": {
                        "type": "internal_error",
                        "message": "An internal error occurred",
                    }
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON with a value of the wrong type is a field violation.
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                let (field, detail) = data_error_parts(&text);
                AppError::Validation(vec![Violation::new(field, "type", detail)])
            }
            JsonRejection::MissingJsonContentType(err) => AppError::InvalidBody {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                message: err.body_text(),
            },
            other => AppError::InvalidBody {
                status: StatusCode::BAD_REQUEST,
                message: other.body_text(),
            },
        }
    }
}

/// Splits axum's "...target type: name: invalid type: ..." text into the
/// offending field path and the serde message. Root-level errors map to `body`.
fn data_error_parts(text: &str) -> (&str, &str) {
    let detail = text
        .split_once("target type: ")
        .map_or(text, |(_, rest)| rest);
    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            (path, message)
        }
        _ => ("body", detail),
    }
}
