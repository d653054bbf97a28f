//! Error types of the content editor core and their HTTP mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum ContentError {
    /// A required field is missing; nothing was sent upstream.
    #[error("{0}")]
    Validation(String),

    /// The action needs state that does not exist yet (unsaved objective, unsaved item).
    #[error("{0}")]
    Precondition(String),

    #[error("File is too large: {actual_bytes} bytes exceeds the {limit_mb} MB limit")]
    SizeLimit { limit_mb: u64, actual_bytes: u64 },

    #[error("Invalid field update: {0}")]
    InvalidField(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ContentError {
    pub fn code(&self) -> &'static str {
        match self {
            ContentError::Validation(_) => "VALIDATION",
            ContentError::Precondition(_) => "PRECONDITION",
            ContentError::SizeLimit { .. } => "SIZE_LIMIT",
            ContentError::InvalidField(_) => "INVALID_FIELD",
            ContentError::NotFound(_) => "NOT_FOUND",
            ContentError::Api(_) => "BACKEND",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ContentError::Validation(_) | ContentError::InvalidField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ContentError::Precondition(_) => StatusCode::CONFLICT,
            ContentError::SizeLimit { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ContentError::NotFound(_) => StatusCode::NOT_FOUND,
            ContentError::Api(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Serializable error body shared by HTTP and WebSocket replies.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&ContentError> for ErrorBody {
    fn from(e: &ContentError) -> Self {
        ErrorBody { code: e.code().to_string(), message: e.to_string() }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for ContentError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, Json(ErrorEnvelope { error: ErrorBody::from(&self) })).into_response()
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_message_names_the_limit() {
        let e = ContentError::SizeLimit { limit_mb: 50, actual_bytes: 60 * 1024 * 1024 };
        assert_eq!(e.code(), "SIZE_LIMIT");
        assert!(e.to_string().contains("50 MB"));
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
