//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dataprep_protocol::{ErrorCode, ErrorEnvelope};

use crate::pipeline::ProcessingError;

/// Message returned for every internal failure; details go to the log only.
pub const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// An error rendered as `{ "error": { "code", "message" } }`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidId, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, INTERNAL_MESSAGE)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::NotFound(_) => Self::not_found(err.to_string()),
            ProcessingError::ProcessingInProgress => {
                Self::new(ErrorCode::ProcessingInProgress, err.to_string())
            }
            ProcessingError::BadRequest(message) => Self::new(ErrorCode::BadRequest, message),
            ProcessingError::Store(source) => {
                tracing::error!(error = %source, "store failure while handling request");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorEnvelope::new(self.code, self.message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_processing_errors_map_to_codes() {
        let cases = [
            (ProcessingError::NotFound("Project"), ErrorCode::NotFound, 404),
            (ProcessingError::ProcessingInProgress, ErrorCode::ProcessingInProgress, 423),
            (
                ProcessingError::BadRequest("No ready sources available for processing".into()),
                ErrorCode::BadRequest,
                400,
            ),
        ];

        for (err, code, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.code(), code);
            assert_eq!(api.status().as_u16(), status);
        }
    }

    #[test]
    fn test_store_error_hides_details() {
        let api: ApiError = ProcessingError::Store(StoreError::Corrupt("row 7".into())).into();
        assert_eq!(api.code(), ErrorCode::InternalError);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message(), INTERNAL_MESSAGE);
    }
}
