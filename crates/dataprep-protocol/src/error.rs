//! Error codes and the error envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned in API error envelopes.
///
/// These codes are stable and used by clients for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Generic malformed request.
    BadRequest,
    /// Request body or query failed validation.
    ValidationError,
    /// Path parameter is not a positive integer.
    InvalidId,
    /// No or unknown bearer token.
    Unauthorized,
    /// Resource missing or not visible to the caller's organisation.
    NotFound,
    /// A run is already processing for the project.
    ProcessingInProgress,
    /// Unexpected server-side failure.
    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidId => "INVALID_ID",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::ProcessingInProgress => "PROCESSING_IN_PROGRESS",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code conventionally paired with this error code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest | Self::ValidationError | Self::InvalidId => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::ProcessingInProgress => 423,
            Self::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code from the registry.
    pub code: ErrorCode,
    /// Human-readable, single-line message. Never carries internal details.
    pub message: String,
}

/// `{ "error": { "code", "message" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    /// Create a new error envelope.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}
