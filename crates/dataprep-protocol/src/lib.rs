//! Dataprep Protocol Types
//!
//! Wire types shared by the processing server and its clients: response
//! envelopes, the error code registry, and request payloads.

pub mod error;
pub mod request;
pub mod response;

pub use error::{ErrorBody, ErrorCode, ErrorEnvelope};
pub use request::{QualitySettings, StartProcessingRequest};
pub use response::{Meta, PaginatedEnvelope, Pagination, SuccessEnvelope};

/// Path prefix under which every API route is mounted.
pub const API_PREFIX: &str = "/api";

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size a client may request.
pub const MAX_PAGE_LIMIT: u32 = 100;
