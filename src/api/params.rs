//! Path, query and body parsing.
//!
//! Rejections use the error envelope rather than axum's plain-text defaults.

use std::collections::HashMap;

use dataprep_protocol::{QualitySettings, StartProcessingRequest};

use super::error::ApiError;
use crate::config::PaginationSection;

/// Parse a positive integer path parameter.
pub fn parse_id(raw: &str, name: &str) -> Result<i64, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::invalid_id(format!(
            "Missing required parameter: {}",
            name
        )));
    }

    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        Ok(_) => Err(ApiError::invalid_id(format!(
            "Invalid {}: must be a positive integer",
            name
        ))),
        Err(_) => Err(ApiError::invalid_id(format!(
            "Invalid {}: must be a number",
            name
        ))),
    }
}

/// Requested page, after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

/// `page` defaults to 1 and is at least 1; `limit` defaults to the configured
/// default and is clamped to `[1, max_limit]`.
pub fn parse_pagination(
    query: &HashMap<String, String>,
    bounds: &PaginationSection,
) -> Result<PageParams, ApiError> {
    let page = parse_query_int(query.get("page"), "page", 1)?;
    let limit = parse_query_int(query.get("limit"), "limit", bounds.default_limit)?;

    Ok(PageParams {
        page: page.max(1),
        limit: limit.clamp(1, bounds.max_limit.max(1)),
    })
}

fn parse_query_int(value: Option<&String>, name: &str, default: u32) -> Result<u32, ApiError> {
    let Some(raw) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    let parsed = raw
        .parse::<i64>()
        .map_err(|_| ApiError::validation(format!("Invalid {}: must be a number", name)))?;
    if parsed < 0 {
        return Err(ApiError::validation(format!(
            "Invalid {}: must be non-negative",
            name
        )));
    }
    Ok(u32::try_from(parsed).unwrap_or(u32::MAX))
}

/// Parse the start-processing body. An empty body is treated as `{}`.
pub fn parse_start_body(body: &[u8]) -> Result<Option<QualitySettings>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let request: StartProcessingRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))?;

    if let Some(settings) = &request.quality_settings {
        settings.validate().map_err(ApiError::validation)?;
    }
    Ok(request.quality_settings)
}
