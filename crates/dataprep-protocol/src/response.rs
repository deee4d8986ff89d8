//! Success and paginated response envelopes.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Per-response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// RFC 3339 timestamp of when the response was produced.
    pub timestamp: String,
    /// Unique id for correlating a response with server logs.
    pub request_id: String,
}

impl Meta {
    /// Fresh metadata stamped with the current time and a new request id.
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// `{ "data": T, "meta": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    pub data: T,
    pub meta: Meta,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Meta::now(),
        }
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl Pagination {
    /// Derive page counts from the requested window and the total row count.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit));
        Self {
            page,
            limit,
            total,
            total_pages,
            has_more: u64::from(page) < total_pages,
        }
    }
}

/// `{ "data": [T], "pagination": {...}, "meta": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedEnvelope<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
    pub meta: Meta,
}

impl<T> PaginatedEnvelope<T> {
    pub fn new(data: Vec<T>, pagination: Pagination) -> Self {
        Self {
            data,
            pagination,
            meta: Meta::now(),
        }
    }
}
