//! HTTP handlers and the pieces they share: response envelope, path id
//! parsing and request-id lookup.

pub mod ad_handlers;
pub mod health_handlers;
pub mod photo_handlers;

use crate::{errors::AppError, services::ad_service::ServiceError};
use axum::http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Envelope for successful mutating calls: `{"err": ..., ...data}` with
/// `err` omitted when absent.
#[derive(Debug, Serialize)]
pub struct MutationResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> MutationResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { err: None, data }
    }
}

/// Payload of calls that return nothing beyond success.
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

/// Parse a positive identifier from a path segment.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ServiceError::BadRouting.into()),
    }
}

/// The request id set by the request-id middleware, or a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
