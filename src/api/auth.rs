//! Client authentication for the gateway.
//!
//! Claude clients send their key in `x-api-key`; OpenAI-style clients use
//! `Authorization: Bearer`. Both are accepted, `x-api-key` first.

use crate::core::{AppError, Result};
use axum::http::HeaderMap;

/// Extract the client key from request headers.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| extract_bearer(headers))
}

/// Extract Bearer token from Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Verify the client key against the configured one.
///
/// Without a configured key every request is accepted.
pub fn verify_auth(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected.filter(|k| !k.is_empty()) else {
        return Ok(());
    };

    match extract_api_key(headers) {
        Some(provided) if provided == expected => Ok(()),
        Some(_) => {
            tracing::warn!("Rejected request with an invalid API key");
            Err(AppError::Unauthorized)
        }
        None => Err(AppError::Unauthorized),
    }
}
