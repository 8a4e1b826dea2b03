//! Shared constants for Claude error envelopes and upstream failure categories.

use axum::http::StatusCode;
use std::fmt;

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_AUTHENTICATION: &str = "authentication_error";
pub const ERROR_TYPE_PERMISSION: &str = "permission_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_error";
pub const ERROR_TYPE_OVERLOADED: &str = "overloaded_error";

pub const UPSTREAM_ERROR_4XX: &str = "upstream_4xx";
pub const UPSTREAM_ERROR_5XX: &str = "upstream_5xx";
pub const UPSTREAM_ERROR_TIMEOUT: &str = "timeout";
pub const UPSTREAM_ERROR_TRANSPORT: &str = "transport";

/// Claude error `type` for an HTTP status.
pub fn error_type_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 | 413 | 422 => ERROR_TYPE_INVALID_REQUEST,
        401 => ERROR_TYPE_AUTHENTICATION,
        403 => ERROR_TYPE_PERMISSION,
        404 => ERROR_TYPE_NOT_FOUND,
        408 | 504 => ERROR_TYPE_TIMEOUT,
        429 => ERROR_TYPE_RATE_LIMIT,
        503 | 529 => ERROR_TYPE_OVERLOADED,
        _ => ERROR_TYPE_API,
    }
}

/// Category of an upstream failure, used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Status4xx,
    Status5xx,
    Timeout,
    Transport,
}

impl UpstreamErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status4xx => UPSTREAM_ERROR_4XX,
            Self::Status5xx => UPSTREAM_ERROR_5XX,
            Self::Timeout => UPSTREAM_ERROR_TIMEOUT,
            Self::Transport => UPSTREAM_ERROR_TRANSPORT,
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::Status5xx
        } else {
            Self::Status4xx
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
