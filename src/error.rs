//! Error classification shared across the pipeline.
//!
//! Each concern owns its own `thiserror` enum; `ErrorCode` gives callers a
//! stable machine-readable code and a retry hint regardless of which enum
//! they are holding.

use crate::http::TransportError;

/// Stable error code plus retry hint for any crate error.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// REFRESH
// =============================================================================

/// Outcome of a failed token refresh. Cloned into every queued caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token was stored when the refresh protocol engaged.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16, body: String },

    /// The refresh call never produced a response.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh endpoint answered 2xx with an unreadable body.
    #[error("refresh response malformed: {0}")]
    Malformed(String),

    /// The refreshing task went away before settling the refresh.
    #[error("refresh abandoned before settling")]
    Abandoned,
}

impl ErrorCode for RefreshError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "E_REFRESH_MISSING_TOKEN",
            Self::Rejected { .. } => "E_REFRESH_REJECTED",
            Self::Transport(_) => "E_REFRESH_TRANSPORT",
            Self::Malformed(_) => "E_REFRESH_MALFORMED",
            Self::Abandoned => "E_REFRESH_ABANDONED",
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Final, post-recovery failure of a request issued through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The transport could not complete the exchange.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    Status { status: u16, body: String },

    /// Session recovery failed; the session has been logged out.
    #[error("session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// The request body could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(String),

    /// The response body could not be deserialized into the expected type.
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl RequestError {
    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.error_code(),
            Self::Status { status: 401, .. } => "E_UNAUTHORIZED",
            Self::Status { status: 403, .. } => "E_FORBIDDEN",
            Self::Status { status: 404, .. } => "E_NOT_FOUND",
            Self::Status { .. } => "E_HTTP_STATUS",
            Self::Refresh(e) => e.error_code(),
            Self::Encode(_) => "E_ENCODE",
            Self::Decode(_) => "E_DECODE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.retryable(),
            Self::Status { status, .. } => matches!(status, 429 | 500..=599),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
