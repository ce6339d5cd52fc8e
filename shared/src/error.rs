//! Error types for the booking dashboard.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of characters of an upstream body kept for diagnostics.
pub const UPSTREAM_BODY_LIMIT: usize = 500;

/// Errors that can occur while serving or rendering dashboard data.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-success status from the spreadsheet backend
    #[error("Upstream error: HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Response body could not be parsed into the expected structure
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an upstream error, truncating the body for diagnostics.
    pub fn upstream(status: u16, body: &str) -> Self {
        Error::Upstream {
            status,
            body: truncate(body, UPSTREAM_BODY_LIMIT),
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) => 401,
            Error::NotFound(_) => 404,
            Error::Upstream { .. } | Error::MalformedResponse(_) | Error::Http(_) => 502,
            _ => 500,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Upstream { status, .. } => *status >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Truncate to at most `limit` characters without splitting a code point.
pub fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("sheet".into()).status_code(), 400);
        assert_eq!(Error::Auth("no secret".into()).status_code(), 401);
        assert_eq!(Error::upstream(503, "busy").status_code(), 502);
        assert_eq!(Error::Config("missing".into()).status_code(), 500);
    }

    #[test]
    fn test_upstream_body_is_truncated() {
        let body = "x".repeat(2000);
        match Error::upstream(500, &body) {
            Error::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), UPSTREAM_BODY_LIMIT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_only_for_server_errors() {
        assert!(Error::upstream(502, "").is_transient());
        assert!(!Error::upstream(404, "").is_transient());
        assert!(!Error::MalformedResponse("html".into()).is_transient());
        assert!(!Error::Auth("rejected".into()).is_transient());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
