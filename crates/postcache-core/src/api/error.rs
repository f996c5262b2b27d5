use std::time::Duration;

use thiserror::Error;

/// Failures reported by a platform client.
///
/// Every client produces one of these closed kinds; callers decide control
/// flow from the variant, never from the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited - please wait before retrying")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Session expired or not authenticated")]
    SessionExpired,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl PlatformError {
    /// Whether an unmodified retry is expected to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Network(_)
                | PlatformError::RateLimited { .. }
                | PlatformError::SessionExpired
                | PlatformError::Unavailable(_)
        )
    }

    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => PlatformError::SessionExpired,
            400 | 403 | 422 => PlatformError::ContentRejected(truncated),
            404 => PlatformError::NotFound(truncated),
            429 => PlatformError::RateLimited { retry_after },
            502 | 503 => PlatformError::Unavailable(truncated),
            500..=599 => PlatformError::ServerError(truncated),
            _ => PlatformError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PlatformError::Timeout
        } else if err.is_decode() {
            PlatformError::InvalidResponse(err.to_string())
        } else {
            PlatformError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(PlatformError::from_status(StatusCode::UNAUTHORIZED, "", None), PlatformError::SessionExpired);
        assert!(matches!(
            PlatformError::from_status(StatusCode::FORBIDDEN, "duplicate", None),
            PlatformError::ContentRejected(ref b) if b == "duplicate"
        ));
        assert_eq!(
            PlatformError::from_status(StatusCode::TOO_MANY_REQUESTS, "", Some(Duration::from_secs(5))),
            PlatformError::RateLimited { retry_after: Some(Duration::from_secs(5)) }
        );
        assert!(matches!(
            PlatformError::from_status(StatusCode::SERVICE_UNAVAILABLE, "", None),
            PlatformError::Unavailable(_)
        ));
        assert!(matches!(
            PlatformError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "", None),
            PlatformError::ServerError(_)
        ));
        assert!(matches!(
            PlatformError::from_status(StatusCode::IM_A_TEAPOT, "", None),
            PlatformError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(PlatformError::Network("reset".into()).is_transient());
        assert!(PlatformError::RateLimited { retry_after: None }.is_transient());
        assert!(PlatformError::SessionExpired.is_transient());
        assert!(PlatformError::Unavailable(String::new()).is_transient());

        assert!(!PlatformError::Timeout.is_transient());
        assert!(!PlatformError::ContentRejected(String::new()).is_transient());
        assert!(!PlatformError::ServerError(String::new()).is_transient());
        assert!(!PlatformError::CredentialsRejected(String::new()).is_transient());
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(2000);
        let truncated = PlatformError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.contains("2000 total bytes"));
        assert_eq!(PlatformError::truncate_body("short"), "short");
    }
}
