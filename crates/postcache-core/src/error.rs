//! Error taxonomy surfaced to callers of the post orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::api::PlatformError;
use crate::cache::StoreError;

#[derive(Error, Debug)]
pub enum PostError {
    /// No usable session and no credentials to log in with.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {reason}")]
    Authentication {
        reason: String,
        #[source]
        source: Option<PlatformError>,
    },

    #[error("Post failed after {attempts} attempt(s): {source}")]
    TransientSubmission {
        attempts: u32,
        #[source]
        source: PlatformError,
    },

    #[error("Post rejected by platform: {0}")]
    ContentRejected(String),

    /// The platform may or may not have accepted the post.
    #[error("Post outcome unknown, not resubmitting: {0}")]
    OutcomeUnknown(#[source] PlatformError),

    #[error("Session storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    /// A read-only platform call (recent posts) failed.
    #[error("Platform request failed: {0}")]
    Fetch(#[source] PlatformError),
}

/// Fieldless view of `PostError` for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    TransientSubmission,
    ContentRejected,
    OutcomeUnknown,
    Storage,
    InvalidRequest,
    DeadlineExceeded,
    Fetch,
}

impl PostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PostError::Configuration(_) => ErrorKind::Configuration,
            PostError::Authentication { .. } => ErrorKind::Authentication,
            PostError::TransientSubmission { .. } => ErrorKind::TransientSubmission,
            PostError::ContentRejected(_) => ErrorKind::ContentRejected,
            PostError::OutcomeUnknown(_) => ErrorKind::OutcomeUnknown,
            PostError::Storage(_) => ErrorKind::Storage,
            PostError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PostError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            PostError::Fetch(_) => ErrorKind::Fetch,
        }
    }

    pub(crate) fn authentication(reason: impl Into<String>, source: Option<PlatformError>) -> Self {
        PostError::Authentication {
            reason: reason.into(),
            source,
        }
    }

    /// Classify a submission failure that will not be retried further.
    pub(crate) fn from_submission(err: PlatformError, attempts: u32) -> Self {
        match err {
            e if e.is_transient() => PostError::TransientSubmission { attempts, source: e },
            PlatformError::ContentRejected(body) | PlatformError::NotFound(body) => {
                PostError::ContentRejected(body)
            }
            PlatformError::CredentialsRejected(body) => PostError::authentication(
                "platform refused the account while posting",
                Some(PlatformError::CredentialsRejected(body)),
            ),
            e @ (PlatformError::Timeout
            | PlatformError::ServerError(_)
            | PlatformError::InvalidResponse(_)) => PostError::OutcomeUnknown(e),
            // Covered by the transient guard above.
            e => PostError::TransientSubmission { attempts, source: e },
        }
    }
}
