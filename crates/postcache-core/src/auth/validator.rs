use std::time::Duration;

use tracing::{debug, warn};

use super::{AccountIdentity, Session};
use crate::api::{Platform, Profile};

/// What the platform said about the session a client holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Logged in as the expected account.
    Valid(Profile),
    /// The platform answered and the session is not usable for this account.
    NotAuthenticated,
    /// No answer: the check errored or timed out.
    Unknown,
}

impl SessionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionCheck::Valid(_))
    }
}

/// Checks whether a session is still logged in, without logging in.
#[derive(Debug, Clone)]
pub struct SessionValidator {
    timeout: Duration,
}

impl SessionValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Load `session` into the client and check it.
    ///
    /// Anything short of a confirmed login counts as invalid here.
    pub async fn validate(&self, platform: &dyn Platform, identity: &AccountIdentity, session: &Session) -> bool {
        platform.set_session_tokens(session.tokens().to_vec()).await;
        self.check(platform, identity).await.is_valid()
    }

    /// The profile the client is logged in as, if it is `identity`.
    pub async fn confirm(&self, platform: &dyn Platform, identity: &AccountIdentity) -> Option<Profile> {
        match self.check(platform, identity).await {
            SessionCheck::Valid(profile) => Some(profile),
            SessionCheck::NotAuthenticated | SessionCheck::Unknown => None,
        }
    }

    /// Ask the platform who the client's current session belongs to.
    ///
    /// A session for another account is `NotAuthenticated`. Errors and
    /// timeouts are `Unknown`.
    pub async fn check(&self, platform: &dyn Platform, identity: &AccountIdentity) -> SessionCheck {
        match tokio::time::timeout(self.timeout, platform.current_identity()).await {
            Ok(Ok(Some(profile))) if identity.matches(&profile.handle) => {
                debug!(identity = %identity, "Session is authenticated");
                SessionCheck::Valid(profile)
            }
            Ok(Ok(Some(profile))) => {
                warn!(identity = %identity, actual = %profile.handle, "Session belongs to a different account");
                SessionCheck::NotAuthenticated
            }
            Ok(Ok(None)) => {
                debug!(identity = %identity, "Session is not authenticated");
                SessionCheck::NotAuthenticated
            }
            Ok(Err(e)) => {
                debug!(identity = %identity, error = %e, "Session check failed");
                SessionCheck::Unknown
            }
            Err(_) => {
                warn!(identity = %identity, timeout_secs = self.timeout.as_secs(), "Session check timed out");
                SessionCheck::Unknown
            }
        }
    }
}
