use std::time::Duration;

use tracing::{info, warn};

use super::{AccountIdentity, Credentials, Session, SessionValidator};
use crate::api::{Platform, PlatformError};
use crate::error::PostError;
use crate::retry::RetryPolicy;

/// Performs a credential login and reads back the resulting session.
#[derive(Debug, Clone)]
pub struct Authenticator {
    settle_delay: Duration,
    login_timeout: Duration,
    validator: SessionValidator,
    retry: RetryPolicy,
}

impl Authenticator {
    pub fn new(settle_delay: Duration, login_timeout: Duration, validator: SessionValidator, retry: RetryPolicy) -> Self {
        Self {
            settle_delay,
            login_timeout,
            validator,
            retry,
        }
    }

    /// Log `identity` in from scratch.
    ///
    /// Clears whatever the client holds before every attempt, submits the
    /// credentials, waits once for the platform to settle, confirms the
    /// account, and returns the new tokens. The credentials are only borrowed for the login call.
    pub async fn login(
        &self,
        platform: &dyn Platform,
        identity: &AccountIdentity,
        credentials: &Credentials,
    ) -> Result<Session, PostError> {
        info!(identity = %identity, "Performing fresh login");

        let outcome = self
            .retry
            .run("login", move || async move {
                platform.clear_session_tokens().await;
                let call = platform.login(credentials.username(), credentials.password(), credentials.email());
                tokio::time::timeout(self.login_timeout, call)
                    .await
                    .unwrap_or(Err(PlatformError::Timeout))
            })
            .await;

        if let Err(e) = outcome {
            warn!(identity = %identity, error = %e, "Login failed");
            let reason = match e {
                PlatformError::CredentialsRejected(_) => "credentials rejected",
                _ => "login request failed",
            };
            return Err(PostError::authentication(reason, Some(e)));
        }

        tokio::time::sleep(self.settle_delay).await;

        if !self.validator.check(platform, identity).await.is_valid() {
            return Err(PostError::authentication(
                "login reported success but the account could not be confirmed",
                None,
            ));
        }

        let session = Session::new(platform.session_tokens().await);
        if session.persistable().is_empty() {
            return Err(PostError::authentication("login returned no session tokens", None));
        }

        info!(identity = %identity, tokens = session.len(), "Login successful");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{authenticator, ScriptedPlatform};

    fn identity(handle: &str) -> AccountIdentity {
        AccountIdentity::new(handle).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_returns_new_session() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        let session = authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "pw"))
            .await
            .unwrap();

        assert!(!session.is_empty());
        assert_eq!(platform.counts().logins, 1);
        assert_eq!(platform.counts().clears, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_settle_delay_once() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        let started = tokio::time::Instant::now();
        authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "pw"))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_are_not_retried() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        let err = authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(platform.counts().logins, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_login_failure_is_retried() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        platform.fail_logins(vec![PlatformError::Network("reset".into())]);
        authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "pw"))
            .await
            .unwrap();
        assert_eq!(platform.counts().logins, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_leaves_no_tokens_behind() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        platform.fail_logins(vec![PlatformError::Network("reset".into())]);
        let session = authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "pw"))
            .await
            .unwrap();

        assert_eq!(platform.counts().clears, 2);
        assert!(session.tokens().iter().all(|t| t.name != "att"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_tokens_fails() {
        let platform = ScriptedPlatform::new("alice").with_password("pw");
        platform.issue_no_tokens();
        let err = authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("alice", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_as_other_account_fails_confirmation() {
        let platform = ScriptedPlatform::new("mallory").with_password("pw");
        let err = authenticator()
            .login(&platform, &identity("alice"), &Credentials::new("mallory", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
