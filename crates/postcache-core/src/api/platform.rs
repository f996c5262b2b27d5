use async_trait::async_trait;

use super::models::{PostResult, PostSummary, Profile};
use super::PlatformError;
use crate::auth::SessionToken;

/// What the orchestrator needs from a social platform client.
///
/// A client carries the token jar of a single session; token operations only
/// touch that local jar, never the platform.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn set_session_tokens(&self, tokens: Vec<SessionToken>);

    async fn session_tokens(&self) -> Vec<SessionToken>;

    async fn clear_session_tokens(&self);

    /// Submit credentials. Rejected credentials surface as `CredentialsRejected`.
    async fn login(&self, username: &str, password: &str, email: Option<&str>) -> Result<(), PlatformError>;

    /// Read-only liveness check. `Ok(None)` means the jar is not authenticated.
    async fn current_identity(&self) -> Result<Option<Profile>, PlatformError>;

    async fn submit_message(&self, text: &str, reply_to: Option<&str>) -> Result<PostResult, PlatformError>;

    async fn recent_messages(&self, handle: &str, count: usize) -> Result<Vec<PostSummary>, PlatformError>;
}

/// Hands out a fresh client per request so token jars are never shared.
pub trait PlatformConnector: Send + Sync {
    fn connect(&self) -> Box<dyn Platform>;
}
