use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{AccountIdentity, Session};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode session: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session encryption error: {0}")]
    Crypto(String),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The persistence collaborator: a remote or local string key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Holds at most one current session per account identity.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Load the stored session for an identity.
    ///
    /// Read and decode failures are logged and reported as "no session" so the
    /// caller falls back to a credential login. Expired tokens are dropped; a
    /// session with nothing left counts as absent.
    pub async fn load(&self, identity: &AccountIdentity) -> Option<Session> {
        debug!(identity = %identity, "Loading session");
        let text = match self.backend.get(&identity.key()).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(identity = %identity, "No saved session found");
                return None;
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to read session, treating as absent");
                return None;
            }
        };

        let session = match Session::from_canonical(&text) {
            Ok(session) => session.without_expired(Utc::now()),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to parse session, treating as absent");
                return None;
            }
        };

        if session.is_empty() {
            debug!(identity = %identity, "Stored session has no live tokens");
            return None;
        }

        debug!(identity = %identity, tokens = session.len(), "Loaded session");
        Some(session)
    }

    /// Persist a session, overwriting any previous one.
    ///
    /// Guest tokens are filtered first. If nothing remains the call is a no-op
    /// so a good stored session is never replaced by an empty one. Returns
    /// whether anything was written.
    pub async fn save(&self, identity: &AccountIdentity, session: &Session) -> Result<bool, StoreError> {
        let persistable = session.persistable();
        if persistable.is_empty() {
            debug!(identity = %identity, "No session tokens to save");
            return Ok(false);
        }

        let text = persistable.to_canonical()?;
        self.backend.put(&identity.key(), text).await?;
        info!(identity = %identity, tokens = persistable.len(), "Saved session");
        Ok(true)
    }
}
