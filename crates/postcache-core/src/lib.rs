//! Postcache core library.
//!
//! Posts messages to a social platform on behalf of an account while keeping
//! its login session cached between runs, so credentials are only used when
//! the cached session is missing or no longer accepted.
//!
//! # Modules
//!
//! - `api`: platform capability trait, HTTP client, and response models
//! - `auth`: identities, credentials, sessions, validation, and login
//! - `cache`: session persistence over pluggable key/value backends
//! - `config`: JSON configuration
//! - `error`: the `PostError` taxonomy
//! - `post`: the post orchestrator
//! - `retry`: backoff policy for transient platform failures

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod post;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Platform, PlatformConnector, PlatformError, PostResult, PostSummary, Profile};
pub use auth::{AccountIdentity, Credentials, Session, SessionToken};
pub use cache::{KeyValueStore, SessionStore};
pub use config::Config;
pub use error::{ErrorKind, PostError};
pub use post::{PostOrchestrator, PostRequest, SessionStatus};
pub use retry::RetryPolicy;
