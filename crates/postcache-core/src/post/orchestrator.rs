use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::{IdentityLocks, PostRequest};
use crate::api::{HttpConnector, Platform, PlatformConnector, PlatformError, PostResult, PostSummary, Profile};
use crate::auth::{AccountIdentity, Authenticator, Credentials, Session, SessionCheck, SessionValidator};
use crate::cache::{FileStore, KeyValueStore, KeyringStore, MemoryStore, SessionCipher, SessionStore, StoreError};
use crate::config::{Config, StoreBackend};
use crate::error::PostError;
use crate::retry::{RetryDecision, RetryPolicy};

/// Where a single post request is in its lifecycle.
enum State<'c> {
    Start,
    SessionLoaded(Option<Session>),
    Validating(Session),
    Authenticated,
    NeedsLogin,
    LoggingIn(&'c Credentials),
    Submitting,
    Done(PostResult),
    Failed(PostError),
}

impl State<'_> {
    fn name(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::SessionLoaded(_) => "session_loaded",
            State::Validating(_) => "validating",
            State::Authenticated => "authenticated",
            State::NeedsLogin => "needs_login",
            State::LoggingIn(_) => "logging_in",
            State::Submitting => "submitting",
            State::Done(_) => "done",
            State::Failed(_) => "failed",
        }
    }
}

/// Result of `check_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing stored for the identity.
    Missing,
    /// A session is stored but the platform no longer accepts it.
    Invalid,
    Valid(Profile),
}

/// Posts messages on behalf of account identities, reusing stored sessions
/// and logging in only when they are missing or rejected.
pub struct PostOrchestrator {
    connector: Arc<dyn PlatformConnector>,
    store: SessionStore,
    validator: SessionValidator,
    authenticator: Authenticator,
    retry: RetryPolicy,
    submit_timeout: Duration,
    deadline: Option<Duration>,
    locks: Option<IdentityLocks>,
}

impl PostOrchestrator {
    /// Orchestrator over the given collaborators with default tuning.
    pub fn new(connector: Arc<dyn PlatformConnector>, backend: Arc<dyn KeyValueStore>) -> Self {
        Self::build(connector, backend, &Config::default())
    }

    /// Wire up the HTTP platform and the configured session backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let connector = HttpConnector::new(config.platform.clone())?;
        let backend = open_backend(config)?;
        Ok(Self::build(Arc::new(connector), backend, config))
    }

    fn build(connector: Arc<dyn PlatformConnector>, backend: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let validator = SessionValidator::new(Duration::from_secs(config.auth.validate_timeout_secs));
        let retry = RetryPolicy::from(&config.retry);
        let authenticator = Authenticator::new(
            Duration::from_millis(config.auth.settle_delay_ms),
            Duration::from_secs(config.auth.login_timeout_secs),
            validator.clone(),
            retry.clone(),
        );

        Self {
            connector,
            store: SessionStore::new(backend),
            validator,
            authenticator,
            retry,
            submit_timeout: config.submit_timeout(),
            deadline: config.deadline(),
            locks: config.serialize_per_identity.then(IdentityLocks::new),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Let concurrent requests for one identity interleave (last writer wins).
    pub fn without_identity_locks(mut self) -> Self {
        self.locks = None;
        self
    }

    /// Publish `request` as `identity`.
    ///
    /// A stored session is used when the platform still accepts it. Otherwise
    /// `credentials` are used for exactly one fresh login; without them the
    /// request fails with `PostError::Configuration`. Transient submission
    /// failures are retried with backoff, re-checking the session before each
    /// retry; only a session the platform reports as logged out leads to a
    /// login. Ambiguous outcomes are never resubmitted. The session is saved
    /// again after every accepted post.
    pub async fn submit_post(
        &self,
        identity: &AccountIdentity,
        credentials: Option<Credentials>,
        request: PostRequest,
    ) -> Result<PostResult, PostError> {
        self.bounded(async {
            let _guard = self.serialize(identity).await;
            self.run_post(identity, credentials.as_ref(), &request).await
        })
        .await
    }

    async fn run_post(
        &self,
        identity: &AccountIdentity,
        credentials: Option<&Credentials>,
        request: &PostRequest,
    ) -> Result<PostResult, PostError> {
        let client = self.connector.connect();
        let platform = client.as_ref();
        // Token set read from the store, updated when validation re-saves it.
        let mut persisted: Option<Session> = None;
        let mut attempt: u32 = 0;
        let mut state = State::Start;

        loop {
            debug!(identity = %identity, state = state.name(), attempt, "Post state");
            state = match state {
                State::Start => State::SessionLoaded(self.store.load(identity).await),

                State::SessionLoaded(Some(session)) => {
                    persisted = Some(session.persistable());
                    State::Validating(session)
                }
                State::SessionLoaded(None) => State::NeedsLogin,

                State::Validating(session) => {
                    if self.validator.validate(platform, identity, &session).await {
                        match self.persist_if_changed(platform, identity, &mut persisted).await {
                            Ok(()) => State::Authenticated,
                            Err(e) => State::Failed(e.into()),
                        }
                    } else {
                        info!(identity = %identity, "Stored session is no longer valid");
                        State::NeedsLogin
                    }
                }

                State::Authenticated => State::Submitting,

                State::NeedsLogin => match credentials {
                    Some(credentials) => State::LoggingIn(credentials),
                    None => State::Failed(PostError::Configuration(format!(
                        "no valid session for {} and no credentials supplied",
                        identity
                    ))),
                },

                State::LoggingIn(credentials) => {
                    match self.authenticator.login(platform, identity, credentials).await {
                        Ok(session) => match self.store.save(identity, &session).await {
                            Ok(_) => State::Submitting,
                            Err(e) => State::Failed(e.into()),
                        },
                        Err(e) => State::Failed(e),
                    }
                }

                State::Submitting => {
                    attempt += 1;
                    match self.submit_once(platform, request).await {
                        Ok(result) => {
                            info!(identity = %identity, attempt, id = ?result.id(), "Post accepted");
                            let current = Session::new(platform.session_tokens().await);
                            if let Err(e) = self.store.save(identity, &current).await {
                                warn!(identity = %identity, error = %e, "Failed to save session after posting");
                            }
                            State::Done(result)
                        }
                        Err(e) => match self.retry.should_retry(attempt, &e) {
                            RetryDecision::Retry { delay } => {
                                warn!(
                                    identity = %identity,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %e,
                                    "Post failed, retrying"
                                );
                                tokio::time::sleep(delay).await;
                                match self.validator.check(platform, identity).await {
                                    SessionCheck::Valid(_) => State::Submitting,
                                    SessionCheck::NotAuthenticated => {
                                        info!(identity = %identity, "Session expired mid-flight");
                                        State::NeedsLogin
                                    }
                                    SessionCheck::Unknown if e == PlatformError::SessionExpired => {
                                        info!(identity = %identity, "Session expired mid-flight");
                                        State::NeedsLogin
                                    }
                                    // No answer is not a rejection: keep the session.
                                    SessionCheck::Unknown => State::Submitting,
                                }
                            }
                            RetryDecision::Stop => {
                                warn!(identity = %identity, attempt, error = %e, "Post failed");
                                State::Failed(PostError::from_submission(e, attempt))
                            }
                        },
                    }
                }

                State::Done(result) => return Ok(result),
                State::Failed(e) => return Err(e),
            };
        }
    }

    async fn submit_once(&self, platform: &dyn Platform, request: &PostRequest) -> Result<PostResult, PlatformError> {
        let call = platform.submit_message(request.text(), request.reply_to());
        tokio::time::timeout(self.submit_timeout, call)
            .await
            .unwrap_or(Err(PlatformError::Timeout))
    }

    /// Log in from scratch and store the session without posting anything.
    pub async fn login_and_store(
        &self,
        identity: &AccountIdentity,
        credentials: Credentials,
    ) -> Result<Session, PostError> {
        self.bounded(async {
            let _guard = self.serialize(identity).await;
            let client = self.connector.connect();
            let session = self.authenticator.login(client.as_ref(), identity, &credentials).await?;
            self.store.save(identity, &session).await?;
            Ok(session.persistable())
        })
        .await
    }

    /// Report whether the stored session for `identity` is still accepted.
    /// Never logs in.
    pub async fn check_session(&self, identity: &AccountIdentity) -> Result<SessionStatus, PostError> {
        self.bounded(async {
            let _guard = self.serialize(identity).await;
            let Some(session) = self.store.load(identity).await else {
                return Ok(SessionStatus::Missing);
            };

            let client = self.connector.connect();
            let platform = client.as_ref();
            platform.set_session_tokens(session.tokens().to_vec()).await;
            let Some(profile) = self.validator.confirm(platform, identity).await else {
                return Ok(SessionStatus::Invalid);
            };

            let mut persisted = Some(session.persistable());
            if let Err(e) = self.persist_if_changed(platform, identity, &mut persisted).await {
                warn!(identity = %identity, error = %e, "Failed to save refreshed session");
            }
            Ok(SessionStatus::Valid(profile))
        })
        .await
    }

    /// Fetch the account's most recent posts with the stored session.
    pub async fn recent_posts(&self, identity: &AccountIdentity, count: usize) -> Result<Vec<PostSummary>, PostError> {
        self.bounded(async {
            let _guard = self.serialize(identity).await;
            let session = self.store.load(identity).await.ok_or_else(|| {
                PostError::Configuration(format!("no stored session for {}, log in first", identity))
            })?;

            let client = self.connector.connect();
            let platform = client.as_ref();
            if !self.validator.validate(platform, identity, &session).await {
                return Err(PostError::Configuration(format!(
                    "stored session for {} is no longer valid, log in again",
                    identity
                )));
            }

            let handle = identity.handle();
            let posts = self
                .retry
                .run("recent", move || async move {
                    tokio::time::timeout(self.submit_timeout, platform.recent_messages(handle, count))
                        .await
                        .unwrap_or(Err(PlatformError::Timeout))
                })
                .await
                .map_err(PostError::Fetch)?;

            let mut persisted = Some(session.persistable());
            if let Err(e) = self.persist_if_changed(platform, identity, &mut persisted).await {
                warn!(identity = %identity, error = %e, "Failed to save refreshed session");
            }
            Ok(posts)
        })
        .await
    }

    /// Save the client's current tokens unless they match what is already stored.
    async fn persist_if_changed(
        &self,
        platform: &dyn Platform,
        identity: &AccountIdentity,
        persisted: &mut Option<Session>,
    ) -> Result<(), StoreError> {
        let current = Session::new(platform.session_tokens().await).persistable();
        if persisted.as_ref() == Some(&current) {
            debug!(identity = %identity, "Session unchanged, not saving");
            return Ok(());
        }
        if self.store.save(identity, &current).await? {
            *persisted = Some(current);
        }
        Ok(())
    }

    async fn serialize(&self, identity: &AccountIdentity) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(identity).await),
            None => None,
        }
    }

    async fn bounded<T>(&self, work: impl Future<Output = Result<T, PostError>>) -> Result<T, PostError> {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(PostError::DeadlineExceeded(limit))),
            None => work.await,
        }
    }
}

fn open_backend(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let backend: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Keyring => Arc::new(KeyringStore::new(config.store.keyring_service.clone())),
        StoreBackend::File => {
            let mut store = FileStore::new(config.session_dir()?);
            if config.store.encrypt {
                let passphrase = std::env::var(&config.store.passphrase_env).with_context(|| {
                    format!("store.encrypt is enabled but {} is not set", config.store.passphrase_env)
                })?;
                store = store.with_cipher(SessionCipher::new(passphrase)?);
            }
            Arc::new(store)
        }
    };
    Ok(backend)
}
