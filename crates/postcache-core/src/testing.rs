//! Test doubles: a scripted in-memory platform and a store that counts writes.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::api::{Platform, PlatformConnector, PlatformError, PostResult, PostSummary, Profile};
use crate::auth::{AccountIdentity, Authenticator, Session, SessionToken, SessionValidator};
use crate::cache::{KeyValueStore, MemoryStore, StoreError};
use crate::retry::RetryPolicy;

const DOMAIN: &str = ".social.example";
const AUTH_COOKIE: &str = "auth_token";

/// A session the scripted platform will recognise once `accept_session` is called.
pub fn session_for(handle: &str) -> Session {
    Session::new(vec![
        SessionToken::new(AUTH_COOKIE, format!("stored-{}", handle), DOMAIN),
        SessionToken::new("ct0", "csrf-stored", DOMAIN),
    ])
}

pub fn authenticator() -> Authenticator {
    Authenticator::new(
        Duration::from_secs(3),
        Duration::from_secs(30),
        SessionValidator::new(Duration::from_secs(30)),
        RetryPolicy::default(),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub logins: usize,
    pub checks: usize,
    pub submits: usize,
    pub clears: usize,
    pub sets: usize,
}

/// What the next `submit_message` call does.
#[derive(Debug, Clone)]
pub enum SubmitStep {
    Fail(PlatformError),
    /// Invalidate the held session, then report it expired.
    ExpireSession,
    Succeed,
}

#[derive(Default)]
struct State {
    password: Option<String>,
    valid: HashSet<String>,
    jar: Vec<SessionToken>,
    login_failures: VecDeque<PlatformError>,
    submit_steps: VecDeque<SubmitStep>,
    identity_error: Option<PlatformError>,
    identity_steps: VecDeque<Option<PlatformError>>,
    identity_delay: Option<Duration>,
    no_tokens: bool,
    rotate_on_submit: bool,
    issued: usize,
    posted: Vec<(String, Option<String>)>,
    submit_times: Vec<Instant>,
    counts: Counts,
}

/// In-memory platform for one account. Clones share state, so a clone handed
/// to the orchestrator through `PlatformConnector` stays observable.
#[derive(Clone)]
pub struct ScriptedPlatform {
    handle: String,
    state: Arc<Mutex<State>>,
}

impl ScriptedPlatform {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn with_password(self, password: &str) -> Self {
        self.state().password = Some(password.to_string());
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn accept_session(&self, session: &Session) {
        let mut state = self.state();
        for token in session.tokens().iter().filter(|t| t.name == AUTH_COOKIE) {
            state.valid.insert(token.value.clone());
        }
    }

    /// Fail every identity check from now on.
    pub fn fail_identity_checks(&self, error: PlatformError) {
        self.state().identity_error = Some(error);
    }

    /// Outcomes of the next identity checks, in order: `None` answers
    /// normally, `Some` fails that one call.
    pub fn script_identity_checks(&self, steps: Vec<Option<PlatformError>>) {
        self.state().identity_steps.extend(steps);
    }

    pub fn delay_identity_checks(&self, delay: Duration) {
        self.state().identity_delay = Some(delay);
    }

    pub fn fail_logins(&self, errors: Vec<PlatformError>) {
        self.state().login_failures.extend(errors);
    }

    pub fn issue_no_tokens(&self) {
        self.state().no_tokens = true;
    }

    pub fn script_submits(&self, steps: Vec<SubmitStep>) {
        self.state().submit_steps.extend(steps);
    }

    /// Refresh the CSRF token on every accepted post.
    pub fn rotate_on_submit(&self) {
        self.state().rotate_on_submit = true;
    }

    pub fn counts(&self) -> Counts {
        self.state().counts
    }

    pub fn held_session(&self) -> Session {
        Session::new(self.state().jar.clone())
    }

    pub fn posted(&self) -> Vec<(String, Option<String>)> {
        self.state().posted.clone()
    }

    pub fn submit_times(&self) -> Vec<Instant> {
        self.state().submit_times.clone()
    }

    fn authenticated(state: &State) -> bool {
        state
            .jar
            .iter()
            .any(|t| t.name == AUTH_COOKIE && state.valid.contains(&t.value))
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn set_session_tokens(&self, tokens: Vec<SessionToken>) {
        let mut state = self.state();
        state.counts.sets += 1;
        state.jar = tokens;
    }

    async fn session_tokens(&self) -> Vec<SessionToken> {
        self.state().jar.clone()
    }

    async fn clear_session_tokens(&self) {
        let mut state = self.state();
        state.counts.clears += 1;
        state.jar.clear();
    }

    async fn login(&self, username: &str, password: &str, _email: Option<&str>) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.counts.logins += 1;
        if let Some(e) = state.login_failures.pop_front() {
            // A flow token set before the failure stays in the jar.
            state.jar.push(SessionToken::new("att", "half-done", DOMAIN));
            return Err(e);
        }
        if !username.eq_ignore_ascii_case(&self.handle) {
            return Err(PlatformError::CredentialsRejected("unknown account".into()));
        }
        if state.password.as_deref().is_some_and(|expected| expected != password) {
            return Err(PlatformError::CredentialsRejected("wrong password".into()));
        }
        if state.no_tokens {
            return Ok(());
        }

        state.issued += 1;
        let value = format!("issued-{}-{}", self.handle, state.issued);
        state.valid.insert(value.clone());
        let issued = [
            SessionToken::new(AUTH_COOKIE, value, DOMAIN),
            SessionToken::new("ct0", format!("csrf-{}", state.issued), DOMAIN),
            SessionToken::new("guest_id", "v1%3A1", DOMAIN),
            SessionToken::new("personalization_id", "v1_abc", DOMAIN),
        ];
        // Like a cookie jar: new tokens replace same-named ones, others stay.
        state.jar.retain(|t| issued.iter().all(|i| i.name != t.name));
        state.jar.extend(issued);
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Profile>, PlatformError> {
        let delay = {
            let mut state = self.state();
            state.counts.checks += 1;
            state.identity_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(Some(e)) = state.identity_steps.pop_front() {
            return Err(e);
        }
        if let Some(e) = state.identity_error.clone() {
            return Err(e);
        }
        if !Self::authenticated(&state) {
            return Ok(None);
        }
        Ok(Some(Profile {
            id: format!("id-{}", self.handle),
            handle: self.handle.clone(),
            display_name: None,
        }))
    }

    async fn submit_message(&self, text: &str, reply_to: Option<&str>) -> Result<PostResult, PlatformError> {
        let mut state = self.state();
        state.counts.submits += 1;
        state.submit_times.push(Instant::now());
        if !Self::authenticated(&state) {
            return Err(PlatformError::SessionExpired);
        }

        match state.submit_steps.pop_front().unwrap_or(SubmitStep::Succeed) {
            SubmitStep::Fail(e) => Err(e),
            SubmitStep::ExpireSession => {
                state.valid.clear();
                Err(PlatformError::SessionExpired)
            }
            SubmitStep::Succeed => {
                state.posted.push((text.to_string(), reply_to.map(str::to_string)));
                let id = state.posted.len();
                if state.rotate_on_submit {
                    let rotated = format!("csrf-rotated-{}", id);
                    if let Some(token) = state.jar.iter_mut().find(|t| t.name == "ct0") {
                        token.value = rotated;
                    }
                }
                Ok(PostResult(json!({
                    "id_str": id.to_string(),
                    "text": text,
                    "reply_to": reply_to,
                })))
            }
        }
    }

    async fn recent_messages(&self, handle: &str, count: usize) -> Result<Vec<PostSummary>, PlatformError> {
        let state = self.state();
        if !Self::authenticated(&state) {
            return Err(PlatformError::SessionExpired);
        }
        if !handle.eq_ignore_ascii_case(&self.handle) {
            return Err(PlatformError::NotFound(handle.to_string()));
        }
        Ok(state
            .posted
            .iter()
            .enumerate()
            .rev()
            .take(count)
            .map(|(i, (text, reply_to))| PostSummary {
                id: (i + 1).to_string(),
                text: text.clone(),
                reply_to: reply_to.clone(),
                ..Default::default()
            })
            .collect())
    }
}

impl PlatformConnector for ScriptedPlatform {
    fn connect(&self) -> Box<dyn Platform> {
        Box::new(self.clone())
    }
}

/// `MemoryStore` that counts writes and can be told to fail.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    puts: AtomicUsize,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a session without counting it as a write.
    pub async fn seed(&self, identity: &AccountIdentity, session: &Session) {
        self.inner
            .put(&identity.key(), session.to_canonical().unwrap())
            .await
            .unwrap();
    }

    pub async fn stored(&self, identity: &AccountIdentity) -> Option<Session> {
        let text = self.inner.get(&identity.key()).await.unwrap()?;
        Some(Session::from_canonical(&text).unwrap())
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }
}

fn unavailable() -> StoreError {
    StoreError::Io(std::io::Error::other("store unavailable"))
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }
}
