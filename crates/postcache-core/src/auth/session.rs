use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token names the platform hands out to anonymous visitors.
/// These never authenticate an account and are dropped before persisting.
const GUEST_TOKEN_PREFIX: &str = "guest_";
const GUEST_TOKEN_NAMES: &[&str] = &["personalization_id"];

fn default_path() -> String {
    "/".to_string()
}

/// One named, domain/path-scoped credential fragment (a cookie).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    /// Older session files wrote the cookie name as `key`.
    #[serde(alias = "key")]
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
}

impl SessionToken {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expiry: None,
            secure: None,
            http_only: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Anonymous/guest-scoped tokens are not part of an authenticated session.
    pub fn is_guest(&self) -> bool {
        self.name.starts_with(GUEST_TOKEN_PREFIX) || GUEST_TOKEN_NAMES.contains(&self.name.as_str())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|e| e <= now).unwrap_or(false)
    }

    /// Two tokens occupy the same slot in a jar when name, domain and path match.
    pub fn same_slot(&self, other: &SessionToken) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

// Token values are live credentials; keep them out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// The set of tokens that lets the platform act as one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    tokens: Vec<SessionToken>,
}

impl Session {
    pub fn new(tokens: Vec<SessionToken>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[SessionToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// The session as it should be persisted: guest tokens removed.
    pub fn persistable(&self) -> Session {
        Session {
            tokens: self.tokens.iter().filter(|t| !t.is_guest()).cloned().collect(),
        }
    }

    /// Drop tokens whose expiry has passed.
    pub fn without_expired(self, now: DateTime<Utc>) -> Session {
        Session {
            tokens: self.tokens.into_iter().filter(|t| !t.is_expired_at(now)).collect(),
        }
    }

    /// Canonical textual form: a pretty-printed JSON array of token records.
    pub fn to_canonical(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_canonical(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl From<Vec<SessionToken>> for Session {
    fn from(tokens: Vec<SessionToken>) -> Self {
        Self::new(tokens)
    }
}
