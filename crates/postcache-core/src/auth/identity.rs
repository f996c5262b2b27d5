use std::fmt;

use crate::error::PostError;

/// Handles longer than this are rejected outright.
const MAX_HANDLE_LENGTH: usize = 64;

/// The account a session belongs to.
///
/// Handles are compared case-insensitively and the lowercase form is used as
/// the storage key, so the accepted character set is kept file-name safe.
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    handle: String,
}

impl AccountIdentity {
    pub fn new(handle: impl Into<String>) -> Result<Self, PostError> {
        let handle = handle.into();
        let handle = handle.trim().trim_start_matches('@').to_string();

        if handle.is_empty() {
            return Err(PostError::InvalidRequest("account handle is empty".to_string()));
        }
        if handle.len() > MAX_HANDLE_LENGTH {
            return Err(PostError::InvalidRequest(format!(
                "account handle longer than {} characters",
                MAX_HANDLE_LENGTH
            )));
        }
        if handle.starts_with('.')
            || !handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        {
            return Err(PostError::InvalidRequest(format!("invalid account handle: {}", handle)));
        }

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Storage key for this identity's session.
    pub fn key(&self) -> String {
        self.handle.to_ascii_lowercase()
    }

    pub fn matches(&self, handle: &str) -> bool {
        self.handle.eq_ignore_ascii_case(handle.trim_start_matches('@'))
    }
}

impl PartialEq for AccountIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.handle.eq_ignore_ascii_case(&other.handle)
    }
}

impl Eq for AccountIdentity {}

impl fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}
