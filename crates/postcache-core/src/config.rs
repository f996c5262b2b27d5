//! Application configuration management.
//!
//! Configuration is stored at `~/.config/postcache/config.json` (or any path
//! the caller passes). Every field has a default, so a missing file or a
//! partial file is fine. Secrets never live here: the session passphrase and
//! account passwords come from the environment or a prompt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "postcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default environment variable holding the session encryption passphrase
pub const DEFAULT_PASSPHRASE_ENV: &str = "POSTCACHE_SESSION_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub platform: PlatformConfig,
    pub store: StoreConfig,
    pub retry: RetryConfig,
    pub auth: AuthConfig,
    /// Per-call timeout for submitting a post.
    pub submit_timeout_secs: u64,
    /// Optional wall-clock bound on a whole post request.
    pub deadline_secs: Option<u64>,
    /// Hold a per-account lock for the whole load/login/post/persist sequence.
    pub serialize_per_identity: bool,
    pub last_identity: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            auth: AuthConfig::default(),
            submit_timeout_secs: 30,
            deadline_secs: None,
            serialize_per_identity: true,
            last_identity: None,
        }
    }
}

/// Where the platform lives. Endpoint paths are resolved against `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub login_path: String,
    pub identity_path: String,
    pub post_path: String,
    pub timeline_path: String,
    pub request_timeout_secs: u64,
    pub user_agent: Option<String>,
    /// Application-level bearer token some platforms require on every call.
    pub bearer_token: Option<String>,
    /// Cookie whose value is mirrored into `csrf_header` on every request.
    pub csrf_cookie: Option<String>,
    pub csrf_header: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_path: "auth/login".to_string(),
            identity_path: "account/verify_credentials".to_string(),
            post_path: "statuses/update".to_string(),
            timeline_path: "statuses/user_timeline".to_string(),
            request_timeout_secs: 30,
            user_agent: None,
            bearer_token: None,
            csrf_cookie: None,
            csrf_header: "x-csrf-token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Session directory for the file backend. Defaults to the user cache dir.
    pub directory: Option<PathBuf>,
    /// Encrypt session files with the passphrase from `passphrase_env`.
    pub encrypt: bool,
    pub passphrase_env: String,
    /// Keychain service name for the keyring backend.
    pub keyring_service: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            directory: None,
            encrypt: false,
            passphrase_env: DEFAULT_PASSPHRASE_ENV.to_string(),
            keyring_service: APP_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Single wait after login before the session is read back.
    pub settle_delay_ms: u64,
    pub login_timeout_secs: u64,
    pub validate_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 3000,
            login_timeout_secs: 30,
            validate_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding one session file per account.
    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store.directory {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("sessions"))
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
