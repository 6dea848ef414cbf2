//! Configuration file parser for ~/.config/bazaar/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings since they are usually typos.
//! Precedence, lowest to highest: file, `BAZAAR_ANON_KEY` env var, CLI flags.
use crate::feed::{FocusPolicy, SyncOptions, DEFAULT_PAGE_SIZE};
use crate::listing::Category;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Env var holding the backend's public API key.
pub const ANON_KEY_ENV: &str = "BAZAAR_ANON_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `anon_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, e.g. `https://project.example.co`.
    pub endpoint: Option<String>,

    /// Public API key sent as `apikey`. `BAZAAR_ANON_KEY` takes precedence.
    pub anon_key: Option<String>,

    /// Listings fetched per page.
    pub page_size: usize,

    /// What happens when a feed view regains focus.
    pub focus_policy: FocusPolicy,

    /// Initial category filter for the market feed.
    pub category: Option<Category>,

    pub request_timeout_secs: u64,

    /// Retries for rate-limited and 5xx responses.
    pub max_retries: u32,

    /// Listing details kept in memory.
    pub detail_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            anon_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            focus_policy: FocusPolicy::default(),
            category: None,
            request_timeout_secs: 15,
            max_retries: 2,
            detail_cache_size: 64,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field("page_size", &self.page_size)
            .field("focus_policy", &self.focus_policy)
            .field("category", &self.category)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("detail_cache_size", &self.detail_cache_size)
            .finish()
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;
    const MAX_PAGE_SIZE: usize = 1000;

    const KNOWN_KEYS: [&'static str; 8] = [
        "endpoint",
        "anon_key",
        "page_size",
        "focus_policy",
        "category",
        "request_timeout_secs",
        "max_retries",
        "detail_cache_size",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            page_size = config.page_size,
            focus_policy = ?config.focus_policy,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be between 1 and {}, got {}",
                Self::MAX_PAGE_SIZE,
                self.page_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.detail_cache_size == 0 {
            return Err(ConfigError::Invalid(
                "detail_cache_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The anon key to use: env var first, then the file.
    pub fn resolve_anon_key(&self) -> Option<SecretString> {
        pick_anon_key(std::env::var(ANON_KEY_ENV).ok(), self.anon_key.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            focus_policy: self.focus_policy,
        }
    }
}

fn pick_anon_key(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|k| !k.trim().is_empty())
        .or_else(|| file.filter(|k| !k.trim().is_empty()).map(str::to_string))
        .map(|k| SecretString::from(k.trim().to_string()))
}

// ============================================================================
// Tests
// ============================================================================
