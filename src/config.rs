//! Configuration file parser for ~/.config/feedmill/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::util::UrlPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. `None` places `feedmill.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// `<head><title>` of exported OPML documents.
    pub export_title: String,

    pub poll: PollConfig,

    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            export_title: "feedmill subscriptions".to_string(),
            poll: PollConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// `[poll]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between poll ticks.
    pub interval_secs: u64,
    /// Feeds fetched at the same time within one tick.
    pub concurrency: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            concurrency: 10,
        }
    }
}

/// `[fetch]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bound on one whole request, body included.
    pub timeout_secs: u64,
    /// Larger responses are rejected.
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Accept subscription URLs on loopback and private networks.
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: concat!("feedmill/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            allow_private_hosts: self.allow_private_hosts,
        }
    }
}

const KNOWN_KEYS: &[&str] = &["database_path", "export_title", "poll", "fetch"];
const KNOWN_POLL_KEYS: &[&str] = &["interval_secs", "concurrency"];
const KNOWN_FETCH_KEYS: &[&str] = &[
    "timeout_secs",
    "max_body_bytes",
    "user_agent",
    "allow_private_hosts",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
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

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            interval_secs = config.poll.interval_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses configuration text. Blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in unknown_keys(&raw) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Database location: the configured path, else `feedmill.db` in
    /// `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feedmill.db"))
    }
}

/// Dotted paths of keys the config structs do not know.
fn unknown_keys(raw: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (key, value) in raw {
        let nested = match key.as_str() {
            "poll" => KNOWN_POLL_KEYS,
            "fetch" => KNOWN_FETCH_KEYS,
            k if KNOWN_KEYS.contains(&k) => continue,
            _ => {
                unknown.push(key.clone());
                continue;
            }
        };
        if let Some(table) = value.as_table() {
            unknown.extend(
                table
                    .keys()
                    .filter(|k| !nested.contains(&k.as_str()))
                    .map(|k| format!("{key}.{k}")),
            );
        }
    }
    unknown
}

// ============================================================================
// Tests
// ============================================================================
