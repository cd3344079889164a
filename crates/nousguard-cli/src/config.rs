use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::Result;
use dirs::config_dir;
use nousguard_journal::bootstrap::RetryPolicy;
use nousguard_storage::key_provider::DEFAULT_KEY_ALIAS;
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYRING_SERVICE: &str = "nousguard";

/// User-level configuration loaded from `~/.config/nousguard/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for data directory (encrypted journal).
    pub data_dir: Option<PathBuf>,
    pub keyring: Option<KeyringConfig>,
    pub bootstrap: Option<BootstrapConfig>,
}

/// Where the journal key lives in the OS keychain.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct KeyringConfig {
    pub service: Option<String>,
    pub alias: Option<String>,
}

/// Startup retry behavior.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl Config {
    pub fn keyring_service(&self) -> String {
        self.keyring
            .as_ref()
            .and_then(|k| k.service.clone())
            .unwrap_or_else(|| DEFAULT_KEYRING_SERVICE.to_string())
    }

    pub fn key_alias(&self) -> String {
        self.keyring
            .as_ref()
            .and_then(|k| k.alias.clone())
            .unwrap_or_else(|| DEFAULT_KEY_ALIAS.to_string())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let Some(bootstrap) = &self.bootstrap else {
            return defaults;
        };
        RetryPolicy {
            max_attempts: bootstrap.max_attempts.unwrap_or(defaults.max_attempts),
            delay: bootstrap
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        }
    }
}

/// Load config from `path` if given, else from the default path; if missing, return defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("nousguard").join("config.toml"))
}

/// Write the given config to `path`, creating parent directories as needed.
/// Leaves an existing file untouched to avoid clobbering user edits.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
