//! Configuration resolution for Warden.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`warden/settings.json` under the platform config dir)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Warden configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            credentials: CredentialConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_secs: 5,
            max_connections: 5,
        }
    }
}

/// Credential issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Lifetime of an authorization grant (seconds).
    pub grant_ttl_secs: i64,
    /// Lifetime of new access tokens when the caller gives none. `None` = never expire.
    pub token_ttl_secs: Option<i64>,
    pub client_secret_bytes: usize,
    pub client_key_bytes: usize,
    /// Attempts at drawing an unused client key before giving up.
    pub client_key_attempts: u32,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            grant_ttl_secs: 300,
            token_ttl_secs: None,
            client_secret_bytes: 32,
            client_key_bytes: 4,
            client_key_attempts: 3,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let global = global_config_path().filter(|p| p.exists());
    let layers: Vec<&Path> = global.as_deref().into_iter().chain(explicit).collect();

    let mut config = load_layers(&layers)?;
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("warden").join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("warden").join("warden.db"))
}

/// Merge config files in order, later files winning key by key, then fill
/// whatever no file set with the built-in defaults.
fn load_layers(paths: &[&Path]) -> Result<Config> {
    let mut merged = Value::Object(Map::new());
    for path in paths {
        merge_values(&mut merged, read_config_value(path)?);
    }
    serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("WARDEN_DATABASE_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("WARDEN_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Ok(val) = std::env::var("WARDEN_GRANT_TTL_SECS") {
        if let Ok(n) = val.parse() {
            config.credentials.grant_ttl_secs = n;
        }
    }
    if let Ok(val) = std::env::var("WARDEN_TOKEN_TTL_SECS") {
        if let Ok(n) = val.parse::<i64>() {
            config.credentials.token_ttl_secs = (n > 0).then_some(n);
        }
    }
}
