//! Client configuration (load, get/set).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// `config.json` in the config directory. Any field may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 15,
            timeout_secs: 30,
            user_agent: format!("palctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path`, then let `PALCTL_URL` override the base URL.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        if let Ok(url) = std::env::var("PALCTL_URL") {
            let url = url.trim();
            if !url.is_empty() {
                tracing::debug!(url, "base URL overridden from environment");
                config.base_url = url.to_string();
            }
        }
        Ok(config)
    }
}

/// Set one config key in the file at `path`, creating it if needed.
/// Edits the raw JSON so keys this version doesn't know about survive.
pub fn set_config_value(path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    let typed = parse_value(key, value)?;

    let mut config = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str::<serde_json::Value>(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(source) => {
            return Err(ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let object = config.as_object_mut().ok_or(ConfigError::NotAnObject)?;
    object.insert(key.to_string(), typed);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ConfigError::CreateDir)?;
    }
    let output = serde_json::to_string_pretty(&config).map_err(ConfigError::SerializeFailed)?;
    std::fs::write(path, output).map_err(|source| ConfigError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Current value of `key` as a display string.
pub fn get_config_value(config: &Config, key: &str) -> Result<String, ConfigError> {
    match key {
        "base_url" => Ok(config.base_url.clone()),
        "connect_timeout_secs" => Ok(config.connect_timeout_secs.to_string()),
        "timeout_secs" => Ok(config.timeout_secs.to_string()),
        "user_agent" => Ok(config.user_agent.clone()),
        _ => Err(ConfigError::UnknownKey(key.to_string())),
    }
}

/// Known keys, in display order.
pub const KEYS: [&str; 4] = ["base_url", "connect_timeout_secs", "timeout_secs", "user_agent"];

fn parse_value(key: &str, value: &str) -> Result<serde_json::Value, ConfigError> {
    let value = value.trim();
    match key {
        "base_url" | "user_agent" => {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            Ok(serde_json::Value::String(value.to_string()))
        }
        "connect_timeout_secs" | "timeout_secs" => {
            let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected whole seconds, got '{}'", value),
            })?;
            Ok(serde_json::Value::from(secs))
        }
        _ => Err(ConfigError::UnknownKey(key.to_string())),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown config key '{0}' (known: base_url, connect_timeout_secs, timeout_secs, user_agent)")]
    UnknownKey(String),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Config file is not a JSON object")]
    NotAnObject,
    #[error("Failed to read config '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[source] serde_json::Error),
    #[error("Failed to create config directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("Failed to write config '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
