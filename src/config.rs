//! Session parameters and application configuration
//!
//! Parameters come from defaults, then an optional JSON file, then the
//! command line / environment. The resolved [`SessionParams`] are validated
//! once and stay immutable for the lifetime of a pipeline run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "soundcheck.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing parameter: {0}")]
    Missing(&'static str),

    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Application configuration, as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub broadcast_id: String,
    #[serde(default)]
    pub auth_token: String,
    /// Log a fingerprint and level for every captured chunk
    #[serde(default)]
    pub diagnostics: bool,
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub broadcast_id: Option<String>,
    pub auth_token: Option<String>,
    pub diagnostics: bool,
}

impl AppConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist and parse. Without one, `soundcheck.json`
    /// in the working directory is used if present; a broken implicit file
    /// is logged and ignored.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::read_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                match Self::read_file(path) {
                    Ok(config) => Ok(config),
                    Err(e) => {
                        tracing::warn!("{}, using defaults", e);
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Apply command line values on top of the file values
    pub fn merge(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.server_url {
            self.server_url = url;
        }
        if let Some(id) = overrides.broadcast_id {
            self.broadcast_id = id;
        }
        if let Some(token) = overrides.auth_token {
            self.auth_token = token;
        }
        self.diagnostics |= overrides.diagnostics;
        self
    }

    /// Validate and extract the session parameters
    pub fn session(&self) -> Result<SessionParams, ConfigError> {
        SessionParams::new(&self.broadcast_id, &self.server_url, &self.auth_token)
    }
}

/// The three values identifying one broadcast session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParams {
    broadcast_id: String,
    server_url: String,
    auth_token: String,
}

impl SessionParams {
    pub fn new(broadcast_id: &str, server_url: &str, auth_token: &str) -> Result<Self, ConfigError> {
        let broadcast_id = non_empty(broadcast_id, "broadcast_id")?;
        let server_url = non_empty(server_url, "server_url")?;
        let auth_token = non_empty(auth_token, "auth_token")?;

        let parsed = reqwest::Url::parse(&server_url).map_err(|e| ConfigError::InvalidUrl {
            url: server_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: server_url,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        Ok(Self {
            broadcast_id,
            server_url,
            auth_token,
        })
    }

    pub fn broadcast_id(&self) -> &str {
        &self.broadcast_id
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// `{server_url}/{broadcast_id}`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            self.broadcast_id
        )
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParams")
            .field("broadcast_id", &self.broadcast_id)
            .field("server_url", &self.server_url)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: &str, name: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(trimmed.to_string())
    }
}
