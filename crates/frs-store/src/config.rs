//! Store endpoint configuration and its single persisted slot.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Hosts accepted for the store endpoint must end with this suffix.
pub const EXPECTED_HOST_SUFFIX: &str = ".supabase.co";

const PLACEHOLDER_ENDPOINT: &str = "https://YOUR_PROJECT_ID.supabase.co";
const PLACEHOLDER_ACCESS_KEY: &str = "YOUR_ANON_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing {0}: both the project URL and the access key are required")]
    MissingField(&'static str),
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("URL host {0:?} is not a project host (expected https://<project>.supabase.co)")]
    UnexpectedHost(String),
    #[error("config slot I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("config slot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ConfigError {
    /// True for errors caused by the submitted values rather than the slot.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            ConfigError::MissingField(_) | ConfigError::InvalidUrl { .. } | ConfigError::UnexpectedHost(_)
        )
    }
}

/// Endpoint and access key of the hosted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub endpoint_url: String,
    pub access_key: String,
}

impl StoreConfig {
    /// Build a configuration from user input, trimming and validating both fields.
    pub fn new(endpoint_url: &str, access_key: &str) -> Result<Self, ConfigError> {
        let config = Self {
            endpoint_url: endpoint_url.trim().to_string(),
            access_key: access_key.trim().to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Used when no configuration has been persisted. It points nowhere useful;
    /// store calls made with it fail and surface as store errors.
    pub fn placeholder() -> Self {
        Self {
            endpoint_url: PLACEHOLDER_ENDPOINT.to_string(),
            access_key: PLACEHOLDER_ACCESS_KEY.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::MissingField("project URL"));
        }
        if self.access_key.trim().is_empty() {
            return Err(ConfigError::MissingField("access key"));
        }

        let url = Url::parse(self.endpoint_url.trim()).map_err(|e| ConfigError::InvalidUrl {
            url: self.endpoint_url.clone(),
            reason: e.to_string(),
        })?;

        let host = url.host_str().unwrap_or_default();
        if !host.ends_with(EXPECTED_HOST_SUFFIX) {
            return Err(ConfigError::UnexpectedHost(host.to_string()));
        }
        Ok(())
    }
}

/// The one well-known file holding the serialized [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct ConfigSlot {
    path: PathBuf,
}

impl ConfigSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/frs/store.json`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("frs")
            .join("store.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted configuration. A missing or unreadable slot both
    /// mean "unconfigured".
    pub fn load(&self) -> Option<StoreConfig> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "reading store config");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "parsing store config");
                None
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.load().is_some()
    }

    /// Persist the configuration, replacing the slot atomically.
    pub fn save(&self, config: &StoreConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(config)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
