//! Application configuration: defaults, then a JSON file, then the
//! command line (whose flags also read the environment).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use firehose_delivery_client::DeliveryConfig;
use serde::{Deserialize, Serialize};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// `~/.run-telemetry`, or the working directory when there is no home.
pub fn base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".run-telemetry"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_store_path() -> PathBuf {
    base_dir().join("runs.sqlite3")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub delivery: DeliveryConfig,
    /// SQLite file holding the run documents.
    pub store_path: PathBuf,
    pub log_level: String,
    /// JSONL log file; stderr only when unset.
    pub log_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            store_path: default_store_path(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_path: None,
        }
    }
}

/// Values taken from flags or their environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub stream_name: Option<String>,
    pub auth_token: Option<String>,
    pub store_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective configuration.
    pub fn resolve(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(endpoint) = &overrides.endpoint {
            self.delivery.endpoint = endpoint.clone();
        }
        if let Some(stream_name) = &overrides.stream_name {
            self.delivery.stream_name = stream_name.clone();
        }
        if let Some(auth_token) = &overrides.auth_token {
            self.delivery.auth_token = auth_token.clone();
        }
        if let Some(store_path) = &overrides.store_path {
            self.store_path = store_path.clone();
        }
        if let Some(log_level) = &overrides.log_level {
            self.log_level = log_level.clone();
        }
        if let Some(log_path) = &overrides.log_path {
            self.log_path = Some(log_path.clone());
        }
    }
}
