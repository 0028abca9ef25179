//! Configuration for the oracle agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::backup::{DEFAULT_MAX_ENTRIES, DEFAULT_NAMESPACE_KEY};
use crate::error::Result;
use crate::pagination::DEFAULT_PAGE_SIZE;

/// Configuration for an oracle agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Remote service settings
    pub backend: BackendConfig,
    /// Local backup settings
    pub backup: BackupConfig,
    /// Risk scoring settings
    pub risk: RiskConfig,
    /// Presentation settings
    pub presentation: PresentationConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl AgentConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load config from a YAML file.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::AgentError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Remote service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the oracle service
    pub base_url: String,
    /// Consult timeout (ms)
    pub consult_timeout_ms: u64,
    /// Ledger fetch timeout (ms)
    pub fetch_timeout_ms: u64,
    /// Hash verification timeout (ms)
    pub verify_timeout_ms: u64,
}

impl BackendConfig {
    pub fn consult_timeout(&self) -> Duration {
        Duration::from_millis(self.consult_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            consult_timeout_ms: 20_000,
            fetch_timeout_ms: 10_000,
            verify_timeout_ms: 10_000,
        }
    }
}

/// Local backup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for the file store; in-memory when unset
    pub directory: Option<PathBuf>,
    /// Key the backup list is stored under
    pub namespace_key: String,
    /// Maximum retained entries
    pub max_entries: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: None,
            namespace_key: DEFAULT_NAMESPACE_KEY.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Risk scoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// YAML rule table; the built-in table when unset
    pub rules_path: Option<PathBuf>,
    /// Skip the oracle entirely when a boundary pattern matches
    pub block_on_boundary: bool,
}

/// Presentation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Records per page
    pub page_size: usize,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// General configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Session identifier sent with every consult
    pub session_id: String,
    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session_{}", uuid::Uuid::new_v4().simple()),
            log_level: "info".to_string(),
        }
    }
}
