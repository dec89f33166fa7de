//! Pipeline configuration, loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where artifacts land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bucket prefix every artifact name is appended to; normally ends
    /// with a slash.
    pub url: String,

    #[serde(default = "default_acl")]
    pub acl: String,

    #[serde(default = "default_index_filename")]
    pub index_filename: String,

    #[serde(default = "default_log_filename")]
    pub log_filename: String,

    /// Local directory of attachments to mirror, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments_dir: Option<String>,
}

/// How the status service is reached and which commit is updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub api_url: String,
    pub token: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    pub repo: String,
    pub revision: String,
    pub context: String,

    /// Link published with every status update, normally the index page.
    pub target_url: String,
}

impl StatusConfig {
    /// REST resource that receives the state updates.
    pub fn resource(&self) -> String {
        format!("repos/{}/statuses/{}", self.repo, self.revision)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,

    /// Absent for purely local runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusConfig>,
}

fn default_acl() -> String {
    "public-read".to_string()
}

fn default_index_filename() -> String {
    "index.html".to_string()
}

fn default_log_filename() -> String {
    "log".to_string()
}

fn default_user_agent() -> String {
    concat!("logstream/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: String::new(),
            acl: default_acl(),
            index_filename: default_index_filename(),
            log_filename: default_log_filename(),
            attachments_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            status: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
