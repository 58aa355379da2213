//! Configuration Management
//!
//! Handles persistent configuration storage for azlist.

use crate::azure::cloud::CloudEnvironment;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema snapshot file name under the config directory
const SCHEMA_FILE: &str = "armschema.json";

/// Environment variable read at the same level as `--subscription-id`
pub const ARM_SUBSCRIPTION_ENV: &str = "ARM_SUBSCRIPTION_ID";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Subscription to list in
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Cloud environment
    #[serde(default)]
    pub environment: Option<CloudEnvironment>,
    /// Concurrent listings
    #[serde(default)]
    pub parallelism: Option<usize>,
    /// Schema snapshot location
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

impl Config {
    /// Directory holding azlist's files
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azlist"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring configuration: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from `path`; a missing file yields the default
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Resolve the subscription to list in: the command line value, then
    /// `ARM_SUBSCRIPTION_ID`, then [`Config::effective_subscription`]
    pub fn resolve_subscription(&self, cli: Option<&str>) -> Option<String> {
        let arm = std::env::var(ARM_SUBSCRIPTION_ENV).ok();
        self.resolve_subscription_from(cli, arm.as_deref())
    }

    fn resolve_subscription_from(&self, cli: Option<&str>, arm: Option<&str>) -> Option<String> {
        // Explicit values are passed through unvalidated, like the flag
        [cli, arm]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.effective_subscription())
    }

    /// Get effective subscription (config > AZURE_SUBSCRIPTION_ID > Azure CLI default)
    pub fn effective_subscription(&self) -> Option<String> {
        self.subscription_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(crate::azure::auth::get_default_subscription)
    }

    /// Get effective cloud environment (config > public)
    pub fn effective_environment(&self) -> CloudEnvironment {
        self.environment.unwrap_or_default()
    }

    /// Get effective schema snapshot path (config > config directory default)
    pub fn effective_schema_path(&self) -> Option<PathBuf> {
        self.schema_path
            .clone()
            .or_else(|| Self::config_dir().map(|p| p.join(SCHEMA_FILE)))
    }
}
