//! Client configuration file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultsync_core::{get_default_vault_path, ConflictPolicy, SyncOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Vault database. Defaults to the platform data directory.
    pub vault_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8743".to_string(),
            vault_path: None,
            request_timeout_ms: 30_000,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Read the config file, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn vault_path(&self) -> PathBuf {
        self.vault_path.clone().unwrap_or_else(get_default_vault_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            request_timeout: self.request_timeout(),
            conflict_policy: self.conflict_policy,
        }
    }
}
