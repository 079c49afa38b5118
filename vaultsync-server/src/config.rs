//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    /// Upper bound on request bodies, in bytes.
    pub max_payload_size: usize,
    /// HMAC key for session tokens. A random per-process key is used when
    /// unset, so tokens do not survive a restart.
    pub token_secret: Option<String>,
    pub token_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("vaultsync.db"),
            max_payload_size: 1_048_576,
            token_secret: None,
            token_ttl_secs: 86_400,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
