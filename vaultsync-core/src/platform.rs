//! Platform-specific default locations

use std::path::PathBuf;

const APP_DIR: &str = "VaultSync";

/// Get the platform-specific data directory for storing vaults
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\VaultSync
/// - macOS: ~/Library/Application Support/VaultSync
/// - Linux/Other: ~/.local/share/VaultSync
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\VaultSync
/// - macOS: ~/Library/Application Support/VaultSync
/// - Linux/Other: ~/.config/VaultSync
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the default vault database path
pub fn get_default_vault_path() -> PathBuf {
    get_data_dir().join("vault.db")
}

/// Get the default client config file path
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("client.toml")
}
