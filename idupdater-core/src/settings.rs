//! Local updater settings
//!
//! Loads updater settings from disk

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";
pub const APP_NAME: &str = "id-updater";

/// Environment variable overriding the configuration URL
pub const CONFIG_URL_ENV: &str = "ID_UPDATER_CONFIG_URL";

/// Updater settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterSettings {
    /// Where the update configuration document is published
    #[serde(default = "default_config_url")]
    pub config_url: String,
    /// Name of the scheduled task
    #[serde(default = "default_task_name")]
    pub task_name: String,
    /// Upgrade code used when the configuration carries none
    #[serde(default = "default_upgrade_code")]
    pub default_upgrade_code: String,
    /// Installer log file name, created in the temp directory
    #[serde(default = "default_install_log_name")]
    pub install_log_name: String,
}

fn default_config_url() -> String {
    "https://id.eesti.ee/updater/config.json".to_string()
}

fn default_task_name() -> String {
    "id updater task".to_string()
}

fn default_upgrade_code() -> String {
    "{58A1DBA8-81A2-4D58-980B-4A6174D5B66B}".to_string()
}

fn default_install_log_name() -> String {
    "esteid_inst.log".to_string()
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            task_name: default_task_name(),
            default_upgrade_code: default_upgrade_code(),
            install_log_name: default_install_log_name(),
        }
    }
}

impl UpdaterSettings {
    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(CONFIG_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                debug!("Configuration URL overridden by {}", CONFIG_URL_ENV);
                self.config_url = url.to_string();
            }
        }
        self
    }
}

/// Get the settings directory path
/// Windows: %APPDATA%\id-updater\
fn get_settings_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

/// Directory for logs and crash reports
/// Windows: %LOCALAPPDATA%\id-updater\
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Load settings from the default location, falling back to defaults
pub fn load_settings() -> UpdaterSettings {
    match get_settings_dir() {
        Some(dir) => load_settings_from(&dir.join(SETTINGS_FILE)),
        None => {
            debug!("Could not determine settings path, using defaults");
            UpdaterSettings::default()
        }
    }
    .with_env_overrides()
}

/// Load settings from `path`, falling back to defaults
pub fn load_settings_from(path: &Path) -> UpdaterSettings {
    if !path.exists() {
        debug!("Settings file does not exist, using defaults");
        return UpdaterSettings::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => {
                info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file: {}", e);
                UpdaterSettings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file: {}", e);
            UpdaterSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = UpdaterSettings::default();
        assert_eq!(settings.task_name, "id updater task");
        assert_eq!(
            settings.default_upgrade_code,
            "{58A1DBA8-81A2-4D58-980B-4A6174D5B66B}"
        );
        assert!(settings.config_url.starts_with("https://"));
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let settings = UpdaterSettings {
            config_url: "https://updates.example/config.json".to_string(),
            ..Default::default()
        };
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"task_name": "custom task"}"#).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.task_name, "custom task");
        assert_eq!(loaded.install_log_name, "esteid_inst.log");
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(load_settings_from(&path), UpdaterSettings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_settings_from(&dir.path().join("absent.json")),
            UpdaterSettings::default()
        );
    }
}
