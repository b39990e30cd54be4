use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdbSettings {
    /// Empty means `adb` resolved through PATH.
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSettings {
    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            probe_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UninstallSettings {
    pub user_id: u32,
    pub keep_data: bool,
}

impl Default for UninstallSettings {
    fn default() -> Self {
        Self {
            user_id: 0,
            keep_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupSettings {
    pub protected_partition: String,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            protected_partition: "/system".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalSettings {
    pub tick_interval_ms: u64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub uninstall: UninstallSettings,
    #[serde(default)]
    pub cleanup: CleanupSettings,
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb: AdbSettings::default(),
            command: CommandSettings::default(),
            uninstall: UninstallSettings::default(),
            cleanup: CleanupSettings::default(),
            terminal: TerminalSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl AppConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command.command_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.command.probe_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.terminal.tick_interval_ms)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ANDROID_DEBLOATER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".android_debloater_config.json")
}

pub fn backup_config_path(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.command.command_timeout_secs == 0 {
        config.command.command_timeout_secs = 30;
    }
    if config.command.probe_timeout_secs == 0 {
        config.command.probe_timeout_secs = 10;
    }
    config.terminal.tick_interval_ms = config.terminal.tick_interval_ms.clamp(20, 1000);
    let partition = config.cleanup.protected_partition.trim();
    if partition.is_empty() || !partition.starts_with('/') || partition == "/" {
        config.cleanup.protected_partition = "/system".to_string();
    } else {
        config.cleanup.protected_partition = partition.trim_end_matches('/').to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().expect("tmp");
        let config =
            load_config_from_path(&tmp.path().join("absent.json"), "trace").expect("load");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.uninstall.user_id, 0);
        assert!(config.uninstall.keep_data);
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        let value = serde_json::json!({
            "adb": { "command_path": "/opt/platform-tools/adb" }
        });
        fs::write(&path, value.to_string()).expect("write");

        let config = load_config_from_path(&path, "trace").expect("load");
        assert_eq!(config.adb.command_path, "/opt/platform-tools/adb");
        assert_eq!(config.command, CommandSettings::default());
        assert_eq!(config.cleanup.protected_partition, "/system");
    }

    #[test]
    fn clamps_invalid_values() {
        let mut config = AppConfig::default();
        config.command.command_timeout_secs = 0;
        config.terminal.tick_interval_ms = 5;
        config.cleanup.protected_partition = "system".to_string();
        let validated = validate_config(config);
        assert_eq!(validated.command.command_timeout_secs, 30);
        assert_eq!(validated.terminal.tick_interval_ms, 20);
        assert_eq!(validated.cleanup.protected_partition, "/system");
    }

    #[test]
    fn save_writes_backup_of_previous_file() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        let backup = backup_config_path(&path);

        let mut config = AppConfig::default();
        save_config_to_path(&config, &path, &backup, "trace").expect("first save");
        assert!(!backup.exists());

        config.uninstall.user_id = 10;
        save_config_to_path(&config, &path, &backup, "trace").expect("second save");
        assert!(backup.exists());

        let reloaded = load_config_from_path(&path, "trace").expect("reload");
        assert_eq!(reloaded.uninstall.user_id, 10);
        let previous = load_config_from_path(&backup, "trace").expect("backup");
        assert_eq!(previous.uninstall.user_id, 0);
    }

    #[test]
    fn malformed_json_is_a_system_error() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        let err = load_config_from_path(&path, "trace-x").unwrap_err();
        assert_eq!(err.code, "ERR_SYSTEM");
        assert_eq!(err.trace_id, "trace-x");
    }
}
