//! Runtime configuration: JSON file with defaults, overridden by
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PsycheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    #[default]
    Cycle,
    Tick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationArchiveSettings {
    pub enabled: bool,
    pub lines_to_keep: usize,
    pub size_threshold: usize,
    pub time_threshold_days: i64,
}

impl Default for ConversationArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lines_to_keep: 50,
            size_threshold: 500,
            time_threshold_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub recipient: Option<String>,
    pub interval_hours: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient: None,
            interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PsycheConfig {
    pub substrate_path: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub source_code_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub port: u16,
    pub model: Option<String>,
    pub strategic_model: Option<String>,
    pub tactical_model: Option<String>,
    pub mode: DriverMode,
    pub auto_start_on_first_run: bool,
    pub auto_start_after_restart: bool,
    pub backup_retention_count: usize,
    pub superego_audit_interval: u64,
    pub autonomy_reminder_interval: u64,
    pub conversation_archive: ConversationArchiveSettings,
    pub email: EmailSettings,
    /// Bearer token gating `/api/*`. None disables the check.
    pub api_token: Option<String>,
    /// Agent CLI the session launcher drives.
    pub launcher_command: Option<String>,
    pub launcher_args: Vec<String>,
}

impl Default for PsycheConfig {
    fn default() -> Self {
        Self {
            substrate_path: None,
            working_directory: None,
            source_code_path: None,
            backup_path: None,
            port: 3000,
            model: None,
            strategic_model: None,
            tactical_model: None,
            mode: DriverMode::Cycle,
            auto_start_on_first_run: false,
            auto_start_after_restart: true,
            backup_retention_count: 14,
            superego_audit_interval: 20,
            autonomy_reminder_interval: 10,
            conversation_archive: ConversationArchiveSettings::default(),
            email: EmailSettings::default(),
            api_token: None,
            launcher_command: None,
            launcher_args: Vec::new(),
        }
    }
}

impl PsycheConfig {
    /// Load from a JSON file (all keys optional), then apply environment
    /// overrides. No path means pure defaults plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| PsycheError::from_io(path, e))?;
                serde_json::from_str(&raw).map_err(|e| PsycheError::Parse(format!(
                    "config {}: {e}",
                    path.display()
                )))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("SUBSTRATE_PATH") {
            self.substrate_path = Some(PathBuf::from(path));
        }
        if let Ok(raw) = std::env::var("PORT") {
            match raw.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("ignoring unparseable PORT={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("SUPEREGO_AUDIT_INTERVAL") {
            match raw.parse() {
                Ok(interval) => self.superego_audit_interval = interval,
                Err(_) => warn!("ignoring unparseable SUPEREGO_AUDIT_INTERVAL={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("AUTONOMY_REMINDER_INTERVAL") {
            match raw.parse() {
                Ok(interval) => self.autonomy_reminder_interval = interval,
                Err(_) => warn!("ignoring unparseable AUTONOMY_REMINDER_INTERVAL={raw}"),
            }
        }
    }

    pub fn substrate_root(&self) -> PathBuf {
        self.substrate_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".psyche")
                .join("substrate")
        })
    }

    pub fn backup_root(&self) -> PathBuf {
        self.backup_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".psyche")
                .join("backups")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PsycheConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.mode, DriverMode::Cycle);
        assert!(!config.auto_start_on_first_run);
        assert!(config.auto_start_after_restart);
        assert_eq!(config.backup_retention_count, 14);
        assert_eq!(config.superego_audit_interval, 20);
        assert_eq!(config.autonomy_reminder_interval, 10);
        assert_eq!(config.conversation_archive.time_threshold_days, 7);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PsycheConfig =
            serde_json::from_str(r#"{"port": 8080, "mode": "tick"}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.mode, DriverMode::Tick);
        assert_eq!(config.superego_audit_interval, 20);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = PsycheConfig::load(Some(Path::new("/nowhere/psyche.json"))).unwrap_err();
        assert!(err.is_not_found());
    }
}
