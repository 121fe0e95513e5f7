use crate::error::TelemetryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analytics: AnalyticsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
}

impl AppConfig {
    /// Load configuration from the default path
    /// (~/.config/session-telemetry/config.toml), falling back to defaults if
    /// the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path. Malformed TOML surfaces as
    /// [`TelemetryError::Config`].
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| TelemetryError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("session-telemetry")
            .join("config.toml")
    }

    /// Platform data directory used when `storage.data_dir` is unset.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("session-telemetry")
    }
}

/// Derived-metric settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Users present for strictly less than this many minutes are insincere.
    pub insincere_threshold_mins: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            insincere_threshold_mins: 30,
        }
    }
}

/// Where aggregate history and per-session archives live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory (None = platform data dir).
    pub data_dir: Option<PathBuf>,
    /// File name of the aggregate history, relative to the data dir.
    pub history_file: String,
    /// Directory for per-session analytics (None = data_dir/sessions).
    pub sessions_dir: Option<PathBuf>,
    /// Persist each finished session's analytics snapshot.
    pub archive_sessions: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_file: "server_data.json".into(),
            sessions_dir: None, // resolved at runtime to data_dir/sessions
            archive_sessions: true,
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(AppConfig::data_dir)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.history_file)
    }

    pub fn resolved_sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| self.resolved_data_dir().join("sessions"))
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Session actor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Mailbox size of each per-session actor.
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("insincere_threshold_mins = 30"));
        assert!(toml_str.contains("server_data.json"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [analytics]
            insincere_threshold_mins = 10
            "#,
        )
        .unwrap();
        assert_eq!(parsed.analytics.insincere_threshold_mins, 10);
        assert_eq!(parsed.storage.history_file, "server_data.json");
        assert_eq!(parsed.service.channel_capacity, 256);
    }

    #[test]
    fn test_storage_paths_resolve_under_data_dir() {
        let storage = StorageConfig {
            data_dir: Some(PathBuf::from("/tmp/telemetry")),
            ..StorageConfig::default()
        };
        assert_eq!(
            storage.history_path(),
            PathBuf::from("/tmp/telemetry/server_data.json")
        );
        assert_eq!(
            storage.resolved_sessions_dir(),
            PathBuf::from("/tmp/telemetry/sessions")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\njson = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[analytics]\ninsincere_threshold_mins = \"soon\"\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        let err = err.downcast_ref::<TelemetryError>().unwrap();
        assert!(matches!(err, TelemetryError::Config(msg) if msg.contains("config.toml")));
    }
}
