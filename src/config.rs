//! Configuration management.
//!
//! Loads configuration from a TOML file and falls back to defaults for
//! anything missing. A missing file means all defaults; a file that exists
//! but cannot be read or parsed is an error.

use crate::dedup::default_session_dir;
use crate::dispatcher::DEFAULT_ENDPOINT;
use crate::filter::DEFAULT_MAX_SINGLE_LINE_CHARS;
use crate::status::Corner;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Period between scans
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Whether scanning starts paused
    #[serde(default = "default_true")]
    pub start_paused: bool,

    /// Single-line search text longer than this is treated as flattened
    #[serde(default = "default_max_single_line_chars")]
    pub max_single_line_chars: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            start_paused: true,
            max_single_line_chars: default_max_single_line_chars(),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Backend URL blocks are POSTed to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HTTP client timeout; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Suppress a second send of a block whose first send is still in flight
    #[serde(default = "default_true")]
    pub track_in_flight: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            track_in_flight: true,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long "Synced" stays up before reverting to "Idle"
    #[serde(default = "default_synced_revert_ms")]
    pub synced_revert_ms: u64,

    /// Initial widget corner
    #[serde(default)]
    pub corner: Corner,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            synced_revert_ms: default_synced_revert_ms(),
            corner: Corner::default(),
        }
    }
}

impl StatusConfig {
    pub fn synced_revert(&self) -> Duration {
        Duration::from_millis(self.synced_revert_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name; blocks sent under one name are not resent under it
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Directory holding session stores
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// End the session when `watch` exits
    #[serde(default)]
    pub clear_on_exit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            dir: None,
            clear_on_exit: false,
        }
    }
}

impl SessionConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_session_dir)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_single_line_chars() -> usize {
    DEFAULT_MAX_SINGLE_LINE_CHARS
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_synced_revert_ms() -> u64 {
    2000
}

fn default_session_name() -> String {
    "default".to_string()
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("patch-bridge")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.interval_ms, 1000);
        assert!(config.scan.start_paused);
        assert_eq!(config.scan.max_single_line_chars, 60);
        assert_eq!(config.dispatch.endpoint, "http://127.0.0.1:3030/api/diff");
        assert!(config.dispatch.track_in_flight);
        assert_eq!(config.status.synced_revert_ms, 2000);
        assert_eq!(config.status.corner, Corner::BottomRight);
        assert_eq!(config.session.name, "default");
        assert!(!config.session.clear_on_exit);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[scan]
interval_ms = 250
start_paused = false

[dispatch]
endpoint = "http://localhost:9000/patch"
timeout_secs = 0
track_in_flight = false

[status]
corner = "top-right"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.scan.interval(), Duration::from_millis(250));
        assert!(!config.scan.start_paused);
        assert_eq!(config.scan.max_single_line_chars, 60);
        assert_eq!(config.dispatch.endpoint, "http://localhost:9000/patch");
        assert_eq!(config.dispatch.timeout(), None);
        assert!(!config.dispatch.track_in_flight);
        assert_eq!(config.status.corner, Corner::TopRight);
        assert_eq!(config.status.synced_revert_ms, 2000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_from_path(Path::new("/no/such/config.toml")).unwrap();
        assert_eq!(config.scan.interval_ms, 1000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dispatch]\nendpoint = 5").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = Config::load_from_path(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.session.name = "review".to_string();
        config.save_to_path(path.clone()).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.session.name, "review");
    }
}
