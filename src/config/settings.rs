//! Application settings and paths.
//!
//! Manages XDG-compliant paths for configuration and run history, and the
//! defaults every probe command starts from.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Global paths singleton.
static PATHS: OnceLock<Paths> = OnceLock::new();

/// Application directory paths following XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/ampscout)
    pub config_dir: PathBuf,
    /// Data directory (~/.local/share/ampscout)
    pub data_dir: PathBuf,
}

impl Paths {
    /// Get the global paths instance, creating the directories on first use.
    pub fn get() -> ConfigResult<&'static Paths> {
        if let Some(paths) = PATHS.get() {
            return Ok(paths);
        }

        let paths = Self::new()?;
        Ok(PATHS.get_or_init(|| paths))
    }

    fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("org", "ampscout", "ampscout")
            .ok_or(ConfigError::DirectoryNotFound)?;

        let paths = Self {
            config_dir: project.config_dir().to_path_buf(),
            data_dir: project.data_dir().to_path_buf(),
        };

        fs::create_dir_all(&paths.config_dir)?;
        fs::create_dir_all(&paths.data_dir)?;

        Ok(paths)
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Get the path to the run history directory.
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

/// How probe responses are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Ordinary UDP socket; no privileges needed.
    Socket,
    /// Link-layer sniffing; needs root, sees padding and IP fragments.
    Raw,
}

impl Default for CaptureMode {
    fn default() -> Self {
        Self::Socket
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket => write!(f, "socket"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// How long to listen for responses after each probe, in milliseconds.
    pub listen_window_ms: u64,
    /// Connect/read timeout for the Memcached TCP key enumeration.
    pub memcached_tcp_timeout_ms: u64,
    /// Hosts probed at the same time. 1 keeps the batch strictly sequential.
    pub concurrency: usize,
    /// Maximum probes per second, 0 for unlimited.
    pub rate_limit: u32,
    /// Default EDNS0 UDP payload size for DNS measurement queries.
    pub edns_payload_size: u16,
    /// Default capture mode.
    pub capture: CaptureMode,
    /// Network interface for raw capture (first suitable one if unset).
    pub interface: Option<String>,
    /// Save every run to the history store.
    pub auto_save_runs: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            listen_window_ms: 3000,
            memcached_tcp_timeout_ms: 5000,
            concurrency: 1,
            rate_limit: 0,
            edns_payload_size: 4096,
            capture: CaptureMode::Socket,
            interface: None,
            auto_save_runs: true,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::get()?.settings_file();

        if !file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Save settings to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Paths::get()?.settings_file())
    }

    /// Save settings to a specific file.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }

    pub fn memcached_tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.memcached_tcp_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.listen_window(), Duration::from_secs(3));
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.capture, CaptureMode::Socket);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"concurrency": 16, "capture": "raw"}"#).unwrap();

        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.concurrency, 16);
        assert_eq!(settings.capture, CaptureMode::Raw);
        assert_eq!(settings.listen_window_ms, 3000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = AppSettings {
            rate_limit: 50,
            ..AppSettings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            AppSettings::load_from(&path),
            Err(ConfigError::InvalidFormat(_))
        ));
    }
}
