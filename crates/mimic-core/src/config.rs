//! Configuration structures for the mimic daemon.
//!
//! [`DaemonConfig`] holds the process-wide settings: where the control socket
//! lives, how long a burst of changes must settle before a transfer starts,
//! and which external tools to invoke. Every field has a default so a config
//! file only needs to name what it overrides.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default settle interval in milliseconds.
///
/// Changes closer together than this are coalesced into a single transfer.
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Socket file name used under `$XDG_RUNTIME_DIR`.
const RUNTIME_SOCKET_NAME: &str = "mimic.sock";

/// Fallback socket location when no runtime directory is available.
const FALLBACK_SOCKET_PATH: &str = "/tmp/mimic_daemon.sock";

/// Configuration for the mimic daemon.
///
/// # Examples
///
/// ```
/// use mimic_core::DaemonConfig;
///
/// let config = DaemonConfig::default();
/// assert_eq!(config.settle_ms, 100);
/// assert_eq!(config.rsync_path, "rsync");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path of the Unix socket the daemon listens on.
    pub socket_path: Utf8PathBuf,

    /// Settle interval in milliseconds, used when a watch does not override it.
    pub settle_ms: u64,

    /// Program used to transfer files.
    pub rsync_path: String,

    /// Program used to open shared connections.
    pub ssh_path: String,

    /// Directory holding ssh control sockets for pooled connections.
    pub control_dir: Utf8PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            settle_ms: DEFAULT_SETTLE_MS,
            rsync_path: "rsync".to_owned(),
            ssh_path: "ssh".to_owned(),
            control_dir: Utf8PathBuf::from("/tmp"),
        }
    }
}

impl DaemonConfig {
    /// Loads a configuration file, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON, and
    /// [`ConfigError::InvalidOption`] if a value fails validation.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every option holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_str().is_empty() {
            return Err(ConfigError::invalid_option("socket_path", "must not be empty"));
        }
        if self.rsync_path.trim().is_empty() {
            return Err(ConfigError::invalid_option("rsync_path", "must not be empty"));
        }
        if self.ssh_path.trim().is_empty() {
            return Err(ConfigError::invalid_option("ssh_path", "must not be empty"));
        }
        if !self.control_dir.is_absolute() {
            return Err(ConfigError::invalid_option(
                "control_dir",
                format!("must be an absolute path, got '{}'", self.control_dir),
            ));
        }
        Ok(())
    }

    /// Returns the default settle interval.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Returns the socket path used when none is configured.
///
/// Prefers `$XDG_RUNTIME_DIR/mimic.sock`, which is private to the user, and
/// falls back to a fixed path under `/tmp`.
#[must_use]
pub fn default_socket_path() -> Utf8PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map_or_else(
            || Utf8PathBuf::from(FALLBACK_SOCKET_PATH),
            |dir| Utf8PathBuf::from(dir).join(RUNTIME_SOCKET_NAME),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_config_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.settle_ms, DEFAULT_SETTLE_MS);
        assert_eq!(config.settle(), Duration::from_millis(100));
        assert_eq!(config.ssh_path, "ssh");
        assert_eq!(config.control_dir, "/tmp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"settle_ms": 250, "rsync_path": "/usr/bin/rsync"}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.settle_ms, 250);
        assert_eq!(config.rsync_path, "/usr/bin/rsync");
        // Other fields should have defaults
        assert_eq!(config.ssh_path, "ssh");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DaemonConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DaemonConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_rejects_empty_rsync() {
        let config = DaemonConfig {
            rsync_path: "  ".to_owned(),
            ..DaemonConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rsync_path"));
    }

    #[test]
    fn test_validate_rejects_relative_control_dir() {
        let config = DaemonConfig {
            control_dir: Utf8PathBuf::from("sockets"),
            ..DaemonConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("mimic.json")).unwrap();
        std::fs::write(&path, r#"{"settle_ms": 40}"#).unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.settle_ms, 40);
    }

    #[test]
    fn test_load_missing_file() {
        let result = DaemonConfig::load(Utf8Path::new("/nonexistent/mimic.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("mimic.json")).unwrap();
        std::fs::write(&path, "{ settle_ms: ").unwrap();

        assert!(matches!(
            DaemonConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
