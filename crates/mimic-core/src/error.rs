//! Error types for the mimic-core crate.
//!
//! [`ConfigError`] covers loading and validating the daemon configuration,
//! [`DestinationError`] covers malformed transfer targets, and [`ErrorKind`]
//! is the wire-level classification the daemon reports back to clients.

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use mimic_core::ConfigError;
///
/// let error = ConfigError::InvalidOption {
///     option: "rsync_path".to_owned(),
///     reason: "must not be empty".to_owned(),
/// };
/// assert!(error.to_string().contains("rsync_path"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced while parsing an rsync-style destination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    /// The destination string was empty.
    #[error("destination must not be empty")]
    Empty,

    /// A remote destination named a user but no host (`user@:path`).
    #[error("destination '{0}' has an empty host")]
    EmptyHost(String),
}

/// Classification of a failed daemon request.
///
/// Carried in [`Response::Error`](crate::Response::Error) so clients can react
/// to specific failures without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// The source path does not exist on disk.
    SourceNotFound,
    /// The source path is already being watched.
    AlreadyWatched,
    /// No watch is registered for the given path.
    NoSuchWatch,
    /// An exclude pattern is not a valid shell glob.
    InvalidPattern,
    /// The destination could not be parsed.
    InvalidDestination,
    /// The request could not be decoded.
    BadRequest,
    /// Any other daemon-side failure.
    Internal,
}

impl ErrorKind {
    /// Returns `true` if the error was caused by the caller's input rather
    /// than by the daemon.
    #[must_use]
    pub const fn is_user_error(self) -> bool {
        !matches!(self, Self::Internal)
    }
}
