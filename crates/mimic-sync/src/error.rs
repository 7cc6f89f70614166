//! Error types for the mimic-sync crate.

use mimic_core::HostKey;

/// Errors raised while running transfers or managing pooled connections.
///
/// None of these stop a watch. A failed transfer is logged and the next
/// burst of changes schedules a fresh one; an unavailable connection means
/// transfers connect directly instead of through a shared master.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A child process could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The transfer tool exited unsuccessfully.
    #[error("transfer failed ({}){}", exit_description(.code), stderr_suffix(.stderr))]
    TransferFailed {
        /// Exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A pooled connection to a host could not be opened.
    #[error("connection to {host} unavailable: {reason}")]
    ConnectionUnavailable {
        /// Host the connection was for.
        host: HostKey,
        /// Why it failed.
        reason: String,
    },
}

impl SyncError {
    /// Creates a new [`SyncError::Spawn`] error.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates a new [`SyncError::TransferFailed`] error.
    pub fn transfer_failed(code: Option<i32>, stderr: impl AsRef<str>) -> Self {
        Self::TransferFailed {
            code,
            stderr: stderr.as_ref().trim().to_owned(),
        }
    }

    /// Creates a new [`SyncError::ConnectionUnavailable`] error.
    pub fn connection_unavailable(host: &HostKey, reason: impl ToString) -> Self {
        Self::ConnectionUnavailable {
            host: host.clone(),
            reason: reason.to_string(),
        }
    }

    /// Returns the exit code of a failed transfer, if any.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::TransferFailed { code, .. } => *code,
            Self::Spawn { .. } | Self::ConnectionUnavailable { .. } => None,
        }
    }

    /// Returns the host associated with this error, if any.
    #[must_use]
    pub const fn host(&self) -> Option<&HostKey> {
        match self {
            Self::ConnectionUnavailable { host, .. } => Some(host),
            Self::Spawn { .. } | Self::TransferFailed { .. } => None,
        }
    }
}

#[allow(clippy::ref_option)]
fn exit_description(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_owned(), |c| format!("exit status {c}"))
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
