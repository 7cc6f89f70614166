//! Running a transfer command to completion.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::command::TransferCommand;
use crate::error::SyncError;

/// Executes transfer commands.
///
/// The executor only cares whether a run succeeded; implementations decide
/// how the command is actually carried out.
#[async_trait]
pub trait TransferRunner: Send + Sync + 'static {
    /// Runs `command` and waits for it to finish.
    async fn run(&self, command: &TransferCommand) -> Result<(), SyncError>;
}

/// Runs transfers as child processes.
///
/// Standard output is discarded (the command runs with `-q`); standard error
/// is captured and attached to [`SyncError::TransferFailed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl TransferRunner for ProcessRunner {
    async fn run(&self, command: &TransferCommand) -> Result<(), SyncError> {
        tracing::debug!(command = %command, "Starting transfer");

        let output = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|e| SyncError::spawn(command.program(), e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SyncError::transfer_failed(output.status.code(), stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use mimic_core::{DaemonConfig, Destination, WatchOptions, WatchSpec};

    fn command_with(rsync_path: &str) -> TransferCommand {
        let spec = WatchSpec::new(
            Utf8PathBuf::from("/a"),
            Destination::new("/b").unwrap(),
            WatchOptions::default(),
            100,
        );
        let config = DaemonConfig {
            rsync_path: rsync_path.to_owned(),
            ..DaemonConfig::default()
        };
        TransferCommand::build(&spec, &config)
    }

    #[tokio::test]
    async fn test_successful_exit() {
        assert!(ProcessRunner.run(&command_with("true")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_exit() {
        let err = ProcessRunner.run(&command_with("false")).await.unwrap_err();
        assert!(matches!(err, SyncError::TransferFailed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = ProcessRunner
            .run(&command_with("/nonexistent/mimic-rsync"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
    }
}
