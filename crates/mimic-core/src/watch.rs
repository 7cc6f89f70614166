//! Watch descriptions shared between the daemon and its clients.

use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::destination::Destination;

/// Per-watch behaviour requested by the client.
///
/// Defaults match the command line: recurse into subdirectories, pick up
/// newly created directories, keep a shared connection open, and never
/// delete files on the destination.
///
/// # Examples
///
/// ```
/// use mimic_core::WatchOptions;
///
/// let options = WatchOptions::default();
/// assert!(options.recursive);
/// assert!(options.auto_add);
/// assert!(options.maintain_connection);
/// assert!(!options.delete_extraneous);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Watch and transfer subdirectories.
    pub recursive: bool,

    /// Extend coverage to directories created after the watch was added.
    pub auto_add: bool,

    /// Pass `--delete` so files removed locally are removed remotely.
    pub delete_extraneous: bool,

    /// Share one persistent ssh connection per host across watches.
    pub maintain_connection: bool,

    /// Shell globs matched against file basenames; matching changes are ignored
    /// and the files are excluded from transfers.
    pub exclude: Vec<String>,

    /// Settle interval override in milliseconds.
    pub settle_ms: Option<u64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            auto_add: true,
            delete_extraneous: false,
            maintain_connection: true,
            exclude: Vec::new(),
            settle_ms: None,
        }
    }
}

/// An accepted watch: canonical source, destination and options.
///
/// Built by the registry once the source has been validated, and never
/// modified afterwards; changing a watch means removing and re-adding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSpec {
    /// Canonical, absolute source directory. Identity of the watch.
    pub source: Utf8PathBuf,

    /// Where changes are mirrored to.
    pub destination: Destination,

    /// Requested behaviour.
    pub options: WatchOptions,

    /// Effective settle interval in milliseconds.
    pub settle_ms: u64,
}

impl WatchSpec {
    /// Creates a spec, resolving the settle interval against the daemon default.
    #[must_use]
    pub fn new(
        source: Utf8PathBuf,
        destination: Destination,
        options: WatchOptions,
        default_settle_ms: u64,
    ) -> Self {
        let settle_ms = options.settle_ms.unwrap_or(default_settle_ms);
        Self {
            source,
            destination,
            options,
            settle_ms,
        }
    }

    /// Returns the effective settle interval.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// State of a watch's transfer scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// No transfer in flight.
    #[default]
    Idle,
    /// A transfer is in flight.
    Running,
    /// A transfer is in flight and another burst of changes is waiting for it.
    RunningWithPendingRerun,
}

impl TransferState {
    /// Returns `true` while a transfer process is active.
    #[inline]
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Returns a short label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "syncing",
            Self::RunningWithPendingRerun => "syncing (rerun queued)",
        }
    }
}
