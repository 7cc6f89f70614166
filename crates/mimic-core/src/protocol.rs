//! Client-daemon wire protocol.
//!
//! Each message is one JSON object on its own line. A client writes a
//! [`Request`] and reads back exactly one [`Response`].
//!
//! ```text
//! → {"op":"remove","source":"/home/alice/site"}
//! ← {"status":"removed","source":"/home/alice/site"}
//! ```

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::destination::Destination;
use crate::error::ErrorKind;
use crate::watch::{TransferState, WatchOptions};

/// A request sent to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Start mirroring a directory.
    Add(AddRequest),
    /// Stop mirroring a directory.
    Remove {
        /// Source path of the watch to remove.
        source: Utf8PathBuf,
    },
    /// List active watches.
    List,
    /// Remove every watch and stop the daemon.
    Shutdown,
}

/// Parameters of [`Request::Add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    /// Directory to watch. Should be absolute; the daemon canonicalizes it.
    pub source: Utf8PathBuf,

    /// Where changes are mirrored to.
    pub destination: Destination,

    /// Watch behaviour.
    #[serde(default)]
    pub options: WatchOptions,
}

/// The daemon's reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Reply to [`Request::Ping`].
    Pong {
        /// Daemon version.
        version: String,
    },
    /// The watch was added.
    Added {
        /// Canonical source path the watch is registered under.
        source: Utf8PathBuf,
    },
    /// The watch was removed.
    Removed {
        /// Source path of the removed watch.
        source: Utf8PathBuf,
    },
    /// Snapshot of active watches.
    Watches {
        /// One entry per watch, ordered by source path.
        watches: Vec<WatchSummary>,
    },
    /// The daemon is shutting down.
    ShuttingDown,
    /// The request failed.
    Error {
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable explanation.
        message: String,
    },
}

impl Response {
    /// Creates an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` if this is an error response.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Point-in-time view of one watch, as returned by [`Request::List`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSummary {
    /// Canonical source path.
    pub source: Utf8PathBuf,

    /// Destination.
    pub destination: Destination,

    /// Options the watch was added with.
    pub options: WatchOptions,

    /// Transfer scheduler state.
    pub state: TransferState,

    /// Transfers that finished, successfully or not.
    pub completed_runs: u64,

    /// Transfers that exited unsuccessfully.
    pub failed_runs: u64,

    /// Why the most recent transfer failed, cleared by the next success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Whether the watch holds a pooled connection.
    pub pooled: bool,

    /// Whether the watch is still receiving change events.
    pub alive: bool,
}
