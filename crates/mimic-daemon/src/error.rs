//! Error types for the mimic-daemon crate.
//!
//! [`DaemonError`] covers both sides of the socket: registry failures that
//! are reported to clients as structured error responses, and transport
//! failures seen by the server or the client.

use camino::Utf8PathBuf;
use mimic_core::{ErrorKind, Response};
use mimic_watcher::WatchError;
use tokio_util::codec::LinesCodecError;

/// Errors that can occur in the daemon or while talking to it.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The source path of an add request does not exist.
    #[error("source path does not exist: {0}")]
    SourceNotFound(Utf8PathBuf),

    /// The source path is already watched.
    #[error("directory already being watched: {0}")]
    AlreadyWatched(Utf8PathBuf),

    /// No watch is registered for the path.
    #[error("no such watch directory: {0}")]
    NoSuchWatch(Utf8PathBuf),

    /// Subscribing to change notifications failed.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// The daemon is shutting down and accepts no new watches.
    #[error("mimic is shutting down")]
    ShuttingDown,

    /// No daemon is listening on the socket.
    #[error("mimic not running, please start")]
    NotRunning(Utf8PathBuf),

    /// Another daemon is already listening on the socket.
    #[error("mimic already running on {0}")]
    AlreadyRunning(Utf8PathBuf),

    /// The peer closed the connection before replying.
    #[error("connection closed before a response was received")]
    ConnectionClosed,

    /// The daemon answered with a response that does not fit the request.
    #[error("unexpected response from daemon: {0}")]
    UnexpectedResponse(String),

    /// A line could not be read from or written to the socket.
    #[error("framing error: {0}")]
    Codec(#[from] LinesCodecError),

    /// A message could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking registry task panicked or was cancelled.
    #[error("registry task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Creates a new [`DaemonError::SourceNotFound`] error.
    pub fn source_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::SourceNotFound(path.into())
    }

    /// Creates a new [`DaemonError::AlreadyWatched`] error.
    pub fn already_watched(path: impl Into<Utf8PathBuf>) -> Self {
        Self::AlreadyWatched(path.into())
    }

    /// Creates a new [`DaemonError::NoSuchWatch`] error.
    pub fn no_such_watch(path: impl Into<Utf8PathBuf>) -> Self {
        Self::NoSuchWatch(path.into())
    }

    /// Returns the wire classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_) | Self::Watch(WatchError::PathNotFound(_)) => {
                ErrorKind::SourceNotFound
            }
            Self::AlreadyWatched(_) => ErrorKind::AlreadyWatched,
            Self::NoSuchWatch(_) => ErrorKind::NoSuchWatch,
            Self::Watch(WatchError::InvalidPattern { .. }) => ErrorKind::InvalidPattern,
            Self::Json(_) => ErrorKind::BadRequest,
            Self::Watch(_)
            | Self::ShuttingDown
            | Self::NotRunning(_)
            | Self::AlreadyRunning(_)
            | Self::ConnectionClosed
            | Self::UnexpectedResponse(_)
            | Self::Codec(_)
            | Self::Task(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Converts this error into the response sent to the client.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response::error(self.kind(), self.to_string())
    }

    /// Returns `true` if the client could not reach a daemon.
    #[must_use]
    pub const fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning(_))
    }
}
