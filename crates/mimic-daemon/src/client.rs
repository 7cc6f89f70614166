//! Client side of the daemon socket.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::{SinkExt, StreamExt};
use mimic_core::{Request, Response, WatchSummary};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::DaemonError;

/// Sends requests to a running daemon, one connection per request.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: Utf8PathBuf,
}

impl DaemonClient {
    /// Creates a client for the daemon listening on `socket_path`.
    #[must_use]
    pub fn new(socket_path: &Utf8Path) -> Self {
        Self {
            socket_path: socket_path.to_owned(),
        }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::NotRunning`] if nothing is listening on the
    /// socket, and a transport error if the exchange fails midway. Error
    /// responses from the daemon are returned as `Ok(Response::Error { .. })`.
    pub async fn request(&self, request: &Request) -> Result<Response, DaemonError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    DaemonError::NotRunning(self.socket_path.clone())
                }
                _ => DaemonError::Io(e),
            })?;

        let mut framed = Framed::new(stream, LinesCodec::new());
        framed.send(serde_json::to_string(request)?).await?;

        let line = framed.next().await.ok_or(DaemonError::ConnectionClosed)??;
        Ok(serde_json::from_str(&line)?)
    }

    /// Checks that the daemon is up; returns its version.
    pub async fn ping(&self) -> Result<String, DaemonError> {
        match self.request(&Request::Ping).await? {
            Response::Pong { version } => Ok(version),
            other => Err(unexpected(&other)),
        }
    }

    /// Returns `true` if a daemon answers on the socket.
    pub async fn is_running(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Fetches the list of active watches.
    pub async fn list(&self) -> Result<Vec<WatchSummary>, DaemonError> {
        match self.request(&Request::List).await? {
            Response::Watches { watches } => Ok(watches),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> DaemonError {
    match response {
        Response::Error { message, .. } => DaemonError::UnexpectedResponse(message.clone()),
        other => DaemonError::UnexpectedResponse(format!("{other:?}")),
    }
}
