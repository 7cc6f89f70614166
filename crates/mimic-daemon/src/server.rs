//! Unix socket server speaking newline-delimited JSON.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  accept   ┌──────────────────────────────┐
//! │ UnixListener │ ────────► │ connection task (per client) │
//! └──────┬───────┘           │ Framed<UnixStream, Lines>    │
//!        │                   │ line -> Request -> Daemon    │
//!        │ shutdown token    │ Response -> line             │
//!        ▼                   └──────────────────────────────┘
//!   registry shutdown, socket file removed
//! ```
//!
//! A malformed line gets an error response and the connection stays open.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::{SinkExt, StreamExt};
use mimic_core::{ErrorKind, Request, Response};
use mimic_sync::{Connector, SshConnector};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::daemon::Daemon;
use crate::error::DaemonError;

/// Longest request line accepted, in bytes.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Listens for client requests until shutdown is requested.
pub struct Server<C: Connector = SshConnector> {
    listener: UnixListener,
    socket_path: Utf8PathBuf,
    daemon: Arc<Daemon<C>>,
}

impl<C: Connector> Server<C> {
    /// Binds the socket.
    ///
    /// A leftover socket file from a daemon that is no longer running is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::AlreadyRunning`] if another daemon answers on
    /// `socket_path`, or [`DaemonError::Io`] if binding fails.
    pub fn bind(socket_path: &Utf8Path, daemon: Arc<Daemon<C>>) -> Result<Self, DaemonError> {
        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
                return Err(DaemonError::AlreadyRunning(socket_path.to_owned()));
            }
            tracing::debug!(socket = %socket_path, "Removing stale socket");
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        tracing::info!(socket = %socket_path, "Listening");

        Ok(Self {
            listener,
            socket_path: socket_path.to_owned(),
            daemon,
        })
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    /// Serves clients until shutdown, then tears the daemon down.
    ///
    /// On return every watch has been removed, pooled connections are closed
    /// and the socket file is gone.
    pub async fn run(self) -> Result<(), DaemonError> {
        let shutdown = self.daemon.shutdown_token();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let daemon = Arc::clone(&self.daemon);
                        tokio::spawn(async move {
                            if let Err(error) = serve_connection(stream, daemon).await {
                                tracing::debug!(error = %error, "Connection ended with error");
                            }
                        });
                    }
                    Err(error) => tracing::warn!(error = %error, "Failed to accept connection"),
                },
            }
        }

        tracing::info!("Shutting down");
        self.daemon.shutdown().await;
        drop(self.listener);
        if let Err(error) = std::fs::remove_file(&self.socket_path) {
            tracing::warn!(socket = %self.socket_path, error = %error, "Failed to remove socket");
        }
        Ok(())
    }
}

/// Answers requests on one connection until the client hangs up.
async fn serve_connection<C: Connector>(
    stream: UnixStream,
    daemon: Arc<Daemon<C>>,
) -> Result<(), DaemonError> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let response = Response::error(ErrorKind::BadRequest, "request too long");
                framed.send(serde_json::to_string(&response)?).await?;
                continue;
            }
            Err(error) => return Err(error.into()),
        };
        if line.trim().is_empty() {
            continue;
        }

        let (response, shutting_down) = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::debug!(request = ?request, "Request received");
                let shutting_down = matches!(request, Request::Shutdown);
                (daemon.handle(request).await, shutting_down)
            }
            Err(error) => (
                Response::error(ErrorKind::BadRequest, error.to_string()),
                false,
            ),
        };

        framed.send(serde_json::to_string(&response)?).await?;

        if shutting_down {
            daemon.request_shutdown();
            break;
        }
    }

    Ok(())
}
