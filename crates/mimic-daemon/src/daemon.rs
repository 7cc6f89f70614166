//! Request handling: maps wire requests onto registry operations.

use std::sync::Arc;

use camino::Utf8PathBuf;
use mimic_core::{AddRequest, Request, Response, WatchSummary};
use mimic_sync::{Connector, SshConnector};
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use crate::registry::WatchRegistry;

/// Daemon version reported by `ping`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Front door of the daemon.
///
/// Holds no watch state of its own; every operation delegates to the shared
/// [`WatchRegistry`].
pub struct Daemon<C: Connector = SshConnector> {
    registry: Arc<WatchRegistry<C>>,
    shutdown: CancellationToken,
}

impl<C: Connector> Daemon<C> {
    /// Creates a daemon over `registry`.
    #[must_use]
    pub fn new(registry: Arc<WatchRegistry<C>>) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &WatchRegistry<C> {
        &self.registry
    }

    /// Handles one request.
    ///
    /// [`Request::Shutdown`] is only acknowledged here. The caller delivers
    /// the acknowledgement and then calls
    /// [`request_shutdown`](Self::request_shutdown).
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong {
                version: self.ping().to_owned(),
            },
            Request::Add(add) => match self.add(add).await {
                Ok(source) => Response::Added { source },
                Err(error) => Self::reject("add", &error),
            },
            Request::Remove { source } => match self.remove(source).await {
                Ok(source) => Response::Removed { source },
                Err(error) => Self::reject("remove", &error),
            },
            Request::List => Response::Watches {
                watches: self.list(),
            },
            Request::Shutdown => {
                tracing::info!("Shutdown requested");
                Response::ShuttingDown
            }
        }
    }

    /// Liveness check; returns the daemon version.
    #[must_use]
    pub const fn ping(&self) -> &'static str {
        VERSION
    }

    /// Adds a watch.
    ///
    /// Subscribing walks the source tree, so the registry call runs on the
    /// blocking pool.
    pub async fn add(&self, request: AddRequest) -> Result<Utf8PathBuf, DaemonError> {
        let registry = Arc::clone(&self.registry);
        let spec = tokio::task::spawn_blocking(move || registry.add_watch(request)).await??;
        Ok(spec.source)
    }

    /// Removes a watch.
    ///
    /// Releasing a pooled connection can wait on a connection being opened,
    /// so the registry call runs on the blocking pool.
    pub async fn remove(&self, source: Utf8PathBuf) -> Result<Utf8PathBuf, DaemonError> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.remove_watch(&source)).await?
    }

    /// Lists active watches.
    #[must_use]
    pub fn list(&self) -> Vec<WatchSummary> {
        self.registry.list_watches()
    }

    /// Signals the server to stop accepting requests and shut down.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns a token that is cancelled once shutdown has been requested.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Removes every watch and closes every pooled connection.
    pub async fn shutdown(&self) {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.stop_all()).await {
            Ok((watches, connections)) => {
                self.registry.pool().connector().wait_closed().await;
                tracing::info!(watches, connections, "Registry shut down");
            }
            Err(error) => tracing::error!(error = %error, "Failed to stop watches"),
        }
    }

    fn reject(op: &str, error: &DaemonError) -> Response {
        tracing::debug!(op, error = %error, "Request rejected");
        error.to_response()
    }
}

impl<C: Connector> std::fmt::Debug for Daemon<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("registry", &self.registry)
            .field("shutdown_requested", &self.shutdown.is_cancelled())
            .finish()
    }
}
