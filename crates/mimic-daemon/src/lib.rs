//! The mimic daemon: watch registry, request handling, and socket transport.
//!
//! # Overview
//!
//! - [`WatchRegistry`] owns every active watch, keyed by canonical source
//!   path, and drives the lifecycle of each watch's aggregator, executor and
//!   pooled connection lease.
//! - [`Daemon`] answers [`Request`](mimic_core::Request)s by delegating to
//!   the registry.
//! - [`Server`] accepts newline-delimited JSON requests on a Unix socket;
//!   [`DaemonClient`] is the other end.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mimic_core::DaemonConfig;
//! use mimic_daemon::{Daemon, Server, WatchRegistry};
//!
//! # async fn example() -> Result<(), mimic_daemon::DaemonError> {
//! let config = DaemonConfig::default();
//! let socket = config.socket_path.clone();
//!
//! let daemon = Arc::new(Daemon::new(Arc::new(WatchRegistry::new(config))));
//! Server::bind(&socket, daemon)?.run().await
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod client;
pub mod daemon;
pub mod error;
pub mod registry;
pub mod server;

// Re-export client types
pub use client::DaemonClient;

// Re-export daemon types
pub use daemon::{Daemon, VERSION};

// Re-export error types
pub use error::DaemonError;

// Re-export registry types
pub use registry::WatchRegistry;

// Re-export server types
pub use server::{MAX_LINE_LENGTH, Server};
