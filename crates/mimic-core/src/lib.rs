//! Core types, configuration, and wire protocol for mimic.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - [`DaemonConfig`] and [`WatchOptions`] with the tool's defaults
//! - [`Destination`] and [`HostKey`] for rsync-style transfer targets
//! - [`WatchSpec`], the immutable description of an active watch
//! - [`Request`] / [`Response`], the client-daemon protocol
//! - Error types ([`ConfigError`], [`DestinationError`], [`ErrorKind`])
//!
//! # Crate Dependencies
//!
//! ```text
//! mimic-cli ──► mimic-daemon ──► mimic-sync ────► mimic-core
//!                            └─► mimic-watcher ─►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod destination;
pub mod error;
pub mod protocol;
pub mod watch;

pub use config::{DEFAULT_SETTLE_MS, DaemonConfig};
pub use destination::{Destination, HostKey};
pub use error::{ConfigError, DestinationError, ErrorKind};
pub use protocol::{AddRequest, Request, Response, WatchSummary};
pub use watch::{TransferState, WatchOptions, WatchSpec};
