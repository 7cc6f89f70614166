//! Transfer scheduling and pooled remote connections.
//!
//! # Overview
//!
//! - [`TransferCommand`] is the rsync invocation for one watch, built once
//!   when the watch is added.
//! - [`SyncExecutor`] turns quiescence signals into transfers: never two at
//!   once per watch, and any number of signals during a transfer collapse
//!   into one rerun.
//! - [`ConnectionPool`] keeps one persistent connection per remote host,
//!   shared by every watch that asks for it and closed with the last lease.
//!
//! The transfer tool and the connection mechanism sit behind the
//! [`TransferRunner`] and [`Connector`] traits. [`ProcessRunner`] and
//! [`SshConnector`] are the production implementations.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mimic_core::{DaemonConfig, Destination, WatchOptions, WatchSpec};
//! use mimic_sync::{ProcessRunner, SyncExecutor, TransferCommand};
//!
//! # async fn example() {
//! let config = DaemonConfig::default();
//! let spec = WatchSpec::new(
//!     "/home/alice/site".into(),
//!     Destination::new("alice@web:/srv/site").unwrap(),
//!     WatchOptions::default(),
//!     config.settle_ms,
//! );
//!
//! let executor = SyncExecutor::new(TransferCommand::build(&spec, &config), Arc::new(ProcessRunner));
//! executor.on_quiescence();
//! executor.wait_idle().await;
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod executor;
pub mod pool;
pub mod runner;
pub mod ssh;

// Re-export command types
pub use command::{TransferCommand, control_path};

// Re-export error types
pub use error::SyncError;

// Re-export executor types
pub use executor::{ExecutorStats, SyncExecutor};

// Re-export pool types
pub use pool::{ConnectionPool, Connector};

// Re-export runner types
pub use runner::{ProcessRunner, TransferRunner};

// Re-export ssh types
pub use ssh::{SshConnector, SshMaster};
