//! Change notification, exclude filtering, and burst coalescing.
//!
//! This crate turns filesystem activity under a watched source directory
//! into "the tree has settled" signals: one signal per burst of relevant
//! changes, however many raw events the burst contained.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    notify event thread                          │
//! │  ┌───────────────────┐    ┌──────────────────────────────────┐  │
//! │  │ RecommendedWatcher│ -> │ translate: notify::Event ->      │  │
//! │  │ (per directory)   │    │ ChangeEvent                      │  │
//! │  └───────────────────┘    └────────────────┬─────────────────┘  │
//! └────────────────────────────────────────────│────────────────────┘
//!                                              │ unbounded send
//!                                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    per-watch tokio task                         │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌─────────────┐  │
//! │  │ ExcludeFilter    │ -> │ settle timer   │ -> │ Quiescence  │  │
//! │  │ (basename globs) │    │ (restartable)  │    │ Sink        │  │
//! │  └──────────────────┘    └────────────────┘    └─────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! mimic-cli ──► mimic-daemon ──► mimic-sync ──► mimic-watcher ──► mimic-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use camino::Utf8Path;
//! use mimic_watcher::{
//!     ChangeAggregator, ExcludeFilter, NotificationSource, NotifySource, QuiescenceSink,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct Print;
//!
//! impl QuiescenceSink for Print {
//!     fn on_quiescence(&self) {
//!         eprintln!("tree settled");
//!     }
//! }
//!
//! # async fn example() -> Result<(), mimic_watcher::WatchError> {
//! let (subscription, events) = NotifySource.subscribe(Utf8Path::new("./site"), true, true)?;
//! let filter = ExcludeFilter::new(["*.swp", "*~"])?;
//! let aggregator = ChangeAggregator::new(filter, Duration::from_millis(100), true);
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(aggregator.run(subscription, events, Arc::new(Print), cancel.clone()));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod error;
pub mod events;
pub mod filter;
pub mod source;

// Re-export aggregator types
pub use aggregator::{AggregatorExit, ChangeAggregator, EventOutcome, Quiescence, QuiescenceSink};

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{ChangeEvent, ChangeKind};

// Re-export filter types
pub use filter::{AcceptAllFilter, ExcludeFilter, FileFilter, should_ignore};

// Re-export source types
pub use source::{EventStream, NotificationSource, NotifySource, Subscription};
