//! Burst coalescing: turns a stream of raw changes into quiescence signals.
//!
//! A [`ChangeAggregator`] records every change that survives its filter and
//! reports quiescence once no further change has arrived for the settle
//! interval. However many events a burst contains, it produces exactly one
//! signal.
//!
//! # State Machine
//!
//! ```text
//!            relevant event (last_event = now)
//!   ┌──────┐ ─────────────────────────────────► ┌─────────┐ ◄─┐ relevant event
//!   │ idle │                                    │ pending │ ──┘ (timer restarts)
//!   └──────┘ ◄───────────────────────────────── └─────────┘
//!            now - last_event >= settle: emit signal
//! ```
//!
//! The `pending` flag and the time of the last event sit behind one mutex, so
//! an event landing while the timer is being evaluated is either part of the
//! burst that fires or starts the next one. It is never lost.
//!
//! [`ChangeAggregator::run`] drives the state machine from a tokio task: it
//! sleeps until the current deadline instead of polling, and wakes early for
//! new events or cancellation.

use std::sync::Arc;
use std::time::Duration;

use mimic_core::WatchSpec;
use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::events::ChangeEvent;
use crate::filter::{ExcludeFilter, FileFilter};
use crate::source::{EventStream, Subscription};

/// Receives quiescence signals from an aggregator.
///
/// Implementations must return quickly; the aggregator task calls this
/// inline between events.
pub trait QuiescenceSink: Send + Sync + 'static {
    /// A burst of changes has settled.
    fn on_quiescence(&self);
}

impl<T: QuiescenceSink + ?Sized> QuiescenceSink for Arc<T> {
    fn on_quiescence(&self) {
        (**self).on_quiescence();
    }
}

/// What the aggregator did with one raw event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// The event passed the filter and restarted the settle timer.
    pub recorded: bool,

    /// The event announced a new directory that coverage should extend to.
    pub extend_coverage: bool,
}

/// Result of evaluating the settle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    /// Nothing has changed since the last signal.
    Idle,
    /// Changes are waiting; re-evaluate at `deadline`.
    Pending {
        /// When the burst will have settled if nothing else arrives.
        deadline: Instant,
    },
    /// The burst settled. `pending` has been cleared; exactly one signal is due.
    Settled,
}

/// Why [`ChangeAggregator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorExit {
    /// The watch was removed.
    Cancelled,
    /// The notification source stopped delivering events.
    StreamClosed,
}

#[derive(Debug, Default)]
struct DebounceState {
    pending: bool,
    last_event: Option<Instant>,
}

/// Per-watch debounce state machine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use camino::Utf8PathBuf;
/// use mimic_watcher::{ChangeAggregator, ChangeEvent, ExcludeFilter, Quiescence};
/// use tokio::time::Instant;
///
/// let filter = ExcludeFilter::new(["*.swp"]).unwrap();
/// let aggregator = ChangeAggregator::new(filter, Duration::from_millis(100), true);
///
/// let start = Instant::now();
/// aggregator.on_raw_event_at(&ChangeEvent::modified(Utf8PathBuf::from("/a/x.txt")), start);
///
/// assert!(matches!(aggregator.poll(start), Quiescence::Pending { .. }));
/// assert_eq!(aggregator.poll(start + Duration::from_millis(100)), Quiescence::Settled);
/// assert_eq!(aggregator.poll(start + Duration::from_millis(200)), Quiescence::Idle);
/// ```
#[derive(Debug)]
pub struct ChangeAggregator<F = ExcludeFilter> {
    filter: F,
    settle: Duration,
    auto_add: bool,
    state: Mutex<DebounceState>,
}

impl<F: FileFilter> ChangeAggregator<F> {
    /// Creates an aggregator.
    ///
    /// # Arguments
    ///
    /// * `filter` - Decides which changes count
    /// * `settle` - Quiet period required before a signal
    /// * `auto_add` - Extend coverage to newly created directories
    #[must_use]
    pub fn new(filter: F, settle: Duration, auto_add: bool) -> Self {
        Self {
            filter,
            settle,
            auto_add,
            state: Mutex::new(DebounceState::default()),
        }
    }

    /// Returns the settle interval.
    #[inline]
    #[must_use]
    pub const fn settle(&self) -> Duration {
        self.settle
    }

    /// Returns `true` if changes are waiting for the burst to settle.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Records a raw event received now.
    pub fn on_raw_event(&self, event: &ChangeEvent) -> EventOutcome {
        self.on_raw_event_at(event, Instant::now())
    }

    /// Records a raw event received at `now`.
    ///
    /// Directory creation is reported for coverage even when the directory's
    /// own name is excluded, so files created inside it are still seen.
    pub fn on_raw_event_at(&self, event: &ChangeEvent, now: Instant) -> EventOutcome {
        let extend_coverage = self.auto_add && event.is_new_directory();

        if !self.filter.should_process(&event.path) {
            tracing::trace!(path = %event.path, "Ignoring excluded change");
            return EventOutcome {
                recorded: false,
                extend_coverage,
            };
        }

        let mut state = self.state.lock();
        state.pending = true;
        state.last_event = Some(now);
        drop(state);

        tracing::trace!(path = %event.path, kind = ?event.kind, "Recorded change");
        EventOutcome {
            recorded: true,
            extend_coverage,
        }
    }

    /// Evaluates the settle timer at `now`.
    ///
    /// Returns [`Quiescence::Settled`] at most once per burst.
    pub fn poll(&self, now: Instant) -> Quiescence {
        let mut state = self.state.lock();
        if !state.pending {
            return Quiescence::Idle;
        }
        let last = state.last_event.unwrap_or(now);
        let deadline = last + self.settle;
        if now >= deadline {
            state.pending = false;
            Quiescence::Settled
        } else {
            Quiescence::Pending { deadline }
        }
    }

    /// Drives the aggregator until cancelled or the event stream ends.
    ///
    /// Every settled burst produces one call to `sink.on_quiescence()`. If the
    /// stream ends while changes are pending, they are flushed with a final
    /// signal rather than dropped.
    pub async fn run<S: QuiescenceSink>(
        self,
        mut subscription: Box<dyn Subscription>,
        mut events: EventStream,
        sink: S,
        cancel: CancellationToken,
    ) -> AggregatorExit {
        loop {
            let deadline = match self.poll(Instant::now()) {
                Quiescence::Settled => {
                    tracing::debug!(settle_ms = self.settle.as_millis(), "Changes settled");
                    sink.on_quiescence();
                    continue;
                }
                Quiescence::Pending { deadline } => Some(deadline),
                Quiescence::Idle => None,
            };

            tokio::select! {
                biased;

                () = cancel.cancelled() => return AggregatorExit::Cancelled,

                event = events.recv() => {
                    let Some(event) = event else {
                        if self.state.lock().pending {
                            tracing::debug!("Event stream closed with pending changes, flushing");
                            sink.on_quiescence();
                        }
                        return AggregatorExit::StreamClosed;
                    };
                    let outcome = self.on_raw_event(&event);
                    let covered = outcome
                        .extend_coverage
                        .then(|| subscription.extend_coverage(&event.path));
                    if let Some(Err(error)) = covered {
                        tracing::warn!(path = %event.path, error = %error, "Failed to extend coverage");
                    }
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            }
        }
    }
}

impl ChangeAggregator<ExcludeFilter> {
    /// Creates the aggregator for an accepted watch.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] if an exclude pattern does not
    /// compile.
    pub fn for_watch(spec: &WatchSpec) -> Result<Self, WatchError> {
        let filter = ExcludeFilter::new(&spec.options.exclude)?;
        Ok(Self::new(filter, spec.settle(), spec.options.auto_add))
    }
}
