//! Per-watch transfer scheduling.
//!
//! # State Machine
//!
//! ```text
//!                on_quiescence (launch)
//!   ┌──────┐ ─────────────────────────► ┌─────────┐
//!   │ Idle │                            │ Running │
//!   └──────┘ ◄───────────────────────── └─────────┘
//!      ▲          transfer finished       │     ▲
//!      │                     on_quiescence│     │ transfer finished
//!      │                                  ▼     │ (relaunch)
//!      │  transfer finished,   ┌─────────────────────────┐
//!      └────── closed ──────── │ RunningWithPendingRerun │ ◄─┐ on_quiescence
//!                              └─────────────────────────┘ ──┘
//! ```
//!
//! At most one transfer runs per watch. Any number of quiescence signals
//! while a transfer runs collapse into a single follow-up run.

use std::sync::Arc;

use mimic_core::TransferState;
use mimic_watcher::QuiescenceSink;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::command::TransferCommand;
use crate::error::SyncError;
use crate::runner::TransferRunner;

/// Counters and state of an executor at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Scheduler state.
    pub state: TransferState,
    /// Transfers that finished, successfully or not.
    pub completed_runs: u64,
    /// Transfers that finished unsuccessfully.
    pub failed_runs: u64,
    /// Error of the most recent transfer, if it failed.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct ExecState {
    transfer: TransferState,
    closed: bool,
    completed_runs: u64,
    failed_runs: u64,
    last_error: Option<String>,
}

impl ExecState {
    fn record(&mut self, result: &Result<(), SyncError>) {
        self.completed_runs += 1;
        match result {
            Ok(()) => self.last_error = None,
            Err(error) => {
                self.failed_runs += 1;
                self.last_error = Some(error.to_string());
            }
        }
    }
}

struct Inner {
    command: TransferCommand,
    runner: Arc<dyn TransferRunner>,
    state: Mutex<ExecState>,
    idle: Notify,
}

/// Runs a watch's transfers, never two at once.
///
/// Cloning yields another handle to the same executor.
#[derive(Clone)]
pub struct SyncExecutor {
    inner: Arc<Inner>,
}

impl SyncExecutor {
    /// Creates an idle executor for `command`.
    #[must_use]
    pub fn new(command: TransferCommand, runner: Arc<dyn TransferRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                command,
                runner,
                state: Mutex::new(ExecState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Returns the command every transfer runs.
    #[must_use]
    pub fn command(&self) -> &TransferCommand {
        &self.inner.command
    }

    /// Schedules a transfer for a settled burst of changes.
    ///
    /// Launches one immediately when idle, otherwise queues a single rerun.
    /// Never waits for the transfer. Must be called within a tokio runtime.
    pub fn on_quiescence(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            tracing::trace!("Executor closed, ignoring quiescence");
            return;
        }

        match state.transfer {
            TransferState::Idle => {
                state.transfer = TransferState::Running;
                drop(state);
                tokio::spawn(Arc::clone(&self.inner).drive());
            }
            TransferState::Running => {
                state.transfer = TransferState::RunningWithPendingRerun;
                tracing::debug!("Transfer in progress, rerun queued");
            }
            TransferState::RunningWithPendingRerun => {}
        }
    }

    /// Stops scheduling transfers.
    ///
    /// A transfer already in flight runs to completion; a queued rerun is
    /// dropped. Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        if state.transfer == TransferState::RunningWithPendingRerun {
            state.transfer = TransferState::Running;
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Returns the current scheduler state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.inner.state.lock().transfer
    }

    /// Returns a snapshot of state and counters.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let state = self.inner.state.lock();
        ExecutorStats {
            state: state.transfer,
            completed_runs: state.completed_runs,
            failed_runs: state.failed_runs,
            last_error: state.last_error.clone(),
        }
    }

    /// Waits until no transfer is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.state().is_running() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    /// Runs transfers until no rerun is queued.
    async fn drive(self: Arc<Self>) {
        loop {
            let result = self.runner.run(&self.command).await;
            match &result {
                Ok(()) => tracing::debug!(command = %self.command, "Transfer finished"),
                Err(error) => tracing::warn!(command = %self.command, error = %error, "Transfer failed"),
            }

            let rerun = {
                let mut state = self.state.lock();
                state.record(&result);
                let rerun =
                    state.transfer == TransferState::RunningWithPendingRerun && !state.closed;
                state.transfer = if rerun {
                    TransferState::Running
                } else {
                    TransferState::Idle
                };
                rerun
            };
            if !rerun {
                break;
            }
            tracing::debug!("Changes arrived during transfer, running again");
        }
        self.idle.notify_waiters();
    }
}

impl QuiescenceSink for SyncExecutor {
    fn on_quiescence(&self) {
        Self::on_quiescence(self);
    }
}

impl std::fmt::Debug for SyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("command", &self.inner.command)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}
