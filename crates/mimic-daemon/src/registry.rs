//! The set of active watches and their lifecycles.
//!
//! # Overview
//!
//! Each entry owns everything a watch needs: its notification subscription
//! (moved into the watch task), the [`ChangeAggregator`] driving it, the
//! [`SyncExecutor`] that runs transfers, and an optional lease on a pooled
//! connection. Adding and removing start and stop all of these together.
//!
//! # Locking
//!
//! The registry lock is only held for bookkeeping. Adding a watch reserves
//! its source under the lock, then walks the tree and opens any pooled
//! connection with the lock released, and finally inserts the entry. A
//! concurrent add for a reserved source fails with `AlreadyWatched`; a failed
//! add drops its reservation. Pool operations never run under the registry
//! lock, and since they may block while connecting, callers run adds,
//! removals and shutdown on blocking threads.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mimic_core::{AddRequest, DaemonConfig, HostKey, WatchSpec, WatchSummary};
use mimic_sync::{
    ConnectionPool, Connector, ProcessRunner, SshConnector, SyncExecutor, TransferCommand,
    TransferRunner,
};
use mimic_watcher::{AggregatorExit, ChangeAggregator, NotificationSource, NotifySource};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;

/// One registered watch.
struct ActiveWatch {
    spec: WatchSpec,
    executor: SyncExecutor,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    lease: Option<HostKey>,
}

impl ActiveWatch {
    fn summary(&self) -> WatchSummary {
        let stats = self.executor.stats();
        WatchSummary {
            source: self.spec.source.clone(),
            destination: self.spec.destination.clone(),
            options: self.spec.options.clone(),
            state: stats.state,
            completed_runs: stats.completed_runs,
            failed_runs: stats.failed_runs,
            last_error: stats.last_error,
            pooled: self.lease.is_some(),
            alive: !self.task.is_finished(),
        }
    }
}

#[derive(Default)]
struct Watches {
    active: FxHashMap<Utf8PathBuf, ActiveWatch>,
    /// Sources whose add is in progress.
    reserved: FxHashSet<Utf8PathBuf>,
    closed: bool,
}

impl Watches {
    fn contains(&self, source: &Utf8Path) -> bool {
        self.active.contains_key(source) || self.reserved.contains(source)
    }
}

/// Holds a source reserved until dropped.
struct Reservation<'a> {
    watches: &'a RwLock<Watches>,
    source: Utf8PathBuf,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.watches.write().reserved.remove(&self.source);
    }
}

/// Process-wide registry of watches, keyed by canonical source path.
pub struct WatchRegistry<C: Connector = SshConnector> {
    config: DaemonConfig,
    source: Arc<dyn NotificationSource>,
    runner: Arc<dyn TransferRunner>,
    pool: ConnectionPool<C>,
    watches: RwLock<Watches>,
}

impl WatchRegistry {
    /// Creates a registry using notify, rsync processes and ssh masters.
    #[must_use]
    pub fn new(config: DaemonConfig) -> Self {
        let connector = SshConnector::from_config(&config);
        Self::with_collaborators(
            config,
            Arc::new(NotifySource::new()),
            Arc::new(ProcessRunner),
            connector,
        )
    }
}

impl<C: Connector> WatchRegistry<C> {
    /// Creates a registry with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: DaemonConfig,
        source: Arc<dyn NotificationSource>,
        runner: Arc<dyn TransferRunner>,
        connector: C,
    ) -> Self {
        Self {
            config,
            source,
            runner,
            pool: ConnectionPool::new(connector),
            watches: RwLock::new(Watches::default()),
        }
    }

    /// Returns the daemon configuration.
    #[must_use]
    pub const fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Returns the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Starts watching a directory.
    ///
    /// On success the watch is receiving events, its executor is idle, and a
    /// pooled connection lease is held if one was requested and could be
    /// opened. A connection failure is logged and does not fail the add.
    /// Walks the source tree and may wait for a connection, so call it from
    /// a blocking thread inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`DaemonError::SourceNotFound`] if the source does not exist
    /// - [`DaemonError::AlreadyWatched`] if the canonical source is
    ///   registered or being added
    /// - [`DaemonError::Watch`] for invalid exclude patterns or subscription
    ///   failures
    /// - [`DaemonError::ShuttingDown`] once [`shutdown`](Self::shutdown) has
    ///   started
    ///
    /// Nothing is registered, leased or spawned when an error is returned.
    pub fn add_watch(&self, request: AddRequest) -> Result<WatchSpec, DaemonError> {
        if !request.source.exists() {
            return Err(DaemonError::source_not_found(request.source));
        }
        let source = request.source.canonicalize_utf8()?;

        let spec = WatchSpec::new(
            source,
            request.destination,
            request.options,
            self.config.settle_ms,
        );
        let aggregator = ChangeAggregator::for_watch(&spec)?;

        let _reservation = self.reserve(&spec.source)?;

        let (subscription, events) =
            self.source
                .subscribe(&spec.source, spec.options.recursive, spec.options.auto_add)?;

        let lease = self.acquire_lease(&spec);
        let executor = SyncExecutor::new(
            TransferCommand::build(&spec, &self.config),
            Arc::clone(&self.runner),
        );

        let mut watches = self.watches.write();
        if watches.closed {
            drop(watches);
            if let Some(host) = &lease {
                self.pool.release(host);
            }
            return Err(DaemonError::ShuttingDown);
        }

        let cancel = CancellationToken::new();
        let task = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            let source = spec.source.clone();
            tokio::spawn(async move {
                let exit = aggregator
                    .run(subscription, events, executor.clone(), cancel)
                    .await;
                if exit == AggregatorExit::StreamClosed {
                    tracing::error!(source = %source, "Watch stopped receiving change events");
                    executor.close();
                }
            })
        };

        tracing::info!(
            source = %spec.source,
            destination = %spec.destination,
            settle_ms = spec.settle_ms,
            pooled = lease.is_some(),
            "Watch added"
        );

        watches.active.insert(
            spec.source.clone(),
            ActiveWatch {
                spec: spec.clone(),
                executor,
                cancel,
                task,
                lease,
            },
        );
        Ok(spec)
    }

    /// Stops watching a directory.
    ///
    /// The watch task is cancelled and the executor closed: a transfer in
    /// flight finishes, nothing new is scheduled. Returns the path the watch
    /// was registered under. Releasing the pooled connection may wait on the
    /// pool, so call it from a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::NoSuchWatch`] if no watch matches `source`.
    pub fn remove_watch(&self, source: &Utf8Path) -> Result<Utf8PathBuf, DaemonError> {
        let canonical = source.canonicalize_utf8().ok();

        let (key, watch) = {
            let mut watches = self.watches.write();
            let key = canonical
                .filter(|path| watches.active.contains_key(path))
                .unwrap_or_else(|| source.to_owned());
            let Some(watch) = watches.active.remove(&key) else {
                return Err(DaemonError::no_such_watch(source));
            };
            (key, watch)
        };

        self.stop(&watch);
        tracing::info!(source = %key, "Watch removed");
        Ok(key)
    }

    /// Returns a snapshot of every watch, ordered by source path.
    #[must_use]
    pub fn list_watches(&self) -> Vec<WatchSummary> {
        let watches = self.watches.read();
        let mut summaries: Vec<_> = watches.active.values().map(ActiveWatch::summary).collect();
        summaries.sort_by(|a, b| a.source.cmp(&b.source));
        summaries
    }

    /// Returns the number of watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.read().active.len()
    }

    /// Returns `true` if nothing is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.read().active.is_empty()
    }

    /// Removes every watch and starts closing every pooled connection.
    ///
    /// Adds still in progress fail with [`DaemonError::ShuttingDown`].
    /// Returns the number of watches removed and connections closed. May
    /// wait on the pool, so call it from a blocking thread.
    pub fn stop_all(&self) -> (usize, usize) {
        let removed: Vec<ActiveWatch> = {
            let mut watches = self.watches.write();
            watches.closed = true;
            watches.active.drain().map(|(_, watch)| watch).collect()
        };

        for watch in &removed {
            self.stop(watch);
        }
        (removed.len(), self.pool.close_all())
    }

    /// Removes every watch and closes every pooled connection, waiting for
    /// the connections to go away.
    pub async fn shutdown(&self) {
        let (removed, closed) = self.stop_all();
        self.pool.connector().wait_closed().await;
        tracing::info!(watches = removed, connections = closed, "Registry shut down");
    }

    fn reserve(&self, source: &Utf8Path) -> Result<Reservation<'_>, DaemonError> {
        let mut watches = self.watches.write();
        if watches.closed {
            return Err(DaemonError::ShuttingDown);
        }
        if watches.contains(source) {
            return Err(DaemonError::already_watched(source));
        }
        watches.reserved.insert(source.to_owned());
        Ok(Reservation {
            watches: &self.watches,
            source: source.to_owned(),
        })
    }

    fn acquire_lease(&self, spec: &WatchSpec) -> Option<HostKey> {
        if !spec.options.maintain_connection {
            return None;
        }
        let host = spec.destination.host_key()?;
        match self.pool.acquire(&host) {
            Ok(()) => Some(host),
            Err(error) => {
                tracing::warn!(
                    source = %spec.source,
                    error = %error,
                    "Continuing without a pooled connection"
                );
                None
            }
        }
    }

    fn stop(&self, watch: &ActiveWatch) {
        watch.cancel.cancel();
        watch.executor.close();
        if let Some(host) = &watch.lease {
            self.pool.release(host);
        }
    }
}

impl<C: Connector> std::fmt::Debug for WatchRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watches", &self.len())
            .field("connections", &self.pool.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use mimic_core::{Destination, TransferState, WatchOptions};
    use mimic_sync::SyncError;
    use mimic_watcher::{ChangeEvent, EventStream, Subscription, WatchError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct NoopSubscription;

    impl Subscription for NoopSubscription {
        fn extend_coverage(&mut self, _path: &Utf8Path) -> Result<(), WatchError> {
            Ok(())
        }
    }

    /// Hands out channels the test can push events into.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        senders: Mutex<FxHashMap<Utf8PathBuf, mpsc::UnboundedSender<ChangeEvent>>>,
        failing: AtomicBool,
    }

    impl FakeSource {
        pub(crate) fn emit(&self, source: &Utf8Path, name: &str) {
            let senders = self.senders.lock();
            let sender = senders.get(source).unwrap();
            sender.send(ChangeEvent::modified(source.join(name))).unwrap();
        }

        fn close(&self, source: &Utf8Path) {
            self.senders.lock().remove(source);
        }

        fn subscriptions(&self) -> usize {
            self.senders.lock().len()
        }
    }

    impl NotificationSource for FakeSource {
        fn subscribe(
            &self,
            path: &Utf8Path,
            _recursive: bool,
            _auto_add: bool,
        ) -> Result<(Box<dyn Subscription>, EventStream), WatchError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(WatchError::path_not_found(path));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().insert(path.to_owned(), tx);
            Ok((Box::new(NoopSubscription), rx))
        }
    }

    /// Blocks in `subscribe` until the test lets it continue.
    struct GatedSource {
        entered: Mutex<std_mpsc::Sender<()>>,
        release: Mutex<std_mpsc::Receiver<()>>,
        senders: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    }

    impl NotificationSource for GatedSource {
        fn subscribe(
            &self,
            _path: &Utf8Path,
            _recursive: bool,
            _auto_add: bool,
        ) -> Result<(Box<dyn Subscription>, EventStream), WatchError> {
            self.entered.lock().send(()).unwrap();
            self.release.lock().recv().unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().push(tx);
            Ok((Box::new(NoopSubscription), rx))
        }
    }

    /// Records every command and succeeds immediately.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub(crate) commands: Mutex<Vec<TransferCommand>>,
    }

    #[async_trait]
    impl TransferRunner for RecordingRunner {
        async fn run(&self, command: &TransferCommand) -> Result<(), SyncError> {
            self.commands.lock().push(command.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingConnector {
        opened: AtomicUsize,
        closed: AtomicUsize,
        unreachable: bool,
    }

    impl Connector for CountingConnector {
        type Handle = ();

        fn open(&self, host: &HostKey) -> Result<(), SyncError> {
            if self.unreachable {
                return Err(SyncError::connection_unavailable(host, "unreachable"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self, _host: &HostKey, _handle: ()) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct Fixture {
        pub(crate) registry: WatchRegistry<CountingConnector>,
        pub(crate) source: Arc<FakeSource>,
        pub(crate) runner: Arc<RecordingRunner>,
    }

    pub(crate) fn fixture_with(connector: CountingConnector) -> Fixture {
        let source = Arc::new(FakeSource::default());
        let runner = Arc::new(RecordingRunner::default());
        let registry = WatchRegistry::with_collaborators(
            DaemonConfig::default(),
            Arc::clone(&source) as Arc<dyn NotificationSource>,
            Arc::clone(&runner) as Arc<dyn TransferRunner>,
            connector,
        );
        Fixture {
            registry,
            source,
            runner,
        }
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(CountingConnector::default())
    }

    pub(crate) fn canonical(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap()
    }

    pub(crate) fn add_request(source: &Utf8Path, destination: &str, options: WatchOptions) -> AddRequest {
        AddRequest {
            source: source.to_owned(),
            destination: Destination::new(destination).unwrap(),
            options,
        }
    }

    #[tokio::test]
    async fn test_add_missing_source() {
        let f = fixture();
        let err = f
            .registry
            .add_watch(add_request(
                Utf8Path::new("/nonexistent/mimic/src"),
                "/b",
                WatchOptions::default(),
            ))
            .unwrap_err();

        assert!(matches!(err, DaemonError::SourceNotFound(_)));
        assert!(f.registry.is_empty());
        assert_eq!(f.source.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_add_leaves_existing_watch() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let path = canonical(&dir);

        f.registry
            .add_watch(add_request(&path, "/first", WatchOptions::default()))
            .unwrap();
        let err = f
            .registry
            .add_watch(add_request(&path, "/second", WatchOptions::default()))
            .unwrap_err();

        assert!(matches!(err, DaemonError::AlreadyWatched(_)));
        let watches = f.registry.list_watches();
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].destination.as_str(), "/first");
        assert!(watches[0].alive);
    }

    #[tokio::test]
    async fn test_invalid_pattern_mutates_nothing() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let options = WatchOptions {
            exclude: vec!["[oops".to_owned()],
            ..WatchOptions::default()
        };

        let err = f
            .registry
            .add_watch(add_request(&canonical(&dir), "bob@host:/b", options))
            .unwrap_err();

        assert!(matches!(err, DaemonError::Watch(WatchError::InvalidPattern { .. })));
        assert!(f.registry.is_empty());
        assert_eq!(f.source.subscriptions(), 0);
        assert!(f.registry.pool().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_watch() {
        let f = fixture();
        let err = f.registry.remove_watch(Utf8Path::new("/not/watched")).unwrap_err();
        assert!(matches!(err, DaemonError::NoSuchWatch(_)));
    }

    #[tokio::test]
    async fn test_readd_with_shared_host_keeps_single_connection() {
        let f = fixture();
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let (a, b) = (canonical(&a), canonical(&b));
        let host = HostKey::new(Some("bob"), "host");
        let opened = || f.registry.pool().connector().opened.load(Ordering::SeqCst);
        let closed = || f.registry.pool().connector().closed.load(Ordering::SeqCst);

        f.registry
            .add_watch(add_request(&a, "bob@host:/a", WatchOptions::default()))
            .unwrap();
        f.registry
            .add_watch(add_request(&b, "bob@host:/b", WatchOptions::default()))
            .unwrap();
        assert_eq!(f.registry.pool().ref_count(&host), 2);

        f.registry.remove_watch(&a).unwrap();
        assert_eq!(f.registry.pool().ref_count(&host), 1);

        f.registry
            .add_watch(add_request(&a, "bob@host:/a", WatchOptions::default()))
            .unwrap();
        assert_eq!(f.registry.pool().ref_count(&host), 2);

        f.registry.remove_watch(&a).unwrap();
        assert_eq!(f.registry.pool().ref_count(&host), 1);
        assert_eq!(opened(), 1);
        assert_eq!(closed(), 0);

        f.registry.remove_watch(&b).unwrap();
        assert_eq!(f.registry.pool().ref_count(&host), 0);
        assert_eq!(closed(), 1);
    }

    #[tokio::test]
    async fn test_failed_subscribe_releases_reservation() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let source = canonical(&dir);

        f.source.failing.store(true, Ordering::SeqCst);
        let err = f
            .registry
            .add_watch(add_request(&source, "bob@host:/b", WatchOptions::default()))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Watch(WatchError::PathNotFound(_))));
        assert!(f.registry.is_empty());
        assert!(f.registry.pool().is_empty());

        f.source.failing.store(false, Ordering::SeqCst);
        f.registry
            .add_watch(add_request(&source, "bob@host:/b", WatchOptions::default()))
            .unwrap();
        assert_eq!(f.registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_subscribe_does_not_hold_the_registry() {
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let registry = Arc::new(WatchRegistry::with_collaborators(
            DaemonConfig::default(),
            Arc::new(GatedSource {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
                senders: Mutex::new(Vec::new()),
            }),
            Arc::new(RecordingRunner::default()),
            CountingConnector::default(),
        ));
        let dir = TempDir::new().unwrap();
        let source = canonical(&dir);

        let adding = {
            let registry = Arc::clone(&registry);
            let source = source.clone();
            tokio::task::spawn_blocking(move || {
                registry.add_watch(add_request(&source, "/b", WatchOptions::default()))
            })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // While the first add is still walking the tree, the registry
        // answers immediately and treats the source as taken.
        let concurrent = {
            let registry = Arc::clone(&registry);
            let source = source.clone();
            tokio::task::spawn_blocking(move || {
                let listed = registry.list_watches().len();
                let duplicate =
                    registry.add_watch(add_request(&source, "/c", WatchOptions::default()));
                let removed = registry.remove_watch(&source);
                (listed, duplicate, removed)
            })
        };
        let (listed, duplicate, removed) = tokio::time::timeout(Duration::from_secs(5), concurrent)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listed, 0);
        assert!(matches!(duplicate, Err(DaemonError::AlreadyWatched(_))));
        assert!(matches!(removed, Err(DaemonError::NoSuchWatch(_))));

        release_tx.send(()).unwrap();
        adding.await.unwrap().unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_refused() {
        let f = fixture();
        let dir = TempDir::new().unwrap();

        f.registry.shutdown().await;
        let err = f
            .registry
            .add_watch(add_request(&canonical(&dir), "bob@host:/b", WatchOptions::default()))
            .unwrap_err();

        assert!(matches!(err, DaemonError::ShuttingDown));
        assert!(f.registry.is_empty());
        assert!(f.registry.pool().is_empty());
    }

    #[tokio::test]
    async fn test_local_and_unpooled_watches_take_no_lease() {
        let f = fixture();
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());

        f.registry
            .add_watch(add_request(&canonical(&a), "/mirror", WatchOptions::default()))
            .unwrap();
        let options = WatchOptions {
            maintain_connection: false,
            ..WatchOptions::default()
        };
        f.registry
            .add_watch(add_request(&canonical(&b), "bob@host:/b", options))
            .unwrap();

        assert!(f.registry.pool().is_empty());
        assert!(f.registry.list_watches().iter().all(|w| !w.pooled));
    }

    #[tokio::test]
    async fn test_unreachable_host_still_adds_watch() {
        let f = fixture_with(CountingConnector {
            unreachable: true,
            ..CountingConnector::default()
        });
        let dir = TempDir::new().unwrap();

        f.registry
            .add_watch(add_request(&canonical(&dir), "bob@host:/b", WatchOptions::default()))
            .unwrap();

        let watches = f.registry.list_watches();
        assert_eq!(watches.len(), 1);
        assert!(!watches[0].pooled);
        assert!(f.registry.pool().is_empty());

        // Releasing on remove must not touch the pool
        f.registry.remove_watch(&canonical(&dir)).unwrap();
        assert_eq!(f.registry.pool().connector().closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_then_relevant_change_runs_one_transfer() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let source = canonical(&dir);
        let options = WatchOptions {
            exclude: vec!["*.swp".to_owned()],
            ..WatchOptions::default()
        };
        f.registry
            .add_watch(add_request(&source, "/b", options))
            .unwrap();

        f.source.emit(&source, ".notes.txt.swp");
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.source.emit(&source, "notes.txt");

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(f.runner.commands.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let commands = f.runner.commands.lock();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].args().iter().any(|a| a == "--exclude=*.swp"));
        assert!(!commands[0].args().iter().any(|a| a == "--delete"));
        assert_eq!(commands[0].args().last().map(String::as_str), Some("/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_watch_reported_not_alive() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let source = canonical(&dir);
        f.registry
            .add_watch(add_request(&source, "/b", WatchOptions::default()))
            .unwrap();

        f.source.close(&source);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let watches = f.registry.list_watches();
        assert!(!watches[0].alive);
        assert_eq!(watches[0].state, TransferState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_watch_stops_transferring() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let source = canonical(&dir);
        f.registry
            .add_watch(add_request(&source, "/b", WatchOptions::default()))
            .unwrap();

        f.source.emit(&source, "a.txt");
        f.registry.remove_watch(&source).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(f.runner.commands.lock().is_empty());
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let f = fixture();
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        f.registry
            .add_watch(add_request(&canonical(&a), "bob@host:/a", WatchOptions::default()))
            .unwrap();
        f.registry
            .add_watch(add_request(&canonical(&b), "carol@other:/b", WatchOptions::default()))
            .unwrap();
        assert_eq!(f.registry.pool().len(), 2);

        f.registry.shutdown().await;

        assert!(f.registry.is_empty());
        assert!(f.registry.pool().is_empty());
        assert_eq!(f.registry.pool().connector().closed.load(Ordering::SeqCst), 2);
    }
}
