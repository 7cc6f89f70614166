//! Reference-counted persistent connections, one per remote host.
//!
//! Watches that maintain a connection take a lease on their destination
//! host. The first lease opens the connection, later leases share it, and
//! releasing the last one closes it. Hosts with no lease have no entry:
//! `ref_count == 0` never appears in the table.

use async_trait::async_trait;
use mimic_core::HostKey;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::SyncError;

/// Opens and closes persistent connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Live connection state kept by the pool.
    type Handle: Send + 'static;

    /// Opens a connection to `host`, returning once it is usable.
    ///
    /// Called with the pool locked and may block while the connection is
    /// established, so pool operations belong on blocking threads.
    fn open(&self, host: &HostKey) -> Result<Self::Handle, SyncError>;

    /// Closes a connection previously returned by [`open`](Self::open).
    ///
    /// Called with the pool locked; slow teardown should be moved off the
    /// calling thread and awaited in [`wait_closed`](Self::wait_closed).
    fn close(&self, host: &HostKey, handle: Self::Handle);

    /// Waits for connections handed to [`close`](Self::close) to finish
    /// shutting down.
    async fn wait_closed(&self) {}
}

#[derive(Debug)]
struct PoolEntry<H> {
    ref_count: usize,
    handle: H,
}

/// Process-wide pool of shared connections.
///
/// Every operation holds a single mutex for its whole check-and-update, so
/// concurrent acquires for a host open exactly one connection.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    entries: Mutex<FxHashMap<HostKey, PoolEntry<C::Handle>>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the underlying connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Takes a lease on `host`, opening a connection if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionUnavailable`] if the connection could
    /// not be opened. No entry is created and the caller holds no lease.
    pub fn acquire(&self, host: &HostKey) -> Result<(), SyncError> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(host) {
            entry.ref_count += 1;
            tracing::debug!(host = %host, ref_count = entry.ref_count, "Reusing pooled connection");
            return Ok(());
        }

        let handle = self.connector.open(host)?;
        entries.insert(
            host.clone(),
            PoolEntry {
                ref_count: 1,
                handle,
            },
        );
        tracing::info!(host = %host, "Opened pooled connection");
        Ok(())
    }

    /// Gives back a lease on `host`, closing the connection with the last one.
    ///
    /// Returns `true` if the connection was closed. Releasing a host with no
    /// lease is logged and otherwise ignored.
    pub fn release(&self, host: &HostKey) -> bool {
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get_mut(host) else {
            tracing::warn!(host = %host, "Released a connection that was not pooled");
            return false;
        };

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            tracing::debug!(host = %host, ref_count = entry.ref_count, "Released pooled connection");
            return false;
        }

        if let Some(entry) = entries.remove(host) {
            self.connector.close(host, entry.handle);
            tracing::info!(host = %host, "Closed pooled connection");
        }
        true
    }

    /// Returns the number of leases on `host`.
    #[must_use]
    pub fn ref_count(&self, host: &HostKey) -> usize {
        self.entries.lock().get(host).map_or(0, |entry| entry.ref_count)
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Closes every connection regardless of outstanding leases.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        for (host, entry) in entries.drain() {
            tracing::debug!(host = %host, ref_count = entry.ref_count, "Closing pooled connection");
            self.connector.close(&host, entry.handle);
        }
        count
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connector", &self.connector)
            .field("connections", &self.len())
            .finish()
    }
}
