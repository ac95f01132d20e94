//! In-process driver over a fixed set of databases.
//!
//! `MemoryDriver` behaves like a tiny cluster: it hands out handles, answers
//! the two listing calls and keeps counters of everything it was asked to do.
//! It refuses to list through a handle that was already closed and reports a
//! second close of the same handle, which makes lifecycle mistakes visible in
//! tests instead of silently succeeding.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{ConnectionOptions, DatabaseDriver, DriverError, DriverResult};

/// A connection handed out by [`MemoryDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHandle {
    id: Uuid,
    uri: String,
    options: ConnectionOptions,
}

impl MemoryHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The URI the handle was opened with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The options the handle was opened with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    double_closes: AtomicUsize,
    list_database_calls: AtomicUsize,
    list_collection_calls: AtomicUsize,
    stale_handle_uses: AtomicUsize,
    listings_in_flight: AtomicUsize,
    peak_listings: AtomicUsize,
}

/// Counts one in-flight listing call for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parks one `open` call until the test lets it through.
#[derive(Debug, Default)]
struct OpenGate {
    armed: AtomicBool,
    held: AtomicUsize,
    gate: Notify,
}

#[derive(Debug, Default)]
struct Faults {
    refused_uris: Mutex<HashSet<String>>,
    deny_list_databases: AtomicBool,
    denied_databases: Mutex<HashSet<String>>,
    fail_close: AtomicBool,
}

/// Instrumented in-memory [`DatabaseDriver`].
///
/// # Example
///
/// ```
/// use mongo_scanner::driver::MemoryDriver;
///
/// let driver = MemoryDriver::new()
///     .with_database("animals", ["cats", "dogs"])
///     .with_database("empty", Vec::<String>::new());
///
/// assert_eq!(driver.opens(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriver {
    /// Databases in listing order, each with its collections.
    cluster: RwLock<Vec<(String, Vec<String>)>>,
    /// Handles currently open, keyed by id.
    open_handles: DashMap<Uuid, String>,
    latency: Option<Duration>,
    open_gate: OpenGate,
    counters: Counters,
    faults: Faults,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a database with its collections.
    pub fn with_database<I, S>(self, name: impl Into<String>, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_database(name, collections);
        self
    }

    /// Delay every driver call by `latency`, so concurrent scans interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a database after construction.
    pub fn insert_database<I, S>(&self, name: impl Into<String>, collections: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let collections: Vec<String> = collections.into_iter().map(Into::into).collect();
        let mut cluster = self.cluster.write().unwrap_or_else(PoisonError::into_inner);
        match cluster.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = collections,
            None => cluster.push((name, collections)),
        }
    }

    /// Remove a database.
    pub fn drop_database(&self, name: &str) {
        self.cluster
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| existing != name);
    }

    /// Make `open` fail for `uri`.
    pub fn refuse_uri(&self, uri: impl Into<String>) {
        self.faults
            .refused_uris
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into());
    }

    /// Make `list_database_names` fail with an authorization error.
    pub fn deny_list_databases(&self, deny: bool) {
        self.faults.deny_list_databases.store(deny, Ordering::SeqCst);
    }

    /// Make `list_collection_names` fail for `database`.
    pub fn deny_list_collections(&self, database: impl Into<String>) {
        self.faults
            .denied_databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(database.into());
    }

    /// Make `close` fail (the handle is still released).
    pub fn fail_close(&self, fail: bool) {
        self.faults.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Park the next `open` call until [`release_held_open`](Self::release_held_open).
    pub fn hold_next_open(&self) {
        self.open_gate.armed.store(true, Ordering::SeqCst);
    }

    /// Let a parked `open` call continue.
    pub fn release_held_open(&self) {
        self.open_gate.gate.notify_one();
    }

    /// Number of `open` calls currently parked.
    pub fn held_opens(&self) -> usize {
        self.open_gate.held.load(Ordering::SeqCst)
    }

    /// Highest number of listing calls that were in flight at once.
    pub fn peak_concurrent_listings(&self) -> usize {
        self.counters.peak_listings.load(Ordering::SeqCst)
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Number of handles closed.
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles.len()
    }

    /// Number of `close` calls on a handle that was already closed.
    pub fn double_closes(&self) -> usize {
        self.counters.double_closes.load(Ordering::SeqCst)
    }

    /// Number of listing calls made through a closed handle.
    pub fn stale_handle_uses(&self) -> usize {
        self.counters.stale_handle_uses.load(Ordering::SeqCst)
    }

    pub fn list_database_calls(&self) -> usize {
        self.counters.list_database_calls.load(Ordering::SeqCst)
    }

    pub fn list_collection_calls(&self) -> usize {
        self.counters.list_collection_calls.load(Ordering::SeqCst)
    }

    /// Total number of listing calls of either kind.
    pub fn driver_calls(&self) -> usize {
        self.list_database_calls() + self.list_collection_calls()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_open(&self, handle: &MemoryHandle) -> DriverResult<()> {
        if self.open_handles.contains_key(&handle.id) {
            Ok(())
        } else {
            self.counters.stale_handle_uses.fetch_add(1, Ordering::SeqCst);
            Err(DriverError::HandleClosed(handle.id.to_string()))
        }
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDriver {
    type Handle = MemoryHandle;

    async fn open(&self, uri: &str, options: &ConnectionOptions) -> DriverResult<MemoryHandle> {
        if self.open_gate.armed.swap(false, Ordering::SeqCst) {
            self.open_gate.held.fetch_add(1, Ordering::SeqCst);
            self.open_gate.gate.notified().await;
            self.open_gate.held.fetch_sub(1, Ordering::SeqCst);
        }
        self.simulate_latency().await;

        let refused = self
            .faults
            .refused_uris
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(uri);
        if refused {
            return Err(DriverError::ConnectionRefused(uri.to_string()));
        }

        let handle = MemoryHandle {
            id: Uuid::new_v4(),
            uri: uri.to_string(),
            options: options.clone(),
        };
        self.open_handles.insert(handle.id, handle.uri.clone());
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        Ok(handle)
    }

    async fn list_database_names(&self, handle: &MemoryHandle) -> DriverResult<Vec<String>> {
        self.counters.list_database_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.counters.listings_in_flight, &self.counters.peak_listings);
        self.simulate_latency().await;
        self.ensure_open(handle)?;

        if self.faults.deny_list_databases.load(Ordering::SeqCst) {
            return Err(DriverError::unauthorized(
                "listDatabases",
                "not authorized on admin",
            ));
        }

        let cluster = self.cluster.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cluster.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_collection_names(
        &self,
        handle: &MemoryHandle,
        database: &str,
    ) -> DriverResult<Vec<String>> {
        self.counters.list_collection_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.counters.listings_in_flight, &self.counters.peak_listings);
        self.simulate_latency().await;
        self.ensure_open(handle)?;

        let denied = self
            .faults
            .denied_databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(database);
        if denied {
            return Err(DriverError::unauthorized(
                "listCollections",
                format!("not authorized on {database}"),
            ));
        }

        // Unknown databases list as empty, like the real server.
        let cluster = self.cluster.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cluster
            .iter()
            .find(|(name, _)| name == database)
            .map(|(_, collections)| collections.clone())
            .unwrap_or_default())
    }

    async fn close(&self, handle: &MemoryHandle) -> DriverResult<()> {
        self.simulate_latency().await;

        if self.open_handles.remove(&handle.id).is_none() {
            self.counters.double_closes.fetch_add(1, Ordering::SeqCst);
            return Err(DriverError::HandleClosed(handle.id.to_string()));
        }
        self.counters.closes.fetch_add(1, Ordering::SeqCst);

        if self.faults.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Other("socket reset during close".to_string()));
        }
        Ok(())
    }
}
