//! Connection lifecycle manager.
//!
//! A scanner owns at most one shared connection, held in a slot together with
//! a persistent-mode flag and a count of in-flight borrowers. Every scan asks
//! the manager for a [`Lease`] and hands it back when done:
//!
//! ```text
//!   borrow(inherited?)
//!     ├── inherited lease given ───────────────► Inherited  (no bookkeeping)
//!     ├── slot persistent ─── borrowers += 1 ──► Persistent (shared handle)
//!     └── otherwise ───────── driver.open() ───► Ephemeral  (private handle)
//!
//!   release(lease)
//!     ├── Inherited  ─► nothing
//!     ├── Ephemeral  ─► driver.close(private handle)
//!     └── Persistent ─► borrowers -= 1;
//!                       close shared handle if !persistent && borrowers == 0
//! ```
//!
//! The slot lock covers bookkeeping only and is never held across a driver
//! call. A shared handle is taken out of the slot by exactly one party before
//! it is closed, so a late `release` and `end_persistent` can never both close
//! it, and it is never closed under a borrower that still uses it.
//!
//! Every handle remembers the parameters it was opened with. A shared handle
//! whose parameters were replaced is never handed out again: it is retired,
//! and the last of its borrowers closes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::driver::{ConnectionOptions, DatabaseDriver, DEFAULT_URI};
use crate::error::{ScanResult, ScannerError};

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub uri: String,
    pub options: ConnectionOptions,
}

impl ConnectionParams {
    pub fn new(uri: impl Into<String>, options: ConnectionOptions) -> Self {
        Self {
            uri: uri.into(),
            options,
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::new(DEFAULT_URI, ConnectionOptions::default())
    }
}

/// Whether the slot currently holds a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Point-in-time view of the connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    pub state: ConnectionState,
    pub persistent: bool,
    /// Borrowers of every shared handle still open, retired ones included.
    pub borrowers: usize,
}

/// How a lease obtained its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    /// Passed down by a composite scan; released by that scan.
    Inherited,
    /// The slot's shared handle, counted in `borrowers`.
    Persistent,
    /// A private handle opened for this lease alone.
    Ephemeral,
}

/// A borrowed connection handle.
#[must_use = "a lease must be handed back to ConnectionManager::release"]
#[derive(Debug)]
pub struct Lease<H> {
    handle: Arc<H>,
    params: ConnectionParams,
    kind: LeaseKind,
    /// Shared handle the lease is counted on; 0 for private handles.
    generation: u64,
}

impl<H> Lease<H> {
    pub fn handle(&self) -> &Arc<H> {
        &self.handle
    }

    /// The parameters the handle was opened with.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn kind(&self) -> LeaseKind {
        self.kind
    }
}

struct SharedHandle<H> {
    generation: u64,
    handle: Arc<H>,
    params: ConnectionParams,
    borrowers: usize,
}

struct Slot<H> {
    current: Option<SharedHandle<H>>,
    /// Shared handles replaced while still borrowed.
    retired: Vec<SharedHandle<H>>,
    persistent: bool,
    next_generation: u64,
}

impl<H> Slot<H> {
    fn status(&self) -> SlotStatus {
        let handles = self.current.iter().chain(&self.retired);
        SlotStatus {
            state: if self.current.is_some() || !self.retired.is_empty() {
                ConnectionState::Open
            } else {
                ConnectionState::Closed
            },
            persistent: self.persistent,
            borrowers: handles.map(|shared| shared.borrowers).sum(),
        }
    }

    /// Uncount one borrower of `generation`, returning the handle when it was
    /// the last one and nobody will hand the handle out again.
    fn uncount(&mut self, generation: u64) -> Option<SharedHandle<H>> {
        match self.current.as_mut() {
            Some(current) if current.generation == generation => {
                current.borrowers = current.borrowers.saturating_sub(1);
                let idle = current.borrowers == 0;
                if idle && !self.persistent {
                    self.current.take()
                } else {
                    None
                }
            }
            _ => {
                let Some(index) = self
                    .retired
                    .iter()
                    .position(|retired| retired.generation == generation)
                else {
                    warn!(generation, "released a lease on an unknown shared connection");
                    return None;
                };
                let retired = &mut self.retired[index];
                retired.borrowers = retired.borrowers.saturating_sub(1);
                if retired.borrowers == 0 {
                    Some(self.retired.swap_remove(index))
                } else {
                    None
                }
            }
        }
    }
}

/// Owns the connection slot of one scanner.
pub struct ConnectionManager<D: DatabaseDriver> {
    driver: Arc<D>,
    params: RwLock<ConnectionParams>,
    slot: Mutex<Slot<D::Handle>>,
    /// Serializes start, end and reconfigure; never taken by borrow or release.
    lifecycle: AsyncMutex<()>,
    status: watch::Sender<SlotStatus>,
}

impl<D: DatabaseDriver> ConnectionManager<D> {
    pub fn new(driver: Arc<D>, params: ConnectionParams) -> Self {
        let slot = Slot {
            current: None,
            retired: Vec::new(),
            persistent: false,
            next_generation: 1,
        };
        let (status, _) = watch::channel(slot.status());

        Self {
            driver,
            params: RwLock::new(params),
            slot: Mutex::new(slot),
            lifecycle: AsyncMutex::new(()),
            status,
        }
    }

    /// Current connection parameters.
    pub fn params(&self) -> ConnectionParams {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current slot status.
    pub fn status(&self) -> SlotStatus {
        *self.status.borrow()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot<D::Handle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, slot: &Slot<D::Handle>) {
        self.status.send_replace(slot.status());
    }

    /// Borrow a handle for one operation.
    ///
    /// With `inherited` set, its handle is returned as is and nothing is
    /// counted. Otherwise the shared handle is used in persistent mode, and a
    /// fresh private handle is opened when not.
    pub async fn borrow(&self, inherited: Option<&Lease<D::Handle>>) -> ScanResult<Lease<D::Handle>> {
        if let Some(outer) = inherited {
            return Ok(Lease {
                handle: Arc::clone(&outer.handle),
                params: outer.params.clone(),
                kind: LeaseKind::Inherited,
                generation: outer.generation,
            });
        }

        if let Some(lease) = self.borrow_shared() {
            return Ok(lease);
        }

        let params = self.params();
        let handle = self.open(&params).await?;
        debug!("opened ephemeral connection");
        Ok(Lease {
            handle: Arc::new(handle),
            params,
            kind: LeaseKind::Ephemeral,
            generation: 0,
        })
    }

    fn borrow_shared(&self) -> Option<Lease<D::Handle>> {
        let mut slot = self.lock_slot();
        if !slot.persistent {
            return None;
        }

        let shared = slot.current.as_mut()?;
        shared.borrowers += 1;
        debug!(borrowers = shared.borrowers, "borrowed persistent connection");
        let lease = Lease {
            handle: Arc::clone(&shared.handle),
            params: shared.params.clone(),
            kind: LeaseKind::Persistent,
            generation: shared.generation,
        };

        self.publish(&slot);
        Some(lease)
    }

    /// Hand a lease back.
    ///
    /// Must be called exactly once per lease, on success and failure paths
    /// alike.
    pub async fn release(&self, lease: Lease<D::Handle>) -> ScanResult<()> {
        match lease.kind {
            LeaseKind::Inherited => Ok(()),
            LeaseKind::Ephemeral => {
                debug!("closing ephemeral connection");
                self.close(&lease.handle, &lease.params).await
            }
            LeaseKind::Persistent => {
                let drained = {
                    let mut slot = self.lock_slot();
                    let drained = slot.uncount(lease.generation);
                    debug!(borrowers = slot.status().borrowers, "released persistent connection");
                    self.publish(&slot);
                    drained
                };

                match drained {
                    Some(shared) => {
                        debug!("last borrower closing shared connection");
                        self.close(&shared.handle, &shared.params).await
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Open the shared handle if needed and enter persistent mode.
    ///
    /// A handle still open with the current parameters is reused. On failure
    /// the slot holds no current handle and persistent mode stays off.
    pub async fn start_persistent(&self) -> ScanResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> ScanResult<()> {
        let params = self.params();

        let stale = {
            let mut slot = self.lock_slot();
            let stale = match slot.current.take() {
                Some(shared) if shared.params == params => {
                    slot.current = Some(shared);
                    slot.persistent = true;
                    info!(borrowers = slot.status().borrowers, "persistent connection started");
                    self.publish(&slot);
                    return Ok(());
                }
                Some(shared) if shared.borrowers > 0 => {
                    debug!(
                        uri = %shared.params.uri,
                        borrowers = shared.borrowers,
                        "retiring shared connection opened with replaced parameters"
                    );
                    slot.retired.push(shared);
                    None
                }
                stale => stale,
            };
            slot.persistent = false;
            self.publish(&slot);
            stale
        };

        if let Some(stale) = stale {
            self.close(&stale.handle, &stale.params).await?;
        }

        let handle = self.open(&params).await?;

        let mut slot = self.lock_slot();
        let generation = slot.next_generation;
        slot.next_generation += 1;
        slot.current = Some(SharedHandle {
            generation,
            handle: Arc::new(handle),
            params,
            borrowers: 0,
        });
        slot.persistent = true;
        info!(generation, "persistent connection started");
        self.publish(&slot);
        Ok(())
    }

    /// Leave persistent mode.
    ///
    /// The shared handle is closed now if nobody is borrowing it; otherwise
    /// the last borrower closes it on release.
    pub async fn end_persistent(&self) -> ScanResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.end_locked().await
    }

    async fn end_locked(&self) -> ScanResult<()> {
        let idle = {
            let mut slot = self.lock_slot();
            slot.persistent = false;

            let borrowers = slot.current.as_ref().map(|shared| shared.borrowers);
            let idle = match borrowers {
                Some(0) => slot.current.take(),
                Some(borrowers) => {
                    debug!(borrowers, "deferring close until outstanding borrowers release");
                    None
                }
                None => None,
            };

            info!("persistent connection ended");
            self.publish(&slot);
            idle
        };

        match idle {
            Some(shared) => self.close(&shared.handle, &shared.params).await,
            None => Ok(()),
        }
    }

    /// Replace the connection parameters.
    ///
    /// In persistent mode the shared handle is ended, drained and reopened
    /// with the new parameters. Borrowers still holding the old handle finish
    /// on it undisturbed.
    pub async fn reconfigure(&self, params: ConnectionParams) -> ScanResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = params;

        let persistent = self.lock_slot().persistent;
        if !persistent {
            return Ok(());
        }

        self.end_locked().await?;
        self.wait_until_drained().await;
        self.start_locked().await
    }

    /// Wait until every shared handle has been closed.
    ///
    /// Only called with the lifecycle lock held, so no new shared handle can
    /// appear meanwhile.
    async fn wait_until_drained(&self) {
        let mut status = self.status.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = status
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await;
    }

    async fn open(&self, params: &ConnectionParams) -> ScanResult<D::Handle> {
        self.driver
            .open(&params.uri, &params.options)
            .await
            .map_err(|source| {
                warn!(uri = %params.uri, error = %source, "failed to open connection");
                ScannerError::Connection {
                    uri: params.uri.clone(),
                    options: params.options.clone(),
                    source,
                }
            })
    }

    async fn close(&self, handle: &D::Handle, params: &ConnectionParams) -> ScanResult<()> {
        self.driver.close(handle).await.map_err(|source| {
            warn!(uri = %params.uri, error = %source, "failed to close connection");
            ScannerError::Disconnection {
                uri: params.uri.clone(),
                options: params.options.clone(),
                source,
            }
        })
    }
}

impl<D: DatabaseDriver> Drop for ConnectionManager<D> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        let handles: Vec<SharedHandle<D::Handle>> = slot
            .current
            .take()
            .into_iter()
            .chain(slot.retired.drain(..))
            .collect();
        if handles.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(count = handles.len(), "closing connections left open by a dropped scanner");
                for shared in handles {
                    let driver = Arc::clone(&self.driver);
                    runtime.spawn(async move {
                        if let Err(error) = driver.close(&shared.handle).await {
                            warn!(uri = %shared.params.uri, %error, "failed to close connection of a dropped scanner");
                        }
                    });
                }
            }
            Err(_) => warn!("scanner dropped outside a runtime with its connection still open"),
        }
    }
}
