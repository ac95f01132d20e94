//! Database driver adapters.
//!
//! The scanner never speaks the wire protocol itself. Everything that touches
//! the network goes through a [`DatabaseDriver`]: opening and closing a
//! connection handle and the two raw listing calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Scanner (connection lifecycle)                  │
//! │        borrow / release / start_persistent / end_persistent     │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       DatabaseDriver                            │
//! │  - open(uri, options)          - list_database_names(handle)    │
//! │  - close(handle)               - list_collection_names(handle)  │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                        │
//!          ▼                                        ▼
//!   MongoDriver (mongodb crate)             MemoryDriver (in-process)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mongo_scanner::driver::{ConnectionOptions, DatabaseDriver, MongoDriver};
//!
//! let driver = MongoDriver::new();
//! let handle = driver.open("mongodb://localhost:27017", &ConnectionOptions::default()).await?;
//! let databases = driver.list_database_names(&handle).await?;
//! driver.close(&handle).await?;
//! ```

mod error;
pub mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{DriverError, DriverResult};
pub use memory::{MemoryDriver, MemoryHandle};
#[cfg(feature = "mongodb")]
pub use mongo::MongoDriver;

/// URI used when a scanner is built without one.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// Adapter over the network layer of a document database.
///
/// Handles are shared by reference: a persistent handle is read by many
/// concurrent scans at once, so every listing call takes `&Self::Handle`.
/// `close` also takes a reference; the caller guarantees it is invoked at most
/// once per handle and only after every user of the handle is done.
#[async_trait]
pub trait DatabaseDriver: Send + Sync + 'static {
    /// An open connection.
    type Handle: Send + Sync + 'static;

    /// Open a new connection.
    async fn open(&self, uri: &str, options: &ConnectionOptions) -> DriverResult<Self::Handle>;

    /// List the names of every database visible to the connection.
    async fn list_database_names(&self, handle: &Self::Handle) -> DriverResult<Vec<String>>;

    /// List the names of every collection in `database`.
    async fn list_collection_names(
        &self,
        handle: &Self::Handle,
        database: &str,
    ) -> DriverResult<Vec<String>>;

    /// Close a connection.
    async fn close(&self, handle: &Self::Handle) -> DriverResult<()>;
}

/// Driver-level options passed to [`DatabaseDriver::open`].
///
/// Every field is optional; `None` leaves the driver's own default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Application name reported to the server.
    pub app_name: Option<String>,
    /// Timeout for establishing a single socket.
    pub connect_timeout: Option<Duration>,
    /// Timeout for finding a suitable server.
    pub server_selection_timeout: Option<Duration>,
    /// Connect to the given host only, skipping topology discovery.
    pub direct_connection: Option<bool>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    pub fn with_direct_connection(mut self, direct: bool) -> Self {
        self.direct_connection = Some(direct);
        self
    }
}
