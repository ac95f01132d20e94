//! The scanner façade.
//!
//! A [`Scanner`] holds the connection parameters and default scan options,
//! and owns one [`SchemaCache`] and one [`ConnectionManager`]. It is the only
//! entry point callers need.
//!
//! By default every call opens a connection, uses it and closes it again.
//! [`Scanner::start_connection`] switches to one persistent connection shared
//! by all calls until [`Scanner::end_connection`]. Calls may run concurrently
//! in either mode; share the scanner by reference or behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use mongo_scanner::driver::MemoryDriver;
//! use mongo_scanner::{ScanOptions, Scanner};
//!
//! # tokio_test_block(async {
//! let driver = MemoryDriver::new()
//!     .with_database("animals", ["cats", "dogs", "system.views"])
//!     .with_database("admin", ["system.version"]);
//!
//! let scanner = Scanner::builder(driver)
//!     .default_options(ScanOptions::new().exclude_system(true))
//!     .build();
//!
//! let schema = scanner
//!     .get_schema(ScanOptions::new().exclude_empty_databases(true))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(schema.len(), 1);
//! assert_eq!(schema["animals"], vec!["cats", "dogs"]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod coordinator;

pub use coordinator::MAX_CONCURRENT_LISTINGS;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::cache::SchemaCache;
use crate::connection::{ConnectionManager, ConnectionParams, SlotStatus};
use crate::driver::{ConnectionOptions, DatabaseDriver, DEFAULT_URI};
use crate::error::ScanResult;
use crate::options::ScanOptions;

/// Databases mapped to their collections.
pub type DatabaseSchema = BTreeMap<String, Vec<String>>;

/// Discovers databases and collections through a [`DatabaseDriver`].
pub struct Scanner<D: DatabaseDriver> {
    driver: Arc<D>,
    connection: ConnectionManager<D>,
    cache: SchemaCache,
    defaults: ScanOptions,
}

impl<D: DatabaseDriver> Scanner<D> {
    /// Create a scanner for the default URI with default options.
    ///
    /// No connection is opened here.
    pub fn new(driver: D) -> Self {
        Self::builder(driver).build()
    }

    pub fn builder(driver: D) -> ScannerBuilder<D> {
        ScannerBuilder {
            driver,
            uri: None,
            connection_options: ConnectionOptions::default(),
            defaults: ScanOptions::default(),
        }
    }

    /// The driver this scanner uses.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn uri(&self) -> String {
        self.connection.params().uri
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        self.connection.params().options
    }

    /// The options every call falls back to.
    pub fn default_options(&self) -> &ScanOptions {
        &self.defaults
    }

    /// Whether a persistent connection is active.
    pub fn is_connected(&self) -> bool {
        self.connection.status().persistent
    }

    /// State of the connection slot.
    pub fn connection_status(&self) -> SlotStatus {
        self.connection.status()
    }

    /// List database names.
    pub async fn list_databases(&self, options: impl Into<Option<ScanOptions>>) -> ScanResult<Vec<String>> {
        let options = self.resolve(options.into());
        self.scan_databases(&options, None).await
    }

    /// List the collection names of `database`.
    pub async fn list_collections(
        &self,
        database: &str,
        options: impl Into<Option<ScanOptions>>,
    ) -> ScanResult<Vec<String>> {
        let options = self.resolve(options.into());
        self.scan_collections(database, &options, None).await
    }

    /// List every database with its collections, over a single connection.
    pub async fn get_schema(&self, options: impl Into<Option<ScanOptions>>) -> ScanResult<DatabaseSchema> {
        let options = self.resolve(options.into());
        self.scan_schema(&options).await
    }

    /// Keep one connection open for all calls until [`end_connection`].
    ///
    /// [`end_connection`]: Scanner::end_connection
    pub async fn start_connection(&self) -> ScanResult<()> {
        self.connection.start_persistent().await
    }

    /// Close the persistent connection once no call is using it.
    pub async fn end_connection(&self) -> ScanResult<()> {
        self.connection.end_persistent().await
    }

    /// Change the URI and driver options.
    ///
    /// `None` restores the default. An active persistent connection is closed
    /// and reopened with the new parameters.
    pub async fn set_connection(
        &self,
        uri: Option<&str>,
        options: Option<ConnectionOptions>,
    ) -> ScanResult<()> {
        let params = ConnectionParams::new(uri.unwrap_or(DEFAULT_URI), options.unwrap_or_default());
        info!(uri = %params.uri, "changing connection");
        self.connection.reconfigure(params).await
    }

    /// Forget every cached listing.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn resolve(&self, options: Option<ScanOptions>) -> crate::options::ResolvedOptions {
        match options {
            Some(options) => options.merged_over(&self.defaults).resolve(),
            None => self.defaults.resolve(),
        }
    }
}

/// Builder for [`Scanner`].
pub struct ScannerBuilder<D: DatabaseDriver> {
    driver: D,
    uri: Option<String>,
    connection_options: ConnectionOptions,
    defaults: ScanOptions,
}

impl<D: DatabaseDriver> ScannerBuilder<D> {
    /// Connection URI. Defaults to `mongodb://localhost:27017`.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Options used for every key a call leaves unset.
    pub fn default_options(mut self, options: ScanOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn build(self) -> Scanner<D> {
        let driver = Arc::new(self.driver);
        let params = ConnectionParams::new(
            self.uri.unwrap_or_else(|| DEFAULT_URI.to_string()),
            self.connection_options,
        );

        Scanner {
            connection: ConnectionManager::new(Arc::clone(&driver), params),
            driver,
            cache: SchemaCache::new(),
            defaults: self.defaults,
        }
    }
}
