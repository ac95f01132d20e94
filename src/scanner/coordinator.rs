//! Execution of a single logical scan.
//!
//! Each scan checks the cache, borrows a connection, calls the driver, stores
//! the raw listing, releases the connection and finally filters. The release
//! runs on every path out of a borrowed section, and a failed release takes
//! precedence over the scan's own outcome.

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::{DatabaseSchema, Scanner};
use crate::connection::Lease;
use crate::driver::DatabaseDriver;
use crate::error::{ScanResult, ScannerError};
use crate::filter::{filter_collections, filter_databases};
use crate::options::ResolvedOptions;

/// Upper bound on collection listings in flight during one schema scan.
pub const MAX_CONCURRENT_LISTINGS: usize = 8;

impl<D: DatabaseDriver> Scanner<D> {
    pub(super) async fn scan_databases(
        &self,
        options: &ResolvedOptions,
        inherited: Option<&Lease<D::Handle>>,
    ) -> ScanResult<Vec<String>> {
        let cached = if options.use_cache {
            self.cache.databases()
        } else {
            None
        };

        let databases = match cached {
            Some(databases) => {
                debug!(count = databases.len(), "databases served from cache");
                databases
            }
            None => {
                let lease = self.connection.borrow(inherited).await?;
                let listed = self.driver.list_database_names(lease.handle()).await;
                if let Ok(databases) = &listed {
                    self.cache.set_databases(databases.clone());
                }
                let released = self.connection.release(lease).await;

                match listed {
                    Ok(databases) => {
                        released?;
                        databases
                    }
                    Err(source) => {
                        let error = ScannerError::ListDatabases { source };
                        warn!(%error, "listing databases failed");
                        options.report_lack_of_permissions(None, &error);
                        released?;
                        if options.ignore_lack_of_permissions {
                            return Ok(Vec::new());
                        }
                        return Err(error);
                    }
                }
            }
        };

        Ok(filter_databases(databases, options.exclude_databases.as_ref()))
    }

    pub(super) async fn scan_collections(
        &self,
        database: &str,
        options: &ResolvedOptions,
        inherited: Option<&Lease<D::Handle>>,
    ) -> ScanResult<Vec<String>> {
        let cached = if options.use_cache {
            self.cache.collections(database)
        } else {
            None
        };

        let collections = match cached {
            Some(collections) => {
                debug!(database, count = collections.len(), "collections served from cache");
                collections
            }
            None => {
                let lease = self.connection.borrow(inherited).await?;
                let listed = self
                    .driver
                    .list_collection_names(lease.handle(), database)
                    .await;
                if let Ok(collections) = &listed {
                    self.cache.set_collections(database, collections.clone());
                }
                let released = self.connection.release(lease).await;

                match listed {
                    Ok(collections) => {
                        released?;
                        collections
                    }
                    Err(source) => {
                        let error = ScannerError::ListCollections {
                            database: database.to_string(),
                            source,
                        };
                        warn!(%error, "listing collections failed");
                        options.report_lack_of_permissions(Some(database), &error);
                        released?;
                        if options.ignore_lack_of_permissions {
                            return Ok(Vec::new());
                        }
                        return Err(error);
                    }
                }
            }
        };

        Ok(filter_collections(
            collections,
            options.exclude_system,
            options.exclude_collections.as_ref(),
        ))
    }

    /// Scan databases and their collections over one borrowed handle.
    pub(super) async fn scan_schema(&self, options: &ResolvedOptions) -> ScanResult<DatabaseSchema> {
        let lease = self.connection.borrow(None).await?;
        let scanned = self.scan_schema_with(options, &lease).await;
        let released = self.connection.release(lease).await;

        released?;
        scanned
    }

    async fn scan_schema_with(
        &self,
        options: &ResolvedOptions,
        lease: &Lease<D::Handle>,
    ) -> ScanResult<DatabaseSchema> {
        let databases = self.scan_databases(options, Some(lease)).await?;

        // Listings come back in database order.
        let pending: Vec<_> = databases
            .iter()
            .map(|database| self.scan_collections(database, options, Some(lease)))
            .collect();
        let listings: Vec<_> = stream::iter(pending)
            .buffered(MAX_CONCURRENT_LISTINGS)
            .collect()
            .await;

        let mut schema = DatabaseSchema::new();
        for (database, collections) in databases.into_iter().zip(listings) {
            let collections = collections?;
            if options.exclude_empty_databases && collections.is_empty() {
                debug!(database, "dropping empty database from schema");
                continue;
            }
            schema.insert(database, collections);
        }

        Ok(schema)
    }
}
