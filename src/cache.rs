//! Two-level snapshot of the last listings seen by a scanner.
//!
//! Entries hold the raw, unfiltered driver output. Exclusion filters are
//! applied on every read, so one cached listing serves any combination of
//! scan options. A fetch either replaces an entry whole or leaves it alone.

use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;

/// Cached database and collection names.
#[derive(Debug, Default)]
pub struct SchemaCache {
    /// `None` until a database listing succeeds.
    databases: RwLock<Option<Vec<String>>>,
    /// Collections per database; a missing key means unset.
    collections: DashMap<String, Vec<String>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached database names.
    pub fn databases(&self) -> Option<Vec<String>> {
        self.databases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the cached collection names of `database`.
    pub fn collections(&self, database: &str) -> Option<Vec<String>> {
        self.collections.get(database).map(|entry| entry.value().clone())
    }

    /// Replace the cached database names.
    pub fn set_databases(&self, databases: Vec<String>) {
        *self.databases.write().unwrap_or_else(PoisonError::into_inner) = Some(databases);
    }

    /// Replace the cached collection names of `database`.
    pub fn set_collections(&self, database: impl Into<String>, collections: Vec<String>) {
        self.collections.insert(database.into(), collections);
    }

    /// Reset every entry to unset.
    pub fn clear(&self) {
        *self.databases.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.collections.clear();
    }
}
