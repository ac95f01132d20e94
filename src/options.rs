//! Scan options and the lack-of-permissions handler.
//!
//! Options are layered: per-call options over the scanner's defaults over the
//! global defaults. Every field is optional so an unset key falls through to
//! the next layer.

use std::fmt;
use std::sync::Arc;

use crate::error::ScannerError;
use crate::filter::Exclusions;

/// Observer invoked whenever a listing call fails.
///
/// `database` is the database whose collections were requested, or `None`
/// when listing databases failed. The handler runs before the scanner decides
/// whether to swallow or propagate the error, and it runs in both cases.
pub trait LackOfPermissionsHandler: Send + Sync {
    fn on_lack_of_permissions(&self, database: Option<&str>, error: &ScannerError);
}

impl<F> LackOfPermissionsHandler for F
where
    F: Fn(Option<&str>, &ScannerError) + Send + Sync,
{
    fn on_lack_of_permissions(&self, database: Option<&str>, error: &ScannerError) {
        self(database, error)
    }
}

/// Options of a single scan.
///
/// # Example
///
/// ```
/// use mongo_scanner::ScanOptions;
///
/// let options = ScanOptions::new()
///     .exclude_system(true)
///     .exclude_databases(["admin", "local"])
///     .ignore_lack_of_permissions(true);
/// ```
#[derive(Clone, Default)]
pub struct ScanOptions {
    pub(crate) use_cache: Option<bool>,
    pub(crate) exclude_databases: Option<Exclusions>,
    pub(crate) exclude_collections: Option<Exclusions>,
    pub(crate) exclude_system: Option<bool>,
    pub(crate) exclude_empty_databases: Option<bool>,
    pub(crate) ignore_lack_of_permissions: Option<bool>,
    pub(crate) on_lack_of_permissions: Option<Arc<dyn LackOfPermissionsHandler>>,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve listings from the cache when it holds them.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    /// Databases to remove from results.
    pub fn exclude_databases(mut self, exclude: impl Into<Exclusions>) -> Self {
        self.exclude_databases = Some(exclude.into());
        self
    }

    /// Collections to remove from results.
    pub fn exclude_collections(mut self, exclude: impl Into<Exclusions>) -> Self {
        self.exclude_collections = Some(exclude.into());
        self
    }

    /// Remove collections with the `system.` prefix.
    pub fn exclude_system(mut self, exclude: bool) -> Self {
        self.exclude_system = Some(exclude);
        self
    }

    /// Drop databases with no collections left after filtering (schema only).
    pub fn exclude_empty_databases(mut self, exclude: bool) -> Self {
        self.exclude_empty_databases = Some(exclude);
        self
    }

    /// Return an empty listing instead of failing when a listing call fails.
    pub fn ignore_lack_of_permissions(mut self, ignore: bool) -> Self {
        self.ignore_lack_of_permissions = Some(ignore);
        self
    }

    /// Observe listing failures with a closure.
    pub fn on_lack_of_permissions<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&str>, &ScannerError) + Send + Sync + 'static,
    {
        self.on_lack_of_permissions = Some(Arc::new(handler));
        self
    }

    /// Observe listing failures with a shared handler.
    pub fn lack_of_permissions_handler(mut self, handler: Arc<dyn LackOfPermissionsHandler>) -> Self {
        self.on_lack_of_permissions = Some(handler);
        self
    }

    /// Fill every unset key of `self` from `base`.
    pub fn merged_over(&self, base: &ScanOptions) -> ScanOptions {
        ScanOptions {
            use_cache: self.use_cache.or(base.use_cache),
            exclude_databases: self
                .exclude_databases
                .clone()
                .or_else(|| base.exclude_databases.clone()),
            exclude_collections: self
                .exclude_collections
                .clone()
                .or_else(|| base.exclude_collections.clone()),
            exclude_system: self.exclude_system.or(base.exclude_system),
            exclude_empty_databases: self.exclude_empty_databases.or(base.exclude_empty_databases),
            ignore_lack_of_permissions: self
                .ignore_lack_of_permissions
                .or(base.ignore_lack_of_permissions),
            on_lack_of_permissions: self
                .on_lack_of_permissions
                .clone()
                .or_else(|| base.on_lack_of_permissions.clone()),
        }
    }

    /// Fill the remaining unset keys with the global defaults.
    pub(crate) fn resolve(&self) -> ResolvedOptions {
        ResolvedOptions {
            use_cache: self.use_cache.unwrap_or(false),
            exclude_databases: self.exclude_databases.clone().filter(|e| !e.is_empty()),
            exclude_collections: self.exclude_collections.clone().filter(|e| !e.is_empty()),
            exclude_system: self.exclude_system.unwrap_or(false),
            exclude_empty_databases: self.exclude_empty_databases.unwrap_or(false),
            ignore_lack_of_permissions: self.ignore_lack_of_permissions.unwrap_or(false),
            on_lack_of_permissions: self.on_lack_of_permissions.clone(),
        }
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("use_cache", &self.use_cache)
            .field("exclude_databases", &self.exclude_databases)
            .field("exclude_collections", &self.exclude_collections)
            .field("exclude_system", &self.exclude_system)
            .field("exclude_empty_databases", &self.exclude_empty_databases)
            .field("ignore_lack_of_permissions", &self.ignore_lack_of_permissions)
            .field(
                "on_lack_of_permissions",
                &self.on_lack_of_permissions.as_ref().map(|_| "<handler>"),
            )
            .finish()
    }
}

/// Fully merged options, as seen by a running scan.
#[derive(Clone)]
pub(crate) struct ResolvedOptions {
    pub use_cache: bool,
    pub exclude_databases: Option<Exclusions>,
    pub exclude_collections: Option<Exclusions>,
    pub exclude_system: bool,
    pub exclude_empty_databases: bool,
    pub ignore_lack_of_permissions: bool,
    pub on_lack_of_permissions: Option<Arc<dyn LackOfPermissionsHandler>>,
}

impl ResolvedOptions {
    pub fn report_lack_of_permissions(&self, database: Option<&str>, error: &ScannerError) {
        if let Some(handler) = &self.on_lack_of_permissions {
            handler.on_lack_of_permissions(database, error);
        }
    }
}
