//! Scanner error types.

use thiserror::Error;

use crate::driver::{ConnectionOptions, DriverError};

/// Result type for scanner operations.
pub type ScanResult<T> = Result<T, ScannerError>;

/// Errors surfaced by a [`Scanner`](crate::Scanner).
///
/// Connection and disconnection failures always propagate. Listing failures
/// are first handed to the lack-of-permissions handler and then either
/// propagated or swallowed, depending on the scan options.
#[derive(Error, Debug)]
pub enum ScannerError {
    /// Opening a connection failed.
    #[error("error in connecting to {uri}: {source}")]
    Connection {
        /// URI of the failed connection.
        uri: String,
        /// Driver options of the failed connection.
        options: ConnectionOptions,
        /// What the driver reported.
        #[source]
        source: DriverError,
    },

    /// Closing a connection failed.
    #[error("error in disconnecting from {uri}: {source}")]
    Disconnection {
        /// URI of the connection that failed to close.
        uri: String,
        /// Driver options of the connection that failed to close.
        options: ConnectionOptions,
        /// What the driver reported.
        #[source]
        source: DriverError,
    },

    /// Listing databases failed.
    #[error("error in listing databases: {source}")]
    ListDatabases {
        #[source]
        source: DriverError,
    },

    /// Listing the collections of a database failed.
    #[error("error in listing collections of {database}: {source}")]
    ListCollections {
        /// Database whose collections were requested.
        database: String,
        #[source]
        source: DriverError,
    },
}

impl ScannerError {
    /// The database a listing error refers to, if any.
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::ListCollections { database, .. } => Some(database),
            _ => None,
        }
    }

    /// The URI of a connection or disconnection error.
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Connection { uri, .. } | Self::Disconnection { uri, .. } => Some(uri),
            _ => None,
        }
    }

    /// The underlying driver error.
    pub fn driver_error(&self) -> &DriverError {
        match self {
            Self::Connection { source, .. }
            | Self::Disconnection { source, .. }
            | Self::ListDatabases { source }
            | Self::ListCollections { source, .. } => source,
        }
    }

    /// Check if this error came from a listing call.
    pub fn is_listing(&self) -> bool {
        matches!(self, Self::ListDatabases { .. } | Self::ListCollections { .. })
    }

    /// Check if this error came from opening or closing a connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Disconnection { .. })
    }

    /// Check if the driver reported a permission failure.
    pub fn is_lack_of_permissions(&self) -> bool {
        self.driver_error().is_unauthorized()
    }
}
