//! Driver-side error types.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by a [`DatabaseDriver`](super::DatabaseDriver).
///
/// These are the underlying causes carried by the scanner's own errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The server could not be reached.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The connection lacks the privileges for a command.
    #[error("not authorized to execute {command}: {message}")]
    Unauthorized {
        /// Command that was rejected.
        command: String,
        /// Message from the server.
        message: String,
    },

    /// The handle was used or closed after it had already been closed.
    #[error("connection handle {0} is closed")]
    HandleClosed(String),

    /// The URI could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidUri(String),

    /// Any other driver failure.
    #[error("{0}")]
    Other(String),

    /// Error from the MongoDB driver.
    #[cfg(feature = "mongodb")]
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl DriverError {
    /// Create an authorization error.
    pub fn unauthorized(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a permission failure.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized { .. } => true,
            #[cfg(feature = "mongodb")]
            Self::Mongo(err) => matches!(
                err.kind.as_ref(),
                mongodb::error::ErrorKind::Command(command) if command.code == 13
            ),
            _ => false,
        }
    }
}
