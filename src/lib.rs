//! # mongo-scanner
//!
//! Discovers the databases and collections of a MongoDB cluster.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Scanner (façade)                      │
//! │  list_databases · list_collections · get_schema          │
//! │  start_connection · end_connection · set_connection      │
//! └─────────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼                              ▼
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │   Scan coordinator       │  │      SchemaCache         │
//! │  cache → borrow → list   │──▶  raw listings, filtered  │
//! │  → store → release       │  │  on every read           │
//! │  → filter                │  └──────────────────────────┘
//! └──────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │               ConnectionManager (slot)                   │
//! │  one shared handle · persistent flag · borrower count    │
//! └─────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │     DatabaseDriver (MongoDriver / MemoryDriver)          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod filter;
pub mod logging;
pub mod options;
pub mod scanner;

pub use connection::{ConnectionState, SlotStatus};
pub use driver::{ConnectionOptions, DatabaseDriver, DriverError};
pub use error::{ScanResult, ScannerError};
pub use filter::{Exclusion, Exclusions};
pub use options::{LackOfPermissionsHandler, ScanOptions};
pub use scanner::{DatabaseSchema, Scanner, ScannerBuilder};

#[cfg(feature = "mongodb")]
pub use driver::MongoDriver;
