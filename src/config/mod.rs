//! Configuration module for the scanner.
//!
//! Handles the TOML config file, environment variable expansion and the
//! conversion of configured values into connection parameters and scan
//! options.

mod settings;

pub use settings::{
    expand_env_vars, parse_exclusions, ConnectionSettings, ScanSettings, Settings, SettingsError,
};
