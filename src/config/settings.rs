//! TOML-based configuration for the scanner.
//!
//! Supports a config file (mongo-scanner.toml) with environment variable
//! expansion in connection URIs.
//!
//! Example configuration:
//! ```toml
//! [connections.production]
//! uri = "${PROD_MONGO_URI}"
//! app_name = "schema-audit"
//! server_selection_timeout_secs = 10
//!
//! [connections.local]
//! uri = "mongodb://localhost:27017"
//! direct_connection = true
//!
//! [scan]
//! exclude_system = true
//! exclude_databases = ["admin", "local", "/^test/"]
//! ignore_lack_of_permissions = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::ConnectionParams;
use crate::driver::{ConnectionOptions, DEFAULT_URI};
use crate::filter::Exclusions;
use crate::options::ScanOptions;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named connections.
    pub connections: HashMap<String, ConnectionSettings>,

    /// Default scan options.
    pub scan: ScanSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Connection URI (supports ${ENV_VAR} expansion).
    pub uri: String,

    #[serde(default)]
    pub app_name: Option<String>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    #[serde(default)]
    pub server_selection_timeout_secs: Option<u64>,

    #[serde(default)]
    pub direct_connection: Option<bool>,
}

impl ConnectionSettings {
    /// Get the URI with environment variables expanded.
    pub fn resolved_uri(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.uri)
    }

    /// Driver options described by this connection.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            app_name: self.app_name.clone(),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            server_selection_timeout: self.server_selection_timeout_secs.map(Duration::from_secs),
            direct_connection: self.direct_connection,
        }
    }

    /// URI and options, ready for a scanner.
    pub fn connection_params(&self) -> Result<ConnectionParams, SettingsError> {
        Ok(ConnectionParams::new(
            self.resolved_uri()?,
            self.connection_options(),
        ))
    }
}

/// Default scan options.
///
/// Exclusion entries written as `/regex/` are patterns, anything else is an
/// exact name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    pub use_cache: Option<bool>,
    pub exclude_databases: Vec<String>,
    pub exclude_collections: Vec<String>,
    pub exclude_system: Option<bool>,
    pub exclude_empty_databases: Option<bool>,
    pub ignore_lack_of_permissions: Option<bool>,
}

impl ScanSettings {
    /// Convert to scan options, leaving unset keys unset.
    pub fn to_scan_options(&self) -> Result<ScanOptions, SettingsError> {
        let mut options = ScanOptions::new();

        if let Some(use_cache) = self.use_cache {
            options = options.use_cache(use_cache);
        }
        if !self.exclude_databases.is_empty() {
            options = options.exclude_databases(parse_exclusions(&self.exclude_databases)?);
        }
        if !self.exclude_collections.is_empty() {
            options = options.exclude_collections(parse_exclusions(&self.exclude_collections)?);
        }
        if let Some(exclude) = self.exclude_system {
            options = options.exclude_system(exclude);
        }
        if let Some(exclude) = self.exclude_empty_databases {
            options = options.exclude_empty_databases(exclude);
        }
        if let Some(ignore) = self.ignore_lack_of_permissions {
            options = options.ignore_lack_of_permissions(ignore);
        }

        Ok(options)
    }
}

/// Parse exclusion entries, reporting the first invalid pattern.
pub fn parse_exclusions(entries: &[String]) -> Result<Exclusions, SettingsError> {
    entries
        .iter()
        .map(|entry| {
            crate::filter::Exclusion::parse(entry).map_err(|source| SettingsError::InvalidPattern {
                pattern: entry.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Exclusions::from)
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `MONGO_SCANNER_CONFIG`
    /// 2. `./mongo-scanner.toml`
    /// 3. `<config dir>/mongo-scanner/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("MONGO_SCANNER_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("mongo-scanner.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mongo-scanner").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection ("default" if defined, else the first one).
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        self.connections.iter().next().map(|(k, v)| (k.as_str(), v))
    }

    /// Connection parameters for `name`, the default connection, or the
    /// built-in default URI when nothing is configured.
    pub fn connection_params(&self, name: Option<&str>) -> Result<ConnectionParams, SettingsError> {
        match name {
            Some(name) => self.get_connection(name)?.connection_params(),
            None => match self.default_connection() {
                Some((_, conn)) => conn.connection_params(),
                None => Ok(ConnectionParams::new(DEFAULT_URI, ConnectionOptions::default())),
            },
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                // Lone `$`, as in passwords.
                result.push('$');
                continue;
            }
            name
        };

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
