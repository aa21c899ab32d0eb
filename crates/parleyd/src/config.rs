//! Server configuration.
//!
//! Settings come from an optional TOML file; a missing file means defaults.
//! The bind address can then be overridden (`PARLEY_BIND`, `--bind`).
//!
//! ```toml
//! bind = "0.0.0.0:12345"
//! outbox_capacity = 256
//! max_line_length = 8192
//! write_timeout_secs = 10
//! ```

use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::session::{
    SessionSettings, DEFAULT_MAX_LINE_LENGTH, DEFAULT_OUTBOX_CAPACITY, DEFAULT_WRITE_TIMEOUT,
};

/// Default listening address (all interfaces, port 12345).
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12345";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

/// Environment variable overriding the bind address.
pub const BIND_ENV: &str = "PARLEY_BIND";

// -----------------------------------------------------------------------------
// ServerConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub outbox_capacity: usize,
    pub max_line_length: usize,
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads the config file at `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` if the file exists but cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    /// - `ConfigError::Invalid` if a value is out of range
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location: `<config_dir>/parley/parleyd.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parley").join("parleyd.toml"))
    }

    /// Replaces the bind address with `value` if one is given.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidBind` if `value` is not a socket address
    pub fn override_bind(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(value) = value {
            self.bind = value.parse().map_err(|e| ConfigError::InvalidBind {
                value: value.to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("outbox_capacity must be at least 1"));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid("max_line_length must be at least 1"));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid("write_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Per-session tunables derived from this config.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            outbox_capacity: self.outbox_capacity,
            max_line_length: self.max_line_length,
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 12345))
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid bind address '{value}': {source}")]
    InvalidBind {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}
