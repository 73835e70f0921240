//! Configuration loading.
//!
//! ```text
//! config.toml
//!     → load_config (read & deserialize)
//!     → AppConfig (immutable for the process lifetime)
//! ```
//!
//! A missing file is not an error: the service starts with defaults and no
//! plugins. A file that exists but cannot be read or parsed is fatal.

mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use thiserror::Error;

pub use schema::{AppConfig, AppErrorMail, MailerConfig};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from a TOML file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!(target: "hookr::service", "Config file {} not found, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
