//! Configuration file handling for drift.
//!
//! Looks for `.config/drift.toml` in the current directory or any parent
//! directory. Every field is optional; command-line flags and environment
//! variables take precedence over the file.
//!
//! ```toml
//! schemas = ["public"]
//!
//! [left]
//! url = "postgres://app@prod-db/shop"
//! label = "prod"
//!
//! [right]
//! url = "postgres://app@staging-db/shop"
//! label = "staging"
//!
//! [output]
//! dir = "reports"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".config/drift.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// First database; its definitions win on mismatch
    pub left: DatabaseConfig,
    /// Second database
    pub right: DatabaseConfig,
    pub output: OutputConfig,
    /// Schemas to read (empty means every user schema)
    pub schemas: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory for the three report files
    pub dir: Option<String>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Load configuration.
///
/// An explicit path must exist. Otherwise `.config/drift.toml` is searched for
/// from the current directory upward, and the defaults apply when none is found.
pub fn load(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: PathBuf::from("."),
                source,
            })?;
            find_config_file(&cwd)
        }
    };

    match path {
        Some(path) => Ok((load_file(&path)?, Some(path))),
        None => Ok((Config::default(), None)),
    }
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Config::from_toml(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Find `.config/drift.toml` by searching up the directory tree.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
