//! Configuration management for snapdiff and snapdiff-up.
//!
//! Everything has a default, so running without a configuration file is
//! the normal case. A TOML file may override any subset; command line
//! flags override the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entry::line::Delimiter;
use crate::fs::walker::{WalkOptions, DEFAULT_MARKER};
use crate::sync::copy::DEFAULT_BUFFER_SIZE;
use crate::utils::errors::{Result, SnapError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dump: DumpConfig,
    pub restore: RestoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Terminate snapshot and list records with NUL instead of newline
    #[serde(default)]
    pub null_delimited: bool,

    /// Do not cross filesystem boundaries while crawling
    #[serde(default)]
    pub one_file_system: bool,

    /// Skip the contents of directories holding the marker file
    #[serde(default = "default_honor_marker")]
    pub honor_marker: bool,

    /// Name of the exclusion marker file
    #[serde(default = "default_marker")]
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Chunk size in bytes used when copying file contents
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Create the target directory when it does not exist
    #[serde(default)]
    pub create_root: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_honor_marker() -> bool {
    true
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            null_delimited: false,
            one_file_system: false,
            honor_marker: default_honor_marker(),
            marker: default_marker(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            create_root: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DumpConfig {
    pub fn delimiter(&self) -> Delimiter {
        Delimiter::from_null_flag(self.null_delimited)
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            one_file_system: self.one_file_system,
            honor_marker: self.honor_marker,
            marker: self.marker.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SnapError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| SnapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// File when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.restore.buffer_size == 0 {
            return Err(SnapError::Config("restore.buffer_size must be positive".into()));
        }
        if self.dump.marker.is_empty() || self.dump.marker.contains('/') {
            return Err(SnapError::Config(format!(
                "dump.marker must be a plain file name, got `{}`",
                self.dump.marker
            )));
        }
        Ok(())
    }
}
