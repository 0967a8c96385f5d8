//! The on-disk configuration shape.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::schematic::LayoutConfig;

/// Everything the server reads from its config file. Every section is
/// optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Editor hint, ignored.
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Free-form note, ignored.
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Roots that schematic paths must resolve under. An empty list falls
    /// back to the working directory.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,

    /// Layout defaults. Per-call tool arguments take precedence.
    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks values that deserialisation alone cannot.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Layout`] when the layout defaults would be rejected by
    /// the planner, [`ConfigError::Invalid`] when an allowed path is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_paths.iter().any(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid(
                "allowed_paths entries must not be empty".to_string(),
            ));
        }
        self.layout.validate().map_err(ConfigError::Layout)?;
        Ok(())
    }
}

/// How schematic files are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Keep a timestamped `.bak` copy of a file before replacing it.
    #[serde(default = "backup_by_default")]
    pub backup_on_write: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            backup_on_write: backup_by_default(),
        }
    }
}

const fn backup_by_default() -> bool {
    true
}

/// Log verbosity written in the config file, lowercase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Used when no `-v`/`-q` flag is given.
    #[serde(default)]
    pub level: LogLevel,
}
