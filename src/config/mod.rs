//! Config file discovery and loading.
//!
//! A path passed on the command line must exist. Otherwise
//! `~/.schematic-layout-mcp/config.json` (`%USERPROFILE%` on Windows) is used
//! when present, and built-in defaults when it is not.

mod settings;

pub use settings::{Config, FilesConfig, LogLevel, LoggingConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// `~/.schematic-layout-mcp/config.json`, if a home directory is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".schematic-layout-mcp").join("config.json"))
}

/// Loads, parses and validates the config.
///
/// # Errors
///
/// [`ConfigError::NotFound`] for a missing explicit path, otherwise whatever
/// reading, parsing or [`Config::validate`] reports.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => return Err(ConfigError::NotFound { path: p.to_path_buf() }),
        None => {
            let Some(p) = default_config_path().filter(|p| p.exists()) else {
                tracing::debug!("no config file, using built-in defaults");
                return Ok(Config::default());
            };
            p
        }
    };

    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: Config =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;
    Ok(config)
}
