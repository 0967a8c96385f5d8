//! Configuration errors.
//!
//! Schematic and layout errors live in [`crate::schematic::SchematicError`];
//! a config file whose layout defaults fail validation wraps one of those.

use std::path::PathBuf;

use thiserror::Error;

use crate::schematic::SchematicError;

/// Why a configuration file could not be turned into a [`crate::config::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly named config file does not exist.
    #[error("no config file at {path}")]
    NotFound {
        /// Path given on the command line.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {path}")]
    Read {
        /// Config file path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unexpected fields.
    #[error("malformed config file {path}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A top-level setting has an unusable value.
    #[error("invalid setting: {0}")]
    Invalid(String),

    /// The layout defaults are out of range.
    #[error("invalid layout defaults")]
    Layout(#[source] SchematicError),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn not_found_names_the_path() {
        let msg = ConfigError::NotFound {
            path: PathBuf::from("/etc/layout/config.json"),
        }
        .to_string();
        assert!(msg.contains("/etc/layout/config.json"), "{msg}");
    }

    #[test]
    fn layout_error_keeps_its_cause() {
        let err = ConfigError::Layout(SchematicError::invalid_config("grid must be positive"));
        let cause = err.source().map(ToString::to_string).unwrap_or_default();
        assert!(cause.contains("grid must be positive"), "{cause}");
    }
}
