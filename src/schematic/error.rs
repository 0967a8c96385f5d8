//! Error types for schematic operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for schematic operations.
pub type SchematicResult<T> = Result<T, SchematicError>;

/// Errors that can occur while reading, mutating or laying out a schematic.
#[derive(Debug, Error)]
pub enum SchematicError {
    /// Layout or grid configuration is unusable.
    #[error("Invalid layout configuration: {message}")]
    InvalidConfig {
        /// Description of what's wrong.
        message: String,
    },

    /// A coordinate could not be represented on the internal grid.
    #[error("Invalid coordinate for {field}: {value}")]
    InvalidCoordinate {
        /// Which value was rejected.
        field: String,
        /// The rejected value.
        value: f64,
    },

    /// A rotation is not one of the axis-aligned angles.
    #[error("Invalid rotation {degrees}: must be 0, 90, 180 or 270 degrees")]
    InvalidRotation {
        /// The rejected angle in degrees.
        degrees: f64,
    },

    /// A component reference is not present in the document.
    #[error("Component not found: {reference}")]
    UnknownReference {
        /// The missing reference.
        reference: String,
    },

    /// A pin identifier is not present on the component.
    #[error("Pin '{pin}' not found on component {reference}")]
    UnknownPin {
        /// Component reference.
        reference: String,
        /// The missing pin identifier.
        pin: String,
    },

    /// No pins were supplied and the symbol is not defined in the document.
    #[error("Symbol not defined: {lib_id}")]
    UnknownSymbol {
        /// `library:symbol` identifier.
        lib_id: String,
    },

    /// Two pins of one symbol share an identifier.
    #[error("Duplicate pin '{pin}' in symbol {lib_id}")]
    DuplicatePin {
        /// `library:symbol` identifier.
        lib_id: String,
        /// The repeated pin identifier.
        pin: String,
    },

    /// Template expansion was requested from an ordinary component.
    #[error("Component {reference} is not a template")]
    NotATemplate {
        /// The component reference.
        reference: String,
    },

    /// The same reference appears twice in a document.
    #[error("Duplicate component reference: {reference}")]
    DuplicateReference {
        /// The repeated reference.
        reference: String,
    },

    /// The net graph changed across a layout that had to preserve it.
    #[error("Connectivity changed on nets: {}", nets.join(", "))]
    ConnectivityViolation {
        /// Names of the nets whose membership differs.
        nets: Vec<String>,
    },

    /// Failed to open or read the file.
    #[error("Failed to read file: {path}")]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to write the file.
    #[error("Failed to write file: {path}")]
    FileWrite {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The document is not valid JSON or does not match the format.
    #[error("Failed to parse schematic {path}")]
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Unsupported document version.
    #[error("Unsupported schematic version: {version}")]
    UnsupportedVersion {
        /// Version number from the file.
        version: u32,
    },
}

impl SchematicError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid coordinate error.
    pub fn invalid_coordinate(field: impl Into<String>, value: f64) -> Self {
        Self::InvalidCoordinate {
            field: field.into(),
            value,
        }
    }

    /// Creates an unknown reference error.
    pub fn unknown_reference(reference: impl Into<String>) -> Self {
        Self::UnknownReference {
            reference: reference.into(),
        }
    }

    /// Creates an unknown pin error.
    pub fn unknown_pin(reference: impl Into<String>, pin: impl Into<String>) -> Self {
        Self::UnknownPin {
            reference: reference.into(),
            pin: pin.into(),
        }
    }

    /// Creates a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a file write error.
    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }
}
