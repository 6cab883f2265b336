//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or a value has the wrong type.
    #[error("{} is not valid settings JSON: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
    /// Values parse but do not make sense together.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted settings key, e.g. `identity.baseUrl`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result alias for settings loading.
pub type Result<T> = std::result::Result<T, SettingsError>;
