//! Storage error types.
//!
//! Defines errors that can occur during storage operations:
//! - `Duplicate`: A record with the same identity already exists
//! - `Serialization`: Failed to encode/decode data
//! - `Io`: Underlying storage system errors
//!
//! Absence is not an error at this layer. Lookups return `Option` and
//! mutations of a possibly-missing record return `bool`, so the vault decides
//! which absences are domain errors.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A record with this identity is already stored
    #[error("duplicate {kind}: {id}")]
    Duplicate {
        /// Record kind ("response", "project key", ...)
        kind: &'static str,
        /// Identity that collided
        id: String,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, poisoned lock, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
