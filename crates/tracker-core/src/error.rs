//! Error types for experiment and checkpoint tracking

use thiserror::Error;

/// Result type alias using the tracker Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by storage backends, the project engine and the CLI
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage backend not available: {backend}")]
    StorageUnavailable { backend: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("ID {id} is used by more than one experiment or checkpoint")]
    DuplicateId { id: String },

    // Resolution errors
    #[error("Invalid ID prefix: {prefix:?}")]
    InvalidPrefix { prefix: String },

    #[error("Could not find experiment or checkpoint matching ID or prefix: {prefix}")]
    PrefixNotFound { prefix: String },

    #[error("Prefix is ambiguous: {prefix} (matches {})", candidates.join(", "))]
    AmbiguousPrefix {
        prefix: String,
        candidates: Vec<String>,
    },

    // Deletion errors
    #[error(
        "Partially removed experiment {experiment_id}: failed to remove checkpoint {failed_checkpoint_id} \
         after removing {} checkpoint(s)",
        succeeded.len()
    )]
    PartialDeletion {
        experiment_id: String,
        failed_checkpoint_id: String,
        succeeded: Vec<String>,
        source: Box<Error>,
    },

    // Configuration errors
    #[error("keepsake.yaml not found in {dir} or any parent directory")]
    ConfigNotFound { dir: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid storage URL {url:?}: {reason}")]
    InvalidStorageUrl { url: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is retryable by a storage backend
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. } | Error::StorageUnavailable { .. }
        )
    }

    /// Returns true if this error means the requested key or record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::StoragePathNotFound { .. } | Error::PrefixNotFound { .. }
        )
    }

    /// Returns true if user input did not map to exactly one record
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPrefix { .. }
                | Error::PrefixNotFound { .. }
                | Error::AmbiguousPrefix { .. }
        )
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CorruptRecord { .. }
                | Error::DuplicateId { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml_ng::Error> for Error {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Error::InvalidConfig {
            message: e.to_string(),
        }
    }
}
