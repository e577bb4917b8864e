//! Error types for keyscope operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout keyscope-core
pub type Result<T> = std::result::Result<T, KeyscopeError>;

/// Errors raised by discovery, extraction, comparison and export
#[derive(Debug, Error)]
pub enum KeyscopeError {
    /// One or more requested key columns are absent from the source
    #[error("column(s) not found: {}. Available columns: {}", missing.join(", "), available.join(", "))]
    ColumnNotFound {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file could not be decoded with any supported encoding
    #[error("encoding error in '{}': {message}", path.display())]
    Encoding { path: PathBuf, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid combination: {0}")]
    InvalidCombination(String),

    #[error("data processing error: {0}")]
    DataProcessing(String),

    /// A generation step exceeded its wall-clock budget
    #[error("step '{step}' timed out after {elapsed:?}")]
    Timeout { step: String, elapsed: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeyscopeError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn data_processing<S: Into<String>>(message: S) -> Self {
        Self::DataProcessing(message.into())
    }

    pub fn invalid_combination<S: Into<String>>(message: S) -> Self {
        Self::InvalidCombination(message.into())
    }

    /// Errors after which no further reads of the same file can succeed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::Encoding { .. } | Self::Io(_)
        )
    }
}

impl From<tempfile::PersistError> for KeyscopeError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
