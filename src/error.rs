use thiserror::Error;

pub type Result<T> = std::result::Result<T, CommissionError>;

#[derive(Error, Debug)]
pub enum CommissionError {
    /// Malformed band, incomplete rule, inverted window or duplicate key.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A record value breaks an invariant (negative commission, zero payment).
    #[error("Validation error: {0}")]
    Validation(String),
    /// Illegal state transition.
    #[error("Guard violation: {0}")]
    Guard(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Uniqueness constraint rejected a write.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Currency service error: {0}")]
    Currency(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl CommissionError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn guard(msg: impl Into<String>) -> Self {
        Self::Guard(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
