use thiserror::Error;

/// Errors produced by a key-value backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store cannot be used at all.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Writing `key` would push the store past its byte quota.
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes needed, limit {limit})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding error while preparing a value for the store.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Convenience alias used by the store layer.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
