use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("malformed record {partition}/{sort}: {reason}")]
    Malformed {
        partition: String,
        sort: String,
        reason: String,
    },

    /// Items were still unprocessed after the retry ceiling. Cursor state may
    /// have diverged from storage, so callers treat this as fatal.
    #[error("{unprocessed} item(s) still unprocessed after {retries} retries")]
    RetriesExhausted { retries: usize, unprocessed: usize },
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::RetriesExhausted { .. })
    }
}
