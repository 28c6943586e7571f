use thiserror::Error;

/// Errors raised by the metadata and blob stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The metadata medium refused a write because it is full.
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The blob database could not be opened or its worker died.
    #[error("Image store unavailable: {0}")]
    BlobStoreUnavailable(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map a SQLite write failure, turning a full disk into a quota error.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => {
                StoreError::QuotaExceeded("the storage medium is full".to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_maps_to_quota() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        assert!(StoreError::from_write(err).is_quota_exceeded());
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from_write(err), StoreError::Sqlite(_)));
    }
}
