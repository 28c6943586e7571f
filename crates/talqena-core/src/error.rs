//! Error types for library operations.

use talqena_db::StoreError;
use talqena_rewrite::RewriteError;
use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Errors surfaced by [`crate::Library`].
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The metadata write failed on a full medium. The in-memory
    /// collection may now be ahead of what is stored.
    #[error("Storage quota exceeded: {0}")]
    StorageQuotaExceeded(String),

    /// The image store cannot be opened.
    #[error("Image store unavailable: {0}")]
    BlobStoreUnavailable(String),

    /// Bulk import found no usable lines.
    #[error("No prompts found in import")]
    ImportEmpty,

    /// The rewrite assistant failed; the original text is unchanged.
    #[error("Rewrite service error: {0}")]
    ExternalService(#[from] RewriteError),

    #[error("Image too large: {size} bytes (limit {limit} bytes)")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("Prompt not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded(msg) => LibraryError::StorageQuotaExceeded(msg),
            StoreError::BlobStoreUnavailable(msg) => LibraryError::BlobStoreUnavailable(msg),
            other => LibraryError::Store(other),
        }
    }
}

impl LibraryError {
    /// Get user-friendly error message for display
    pub fn user_message(&self) -> String {
        match self {
            LibraryError::StorageQuotaExceeded(_) => {
                "Failed to save! Storage might be full, especially if using many images. \
                 Recent changes are only kept until the library is closed."
                    .to_string()
            }
            LibraryError::BlobStoreUnavailable(_) => {
                "Images are unavailable right now. Prompts are still saved without them."
                    .to_string()
            }
            LibraryError::ImportEmpty => "No prompts found in file.".to_string(),
            LibraryError::ExternalService(err) => {
                format!("Could not enhance the prompt ({}). Your text was left unchanged.", err)
            }
            LibraryError::ImageTooLarge { limit, .. } => format!(
                "Image too large. Please choose an image under {}KB.",
                limit / 1024
            ),
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            LibraryError::StorageQuotaExceeded(_) => "quota",
            LibraryError::BlobStoreUnavailable(_) => "blob_store",
            LibraryError::ImportEmpty => "import",
            LibraryError::ExternalService(_) => "external_service",
            LibraryError::ImageTooLarge { .. } => "image_intake",
            LibraryError::NotFound(_) => "not_found",
            LibraryError::Store(_) => "storage",
        }
    }
}
