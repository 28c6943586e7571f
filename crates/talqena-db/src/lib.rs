//! Storage layer for talqena.
//!
//! Two independent stores back a prompt library:
//!
//! - [`MetadataStore`] - synchronous whole-collection read/write of
//!   [`PromptRecord`]s under one fixed key in a SQLite key-value table.
//! - [`BlobStore`] - asynchronous per-id CRUD over image payloads, lazily
//!   opened on first use and sharing one connection across calls.
//!
//! Neither store knows about the other. Keeping them consistent is the job
//! of the coordinator in `talqena-core`.

mod blobs;
mod error;
mod metadata;
mod record;

pub use blobs::{
    is_staging_id, new_staging_id, BlobEntry, BlobLocation, BlobStore, IMAGE_DB_NAME,
    STAGING_PREFIX,
};
pub use error::StoreError;
pub use metadata::{MetadataStore, METADATA_DB_NAME, STORAGE_KEY};
pub use record::{AiModel, BadgeColor, Category, CategoryStyle, PromptRecord};

use std::path::PathBuf;

/// Get the default data directory.
///
/// The default location is `~/.local/share/talqena`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("talqena")
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
