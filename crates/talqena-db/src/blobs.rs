//! Asynchronous image store.
//!
//! One SQLite table keyed by string id. The connection is opened lazily on
//! the first call and shared by every call after that; concurrent first
//! calls wait on the same open. Each operation runs on the blocking pool and
//! is a single statement, so it is atomic on its own. Liveness is never
//! decided here: callers pass the set of live ids to [`BlobStore::cleanup_orphans`].

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Database name of the image store.
pub const IMAGE_DB_NAME: &str = "talqena_images";

/// Prefix that marks a staging id.
pub const STAGING_PREFIX: &str = "temp_";

/// Allocate a fresh staging id.
pub fn new_staging_id() -> String {
    format!("{}{}", STAGING_PREFIX, Uuid::new_v4())
}

pub fn is_staging_id(id: &str) -> bool {
    id.starts_with(STAGING_PREFIX)
}

/// Where the image database lives.
#[derive(Debug, Clone)]
pub enum BlobLocation {
    File(PathBuf),
    Memory,
}

/// A stored image with its write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub id: String,
    pub blob: Vec<u8>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

type SharedConnection = Arc<Mutex<Connection>>;

/// SQLite-backed image store with a lazily opened shared connection.
pub struct BlobStore {
    location: BlobLocation,
    conn: OnceCell<SharedConnection>,
}

impl BlobStore {
    pub fn new(location: BlobLocation) -> Self {
        Self {
            location,
            conn: OnceCell::new(),
        }
    }

    /// Store images in `dir/talqena_images.db`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(BlobLocation::File(dir.join(format!("{}.db", IMAGE_DB_NAME))))
    }

    /// Private in-memory store (useful for testing).
    pub fn in_memory() -> Self {
        Self::new(BlobLocation::Memory)
    }

    /// Open the connection if it is not open yet. Safe to call repeatedly.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    /// Insert or overwrite the image stored under `id`.
    pub async fn save(&self, id: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        let id = id.to_string();
        let size = blob.len();
        let timestamp = crate::now_millis();
        let key = id.clone();

        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO images (id, blob, timestamp) VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    blob = excluded.blob,
                    timestamp = excluded.timestamp
                "#,
                params![key, blob, timestamp],
            )
            .map(|_| ())
        })
        .await?;

        debug!(id = %id, size, "Saved image");
        Ok(())
    }

    /// Get the image stored under `id`. Absence is `Ok(None)`.
    pub async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entry(id).await?.map(|entry| entry.blob))
    }

    /// Get the full entry stored under `id`.
    pub async fn entry(&self, id: &str) -> Result<Option<BlobEntry>, StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, blob, timestamp FROM images WHERE id = ?1",
                params![id],
                |row| {
                    Ok(BlobEntry {
                        id: row.get(0)?,
                        blob: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// Delete the image stored under `id`.
    ///
    /// Returns whether something was removed; deleting an absent id succeeds.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let key = id.to_string();
        let rows = self
            .run(move |conn| conn.execute("DELETE FROM images WHERE id = ?1", params![key]))
            .await?;

        debug!(id = %id, removed = rows > 0, "Deleted image");
        Ok(rows > 0)
    }

    /// All stored ids, in no particular order.
    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM images")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
    }

    /// Delete every stored id not in `live_ids`.
    ///
    /// Individual delete failures are logged and skipped. Returns how many
    /// images were removed.
    pub async fn cleanup_orphans(&self, live_ids: &HashSet<String>) -> Result<usize, StoreError> {
        let orphans: Vec<String> = self
            .list_ids()
            .await?
            .into_iter()
            .filter(|id| !live_ids.contains(id))
            .collect();

        let mut removed = 0;
        for id in &orphans {
            match self.delete(id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(id = %id, error = %e, "Failed to delete orphaned image"),
            }
        }

        if removed > 0 {
            info!(removed, scanned = orphans.len(), "Cleaned up orphaned images");
        }
        Ok(removed)
    }

    async fn connection(&self) -> Result<SharedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| Self::open(self.location.clone()))
            .await
            .cloned()
    }

    async fn open(location: BlobLocation) -> Result<SharedConnection, StoreError> {
        if let BlobLocation::File(ref path) = location {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::BlobStoreUnavailable(format!(
                        "Failed to create image directory: {}",
                        e
                    ))
                })?;
            }
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = match location {
                BlobLocation::File(path) => Connection::open(path)?,
                BlobLocation::Memory => Connection::open_in_memory()?,
            };
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS images (
                    id TEXT PRIMARY KEY,
                    blob BLOB NOT NULL,
                    timestamp INTEGER NOT NULL
                );
                "#,
            )?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await
        .map_err(|e| StoreError::BlobStoreUnavailable(format!("open task failed: {}", e)))?
        .map_err(|e| StoreError::BlobStoreUnavailable(e.to_string()))?;

        debug!("Opened image store");
        Ok(Arc::new(Mutex::new(conn)))
    }

    /// Run one statement against the shared connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            op(&*guard).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::BlobStoreUnavailable(format!("image task failed: {}", e)))?
    }
}
