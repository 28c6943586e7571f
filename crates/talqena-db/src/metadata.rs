//! Synchronous whole-collection store for prompt records.
//!
//! The collection lives as one JSON array under [`STORAGE_KEY`] in a
//! SQLite key-value table. Every save replaces the whole value in a single
//! statement, so a reader sees either the new collection or the previous one.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::record::PromptRecord;

/// Fixed key the prompt collection is stored under.
pub const STORAGE_KEY: &str = "talqena_prompts_v1";

/// File name of the metadata database inside the data directory.
pub const METADATA_DB_NAME: &str = "talqena.db";

/// Key-value backed store for the ordered prompt collection.
pub struct MetadataStore {
    conn: Mutex<Connection>,
    quota: Option<usize>,
}

impl MetadataStore {
    /// Open or create the metadata database inside `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Self::open_at(&dir.join(METADATA_DB_NAME))
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            quota: None,
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            quota: None,
        })
    }

    /// Cap the serialized collection size in bytes. Writes above the cap
    /// fail with [`StoreError::QuotaExceeded`] and leave the stored value alone.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Load the stored collection.
    ///
    /// An absent key and unreadable content both yield an empty collection.
    pub fn load(&self) -> Vec<PromptRecord> {
        match self.load_checked() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load stored prompts, starting empty");
                Vec::new()
            }
        }
    }

    /// Load the stored collection, reporting a value that exists but cannot
    /// be read or parsed. An absent key is `Ok` with an empty collection.
    pub fn load_checked(&self) -> Result<Vec<PromptRecord>, StoreError> {
        let raw = match self.read_raw()? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        let mut records: Vec<PromptRecord> = serde_json::from_str(&raw)?;
        for record in &mut records {
            if record.image_ref.is_some() {
                record.image_ref = Some(record.id.clone());
            }
        }
        debug!(count = records.len(), "Loaded prompts");
        Ok(records)
    }

    /// Replace the stored collection with `records`.
    pub fn save(&self, records: &[PromptRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;

        if let Some(limit) = self.quota {
            if json.len() > limit {
                return Err(StoreError::QuotaExceeded(format!(
                    "collection needs {} bytes, limit is {} bytes",
                    json.len(),
                    limit
                )));
            }
        }

        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![STORAGE_KEY, json],
        )
        .map_err(StoreError::from_write)?;

        debug!(count = records.len(), bytes = json.len(), "Saved prompts");
        Ok(())
    }

    /// Remove the key entirely.
    pub fn clear(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![STORAGE_KEY])
            .map_err(StoreError::from_write)?;
        debug!("Cleared prompts key");
        Ok(())
    }

    /// Whether a value is currently stored under the key.
    pub fn has_key(&self) -> Result<bool, StoreError> {
        Ok(self.read_raw()?.is_some())
    }

    fn read_raw(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let raw = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![STORAGE_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    /// Write a raw value under the key, bypassing serialization.
    #[cfg(test)]
    pub(crate) fn write_raw(&self, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![STORAGE_KEY, value],
        )?;
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Category;

    fn record(id: &str, title: &str) -> PromptRecord {
        PromptRecord {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("content of {}", title),
            description: None,
            category: Category::Coding,
            model: None,
            tags: vec!["dev".to_string()],
            image_ref: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            is_favorite: false,
        }
    }

    #[test]
    fn test_load_absent_key_is_empty() {
        let store = MetadataStore::open_in_memory().unwrap();
        assert!(store.load().is_empty());
        assert!(!store.has_key().unwrap());
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let store = MetadataStore::open_in_memory().unwrap();
        let records = vec![record("b", "Second"), record("a", "First"), record("c", "Third")];

        store.save(&records).unwrap();

        assert_eq!(store.load(), records);
    }

    #[test]
    fn test_save_overwrites_previous_value() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.save(&[record("a", "A"), record("b", "B")]).unwrap();
        store.save(&[record("c", "C")]).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    #[test]
    fn test_unparsable_content_loads_empty() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.write_raw("{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_checked_reports_unparsable_content() {
        let store = MetadataStore::open_in_memory().unwrap();
        assert!(store.load_checked().unwrap().is_empty());

        store.write_raw(r#"[{"id":"p1","category":"Poetry"}]"#).unwrap();
        assert!(matches!(store.load_checked(), Err(StoreError::Serde(_))));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_clear_removes_key() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.save(&[record("a", "A")]).unwrap();
        assert!(store.has_key().unwrap());

        store.clear().unwrap();
        assert!(!store.has_key().unwrap());
        assert!(store.load().is_empty());

        // Clearing an absent key is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_quota_exceeded_keeps_previous_value() {
        let store = MetadataStore::open_in_memory().unwrap().with_quota(400);
        let small = vec![record("a", "A")];
        store.save(&small).unwrap();

        let big: Vec<PromptRecord> = (0..20).map(|i| record(&i.to_string(), "Big")).collect();
        let err = store.save(&big).unwrap_err();

        assert!(err.is_quota_exceeded());
        assert_eq!(store.load(), small);
    }

    #[test]
    fn test_image_ref_normalized_to_own_id() {
        let store = MetadataStore::open_in_memory().unwrap();
        store
            .write_raw(
                r#"[{"id":"p1","title":"T","content":"C","category":"Art Generation","tags":[],
                "imageUrl":"blob:stale","createdAt":5,"updatedAt":5,"isFavorite":true}]"#,
            )
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded[0].image_ref.as_deref(), Some("p1"));
        assert!(loaded[0].is_favorite);
    }

    #[test]
    fn test_open_in_dir_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MetadataStore::open_in_dir(dir.path()).unwrap();
            store.save(&[record("a", "A")]).unwrap();
        }
        let reopened = MetadataStore::open_in_dir(dir.path()).unwrap();
        assert_eq!(reopened.load().len(), 1);
    }
}
