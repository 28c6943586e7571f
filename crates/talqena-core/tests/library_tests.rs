use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use talqena_core::{
    Category, ImageField, ImportOptions, Library, LibraryConfig, LibraryError, PromptDraft,
    PromptFilter,
};
use talqena_db::{BlobLocation, BlobStore, MetadataStore, IMAGE_DB_NAME, METADATA_DB_NAME};
use talqena_rewrite::{RewriteError, Rewriter};
use tempfile::TempDir;

// ============================================================
// Helpers
// ============================================================

struct Fixture {
    dir: TempDir,
    blobs: Arc<BlobStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            blobs: Arc::new(BlobStore::in_memory()),
        }
    }

    fn metadata(&self) -> MetadataStore {
        MetadataStore::open_in_dir(self.dir.path()).unwrap()
    }

    async fn open(&self) -> Library {
        Library::open(self.metadata(), self.blobs.clone(), LibraryConfig::default()).await
    }

    async fn blob_ids(&self) -> Vec<String> {
        let mut ids = self.blobs.list_ids().await.unwrap();
        ids.sort();
        ids
    }
}

/// Make deleting the image stored under `id` fail.
fn block_image_delete(db_path: &Path, id: &str) {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER keep_image BEFORE DELETE ON images WHEN old.id = '{}' \
         BEGIN SELECT RAISE(ABORT, 'locked'); END;",
        id
    ))
    .unwrap();
}

struct FixedRewriter(Result<String, String>);

#[async_trait]
impl Rewriter for FixedRewriter {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn rewrite(&self, _content: &str) -> Result<String, RewriteError> {
        self.0.clone().map_err(RewriteError::Unavailable)
    }

    async fn is_available(&self) -> bool {
        self.0.is_ok()
    }
}

// ============================================================
// Create / update / delete
// ============================================================

#[tokio::test]
async fn test_create_promotes_staged_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staging_id = lib.stage_image(b"png-a".to_vec()).await.unwrap();
    let record = lib
        .create(
            PromptDraft::new("Logo", "Draw a fox")
                .with_category(Category::Art)
                .with_image(ImageField::Staged(staging_id.clone())),
        )
        .await
        .unwrap();

    assert_eq!(record.image_ref.as_deref(), Some(record.id.as_str()));
    assert_eq!(fx.blobs.get(&record.id).await.unwrap(), Some(b"png-a".to_vec()));
    assert_eq!(fx.blobs.get(&staging_id).await.unwrap(), None);

    let handle = lib.image_handle(&record.id).unwrap();
    assert_eq!(lib.resolve_handle(handle), Some(&b"png-a"[..]));
}

#[tokio::test]
async fn test_create_prepends_newest_first() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    lib.create(PromptDraft::new("First", "1")).await.unwrap();
    lib.create(PromptDraft::new("Second", "2")).await.unwrap();

    let titles: Vec<&str> = lib.records().iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Second", "First"]);

    // Persisted in the same order
    let reloaded = fx.metadata().load();
    assert_eq!(reloaded, lib.records());
}

#[tokio::test]
async fn test_create_with_missing_staged_image_saves_without_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged("temp_gone".to_string())))
        .await
        .unwrap();

    assert!(record.image_ref.is_none());
    assert!(lib.image_handle(&record.id).is_none());
    assert!(fx.blob_ids().await.is_empty());
}

#[tokio::test]
async fn test_update_replaces_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged_a = lib.stage_image(b"A".to_vec()).await.unwrap();
    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged_a)))
        .await
        .unwrap();
    let old_handle = lib.image_handle(&record.id).unwrap().clone();

    let staged_b = lib.stage_image(b"B".to_vec()).await.unwrap();
    let draft = PromptDraft::from_record(&record).with_image(ImageField::Staged(staged_b));
    let updated = lib.update(&record.id, draft).await.unwrap();

    assert_eq!(updated.image_ref.as_deref(), Some(record.id.as_str()));
    assert_eq!(fx.blobs.get(&record.id).await.unwrap(), Some(b"B".to_vec()));
    assert_eq!(fx.blob_ids().await, vec![record.id.clone()]);

    // The old handle is gone, the new one shows B
    assert_eq!(lib.resolve_handle(&old_handle), None);
    let handle = lib.image_handle(&record.id).unwrap();
    assert_eq!(lib.resolve_handle(handle), Some(&b"B"[..]));
}

#[tokio::test]
async fn test_update_removes_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
        .await
        .unwrap();

    let draft = PromptDraft::from_record(&record).with_image(ImageField::Remove);
    let updated = lib.update(&record.id, draft).await.unwrap();

    assert!(updated.image_ref.is_none());
    assert_eq!(fx.blobs.get(&record.id).await.unwrap(), None);
    assert!(lib.image_handle(&record.id).is_none());
}

#[tokio::test]
async fn test_update_keeps_position_and_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let older = lib
        .create(PromptDraft::new("Older", "C").with_image(ImageField::Staged(staged)))
        .await
        .unwrap();
    lib.create(PromptDraft::new("Newer", "C")).await.unwrap();

    let mut draft = PromptDraft::from_record(&older);
    draft.title = "Older, edited".to_string();
    draft.add_tag("edited");
    let updated = lib.update(&older.id, draft).await.unwrap();

    assert_eq!(lib.records()[1].id, older.id);
    assert_eq!(lib.records()[1].title, "Older, edited");
    assert_eq!(updated.created_at, older.created_at);
    assert!(updated.updated_at >= older.updated_at);
    assert_eq!(updated.image_ref, older.image_ref);
    assert_eq!(fx.blobs.get(&older.id).await.unwrap(), Some(b"A".to_vec()));
}

#[tokio::test]
async fn test_update_with_missing_staged_image_keeps_prior_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
        .await
        .unwrap();
    let handle = lib.image_handle(&record.id).unwrap().clone();

    let draft = PromptDraft::from_record(&record)
        .with_image(ImageField::Staged("temp_missing".to_string()));
    let updated = lib.update(&record.id, draft).await.unwrap();

    assert_eq!(updated.image_ref.as_deref(), Some(record.id.as_str()));
    assert_eq!(fx.blobs.get(&record.id).await.unwrap(), Some(b"A".to_vec()));
    assert_eq!(lib.image_handle(&record.id), Some(&handle));
    assert_eq!(lib.resolve_handle(&handle), Some(&b"A"[..]));
}

#[tokio::test]
async fn test_update_unknown_is_not_found() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let err = lib.update("nope", PromptDraft::new("T", "C")).await.unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_cascades_to_image() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
        .await
        .unwrap();

    assert!(lib.delete(&record.id).await.unwrap());

    assert!(fx.blob_ids().await.is_empty());
    assert!(lib.get(&record.id).is_none());
    assert!(lib.image_handle(&record.id).is_none());
}

#[tokio::test]
async fn test_delete_last_prompt_clears_key() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let a = lib.create(PromptDraft::new("A", "a")).await.unwrap();
    let b = lib.create(PromptDraft::new("B", "b")).await.unwrap();

    lib.delete(&a.id).await.unwrap();
    assert!(fx.metadata().has_key().unwrap());

    lib.delete(&b.id).await.unwrap();
    assert!(!fx.metadata().has_key().unwrap());
    assert!(lib.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_twice_succeeds() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    assert!(!lib.delete("ghost").await.unwrap());
    assert!(!lib.delete("ghost").await.unwrap());
}

#[tokio::test]
async fn test_delete_unknown_leaves_images_alone() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;
    let staging_id = lib.stage_image(b"pending".to_vec()).await.unwrap();

    assert!(!lib.delete(&staging_id).await.unwrap());
    assert_eq!(fx.blobs.get(&staging_id).await.unwrap(), Some(b"pending".to_vec()));
}

#[tokio::test]
async fn test_delete_all_continues_past_failed_image_delete() {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(BlobStore::in_dir(dir.path()));
    let metadata = MetadataStore::open_in_dir(dir.path()).unwrap();
    let mut lib = Library::open(metadata, blobs.clone(), LibraryConfig::default()).await;

    let mut ids = Vec::new();
    for payload in [b"A", b"B"] {
        let staged = lib.stage_image(payload.to_vec()).await.unwrap();
        let record = lib
            .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
            .await
            .unwrap();
        ids.push(record.id);
    }
    block_image_delete(&dir.path().join(format!("{}.db", IMAGE_DB_NAME)), &ids[0]);

    assert_eq!(lib.delete_all().await.unwrap(), 2);

    assert_eq!(blobs.list_ids().await.unwrap(), vec![ids[0].clone()]);
    assert!(lib.is_empty());
    assert!(!MetadataStore::open_in_dir(dir.path()).unwrap().has_key().unwrap());
}

#[tokio::test]
async fn test_delete_all_clears_both_stores() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    for i in 0..3 {
        let staged = lib.stage_image(vec![i]).await.unwrap();
        lib.create(PromptDraft::new(format!("P{}", i), "c").with_image(ImageField::Staged(staged)))
            .await
            .unwrap();
    }
    // A pending upload is wiped as well
    lib.stage_image(b"pending".to_vec()).await.unwrap();

    assert_eq!(lib.delete_all().await.unwrap(), 3);

    assert!(fx.blob_ids().await.is_empty());
    assert!(!fx.metadata().has_key().unwrap());
    assert!(lib.is_empty());
}

// ============================================================
// Bulk import
// ============================================================

#[tokio::test]
async fn test_bulk_import_orders_batch_ahead_of_existing() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;
    let existing = lib.create(PromptDraft::new("Existing", "x")).await.unwrap();

    let mut options = ImportOptions::new(Category::Writing);
    options.add_tag("imported");
    let count = lib.bulk_import("a\nb\nc", &options).unwrap();

    assert_eq!(count, 3);
    let records = lib.records();
    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c", "x"]);
    assert!(records[0].created_at < records[1].created_at);
    assert!(records[1].created_at < records[2].created_at);
    assert_eq!(records[3].id, existing.id);
    assert!(records[..3].iter().all(|r| r.tags == vec!["imported".to_string()]));

    assert_eq!(fx.metadata().load().len(), 4);
}

#[tokio::test]
async fn test_bulk_import_empty_does_not_mutate() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;
    lib.create(PromptDraft::new("Existing", "x")).await.unwrap();
    let before = fx.metadata().load();

    let err = lib
        .bulk_import("\n   \n\r\n", &ImportOptions::default())
        .unwrap_err();

    assert!(matches!(err, LibraryError::ImportEmpty));
    assert_eq!(lib.len(), 1);
    assert_eq!(fx.metadata().load(), before);
}

// ============================================================
// Consistency across stores
// ============================================================

#[tokio::test]
async fn test_crash_between_stores_is_reconciled() {
    let fx = Fixture::new();

    // The metadata write fails after the image was promoted
    let tiny = fx.metadata().with_quota(16);
    let mut lib = Library::open(tiny, fx.blobs.clone(), LibraryConfig::default()).await;
    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let err = lib
        .create(PromptDraft::new("Lost", "c").with_image(ImageField::Staged(staged)))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::StorageQuotaExceeded(_)));
    // The in-memory collection is ahead of durable state
    assert_eq!(lib.len(), 1);
    let orphan_id = lib.records()[0].id.clone();
    assert_eq!(fx.blob_ids().await, vec![orphan_id]);
    drop(lib);

    // Restart: nothing references the image, so the sweep reclaims it
    let lib = fx.open().await;
    assert!(lib.is_empty());
    assert!(fx.blob_ids().await.is_empty());
}

#[tokio::test]
async fn test_unreadable_collection_keeps_images() {
    let fx = Fixture::new();
    let record = {
        let mut lib = fx.open().await;
        let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
        let record = lib
            .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
            .await
            .unwrap();
        lib.close();
        record
    };

    // An unknown category makes the stored collection unparsable
    let conn = rusqlite::Connection::open(fx.dir.path().join(METADATA_DB_NAME)).unwrap();
    conn.execute(
        "UPDATE kv SET value = replace(value, '\"Other\"', '\"Poetry\"')",
        [],
    )
    .unwrap();
    drop(conn);

    let mut lib = fx.open().await;
    assert!(lib.is_empty());
    assert_eq!(fx.blob_ids().await, vec![record.id.clone()]);
    assert_eq!(lib.reconcile().await.unwrap(), 0);
    assert_eq!(fx.blob_ids().await, vec![record.id.clone()]);

    // Once a write replaces the stored collection the sweep runs again
    lib.create(PromptDraft::new("Fresh", "c")).await.unwrap();
    assert_eq!(lib.reconcile().await.unwrap(), 1);
    assert!(fx.blob_ids().await.is_empty());
}

#[tokio::test]
async fn test_reconcile_keeps_live_and_pending_images() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;

    let staged = lib.stage_image(b"A".to_vec()).await.unwrap();
    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged(staged)))
        .await
        .unwrap();
    let pending = lib.stage_image(b"P".to_vec()).await.unwrap();
    fx.blobs.save("stray-1", b"x".to_vec()).await.unwrap();
    fx.blobs.save("temp_abandoned", b"y".to_vec()).await.unwrap();

    assert_eq!(lib.reconcile().await.unwrap(), 2);

    let mut expected = vec![record.id.clone(), pending.clone()];
    expected.sort();
    assert_eq!(fx.blob_ids().await, expected);

    lib.discard_staged(&pending).await.unwrap();
    assert_eq!(fx.blob_ids().await, vec![record.id]);
}

#[tokio::test]
async fn test_reopen_acquires_handles_and_tolerates_missing_images() {
    let fx = Fixture::new();
    let (with_image, lost_image) = {
        let mut lib = fx.open().await;
        let a = lib.stage_image(b"A".to_vec()).await.unwrap();
        let with_image = lib
            .create(PromptDraft::new("Kept", "c").with_image(ImageField::Staged(a)))
            .await
            .unwrap();
        let b = lib.stage_image(b"B".to_vec()).await.unwrap();
        let lost_image = lib
            .create(PromptDraft::new("Lost", "c").with_image(ImageField::Staged(b)))
            .await
            .unwrap();
        lib.close();
        (with_image, lost_image)
    };

    // The image disappears behind the library's back
    fx.blobs.delete(&lost_image.id).await.unwrap();

    let lib = fx.open().await;
    assert_eq!(lib.len(), 2);
    let handle = lib.image_handle(&with_image.id).unwrap();
    assert_eq!(lib.resolve_handle(handle), Some(&b"A"[..]));
    assert!(lib.image_handle(&lost_image.id).is_none());
}

#[tokio::test]
async fn test_unavailable_image_store_degrades_to_no_image() {
    let fx = Fixture::new();
    let blocker = fx.dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();
    let broken = Arc::new(BlobStore::new(BlobLocation::File(
        blocker.join("images").join("talqena_images.db"),
    )));

    let mut lib = Library::open(fx.metadata(), broken, LibraryConfig::default()).await;

    let err = lib.stage_image(b"A".to_vec()).await.unwrap_err();
    assert!(matches!(err, LibraryError::BlobStoreUnavailable(_)));

    let record = lib
        .create(PromptDraft::new("T", "C").with_image(ImageField::Staged("temp_x".to_string())))
        .await
        .unwrap();
    assert!(record.image_ref.is_none());

    // Deleting still removes the prompt
    assert!(lib.delete(&record.id).await.unwrap());
    assert!(lib.is_empty());
}

#[tokio::test]
async fn test_image_size_bound() {
    let fx = Fixture::new();
    let config = LibraryConfig { max_image_bytes: 4 };
    let mut lib = Library::open(fx.metadata(), fx.blobs.clone(), config).await;

    let err = lib.stage_image(vec![0; 5]).await.unwrap_err();
    assert!(matches!(err, LibraryError::ImageTooLarge { size: 5, limit: 4 }));
    assert!(fx.blob_ids().await.is_empty());

    lib.stage_image(vec![0; 4]).await.unwrap();
}

// ============================================================
// Favorites, filtering, enhancement
// ============================================================

#[tokio::test]
async fn test_toggle_favorite_persists() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;
    let record = lib.create(PromptDraft::new("T", "C")).await.unwrap();

    assert!(lib.toggle_favorite(&record.id).unwrap());
    assert!(fx.metadata().load()[0].is_favorite);
    assert!(!lib.toggle_favorite(&record.id).unwrap());

    assert!(matches!(
        lib.toggle_favorite("nope"),
        Err(LibraryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_filtered_and_tags() {
    let fx = Fixture::new();
    let mut lib = fx.open().await;
    lib.create(
        PromptDraft::new("Fix bug", "trace the panic")
            .with_category(Category::Coding)
            .with_tags(["dev", "bug"]),
    )
    .await
    .unwrap();
    lib.create(
        PromptDraft::new("Poem", "about autumn")
            .with_tags(["art"])
            .favorite(),
    )
    .await
    .unwrap();

    let bugs = lib.filtered(&PromptFilter {
        search: "bug".to_string(),
        ..Default::default()
    });
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].title, "Fix bug");

    let favorites = lib.filtered(&PromptFilter {
        favorites_only: true,
        ..Default::default()
    });
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].title, "Poem");

    assert_eq!(lib.available_tags(), vec!["art", "dev", "bug"]);
}

#[tokio::test]
async fn test_enhance_uses_rewriter() {
    let fx = Fixture::new();
    let lib = fx.open().await;

    let ok = FixedRewriter(Ok("Better prompt".to_string()));
    assert_eq!(lib.enhance(&ok, "prompt").await.unwrap(), "Better prompt");

    let empty = FixedRewriter(Ok("  ".to_string()));
    assert_eq!(lib.enhance(&empty, "prompt").await.unwrap(), "prompt");

    let failing = FixedRewriter(Err("no key".to_string()));
    let err = lib.enhance(&failing, "prompt").await.unwrap_err();
    assert!(matches!(err, LibraryError::ExternalService(_)));
}
