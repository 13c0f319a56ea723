use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bookcache::domain::{
    CatalogClient, CatalogError, ChangeType, DocumentChange, StoreError, SyncError,
};
use bookcache::infrastructure::LocalStore;
use bookcache::models::book;
use bookcache::models::{BookEdit, CatalogRecord, ImageInfo, ImagesField};
use bookcache::sync::SyncCoordinator;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;

/// In-memory catalog with switchable failures
#[derive(Default)]
struct FakeCatalog {
    records: Mutex<Vec<CatalogRecord>>,
    failure: Mutex<Option<CatalogError>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl FakeCatalog {
    fn with(records: Vec<CatalogRecord>) -> Arc<Self> {
        let fake = Self::default();
        for r in records {
            fake.put(r);
        }
        Arc::new(fake)
    }

    fn fail_with(&self, e: CatalogError) {
        *self.failure.lock().unwrap() = Some(e);
    }

    fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    // Replaces a record with the same id, keeps insertion order otherwise
    fn put(&self, record: CatalogRecord) {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.records.lock().unwrap().iter().any(|r| r.id == id)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, call: &str) -> Result<(), CatalogError> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn search(&self, title: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.enter("search")?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.title.contains(title))
            .cloned()
            .collect())
    }

    async fn get_recommended(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.enter("get_recommended")?;
        Ok(self.records.lock().unwrap().clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<CatalogRecord, CatalogError> {
        self.enter("get_by_id")?;
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }

    async fn create(&self, record: &CatalogRecord) -> Result<CatalogRecord, CatalogError> {
        self.enter("create")?;
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut created = record.clone();
        created.id = id;
        self.put(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: &str,
        record: &CatalogRecord,
    ) -> Result<CatalogRecord, CatalogError> {
        self.enter("update")?;
        if !self.contains(id) {
            return Err(CatalogError::NotFound);
        }
        let mut canonical = record.clone();
        canonical.id = id.to_string();
        // The server trims titles
        canonical.title = canonical.title.trim().to_string();
        self.put(canonical.clone());
        Ok(canonical)
    }

    async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        self.enter("delete")?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }
}

fn record(id: &str, title: &str, author: &str) -> CatalogRecord {
    CatalogRecord {
        id: id.to_string(),
        title: title.to_string(),
        author_name: author.to_string(),
        ..Default::default()
    }
}

async fn setup(catalog: Arc<FakeCatalog>) -> SyncCoordinator {
    let store = LocalStore::open("sqlite::memory:")
        .await
        .expect("Failed to open store");
    SyncCoordinator::new(store, catalog)
}

async fn insert_draft(store: &LocalStore, id: &str, title: &str) {
    let id = id.to_string();
    let title = title.to_string();
    store
        .write(move |txn| {
            Box::pin(async move {
                let now = chrono::Utc::now().to_rfc3339();
                book::ActiveModel {
                    id: Set(id),
                    remote_id: Set(String::new()),
                    title: Set(title),
                    author_id: Set(None),
                    author_position: Set(0),
                    description: Set(String::new()),
                    summary: Set(String::new()),
                    language: Set("en".to_string()),
                    rating: Set(0.0),
                    rating_count: Set(0),
                    publisher: Set(String::new()),
                    publish_date: Set(String::new()),
                    pages: Set(0),
                    categories: Set("[]".to_string()),
                    price: Set(0.0),
                    currency: Set("USD".to_string()),
                    created_at: Set(now.clone()),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .expect("Failed to insert draft");
}

#[tokio::test]
async fn test_bootstrap_end_to_end_applies_defaults() {
    let catalog = FakeCatalog::with(vec![]);
    let payload: CatalogRecord = serde_json::from_value(json!({
        "id": "r1",
        "title": "1984",
        "authorName": "Orwell",
        "rating": null,
        "currency": null
    }))
    .unwrap();
    catalog.put(payload);
    let sync = setup(catalog).await;

    let merged = sync.bootstrap_sync().await.expect("bootstrap failed");
    assert_eq!(merged, 1);

    let authors = sync.store().list_authors().await.unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].full_name, "Orwell");

    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();
    assert_eq!(book.title, "1984");
    assert_eq!(book.author_name(), "Orwell");
    assert_eq!(book.detail.rating, 0.0);
    assert_eq!(book.detail.currency, "USD");
    assert_eq!(book.detail.language, "en");
    assert_eq!(authors[0].book_ids, vec![book.id]);
}

#[tokio::test]
async fn test_upsert_merge_is_idempotent() {
    let sync = setup(FakeCatalog::with(vec![])).await;

    let mut rec = record("r1", "Dune", "Herbert");
    let first = sync.upsert_merge(rec.clone()).await.unwrap();
    rec.rating = Some(4.2);
    rec.title = "Dune (Deluxe)".to_string();
    let second = sync.upsert_merge(rec.clone()).await.unwrap();
    let third = sync.upsert_merge(rec).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(sync.store().count_books().await.unwrap(), 1);

    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();
    assert_eq!(book.title, "Dune (Deluxe)");
    assert_eq!(book.detail.rating, 4.2);
}

#[tokio::test]
async fn test_local_id_survives_remote_update() {
    let sync = setup(FakeCatalog::with(vec![])).await;
    let local_id = sync
        .upsert_merge(record("r1", "Old title", "Someone"))
        .await
        .unwrap();

    sync.upsert_merge(record("r1", "New title", "Someone Else"))
        .await
        .unwrap();

    let book = sync.store().find_by_id(&local_id).await.unwrap().unwrap();
    assert_eq!(book.remote_id, "r1");
    assert_eq!(book.title, "New title");
    assert_eq!(book.author_name(), "Someone Else");
}

#[tokio::test]
async fn test_author_dedup_is_exact_match() {
    let sync = setup(FakeCatalog::with(vec![])).await;

    sync.upsert_merge(record("r1", "A", "Jane Doe")).await.unwrap();
    sync.upsert_merge(record("r2", "B", "Jane Doe")).await.unwrap();
    assert_eq!(sync.store().list_authors().await.unwrap().len(), 1);

    sync.upsert_merge(record("r3", "C", "jane doe")).await.unwrap();
    let authors = sync.store().list_authors().await.unwrap();
    assert_eq!(authors.len(), 2);

    let jane = sync
        .store()
        .find_author_by_name("Jane Doe")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(jane.book_ids.len(), 2);

    let titles: Vec<_> = sync
        .store()
        .books_of_author("Jane Doe")
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["A", "B"]);
    assert!(sync.store().books_of_author("Nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_image_string_becomes_cover() {
    let mut rec = record("r1", "Dune", "Herbert");
    rec.images = Some(ImagesField::Legacy("http://x/y.jpg".to_string()));
    let sync = setup(FakeCatalog::with(vec![rec])).await;

    sync.bootstrap_sync().await.unwrap();

    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();
    assert_eq!(
        book.detail.images,
        vec![ImageInfo {
            url: "http://x/y.jpg".to_string(),
            kind: "cover".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_bootstrap_failure_leaves_store_untouched() {
    let catalog = FakeCatalog::with(vec![record("r1", "Dune", "Herbert")]);
    catalog.fail_with(CatalogError::Server(503));
    let sync = setup(catalog).await;

    let result = sync.bootstrap_sync().await;

    assert_eq!(result, Err(SyncError::Catalog(CatalogError::Server(503))));
    assert_eq!(sync.store().count_books().await.unwrap(), 0);
    assert_eq!(sync.store().revision(), 0);
}

#[tokio::test]
async fn test_batch_skips_records_without_id() {
    let catalog = FakeCatalog::with(vec![]);
    let sync = setup(catalog.clone()).await;
    catalog.put(record("a", "Valid", "Someone"));
    catalog.put(record("", "Broken", "Someone"));
    catalog.put(record("b", "Also valid", "Someone"));

    assert_eq!(sync.bootstrap_sync().await, Ok(2));
    assert_eq!(sync.store().count_books().await.unwrap(), 2);
    assert!(sync.store().find_by_remote_id("a").await.unwrap().is_some());
    assert!(sync.store().find_by_remote_id("b").await.unwrap().is_some());

    // Nothing left to merge is not a failure
    let revision = sync.store().revision();
    let only_broken = FakeCatalog::with(vec![record("", "Broken", "Someone")]);
    let sync = SyncCoordinator::new(sync.store().clone(), only_broken);
    assert_eq!(sync.bootstrap_sync().await, Ok(0));
    assert_eq!(sync.store().revision(), revision);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_merges_and_removals_serialize() {
    let sync = Arc::new(setup(FakeCatalog::with(vec![])).await);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let sync = sync.clone();
        tasks.push(tokio::spawn(async move {
            if i % 3 == 2 {
                sync.apply_change(DocumentChange {
                    change_type: ChangeType::Removed,
                    document_id: "r1".to_string(),
                    payload: serde_json::Value::Null,
                })
                .await
            } else {
                let author = if i % 2 == 0 { "Jane Doe" } else { "John Roe" };
                sync.upsert_merge(record("r1", &format!("Title {}", i), author))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    let store = sync.store();
    assert!(store.count_books().await.unwrap() <= 1);
    let names: Vec<_> = store
        .list_authors()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.full_name)
        .collect();
    assert_eq!(names, vec!["Jane Doe", "John Roe"]);

    // The surviving book, if any, is consistent with its author
    if let Some(book) = store.find_by_remote_id("r1").await.unwrap() {
        let owner = store
            .find_author_by_name(book.author_name())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.book_ids, vec![book.id.clone()]);
    }
}

#[tokio::test]
async fn test_search_merges_without_pruning() {
    let catalog = FakeCatalog::with(vec![
        record("r1", "Dune", "Herbert"),
        record("r2", "Neuromancer", "Gibson"),
    ]);
    let sync = setup(catalog).await;

    assert_eq!(sync.search_sync("Dune").await.unwrap(), 1);
    assert_eq!(sync.search_sync("Neuro").await.unwrap(), 1);

    // The first result is still there
    assert_eq!(sync.store().count_books().await.unwrap(), 2);
}

#[tokio::test]
async fn test_blank_search_skips_remote() {
    let catalog = FakeCatalog::with(vec![record("r1", "Dune", "Herbert")]);
    let sync = setup(catalog.clone()).await;

    assert_eq!(sync.search_sync("   ").await.unwrap(), 0);
    assert!(catalog.calls().is_empty());
}

#[tokio::test]
async fn test_create_draft_uses_server_id() {
    let catalog = FakeCatalog::with(vec![]);
    let sync = setup(catalog.clone()).await;

    let local_id = sync.create_local_draft("Solaris", "Lem").await.unwrap();

    let book = sync.store().find_by_id(&local_id).await.unwrap().unwrap();
    assert_eq!(book.remote_id, "srv-1");
    assert_eq!(book.detail.description, "no description");
    assert_eq!(book.author_name(), "Lem");
    assert!(catalog.contains("srv-1"));
}

#[tokio::test]
async fn test_create_draft_failure_creates_nothing() {
    let catalog = FakeCatalog::with(vec![]);
    catalog.fail_with(CatalogError::Timeout);
    let sync = setup(catalog).await;

    let result = sync.create_local_draft("Solaris", "Lem").await;

    assert_eq!(result, Err(SyncError::Catalog(CatalogError::Timeout)));
    assert_eq!(sync.store().count_books().await.unwrap(), 0);
    assert!(sync.store().list_authors().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_merges_server_response() {
    let catalog = FakeCatalog::with(vec![record("r1", "Dune", "Herbert")]);
    let sync = setup(catalog.clone()).await;
    sync.bootstrap_sync().await.unwrap();
    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();

    let edit = BookEdit {
        title: "  Dune Messiah  ".to_string(),
        author_name: "Frank Herbert".to_string(),
        currency: "EUR".to_string(),
        price: 9.5,
        ..Default::default()
    };
    let updated = sync
        .update_remote_and_merge(&book.id, edit)
        .await
        .unwrap();

    assert_eq!(updated.as_deref(), Some(book.id.as_str()));
    let book = sync.store().find_by_id(&book.id).await.unwrap().unwrap();
    assert_eq!(book.title, "Dune Messiah");
    assert_eq!(book.author_name(), "Frank Herbert");
    assert_eq!(book.detail.currency, "EUR");
    assert_eq!(book.detail.price, 9.5);
    assert!(catalog.calls().contains(&"update".to_string()));
}

#[tokio::test]
async fn test_update_of_draft_is_not_syncable() {
    let catalog = FakeCatalog::with(vec![]);
    let sync = setup(catalog.clone()).await;
    insert_draft(sync.store(), "d1", "Unsynced").await;

    let result = sync
        .update_remote_and_merge("d1", BookEdit::default())
        .await;

    assert_eq!(result, Err(SyncError::NotSyncable("d1".to_string())));
    assert!(catalog.calls().is_empty());
}

#[tokio::test]
async fn test_update_of_unknown_book_is_noop() {
    let catalog = FakeCatalog::with(vec![]);
    let sync = setup(catalog.clone()).await;

    let result = sync
        .update_remote_and_merge("missing", BookEdit::default())
        .await;

    assert_eq!(result, Ok(None));
    assert!(catalog.calls().is_empty());
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_local_book() {
    let catalog = FakeCatalog::with(vec![record("r1", "Dune", "Herbert")]);
    let sync = setup(catalog.clone()).await;
    sync.bootstrap_sync().await.unwrap();
    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();

    catalog.fail_with(CatalogError::Network("connection refused".to_string()));
    let result = sync.delete_remote_and_local(&book.id).await;

    assert!(matches!(
        result,
        Err(SyncError::Catalog(CatalogError::Network(_)))
    ));
    assert!(sync.store().find_by_id(&book.id).await.unwrap().is_some());

    catalog.recover();
    assert_eq!(sync.delete_remote_and_local(&book.id).await, Ok(true));
    assert!(sync.store().find_by_id(&book.id).await.unwrap().is_none());
    assert!(catalog.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_draft_stays_local() {
    let catalog = FakeCatalog::with(vec![]);
    let sync = setup(catalog.clone()).await;
    insert_draft(sync.store(), "d1", "Unsynced").await;

    assert_eq!(sync.delete_remote_and_local("d1").await, Ok(true));
    assert_eq!(sync.delete_remote_and_local("d1").await, Ok(false));
    assert!(catalog.calls().is_empty());
}

#[tokio::test]
async fn test_refresh_pulls_remote_changes() {
    let catalog = FakeCatalog::with(vec![record("r1", "Dune", "Herbert")]);
    let sync = setup(catalog.clone()).await;
    sync.bootstrap_sync().await.unwrap();
    let book = sync.store().find_by_remote_id("r1").await.unwrap().unwrap();

    let mut changed = record("r1", "Dune", "Herbert");
    changed.pages = Some(412);
    catalog.put(changed);

    sync.refresh_from_remote(&book.id).await.unwrap();
    let book = sync.store().find_by_id(&book.id).await.unwrap().unwrap();
    assert_eq!(book.detail.pages, 412);

    catalog.records.lock().unwrap().clear();
    let result = sync.refresh_from_remote(&book.id).await;
    assert_eq!(result, Err(SyncError::Catalog(CatalogError::NotFound)));
    assert!(sync.store().find_by_id(&book.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_realtime_added_and_modified_merge() {
    let sync = setup(FakeCatalog::with(vec![])).await;

    sync.apply_change(DocumentChange {
        change_type: ChangeType::Added,
        document_id: "doc-1".to_string(),
        payload: json!({ "title": "Hyperion", "authorName": "Simmons", "pages": 482.0 }),
    })
    .await
    .unwrap();
    let local_id = sync
        .store()
        .find_by_remote_id("doc-1")
        .await
        .unwrap()
        .unwrap()
        .id;

    sync.apply_change(DocumentChange {
        change_type: ChangeType::Modified,
        document_id: "doc-1".to_string(),
        payload: json!({ "title": "Hyperion", "authorName": "Dan Simmons", "rating": 4.6 }),
    })
    .await
    .unwrap();

    let book = sync.store().find_by_id(&local_id).await.unwrap().unwrap();
    assert_eq!(book.remote_id, "doc-1");
    assert_eq!(book.author_name(), "Dan Simmons");
    assert_eq!(book.detail.rating, 4.6);
    assert_eq!(sync.store().count_books().await.unwrap(), 1);
}

#[tokio::test]
async fn test_realtime_removed_deletes_or_ignores() {
    let sync = setup(FakeCatalog::with(vec![])).await;
    sync.upsert_merge(record("D", "Dune", "Herbert")).await.unwrap();

    let removed = |id: &str| DocumentChange {
        change_type: ChangeType::Removed,
        document_id: id.to_string(),
        payload: serde_json::Value::Null,
    };

    sync.apply_change(removed("D")).await.unwrap();
    assert!(sync.store().find_by_remote_id("D").await.unwrap().is_none());

    // Absent document is a no-op
    sync.apply_change(removed("D")).await.unwrap();
    sync.apply_change(removed("never-seen")).await.unwrap();
    assert_eq!(sync.store().count_books().await.unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_document_is_skipped() {
    let sync = setup(FakeCatalog::with(vec![])).await;

    let result = sync
        .apply_change(DocumentChange {
            change_type: ChangeType::Added,
            document_id: "doc-1".to_string(),
            payload: json!({ "title": 42 }),
        })
        .await;

    assert!(matches!(result, Err(SyncError::InvalidRecord(_))));
    assert_eq!(sync.store().count_books().await.unwrap(), 0);
}
