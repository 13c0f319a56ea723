//! Local store over SeaORM/SQLite
//!
//! Writes are serialized through one async mutex and run inside a single
//! database transaction each. Every successful commit bumps a revision and is
//! broadcast to observers; live queries re-run their filter on each
//! notification from their own task, never on the writer's call path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionError, TransactionTrait,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;

use crate::db;
use crate::domain::{BookFilter, StoreError};
use crate::models::author::{self, Entity as AuthorEntity};
use crate::models::book::{self, Entity as BookEntity};
use crate::models::book_image::{self, Entity as BookImageEntity};
use crate::models::{Author, Book};

/// Future returned by a write callback; borrows the open transaction.
pub type TxnFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'c>>;

/// Commit notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub revision: u64,
}

#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db: DatabaseConnection,
    writer: Mutex<()>,
    revision: AtomicU64,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    /// Connect and migrate the schema
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let db = db::init_db(database_url).await?;
        Ok(Self::new(db))
    }

    /// Wrap an already migrated connection
    pub fn new(db: DatabaseConnection) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(StoreInner {
                db,
                writer: Mutex::new(()),
                revision: AtomicU64::new(0),
                changes,
            }),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.inner.db
    }

    /// Revision of the last committed write
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Commit notifications, starting with the next commit
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    /// Run `f` atomically. Every mutation made through the transaction commits
    /// together, or none persists if `f` returns an error.
    ///
    /// All reads inside `f` must go through the transaction it receives.
    pub async fn write<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxnFuture<'c, T> + Send,
        T: Send,
    {
        let _guard = self.inner.writer.lock().await;

        let value = self
            .inner
            .db
            .transaction::<_, T, StoreError>(f)
            .await
            .map_err(|e| match e {
                TransactionError::Connection(e) => StoreError::from(e),
                TransactionError::Transaction(e) => e,
            })?;

        let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine
        let _ = self.inner.changes.send(StoreChange { revision });

        Ok(value)
    }

    pub async fn find_by_id(&self, local_id: &str) -> Result<Option<Book>, StoreError> {
        let books = load_books(&self.inner.db, &BookFilter::by_local_id(local_id)).await?;
        Ok(books.into_iter().next())
    }

    pub async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<Book>, StoreError> {
        if remote_id.is_empty() {
            return Ok(None);
        }
        let books = load_books(&self.inner.db, &BookFilter::by_remote_id(remote_id)).await?;
        Ok(books.into_iter().next())
    }

    pub async fn find_author_by_name(&self, full_name: &str) -> Result<Option<Author>, StoreError> {
        let Some(model) = AuthorEntity::find()
            .filter(author::Column::FullName.eq(full_name))
            .one(&self.inner.db)
            .await?
        else {
            return Ok(None);
        };

        let book_ids = book_ids_of_author(&self.inner.db, &model.id).await?;
        Ok(Some(Author::from_model(model, book_ids)))
    }

    pub async fn list_authors(&self) -> Result<Vec<Author>, StoreError> {
        let authors = AuthorEntity::find()
            .order_by_asc(author::Column::FullName)
            .all(&self.inner.db)
            .await?;

        let mut result = Vec::with_capacity(authors.len());
        for model in authors {
            let book_ids = book_ids_of_author(&self.inner.db, &model.id).await?;
            result.push(Author::from_model(model, book_ids));
        }
        Ok(result)
    }

    /// Books of the author named `full_name`, in the order they were attached
    pub async fn books_of_author(&self, full_name: &str) -> Result<Vec<Book>, StoreError> {
        let Some(author) = self.find_author_by_name(full_name).await? else {
            return Ok(Vec::new());
        };

        let filter = BookFilter {
            author: Some(full_name.to_string()),
            ..Default::default()
        };
        let mut books = self.books(&filter).await?;
        books.sort_by_key(|b| author.book_ids.iter().position(|id| *id == b.id));
        Ok(books)
    }

    pub async fn books(&self, filter: &BookFilter) -> Result<Vec<Book>, StoreError> {
        load_books(&self.inner.db, filter).await
    }

    pub async fn count_books(&self) -> Result<u64, StoreError> {
        Ok(BookEntity::find().count(&self.inner.db).await?)
    }

    /// Snapshot of the books matching `filter`, kept current after every commit.
    pub async fn query(&self, filter: BookFilter) -> Result<LiveQuery, StoreError> {
        // Subscribe before reading so no commit falls between snapshot and stream
        let mut changes = self.changes();
        let snapshot = self.books(&filter).await?;
        let (tx, rx) = watch::channel(snapshot.clone());

        let store = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    change = changes.recv() => match change {
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }

                match store.books(&filter).await {
                    Ok(books) => {
                        tx.send_if_modified(|current| {
                            if *current == books {
                                false
                            } else {
                                *current = books;
                                true
                            }
                        });
                    }
                    Err(e) => tracing::warn!("Live query refresh failed: {}", e),
                }
            }
        });

        Ok(LiveQuery {
            snapshot,
            updates: rx,
            task,
        })
    }
}

/// Initial snapshot plus a stream of later results.
///
/// Updates are coalesced: a slow consumer sees the latest result, not every
/// intermediate one. Dropping the query stops its refresh task.
pub struct LiveQuery {
    snapshot: Vec<Book>,
    updates: watch::Receiver<Vec<Book>>,
    task: JoinHandle<()>,
}

impl LiveQuery {
    /// Result at the time the query was opened
    pub fn snapshot(&self) -> &[Book] {
        &self.snapshot
    }

    /// Latest known result
    pub fn current(&self) -> Vec<Book> {
        self.updates.borrow().clone()
    }

    /// Wait for the next changed result. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Vec<Book>> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Load books matching `filter` with their author and ordered images.
///
/// Generic over the connection so merges can read through their transaction.
pub async fn load_books<C: ConnectionTrait>(
    conn: &C,
    filter: &BookFilter,
) -> Result<Vec<Book>, StoreError> {
    let mut query = BookEntity::find();

    if let Some(id) = &filter.local_id {
        query = query.filter(book::Column::Id.eq(id.as_str()));
    }

    if let Some(remote_id) = &filter.remote_id {
        query = query.filter(book::Column::RemoteId.eq(remote_id.as_str()));
    }

    if let Some(title) = &filter.title
        && !title.is_empty()
    {
        query = query.filter(book::Column::Title.contains(title));
    }

    if let Some(name) = &filter.author {
        let author = AuthorEntity::find()
            .filter(author::Column::FullName.eq(name.as_str()))
            .one(conn)
            .await?;
        match author {
            Some(a) => query = query.filter(book::Column::AuthorId.eq(a.id)),
            None => return Ok(Vec::new()),
        }
    }

    let models = query
        .order_by_asc(book::Column::CreatedAt)
        .order_by_asc(book::Column::Id)
        .all(conn)
        .await?;

    if models.is_empty() {
        return Ok(Vec::new());
    }

    let author_ids: Vec<String> = models.iter().filter_map(|m| m.author_id.clone()).collect();
    let authors: HashMap<String, author::Model> = AuthorEntity::find()
        .filter(author::Column::Id.is_in(author_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();

    let book_ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
    let mut images: HashMap<String, Vec<book_image::Model>> = HashMap::new();
    for image in BookImageEntity::find()
        .filter(book_image::Column::BookId.is_in(book_ids))
        .order_by_asc(book_image::Column::BookId)
        .order_by_asc(book_image::Column::Position)
        .all(conn)
        .await?
    {
        images.entry(image.book_id.clone()).or_default().push(image);
    }

    Ok(models
        .into_iter()
        .map(|model| {
            let author = model.author_id.as_ref().and_then(|id| authors.get(id));
            let book_images = images.remove(&model.id).unwrap_or_default();
            Book::from_parts(model, author, book_images)
        })
        .collect())
}

async fn book_ids_of_author<C: ConnectionTrait>(
    conn: &C,
    author_id: &str,
) -> Result<Vec<String>, StoreError> {
    Ok(BookEntity::find()
        .filter(book::Column::AuthorId.eq(author_id))
        .order_by_asc(book::Column::AuthorPosition)
        .all(conn)
        .await?
        .into_iter()
        .map(|b| b.id)
        .collect())
}
