//! Read models derived from the local store's live queries.
//!
//! The view never writes. It observes the store, so it shows the same data
//! whether a change came from a sync pass, a client edit or the realtime feed.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{BookFilter, StoreError};
use crate::infrastructure::store::{LiveQuery, LocalStore};
use crate::models::{Book, BookEdit};

/// Flattened list row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub author_name: String,
    pub rating: f64,
    pub primary_image_url: Option<String>,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author_name: book.author_name().to_string(),
            rating: book.detail.rating,
            primary_image_url: book.detail.primary_image_url().map(str::to_string),
        }
    }
}

/// Everything the detail screen shows for one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetailView {
    pub id: String,
    pub remote_id: String,
    pub title: String,
    pub author_name: String,
    pub image_urls: Vec<String>,
    pub description: String,
    pub summary: String,
    pub language: String,
    pub publisher: String,
    pub publish_date: String,
    pub pages: i32,
    pub rating: f64,
    pub rating_count: i32,
    pub price: f64,
    pub currency: String,
    pub categories: Vec<String>,
}

impl From<&Book> for BookDetailView {
    fn from(book: &Book) -> Self {
        let detail = &book.detail;
        Self {
            id: book.id.clone(),
            remote_id: book.remote_id.clone(),
            title: book.title.clone(),
            author_name: book.author_name().to_string(),
            image_urls: detail.images.iter().map(|i| i.url.clone()).collect(),
            description: detail.description.clone(),
            summary: detail.summary.clone(),
            language: detail.language.clone(),
            publisher: detail.publisher.clone(),
            publish_date: detail.publish_date.clone(),
            pages: detail.pages,
            rating: detail.rating,
            rating_count: detail.rating_count,
            price: detail.price,
            currency: detail.currency.clone(),
            categories: detail.categories.clone(),
        }
    }
}

impl From<&BookDetailView> for BookEdit {
    fn from(view: &BookDetailView) -> Self {
        Self {
            title: view.title.clone(),
            author_name: view.author_name.clone(),
            description: view.description.clone(),
            summary: view.summary.clone(),
            language: view.language.clone(),
            publisher: view.publisher.clone(),
            publish_date: view.publish_date.clone(),
            pages: view.pages,
            rating: view.rating,
            rating_count: view.rating_count,
            price: view.price,
            currency: view.currency.clone(),
            categories: view.categories.clone(),
            images: view.image_urls.clone(),
        }
    }
}

struct Selection {
    local_id: String,
    detail: watch::Receiver<Option<BookDetailView>>,
    task: JoinHandle<()>,
}

pub struct QueryView {
    store: LocalStore,
    books: watch::Receiver<Vec<BookSummary>>,
    books_task: JoinHandle<()>,
    selection: Mutex<Option<Selection>>,
}

impl QueryView {
    /// Open the all-books live query and start projecting it.
    pub async fn new(store: LocalStore) -> Result<Self, StoreError> {
        let live = store.query(BookFilter::default()).await?;
        let initial = project(live.snapshot(), |b| BookSummary::from(b));
        let (tx, rx) = watch::channel(initial);

        let books_task = tokio::spawn(forward(live, tx, |books| {
            project(&books, |b| BookSummary::from(b))
        }));

        Ok(Self {
            store,
            books: rx,
            books_task,
            selection: Mutex::new(None),
        })
    }

    /// Latest list rows, in store order
    pub fn books(&self) -> Vec<BookSummary> {
        self.books.borrow().clone()
    }

    /// Receiver that changes whenever the list rows change
    pub fn subscribe_books(&self) -> watch::Receiver<Vec<BookSummary>> {
        self.books.clone()
    }

    /// Read one book straight from the store.
    pub async fn detail(&self, local_id: &str) -> Result<Option<BookDetailView>, StoreError> {
        Ok(self
            .store
            .find_by_id(local_id)
            .await?
            .as_ref()
            .map(BookDetailView::from))
    }

    /// Make `local_id` the selected book and keep its detail live.
    ///
    /// The watch on the previously selected book is cancelled first.
    pub async fn select(&self, local_id: &str) -> Result<Option<BookDetailView>, StoreError> {
        self.dismiss();

        let live = self.store.query(BookFilter::by_local_id(local_id)).await?;
        let current = live.snapshot().first().map(BookDetailView::from);
        let (tx, rx) = watch::channel(current.clone());
        let task = tokio::spawn(forward(live, tx, |books| {
            books.first().map(BookDetailView::from)
        }));

        let previous = self.lock_selection().replace(Selection {
            local_id: local_id.to_string(),
            detail: rx,
            task,
        });
        // A concurrent select may have slipped in between dismiss and replace
        if let Some(previous) = previous {
            previous.task.abort();
        }

        Ok(current)
    }

    /// Detail of the selected book as last seen by its watch.
    pub fn selected(&self) -> Option<BookDetailView> {
        self.lock_selection()
            .as_ref()
            .and_then(|s| s.detail.borrow().clone())
    }

    pub fn selected_id(&self) -> Option<String> {
        self.lock_selection().as_ref().map(|s| s.local_id.clone())
    }

    /// Receiver for the selected book's detail; `None` if nothing is selected.
    pub fn watch_selected(&self) -> Option<watch::Receiver<Option<BookDetailView>>> {
        self.lock_selection().as_ref().map(|s| s.detail.clone())
    }

    /// Clear the selection and stop its watch.
    pub fn dismiss(&self) {
        if let Some(selection) = self.lock_selection().take() {
            selection.task.abort();
        }
    }

    fn lock_selection(&self) -> std::sync::MutexGuard<'_, Option<Selection>> {
        self.selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for QueryView {
    fn drop(&mut self) {
        self.books_task.abort();
        self.dismiss();
    }
}

fn project<T>(books: &[Book], f: impl Fn(&Book) -> T) -> Vec<T> {
    books.iter().map(f).collect()
}

// Pushes each live-query result through `map` until either side goes away.
async fn forward<T, M>(mut live: LiveQuery, tx: watch::Sender<T>, map: M)
where
    M: Fn(Vec<Book>) -> T,
{
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            next = live.changed() => match next {
                Some(books) => {
                    let _ = tx.send(map(books));
                }
                None => break,
            },
        }
    }
}
