//! Gateway trait definitions
//!
//! These traits define the contract with the two remote sources of truth.
//! Implementations live in the infrastructure layer; tests substitute fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{CatalogError, ChannelError};
use crate::models::CatalogRecord;

/// Filter criteria for book queries against the local store.
///
/// All set fields must match; the default filter selects every book.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BookFilter {
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    /// Substring match on the title
    pub title: Option<String>,
    /// Exact match on the author's full name
    pub author: Option<String>,
}

impl BookFilter {
    pub fn by_local_id(id: impl Into<String>) -> Self {
        Self {
            local_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_remote_id(id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Request/response gateway to the catalog service.
///
/// Calls have no side effects beyond the network request and never retry.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search records by title
    async fn search(&self, title: &str) -> Result<Vec<CatalogRecord>, CatalogError>;

    /// Fetch the recommended (default) catalog
    async fn get_recommended(&self) -> Result<Vec<CatalogRecord>, CatalogError>;

    /// Fetch a single record, `CatalogError::NotFound` if absent
    async fn get_by_id(&self, id: &str) -> Result<CatalogRecord, CatalogError>;

    /// Create a record; the server assigns the id
    async fn create(&self, record: &CatalogRecord) -> Result<CatalogRecord, CatalogError>;

    /// Replace a record and return the server's canonical version
    async fn update(&self, id: &str, record: &CatalogRecord)
    -> Result<CatalogRecord, CatalogError>;

    /// Delete a record
    async fn delete(&self, id: &str) -> Result<(), CatalogError>;
}

/// Kind of change carried by a realtime document event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One document change pushed by the realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub document_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Item delivered on a subscription's event stream.
///
/// `Fatal` is always the last item: the subscription is `Closed` after it.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Change(DocumentChange),
    Fatal(ChannelError),
}

/// Lifecycle of a realtime subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Subscribing,
    Active,
    Closed,
}

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Bounded stream of feed items; a full buffer applies backpressure upstream.
pub type FeedStream = mpsc::Receiver<FeedItem>;

/// Long-lived push subscription to a document collection.
pub trait RealtimeFeed: Send + Sync {
    /// Start a subscription. Connection happens in the background; failures
    /// arrive as `FeedItem::Fatal` on the returned stream.
    fn subscribe(&self, collection: &str) -> (SubscriptionHandle, FeedStream);

    /// Tear down a subscription. Unknown or already-closed handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Current state; `Closed` once a handle is released, `Idle` for handles never issued.
    fn state(&self, handle: SubscriptionHandle) -> FeedState;
}
