//! Sync coordinator
//!
//! Composes the catalog client and the local store. Remote calls always run
//! before the store write they feed and never while the writer lock is held.
//! Every failure is returned as a `SyncError`; nothing is retried here.

use std::sync::Arc;

use sea_orm::ConnectionTrait;

use super::merge::{self, MergeOutcome};
use crate::domain::{CatalogClient, ChangeType, DocumentChange, StoreError, SyncError};
use crate::infrastructure::store::LocalStore;
use crate::models::{BookEdit, CatalogRecord};

pub struct SyncCoordinator {
    store: LocalStore,
    catalog: Arc<dyn CatalogClient>,
}

impl SyncCoordinator {
    pub fn new(store: LocalStore, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Merge the recommended catalog in one transaction.
    /// Returns the number of merged records.
    pub async fn bootstrap_sync(&self) -> Result<usize, SyncError> {
        let records = self
            .catalog
            .get_recommended()
            .await
            .inspect_err(|e| tracing::error!("Bootstrap fetch failed: {}", e))?;

        let merged = self.merge_batch(records).await?;
        tracing::info!("Bootstrap sync merged {} records", merged);
        Ok(merged)
    }

    /// Merge search results for `query`. Rows missing from the results stay.
    pub async fn search_sync(&self, query: &str) -> Result<usize, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(0);
        }

        let records = self
            .catalog
            .search(query)
            .await
            .inspect_err(|e| tracing::error!("Search for '{}' failed: {}", query, e))?;

        let merged = self.merge_batch(records).await?;
        tracing::info!("Search '{}' merged {} records", query, merged);
        Ok(merged)
    }

    /// Create or update the local book for `record`, returning its local id.
    pub async fn upsert_merge(&self, record: CatalogRecord) -> Result<String, SyncError> {
        let outcome = self
            .store
            .write(move |txn| Box::pin(async move { merge::upsert_merge(txn, &record).await }))
            .await
            .inspect_err(|e| tracing::error!("Merge failed: {}", e))?;

        Ok(outcome.local_id)
    }

    /// Create the book remotely, then merge the server's record.
    /// Nothing is stored locally if the remote call fails.
    pub async fn create_local_draft(
        &self,
        title: &str,
        author_name: &str,
    ) -> Result<String, SyncError> {
        let draft = CatalogRecord::draft(title, author_name);
        let created = self
            .catalog
            .create(&draft)
            .await
            .inspect_err(|e| tracing::error!("Remote create of '{}' failed: {}", title, e))?;

        if created.id.is_empty() {
            return Err(SyncError::InvalidRecord(
                "catalog did not assign an id".to_string(),
            ));
        }

        let local_id = self.upsert_merge(created).await?;
        tracing::info!("Created book {} ('{}')", local_id, title);
        Ok(local_id)
    }

    /// Push `edit` for a synced book and merge what the server sends back.
    ///
    /// `Ok(None)` if no book has `local_id`.
    pub async fn update_remote_and_merge(
        &self,
        local_id: &str,
        edit: BookEdit,
    ) -> Result<Option<String>, SyncError> {
        let Some(book) = self.store.find_by_id(local_id).await? else {
            return Ok(None);
        };
        if !book.is_synced() {
            return Err(SyncError::NotSyncable(local_id.to_string()));
        }

        let record = edit.into_record(&book.remote_id);
        let mut canonical = self
            .catalog
            .update(&book.remote_id, &record)
            .await
            .inspect_err(|e| tracing::error!("Remote update of {} failed: {}", book.remote_id, e))?;
        if canonical.id.is_empty() {
            canonical.id = book.remote_id.clone();
        }

        self.upsert_merge(canonical).await.map(Some)
    }

    /// Delete remotely first, then locally. A remote failure keeps the local row.
    ///
    /// Returns false if no book has `local_id`.
    pub async fn delete_remote_and_local(&self, local_id: &str) -> Result<bool, SyncError> {
        let Some(book) = self.store.find_by_id(local_id).await? else {
            return Ok(false);
        };

        if book.is_synced() {
            self.catalog.delete(&book.remote_id).await.inspect_err(|e| {
                tracing::error!("Remote delete of {} failed, keeping local row: {}", book.remote_id, e)
            })?;
        }

        let local_id = local_id.to_string();
        let deleted = self
            .store
            .write(move |txn| {
                Box::pin(async move { merge::delete_book_cascade(txn, &local_id).await })
            })
            .await?;

        tracing::info!("Deleted book {} (remote '{}')", book.id, book.remote_id);
        Ok(deleted)
    }

    /// Re-fetch a synced book from the catalog and merge it.
    ///
    /// `Ok(None)` if no book has `local_id`.
    pub async fn refresh_from_remote(&self, local_id: &str) -> Result<Option<String>, SyncError> {
        let Some(book) = self.store.find_by_id(local_id).await? else {
            return Ok(None);
        };
        if !book.is_synced() {
            return Err(SyncError::NotSyncable(local_id.to_string()));
        }

        let mut record = self
            .catalog
            .get_by_id(&book.remote_id)
            .await
            .inspect_err(|e| tracing::error!("Refresh of {} failed: {}", book.remote_id, e))?;
        if record.id.is_empty() {
            record.id = book.remote_id.clone();
        }

        self.upsert_merge(record).await.map(Some)
    }

    /// Reconcile one realtime change in its own transaction.
    pub async fn apply_change(&self, change: DocumentChange) -> Result<(), SyncError> {
        if change.document_id.is_empty() {
            tracing::warn!("Ignoring {:?} change without document id", change.change_type);
            return Ok(());
        }

        match change.change_type {
            ChangeType::Added | ChangeType::Modified => {
                let record = CatalogRecord::from_document(&change.document_id, &change.payload)
                    .map_err(|e| {
                        tracing::warn!(
                            "Skipping undecodable document {}: {}",
                            change.document_id,
                            e
                        );
                        SyncError::InvalidRecord(e.to_string())
                    })?;
                let local_id = self.upsert_merge(record).await?;
                tracing::debug!("Realtime merge {} -> {}", change.document_id, local_id);
            }
            ChangeType::Removed => {
                let remote_id = change.document_id;
                let removed = self
                    .store
                    .write(move |txn| {
                        Box::pin(async move { merge::delete_by_remote_id(txn, &remote_id).await })
                    })
                    .await?;
                if let Some(local_id) = removed {
                    tracing::debug!("Realtime removal deleted book {}", local_id);
                }
            }
        }

        Ok(())
    }

    // Records without a remote id are skipped; the rest merge in one transaction.
    async fn merge_batch(&self, records: Vec<CatalogRecord>) -> Result<usize, SyncError> {
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| {
                if r.id.is_empty() {
                    tracing::warn!("Skipping catalog record without id: '{}'", r.title);
                }
                !r.id.is_empty()
            })
            .collect();
        if records.is_empty() {
            return Ok(0);
        }

        let outcomes = self
            .store
            .write(move |txn| Box::pin(async move { merge_all(txn, &records).await }))
            .await
            .inspect_err(|e| tracing::error!("Batch merge rolled back: {}", e))?;

        Ok(outcomes.len())
    }
}

async fn merge_all<C: ConnectionTrait>(
    conn: &C,
    records: &[CatalogRecord],
) -> Result<Vec<MergeOutcome>, StoreError> {
    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        outcomes.push(merge::upsert_merge(conn, record).await?);
    }
    Ok(outcomes)
}
