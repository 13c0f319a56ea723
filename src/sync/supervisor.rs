//! Keeps a realtime subscription alive and feeds it into the coordinator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::coordinator::SyncCoordinator;
use crate::domain::{FeedItem, RealtimeFeed};

pub struct RealtimeSupervisor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RealtimeSupervisor {
    /// Subscribe to `collection` and reconcile every change until stopped.
    ///
    /// A fatal channel error or a closed stream leads to a new subscription
    /// after `resubscribe_delay`.
    pub fn start(
        feed: Arc<dyn RealtimeFeed>,
        coordinator: Arc<SyncCoordinator>,
        collection: String,
        resubscribe_delay: Duration,
    ) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                let (handle, mut events) = feed.subscribe(&collection);
                tracing::info!("Realtime subscription {:?} on '{}'", handle, collection);

                let stopped = loop {
                    tokio::select! {
                        _ = stop.changed() => break true,
                        item = events.recv() => match item {
                            Some(FeedItem::Change(change)) => {
                                let document_id = change.document_id.clone();
                                if let Err(e) = coordinator.apply_change(change).await {
                                    tracing::warn!("Realtime change {} not applied: {}", document_id, e);
                                }
                            }
                            Some(FeedItem::Fatal(e)) => {
                                tracing::error!("Realtime channel failed: {}", e);
                                break false;
                            }
                            None => {
                                tracing::warn!("Realtime stream ended");
                                break false;
                            }
                        },
                    }
                };

                feed.unsubscribe(handle);
                if stopped {
                    break;
                }

                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(resubscribe_delay) => {
                        tracing::info!("Resubscribing to '{}'", collection);
                    }
                }
            }
            tracing::info!("Realtime sync stopped");
        });

        Self { shutdown, task }
    }

    /// Stop the loop and release the live subscription.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Realtime supervisor task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
