//! WebSocket realtime feed
//!
//! One connection per subscription. The socket reader pushes into a bounded
//! channel, so a slow consumer slows the reader down instead of queueing
//! frames without limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::{
    ChannelError, DocumentChange, FeedItem, FeedState, FeedStream, RealtimeFeed,
    SubscriptionHandle,
};

/// Live subscriptions. An entry lives from `subscribe` until the socket task
/// ends or the handle is released, whichever comes first.
#[derive(Default)]
struct Registry {
    states: DashMap<u64, FeedState>,
    tasks: DashMap<u64, JoinHandle<()>>,
}

impl Registry {
    fn release(&self, id: u64) {
        self.states.remove(&id);
        self.tasks.remove(&id);
    }
}

pub struct WsRealtimeFeed {
    url: String,
    buffer: usize,
    next_handle: AtomicU64,
    registry: Arc<Registry>,
}

impl WsRealtimeFeed {
    pub fn new(url: impl Into<String>, buffer: usize) -> Self {
        Self {
            url: url.into(),
            buffer: buffer.max(1),
            next_handle: AtomicU64::new(0),
            registry: Arc::new(Registry::default()),
        }
    }

    /// Number of subscriptions still holding a socket task
    pub fn tracked_subscriptions(&self) -> usize {
        self.registry.tasks.len()
    }
}

impl RealtimeFeed for WsRealtimeFeed {
    fn subscribe(&self, collection: &str) -> (SubscriptionHandle, FeedStream) {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(self.buffer);
        let (start_tx, start_rx) = oneshot::channel();
        self.registry.states.insert(id, FeedState::Subscribing);

        let task = tokio::spawn(run_subscription(
            id,
            self.url.clone(),
            collection.to_string(),
            tx,
            self.registry.clone(),
            start_rx,
        ));
        // The task waits for this signal, so its own cleanup always runs after the insert
        self.registry.tasks.insert(id, task);
        let _ = start_tx.send(());

        (SubscriptionHandle(id), rx)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some((_, task)) = self.registry.tasks.remove(&handle.0) {
            task.abort();
            tracing::debug!("Unsubscribed realtime handle {}", handle.0);
        }
        self.registry.states.remove(&handle.0);
    }

    fn state(&self, handle: SubscriptionHandle) -> FeedState {
        if let Some(state) = self.registry.states.get(&handle.0) {
            return *state;
        }
        // Issued handles that are no longer tracked have finished
        if handle.0 != 0 && handle.0 <= self.next_handle.load(Ordering::SeqCst) {
            FeedState::Closed
        } else {
            FeedState::Idle
        }
    }
}

async fn run_subscription(
    id: u64,
    url: String,
    collection: String,
    tx: mpsc::Sender<FeedItem>,
    registry: Arc<Registry>,
    start: oneshot::Receiver<()>,
) {
    if start.await.is_err() {
        registry.release(id);
        return;
    }

    let result = stream_changes(id, &url, &collection, &tx, &registry.states).await;
    registry.release(id);

    match result {
        Ok(()) => tracing::debug!("Realtime consumer for handle {} went away", id),
        Err(e) => {
            tracing::warn!("Realtime handle {} closed: {}", id, e);
            let _ = tx.send(FeedItem::Fatal(e)).await;
        }
    }
}

// Ok(()) means the receiving side was dropped.
async fn stream_changes(
    id: u64,
    url: &str,
    collection: &str,
    tx: &mpsc::Sender<FeedItem>,
    states: &DashMap<u64, FeedState>,
) -> Result<(), ChannelError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| ChannelError::Connect(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let request = json!({ "op": "subscribe", "collection": collection }).to_string();
    write
        .send(Message::Text(request))
        .await
        .map_err(|e| ChannelError::Socket(e.to_string()))?;
    // A released handle stays released
    if let Some(mut state) = states.get_mut(&id) {
        *state = FeedState::Active;
    }
    tracing::info!("Realtime subscription {} active on '{}'", id, collection);

    while let Some(frame) = read.next().await {
        match frame.map_err(|e| ChannelError::Socket(e.to_string()))? {
            Message::Text(text) => match serde_json::from_str::<DocumentChange>(&text) {
                Ok(change) => {
                    if tx.send(FeedItem::Change(change)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed realtime frame: {}", e),
            },
            Message::Ping(data) => write
                .send(Message::Pong(data))
                .await
                .map_err(|e| ChannelError::Socket(e.to_string()))?,
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by server".to_string());
                return Err(ChannelError::Closed(reason));
            }
            _ => {}
        }
    }

    Err(ChannelError::Closed("stream ended".to_string()))
}
