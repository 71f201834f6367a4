//! Live view of the shared collections
//!
//! The LiveView follows the store's snapshot subscriptions and keeps the
//! latest snapshot of every collection. Each refresh replaces the held
//! snapshot wholesale and is rebroadcast to WebSocket clients.
//!
//! ## Architecture
//!
//! ```text
//! DocumentStore::subscribe (watch, one per collection)
//!     │
//!     └─► LiveView (latest snapshots + broadcast)
//!              │
//!              ├─► HTTP read endpoints
//!              └─► WebSocket clients (subscribed to chosen collections)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::Record;
use crate::store::records::decode_all;
use crate::store::{Collection, Document, DocumentStore, Snapshot};

/// Configuration for the live view
#[derive(Debug, Clone)]
pub struct LiveViewConfig {
    /// Broadcast channel capacity (default: 256)
    pub channel_capacity: usize,
    /// Heartbeat interval for WebSocket connections (default: 30s)
    pub heartbeat_interval: Duration,
}

impl Default for LiveViewConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Message types sent to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Complete contents of one collection; replaces the client's copy
    Snapshot {
        collection: Collection,
        version: u64,
        documents: Vec<Document>,
    },
    /// Periodic heartbeat
    Heartbeat { timestamp: String },
    /// Reply to a client ping
    Pong,
    /// Client sent something we could not use
    Error { message: String },
}

impl LiveMessage {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        LiveMessage::Snapshot {
            collection: snapshot.collection,
            version: snapshot.version,
            documents: snapshot.documents.clone(),
        }
    }

    /// Collection a snapshot message belongs to
    pub fn collection(&self) -> Option<Collection> {
        match self {
            LiveMessage::Snapshot { collection, .. } => Some(*collection),
            _ => None,
        }
    }
}

pub struct LiveView {
    config: LiveViewConfig,
    snapshots: Arc<RwLock<HashMap<Collection, Arc<Snapshot>>>>,
    updates_tx: broadcast::Sender<LiveMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveView {
    /// Start following every collection of `store`
    pub fn start(store: &Arc<dyn DocumentStore>, config: LiveViewConfig) -> Self {
        let (updates_tx, _) = broadcast::channel(config.channel_capacity);
        let snapshots: Arc<RwLock<HashMap<Collection, Arc<Snapshot>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let mut tasks = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let mut rx = store.subscribe(collection);
            let snapshots = snapshots.clone();
            let updates_tx = updates_tx.clone();

            tasks.push(tokio::spawn(async move {
                loop {
                    let snapshot = rx.borrow_and_update().clone();
                    let message = LiveMessage::from_snapshot(&snapshot);
                    snapshots.write().await.insert(collection, snapshot);
                    // No WebSocket clients is fine
                    let _ = updates_tx.send(message);

                    if rx.changed().await.is_err() {
                        debug!(collection = %collection, "Store closed, live view stops");
                        break;
                    }
                }
            }));
        }

        info!("LiveView started");
        Self {
            config,
            snapshots,
            updates_tx,
            tasks,
        }
    }

    pub fn config(&self) -> &LiveViewConfig {
        &self.config
    }

    /// Subscribe to snapshot refreshes
    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.updates_tx.subscribe()
    }

    /// Latest snapshot of a collection (empty until the first refresh)
    pub async fn snapshot(&self, collection: Collection) -> Arc<Snapshot> {
        self.snapshots
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_else(|| Arc::new(Snapshot::empty(collection)))
    }

    /// Typed records of the latest snapshot
    pub async fn records<T: Record>(&self) -> Vec<T> {
        let snapshot = self.snapshot(T::COLLECTION).await;
        decode_all(&*snapshot)
    }

    /// Current state of the given collections, for a newly connected client
    pub async fn initial_messages(&self, collections: &[Collection]) -> Vec<LiveMessage> {
        let snapshots = self.snapshots.read().await;
        collections
            .iter()
            .map(|c| match snapshots.get(c) {
                Some(snapshot) => LiveMessage::from_snapshot(snapshot),
                None => LiveMessage::from_snapshot(&Snapshot::empty(*c)),
            })
            .collect()
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
