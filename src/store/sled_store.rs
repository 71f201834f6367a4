//! Durable document store backed by sled
//!
//! One sled tree per collection, named `{namespace}_{collection}`. Values are
//! MessagePack-encoded JSON documents. Batches run as a single multi-tree
//! sled transaction.

use async_trait::async_trait;
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Collection, Document, DocumentStore, Snapshot, SnapshotHub, WriteBatch, WriteOp};
use crate::error::QuestError;

/// Configuration for the sled store
#[derive(Debug, Clone)]
pub struct SledStoreConfig {
    /// Path to sled database
    pub db_path: PathBuf,
    /// Prefix of the collection tree names
    pub namespace: String,
    /// Cache size in bytes
    pub cache_size: u64,
}

impl Default for SledStoreConfig {
    fn default() -> Self {
        Self {
            db_path: crate::config::default_storage_dir().join("documents.sled"),
            namespace: crate::config::DEFAULT_NAMESPACE.to_string(),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    habits: sled::Tree,
    logs: sled::Tree,
    feed: sled::Tree,
    hub: SnapshotHub,
    /// Serializes snapshot rebuilds so a stale listing is never published last
    publish_lock: Mutex<()>,
}

impl SledStore {
    /// Open or create the store
    pub async fn open(config: SledStoreConfig) -> Result<Self, QuestError> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = sled::Config::new()
            .path(&config.db_path)
            .cache_capacity(config.cache_size)
            .mode(sled::Mode::HighThroughput)
            .open()?;

        let open_tree = |c: Collection| db.open_tree(c.physical_name(&config.namespace));
        let users = open_tree(Collection::Users)?;
        let habits = open_tree(Collection::Habits)?;
        let logs = open_tree(Collection::Logs)?;
        let feed = open_tree(Collection::Feed)?;

        let store = Self {
            db,
            users,
            habits,
            logs,
            feed,
            hub: SnapshotHub::new(),
            publish_lock: Mutex::new(()),
        };

        // Seed the watch channels with what is already on disk
        for collection in Collection::ALL {
            store.publish(collection)?;
        }

        info!(
            path = %config.db_path.display(),
            namespace = %config.namespace,
            "SledStore initialized"
        );
        Ok(store)
    }

    /// Open a store at a specific path with the default namespace
    pub async fn at_path(path: impl AsRef<Path>) -> Result<Self, QuestError> {
        Self::open(SledStoreConfig {
            db_path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
        .await
    }

    fn tree(&self, collection: Collection) -> &sled::Tree {
        match collection {
            Collection::Users => &self.users,
            Collection::Habits => &self.habits,
            Collection::Logs => &self.logs,
            Collection::Feed => &self.feed,
        }
    }

    fn read_documents(&self, collection: Collection) -> Result<Vec<Document>, QuestError> {
        let mut documents = Vec::new();
        for item in self.tree(collection).iter() {
            let (key, bytes) = item?;
            let id = String::from_utf8_lossy(&key).to_string();
            match decode(&bytes) {
                Ok(data) => documents.push(Document { id, data }),
                Err(e) => warn!(collection = %collection, id = %id, error = %e, "Skipping undecodable document"),
            }
        }
        Ok(documents)
    }

    fn publish(&self, collection: Collection) -> Result<(), QuestError> {
        let _guard = self
            .publish_lock
            .lock()
            .map_err(|e| QuestError::Internal(format!("Lock poisoned: {}", e)))?;
        let documents = self.read_documents(collection)?;
        self.hub.publish(collection, documents);
        Ok(())
    }
}

fn encode(value: &Value) -> Result<Vec<u8>, QuestError> {
    rmp_serde::to_vec(value).map_err(|e| QuestError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Value, QuestError> {
    rmp_serde::from_slice(bytes).map_err(|e| QuestError::Serialization(e.to_string()))
}

/// Apply one operation inside the transaction
fn apply_in_tx(
    tree: &TransactionalTree,
    op: &WriteOp,
) -> Result<(), ConflictableTransactionError<QuestError>> {
    let key = op.id().as_bytes();
    let current = match tree.get(key)? {
        Some(bytes) => Some(decode(&bytes).map_err(ConflictableTransactionError::Abort)?),
        None => None,
    };

    match op.apply(current.as_ref()).map_err(ConflictableTransactionError::Abort)? {
        Some(next) => {
            let bytes = encode(&next).map_err(ConflictableTransactionError::Abort)?;
            tree.insert(key, bytes)?;
        }
        None => {
            tree.remove(key)?;
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, QuestError> {
        match self.tree(collection).get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Document {
                id: id.to_string(),
                data: decode(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Snapshot, QuestError> {
        let version = self.hub.subscribe(collection).borrow().version;
        Ok(Snapshot {
            collection,
            version,
            documents: self.read_documents(collection)?,
        })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), QuestError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let result = (&self.users, &self.habits, &self.logs, &self.feed).transaction(
            |(users, habits, logs, feed)| {
                for op in batch.ops() {
                    let tree = match op.collection() {
                        Collection::Users => users,
                        Collection::Habits => habits,
                        Collection::Logs => logs,
                        Collection::Feed => feed,
                    };
                    apply_in_tx(tree, op)?;
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(QuestError::Database(e)),
        }

        let touched = batch.touched();
        for collection in &touched {
            self.publish(*collection)?;
        }

        debug!(ops = batch.len(), collections = ?touched, "Batch committed");
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> watch::Receiver<Arc<Snapshot>> {
        self.hub.subscribe(collection)
    }

    async fn flush(&self) -> Result<(), QuestError> {
        self.db.flush_async().await?;
        Ok(())
    }
}
