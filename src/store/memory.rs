//! In-memory document store
//!
//! Keeps every collection in a `BTreeMap` behind one lock, so a batch is
//! staged on copies of the touched collections and swapped in only when
//! every operation succeeded.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use super::{Collection, Document, DocumentStore, Snapshot, SnapshotHub, WriteBatch};
use crate::error::QuestError;

type CollectionMap = BTreeMap<String, Value>;

pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, CollectionMap>>,
    hub: SnapshotHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        let collections = Collection::ALL
            .into_iter()
            .map(|c| (c, CollectionMap::new()))
            .collect();

        Self {
            collections: RwLock::new(collections),
            hub: SnapshotHub::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_documents(map: &CollectionMap) -> Vec<Document> {
    map.iter()
        .map(|(id, data)| Document {
            id: id.clone(),
            data: data.clone(),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, QuestError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn list(&self, collection: Collection) -> Result<Snapshot, QuestError> {
        let collections = self.collections.read().await;
        let documents = collections
            .get(&collection)
            .map(to_documents)
            .unwrap_or_default();
        Ok(Snapshot {
            collection,
            version: self.hub.subscribe(collection).borrow().version,
            documents,
        })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), QuestError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let touched = batch.touched();

        let mut staged: HashMap<Collection, CollectionMap> = touched
            .iter()
            .map(|c| (*c, collections.get(c).cloned().unwrap_or_default()))
            .collect();

        for op in batch.ops() {
            let target = staged.entry(op.collection()).or_default();
            match op.apply(target.get(op.id()))? {
                Some(next) => {
                    target.insert(op.id().to_string(), next);
                }
                None => {
                    target.remove(op.id());
                }
            }
        }

        for (collection, map) in staged {
            let documents = to_documents(&map);
            collections.insert(collection, map);
            self.hub.publish(collection, documents);
        }

        debug!(ops = batch.len(), collections = ?touched, "Batch committed");
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> watch::Receiver<Arc<Snapshot>> {
        self.hub.subscribe(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_crud() {
        let store = MemoryStore::new();

        let id = store
            .create(Collection::Habits, json!({ "title": "WORKOUT" }))
            .await
            .unwrap();
        let doc = store.get(Collection::Habits, &id).await.unwrap().unwrap();
        assert_eq!(doc.data["title"], "WORKOUT");

        store
            .update(
                Collection::Habits,
                &id,
                json!({ "streak": 1 }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let doc = store.get(Collection::Habits, &id).await.unwrap().unwrap();
        assert_eq!(doc.data["streak"], 1);
        assert_eq!(doc.data["title"], "WORKOUT");

        store.delete(Collection::Habits, &id).await.unwrap();
        assert!(store.get(Collection::Habits, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_trace() {
        let store = MemoryStore::new();
        store
            .set(Collection::Users, "user_a", json!({ "points": 10 }))
            .await
            .unwrap();

        let batch = WriteBatch::new()
            .adjust(Collection::Users, "user_a", "points", 50)
            .update(Collection::Habits, "missing", serde_json::Map::new());
        assert!(store.commit(batch).await.is_err());

        let user = store.get(Collection::Users, "user_a").await.unwrap().unwrap();
        assert_eq!(user.data["points"], 10);
    }

    #[tokio::test]
    async fn test_subscribers_receive_full_snapshots() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe(Collection::Habits);

        store
            .set(Collection::Habits, "h1", json!({ "title": "A" }))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().documents.len(), 1);

        store
            .set(Collection::Habits, "h2", json!({ "title": "B" }))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.documents.len(), 2);
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn test_untouched_collections_not_republished() {
        let store = MemoryStore::new();
        let rx = store.subscribe(Collection::Feed);

        store
            .set(Collection::Users, "user_a", json!({}))
            .await
            .unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
