//! Typed access to stored documents
//!
//! The single place raw documents become typed records. A document that
//! cannot be decoded at all is skipped with a warning; individual bad
//! fields are defaulted by the decoders in `models::defaults`.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::{Document, DocumentStore, Snapshot};
use crate::error::QuestError;
use crate::models::Record;

/// Decode one document, restoring its key from the envelope
pub fn decode<T: Record>(doc: &Document) -> Option<T> {
    match serde_json::from_value::<T>(doc.data.clone()) {
        Ok(mut record) => {
            record.set_id(doc.id.clone());
            Some(record)
        }
        Err(e) => {
            warn!(
                collection = %T::COLLECTION,
                id = %doc.id,
                error = %e,
                "Skipping malformed document"
            );
            None
        }
    }
}

/// Decode every well-formed document of a snapshot
pub fn decode_all<T: Record>(snapshot: &Snapshot) -> Vec<T> {
    snapshot.documents.iter().filter_map(decode::<T>).collect()
}

/// Encode a record as a document body
pub fn encode<T: Record>(record: &T) -> Result<Value, QuestError> {
    Ok(serde_json::to_value(record)?)
}

/// Typed reads over a [`DocumentStore`]
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn DocumentStore>,
}

impl Records {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fetch and decode one record; malformed documents read as absent
    pub async fn get<T: Record>(&self, id: &str) -> Result<Option<T>, QuestError> {
        Ok(self
            .store
            .get(T::COLLECTION, id)
            .await?
            .as_ref()
            .and_then(decode::<T>))
    }

    /// Fetch and decode a whole collection
    pub async fn list<T: Record>(&self) -> Result<Vec<T>, QuestError> {
        let snapshot = self.store.list(T::COLLECTION).await?;
        Ok(decode_all(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Habit, User};
    use crate::store::{Collection, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_restores_id_and_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(Collection::Habits, "h1", json!({ "userId": "user_a", "title": "MEDITATE" }))
            .await
            .unwrap();

        let records = Records::new(store);
        let habit: Habit = records.get("h1").await.unwrap().unwrap();
        assert_eq!(habit.id, "h1");
        assert_eq!(habit.streak, 0);
        assert_eq!(habit.last_completed, None);
    }

    #[tokio::test]
    async fn test_list_skips_malformed() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(Collection::Users, "user_a", json!({ "name": "A", "points": 120 }))
            .await
            .unwrap();
        store
            .set(Collection::Users, "user_b", json!({ "name": ["not", "text"], "points": "x" }))
            .await
            .unwrap();

        let records = Records::new(store);
        let users: Vec<User> = records.list().await.unwrap();
        // `text` accepts any JSON so user_b still decodes, with defaults
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].points, 120);
        assert_eq!(users[1].points, 0);
    }
}
