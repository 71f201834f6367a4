//! Shared document store
//!
//! Keyed JSON documents in four collections, with atomic write batches and
//! live full-snapshot subscriptions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DocumentStore                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  get / list        - keyed reads, full collection snapshots      │
//! │  commit(batch)     - all-or-nothing Set/Update/Adjust/Delete/... │
//! │  subscribe(coll)   - watch channel of complete snapshots         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  MemoryStore       - process-local maps                          │
//! │  SledStore         - one sled tree per collection                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every commit that touches a collection publishes a new snapshot of the
//! whole collection. Subscribers replace their view with it; there are no
//! incremental deltas to merge.

pub mod memory;
pub mod records;
pub mod sled_store;

pub use memory::MemoryStore;
pub use records::Records;
pub use sled_store::SledStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::error::QuestError;
use crate::models::defaults::value_to_count;

/// The four shared collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Habits,
    Logs,
    Feed,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Habits,
        Collection::Logs,
        Collection::Feed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Habits => "habits",
            Collection::Logs => "logs",
            Collection::Feed => "feed",
        }
    }

    /// Feed events are never rewritten or removed
    pub fn is_append_only(&self) -> bool {
        matches!(self, Collection::Feed)
    }

    /// Storage name under a namespace, e.g. `habitquest_v1_users`
    pub fn physical_name(&self, namespace: &str) -> String {
        format!("{}_{}", namespace, self.name())
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document with its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Complete contents of one collection at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub collection: Collection,
    /// Incremented on every publish
    pub version: u64,
    /// Ordered by document id
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn empty(collection: Collection) -> Self {
        Self {
            collection,
            version: 0,
            documents: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents
            .binary_search_by(|d| d.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.documents[i])
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

// ============================================================================
// Write batches
// ============================================================================

/// A single write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite the whole document
    Set {
        collection: Collection,
        id: String,
        data: Value,
    },
    /// Merge top-level fields into an existing document
    Update {
        collection: Collection,
        id: String,
        fields: Map<String, Value>,
    },
    /// Add `delta` to an integer field of an existing document, never going
    /// below `floor`. A missing or non-numeric field counts as 0.
    Adjust {
        collection: Collection,
        id: String,
        field: String,
        delta: i64,
        floor: i64,
    },
    /// Remove a document; removing a missing document is a no-op
    Delete { collection: Collection, id: String },
    /// Insert a new document; the id must be unused
    Append {
        collection: Collection,
        id: String,
        data: Value,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Adjust { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::Append { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. }
            | WriteOp::Update { id, .. }
            | WriteOp::Adjust { id, .. }
            | WriteOp::Delete { id, .. }
            | WriteOp::Append { id, .. } => id,
        }
    }

    /// Reject writes a collection does not accept
    pub fn validate(&self) -> Result<(), QuestError> {
        let collection = self.collection();
        if collection.is_append_only() && !matches!(self, WriteOp::Append { .. }) {
            return Err(QuestError::AppendOnly(collection));
        }
        if self.id().is_empty() {
            return Err(QuestError::InvalidInput(format!(
                "empty document id in {}",
                collection
            )));
        }
        match self {
            WriteOp::Set { data, .. } | WriteOp::Append { data, .. } if !data.is_object() => {
                Err(QuestError::InvalidInput(format!(
                    "{} documents must be JSON objects",
                    collection
                )))
            }
            _ => Ok(()),
        }
    }

    /// Compute the new state of the target document
    ///
    /// `None` for `current` means the document does not exist; a `None`
    /// result means the document must be removed.
    pub fn apply(&self, current: Option<&Value>) -> Result<Option<Value>, QuestError> {
        match self {
            WriteOp::Set { data, .. } => Ok(Some(data.clone())),
            WriteOp::Update {
                collection,
                id,
                fields,
            } => {
                let mut doc = existing_object(*collection, id, current)?;
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
                Ok(Some(Value::Object(doc)))
            }
            WriteOp::Adjust {
                collection,
                id,
                field,
                delta,
                floor,
            } => {
                let mut doc = existing_object(*collection, id, current)?;
                let current_value = doc
                    .get(field)
                    .map(value_to_count)
                    .unwrap_or(0)
                    .min(i64::MAX as u64) as i64;
                let adjusted = current_value.saturating_add(*delta).max(*floor);
                doc.insert(field.clone(), Value::from(adjusted));
                Ok(Some(Value::Object(doc)))
            }
            WriteOp::Delete { .. } => Ok(None),
            WriteOp::Append {
                collection,
                id,
                data,
            } => {
                if current.is_some() {
                    return Err(QuestError::AlreadyExists {
                        collection: *collection,
                        id: id.clone(),
                    });
                }
                Ok(Some(data.clone()))
            }
        }
    }
}

fn existing_object(
    collection: Collection,
    id: &str,
    current: Option<&Value>,
) -> Result<Map<String, Value>, QuestError> {
    match current {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Ok(Map::new()),
        None => Err(QuestError::not_found(collection, id)),
    }
}

/// Ordered set of writes committed all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn set(self, collection: Collection, id: impl Into<String>, data: Value) -> Self {
        self.push(WriteOp::Set {
            collection,
            id: id.into(),
            data,
        })
    }

    pub fn update(
        self,
        collection: Collection,
        id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        self.push(WriteOp::Update {
            collection,
            id: id.into(),
            fields,
        })
    }

    /// Clamped add, floor 0
    pub fn adjust(
        self,
        collection: Collection,
        id: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> Self {
        self.push(WriteOp::Adjust {
            collection,
            id: id.into(),
            field: field.into(),
            delta,
            floor: 0,
        })
    }

    pub fn delete(self, collection: Collection, id: impl Into<String>) -> Self {
        self.push(WriteOp::Delete {
            collection,
            id: id.into(),
        })
    }

    pub fn append(self, collection: Collection, id: impl Into<String>, data: Value) -> Self {
        self.push(WriteOp::Append {
            collection,
            id: id.into(),
            data,
        })
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Collections written by this batch, in [`Collection::ALL`] order
    pub fn touched(&self) -> Vec<Collection> {
        Collection::ALL
            .into_iter()
            .filter(|c| self.ops.iter().any(|op| op.collection() == *c))
            .collect()
    }

    pub fn validate(&self) -> Result<(), QuestError> {
        self.ops.iter().try_for_each(WriteOp::validate)
    }
}

// ============================================================================
// Store trait
// ============================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, QuestError>;

    /// Read the whole collection
    async fn list(&self, collection: Collection) -> Result<Snapshot, QuestError>;

    /// Apply every operation of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), QuestError>;

    /// Live snapshots of a collection; the current value is available immediately
    fn subscribe(&self, collection: Collection) -> watch::Receiver<Arc<Snapshot>>;

    /// Persist buffered writes
    async fn flush(&self) -> Result<(), QuestError> {
        Ok(())
    }

    /// Insert a document under a generated id
    async fn create(&self, collection: Collection, data: Value) -> Result<String, QuestError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.commit(WriteBatch::new().append(collection, id.clone(), data))
            .await?;
        Ok(id)
    }

    async fn set(&self, collection: Collection, id: &str, data: Value) -> Result<(), QuestError> {
        self.commit(WriteBatch::new().set(collection, id, data)).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), QuestError> {
        self.commit(WriteBatch::new().update(collection, id, fields))
            .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), QuestError> {
        self.commit(WriteBatch::new().delete(collection, id)).await
    }

    /// Append-only write for feed-style collections
    async fn append(&self, collection: Collection, data: Value) -> Result<String, QuestError> {
        self.create(collection, data).await
    }
}

// ============================================================================
// Snapshot publishing
// ============================================================================

/// Per-collection watch channels shared by the backends
pub(crate) struct SnapshotHub {
    senders: HashMap<Collection, watch::Sender<Arc<Snapshot>>>,
}

impl SnapshotHub {
    pub(crate) fn new() -> Self {
        let senders = Collection::ALL
            .into_iter()
            .map(|c| {
                let (tx, _) = watch::channel(Arc::new(Snapshot::empty(c)));
                (c, tx)
            })
            .collect();
        Self { senders }
    }

    pub(crate) fn subscribe(&self, collection: Collection) -> watch::Receiver<Arc<Snapshot>> {
        self.sender(collection).subscribe()
    }

    /// Replace the published snapshot of `collection`
    pub(crate) fn publish(&self, collection: Collection, documents: Vec<Document>) {
        self.sender(collection).send_modify(|current| {
            let version = current.version + 1;
            *current = Arc::new(Snapshot {
                collection,
                version,
                documents,
            });
        });
        trace!(collection = %collection, "Snapshot published");
    }

    fn sender(&self, collection: Collection) -> &watch::Sender<Arc<Snapshot>> {
        // Constructed with every collection
        &self.senders[&collection]
    }
}
