//! Error types for habitquest

use thiserror::Error;

use crate::store::Collection;

#[derive(Error, Debug)]
pub enum QuestError {
    #[error("Unknown roster member: {0}")]
    UnknownMember(String),

    #[error("Incorrect PIN for {0}")]
    PinMismatch(String),

    #[error("Session missing or expired")]
    Unauthorized,

    #[error("{collection} document not found: {id}")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} document already exists: {id}")]
    AlreadyExists { collection: Collection, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Operation already in flight for {0}")]
    Busy(String),

    #[error("{0} is append-only")]
    AppendOnly(Collection),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuestError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// True for failures of the backing store rather than of the request
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::Database(_)
                | Self::Serialization(_)
                | Self::Io(_)
                | Self::Internal(_)
        )
    }
}
