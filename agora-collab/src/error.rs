//! Error types for the collection layer.
//!
//! Reads never fail: an unbound collection reads as empty. Only the store
//! collaborator and record (de)serialization surface errors.

use thiserror::Error;

/// Failures reported by a replicated store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Collection closed: {0}")]
    Closed(String),
    #[error("Access denied: {writer} may not write '{id}' in {collection}")]
    AccessDenied {
        collection: String,
        writer: String,
        id: String,
    },
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Not connected")]
    NotConnected,
}

/// Errors surfaced by collections and page data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollabError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Collection already bound: {0}")]
    AlreadyBound(String),
    #[error("Page data not initialized")]
    NotInitialized,
    #[error("Unknown debate: {0}")]
    UnknownDebate(String),
    #[error("Only the debate owner may do this")]
    NotOwner,
    #[error("Debate {0} has not started")]
    MissingStartCode(String),
}

impl From<serde_json::Error> for CollabError {
    fn from(e: serde_json::Error) -> Self {
        CollabError::Serialization(e.to_string())
    }
}
