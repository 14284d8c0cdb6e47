//! Storage error types for calcgraph-storage.
//!
//! [`StorageError`] covers backend failures (SQLite, migrations,
//! serialization), lookups of records that do not exist, field validation
//! failures, and integrity violations such as a duplicate owner triple.

use calcgraph_core::{CoreError, NodeId};
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored id or owner reference failed to parse.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A node with the given id does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// An entity with the given key does not exist.
    #[error("entity not found: {collection}/{id}")]
    EntityNotFound { collection: String, id: String },

    /// A field value does not satisfy its declared kind.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },
}
