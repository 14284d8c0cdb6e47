//! Core error types for calcgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the data model itself: malformed identifiers, malformed
//! owner triples and undecodable stored values.

use thiserror::Error;

/// Errors produced by the calcgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id is not a valid formula identifier.
    #[error("invalid node id '{id}': {reason}")]
    InvalidNodeId { id: String, reason: &'static str },

    /// An owner triple could not be parsed or has an empty component.
    #[error("invalid owner reference '{raw}': expected collection/row/field")]
    InvalidOwnerRef { raw: String },

    /// A stored value is not valid JSON.
    #[error("invalid stored value '{raw}': {source}")]
    InvalidValue {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// A computed value could not be serialized.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}
