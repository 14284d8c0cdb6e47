//! Engine error types.
//!
//! Every [`EngineError`] aborts the mutation that raised it and rolls back
//! its transaction. Formula runtime failures are not errors at this level:
//! they are stored as sentinel values (see [`crate::evaluate`]).

use calcgraph_core::{CoreError, NodeId, OwnerRef};
use calcgraph_expr::CompileError;
use calcgraph_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node {node} references itself in formula '{formula}'")]
    SelfReference { node: NodeId, formula: String },

    #[error("node {node} references missing node(s): {}", .missing.join(", "))]
    MissingDependency { node: NodeId, missing: Vec<String> },

    #[error("syntax error in formula of node {node} ('{formula}'): {source}")]
    SyntaxError {
        node: NodeId,
        formula: String,
        #[source]
        source: CompileError,
    },

    #[error("circular dependency between {from} and {to}")]
    CircularDependency { from: NodeId, to: NodeId },

    #[error("owner {owner} of node {node} does not exist")]
    OwnerMissing { node: NodeId, owner: OwnerRef },

    #[error("owner of node {node} cannot be changed once set")]
    OwnerImmutable { node: NodeId },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("entity not found: {collection}/{id}")]
    EntityNotFound { collection: String, id: String },

    #[error("slot {collection}/{entity}/{slot} links node {node}, which belongs to another owner")]
    SlotHijack {
        collection: String,
        entity: String,
        slot: String,
        node: NodeId,
    },

    #[error("slot {collection}/{entity}/{slot} links missing node {node}")]
    SlotNodeMissing {
        collection: String,
        entity: String,
        slot: String,
        node: NodeId,
    },

    #[error("propagation from {root} exceeded {limit} visits")]
    PropagationLimit { root: NodeId, limit: usize },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("node {node} holds an undecodable value: {source}")]
    InvalidStoredValue {
        node: NodeId,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
