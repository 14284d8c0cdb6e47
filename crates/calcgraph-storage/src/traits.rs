//! The record-store contract the engine runs against.
//!
//! Three layers:
//! - [`RecordReader`]: lookups, available both on a store and inside a
//!   transaction.
//! - [`Transaction`]: raw writes. A raw save bypasses every engine hook and
//!   only validates field kinds.
//! - [`RecordStore`]: opens a transaction scope. The closure's `Ok` commits;
//!   any `Err` discards every write made inside it.
//!
//! All backends (InMemoryStore, SqliteStore) implement these traits with
//! identical semantics, so they are swappable without changing engine code.

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};

use crate::error::StorageError;

/// Edges between nodes that [`RecordReader::expand`] can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// From a node to the nodes its formula references.
    DependsOn,
    /// From a node to the nodes whose formulas reference it.
    Dependents,
}

/// Read access to nodes and entities.
pub trait RecordReader {
    /// Fetches one node by id.
    fn find_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError>;

    /// Batch fetch. Ids that do not exist are silently absent from the
    /// result, so the result may be shorter than `ids`.
    fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, StorageError>;

    /// Nodes whose `depends_on` contains `id`, ordered by id.
    fn find_dependents(&self, id: &NodeId) -> Result<Vec<Node>, StorageError>;

    /// The node owned by `owner`, if any.
    fn find_node_by_owner(&self, owner: &OwnerRef) -> Result<Option<Node>, StorageError>;

    /// Every node, ordered by id.
    fn list_nodes(&self) -> Result<Vec<Node>, StorageError>;

    fn find_entity(&self, collection: &str, id: &str) -> Result<Option<Entity>, StorageError>;

    /// Follows `edge` one step from `node`.
    fn expand(&self, node: &Node, edge: Edge) -> Result<Vec<Node>, StorageError> {
        match edge {
            Edge::DependsOn => {
                let ids: Vec<NodeId> = node.depends_on.iter().cloned().collect();
                self.find_nodes(&ids)
            }
            Edge::Dependents => self.find_dependents(&node.id),
        }
    }
}

/// Raw writes inside one transaction scope.
pub trait Transaction: RecordReader {
    /// Inserts or replaces a node.
    ///
    /// Fails with `IntegrityError` if another node already has the same
    /// owner triple.
    fn save_node(&mut self, node: &Node) -> Result<(), StorageError>;

    /// Deletes a node. Fails with `NodeNotFound` if it does not exist.
    fn delete_node(&mut self, id: &NodeId) -> Result<(), StorageError>;

    /// Inserts or replaces an entity.
    fn save_entity(&mut self, entity: &Entity) -> Result<(), StorageError>;

    /// Deletes an entity. Fails with `EntityNotFound` if it does not exist.
    fn delete_entity(&mut self, collection: &str, id: &str) -> Result<(), StorageError>;
}

/// A store that can open transaction scopes.
pub trait RecordStore: RecordReader {
    /// Runs `f` inside a transaction. Commits if `f` returns `Ok`, rolls back
    /// otherwise.
    fn run_in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>;
}
