//! In-memory implementation of the record-store traits.
//!
//! [`InMemoryStore`] is a first-class backend for tests and ephemeral use.
//! Records live in BTreeMaps with semantics identical to the SQLite backend.
//! A transaction works on a clone of the records that replaces the live copy
//! only when the closure succeeds.

use std::collections::BTreeMap;

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};

use crate::error::StorageError;
use crate::field::{validate_entity, validate_node};
use crate::traits::{RecordReader, RecordStore, Transaction};

/// All records of the in-memory backend.
#[derive(Debug, Clone, Default)]
struct Records {
    nodes: BTreeMap<NodeId, Node>,
    /// Owner triple to the node carrying it.
    owners: BTreeMap<OwnerRef, NodeId>,
    /// Entities keyed by (collection, id).
    entities: BTreeMap<(String, String), Entity>,
}

impl RecordReader for Records {
    fn find_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        Ok(self.nodes.get(id).cloned())
    }

    fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, StorageError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect())
    }

    fn find_dependents(&self, id: &NodeId) -> Result<Vec<Node>, StorageError> {
        Ok(self
            .nodes
            .values()
            .filter(|node| node.depends_on.contains(id))
            .cloned()
            .collect())
    }

    fn find_node_by_owner(&self, owner: &OwnerRef) -> Result<Option<Node>, StorageError> {
        Ok(self
            .owners
            .get(owner)
            .and_then(|id| self.nodes.get(id))
            .cloned())
    }

    fn list_nodes(&self) -> Result<Vec<Node>, StorageError> {
        Ok(self.nodes.values().cloned().collect())
    }

    fn find_entity(&self, collection: &str, id: &str) -> Result<Option<Entity>, StorageError> {
        Ok(self
            .entities
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }
}

impl Transaction for Records {
    fn save_node(&mut self, node: &Node) -> Result<(), StorageError> {
        validate_node(node)?;

        if let Some(owner) = &node.owner {
            if let Some(holder) = self.owners.get(owner) {
                if *holder != node.id {
                    return Err(StorageError::IntegrityError {
                        reason: format!("owner {owner} already held by node {holder}"),
                    });
                }
            }
        }

        let previous_owner = self.nodes.get(&node.id).and_then(|n| n.owner.clone());
        if let Some(previous) = previous_owner {
            self.owners.remove(&previous);
        }
        if let Some(owner) = &node.owner {
            self.owners.insert(owner.clone(), node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn delete_node(&mut self, id: &NodeId) -> Result<(), StorageError> {
        let removed = self
            .nodes
            .remove(id)
            .ok_or_else(|| StorageError::NodeNotFound(id.clone()))?;
        if let Some(owner) = removed.owner {
            self.owners.remove(&owner);
        }
        Ok(())
    }

    fn save_entity(&mut self, entity: &Entity) -> Result<(), StorageError> {
        validate_entity(entity)?;
        self.entities.insert(
            (entity.collection.clone(), entity.id.clone()),
            entity.clone(),
        );
        Ok(())
    }

    fn delete_entity(&mut self, collection: &str, id: &str) -> Result<(), StorageError> {
        self.entities
            .remove(&(collection.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::EntityNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Records,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordReader for InMemoryStore {
    fn find_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.records.find_node(id)
    }

    fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, StorageError> {
        self.records.find_nodes(ids)
    }

    fn find_dependents(&self, id: &NodeId) -> Result<Vec<Node>, StorageError> {
        self.records.find_dependents(id)
    }

    fn find_node_by_owner(&self, owner: &OwnerRef) -> Result<Option<Node>, StorageError> {
        self.records.find_node_by_owner(owner)
    }

    fn list_nodes(&self) -> Result<Vec<Node>, StorageError> {
        self.records.list_nodes()
    }

    fn find_entity(&self, collection: &str, id: &str) -> Result<Option<Entity>, StorageError> {
        self.records.find_entity(collection, id)
    }
}

impl RecordStore for InMemoryStore {
    fn run_in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut working = self.records.clone();
        let out = f(&mut working)?;
        self.records = working;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let mut store = InMemoryStore::new();
        let result: Result<(), StorageError> = store.run_in_transaction(|tx| {
            tx.save_node(&Node::new(id("a"), "1"))?;
            Err(StorageError::IntegrityError {
                reason: "abort".into(),
            })
        });
        assert!(result.is_err());
        assert!(store.find_node(&id("a")).unwrap().is_none());
    }

    #[test]
    fn resaving_a_node_moves_its_owner_index() {
        let mut store = InMemoryStore::new();
        let owner = OwnerRef::new("orders", "o1", "total");
        store
            .run_in_transaction::<_, StorageError, _>(|tx| {
                tx.save_node(&Node::new(id("a"), "1").with_owner(owner.clone()))?;
                tx.save_node(&Node::new(id("a"), "2"))
            })
            .unwrap();
        assert!(store.find_node_by_owner(&owner).unwrap().is_none());
    }
}
