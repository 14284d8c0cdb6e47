//! Lifecycle entry points.
//!
//! [`Engine`] owns a record store and runs every mutation in one transaction
//! scope: a failure anywhere rolls back every write the mutation made. Reads
//! (`on_view_read`, `on_list_read`, `authorize_update`, `verify`) go straight
//! to the store.

use std::collections::VecDeque;

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};
use calcgraph_expr::extract_identifiers;
use calcgraph_storage::{Edge, RecordReader, RecordStore, Transaction};
use indexmap::IndexSet;

use crate::access::AccessContext;
use crate::cascade::cascade_delete;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluate::evaluate;
use crate::integrity::{inspect, DependencyGraph, IntegrityReport};
use crate::mask::{mask, owner_viewable};
use crate::propagate::{propagate, store_if_changed};
use crate::resolver::{resolve, stored_environment};

/// The reactive formula engine over a record store.
pub struct Engine<S: RecordStore> {
    store: S,
    config: EngineConfig,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Engine { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // -----------------------------------------------------------------------
    // Node lifecycle
    // -----------------------------------------------------------------------

    /// Creates a node with a generated id.
    pub fn create_node(
        &mut self,
        formula: impl Into<String>,
        owner: Option<OwnerRef>,
    ) -> Result<Node, EngineError> {
        let mut node = Node::new(NodeId::generate(), formula);
        node.owner = owner;
        self.on_create_or_update(node)
    }

    /// Fetches a stored node, unmasked.
    pub fn get_node(&self, id: &NodeId) -> Result<Node, EngineError> {
        self.store
            .find_node(id)?
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
    }

    /// Saves `node` and brings it and everything downstream up to date.
    ///
    /// Only `formula` and, on first set, `owner` are taken from the request;
    /// the stored result and dependencies are the engine's. Saving an
    /// existing node with an unchanged formula and owner is a no-op.
    pub fn on_create_or_update(&mut self, node: Node) -> Result<Node, EngineError> {
        let config = &self.config;
        let saved = self
            .store
            .run_in_transaction(|tx| save_and_evaluate(tx, config, node))?;
        tracing::info!(node = %saved.id, value = %saved.value, "saved node");
        Ok(saved)
    }

    /// Deletes a node, rewriting and degrading its dependents.
    pub fn on_delete(&mut self, id: &NodeId) -> Result<(), EngineError> {
        let config = &self.config;
        self.store
            .run_in_transaction(|tx| cascade_delete(tx, config, id))?;
        tracing::info!(node = %id, "deleted node");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Masks `node` if the requester cannot view every owner in its
    /// dependency closure.
    pub fn on_view_read(&self, node: Node, ctx: &dyn AccessContext) -> Result<Node, EngineError> {
        mask(&self.store, &self.config, node, ctx)
    }

    /// Drops nodes whose own owner the requester cannot view, then masks the
    /// rest.
    pub fn on_list_read(
        &self,
        nodes: Vec<Node>,
        ctx: &dyn AccessContext,
    ) -> Result<Vec<Node>, EngineError> {
        if ctx.is_superuser() {
            return Ok(nodes);
        }
        let mut visible = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !owner_viewable(&self.store, &node, ctx)? {
                tracing::debug!(node = %node.id, "hidden from list");
                continue;
            }
            visible.push(mask(&self.store, &self.config, node, ctx)?);
        }
        Ok(visible)
    }

    /// Checks that the requester may save `node` with its formula.
    ///
    /// The requester must be able to update the node's owner and to view the
    /// owner of every node the new formula transitively reads.
    pub fn authorize_update(&self, node: &Node, ctx: &dyn AccessContext) -> Result<(), EngineError> {
        if ctx.is_superuser() {
            return Ok(());
        }
        let forbidden = |reason: String| {
            tracing::warn!(node = %node.id, %reason, "update refused");
            EngineError::Forbidden { reason }
        };

        let stored = self.store.find_node(&node.id)?;
        let owner = stored
            .as_ref()
            .and_then(|n| n.owner.as_ref())
            .or(node.owner.as_ref())
            .ok_or_else(|| forbidden(format!("node {} has no owner", node.id)))?;
        let entity = self
            .store
            .find_entity(&owner.collection, &owner.row)?
            .ok_or_else(|| forbidden(format!("owner {owner} of node {} does not exist", node.id)))?;
        if !ctx.can_update(&entity) {
            return Err(forbidden(format!("not allowed to update {owner}")));
        }

        let names = extract_identifiers(&node.formula);
        let ids: Vec<NodeId> = names
            .iter()
            .filter_map(|name| NodeId::new(name.as_str()).ok())
            .collect();
        let referenced = self.store.find_nodes(&ids)?;
        if referenced.len() < names.len() {
            let missing = names
                .iter()
                .filter(|name| !referenced.iter().any(|n| n.id.as_str() == name.as_str()))
                .cloned()
                .collect();
            return Err(EngineError::MissingDependency {
                node: node.id.clone(),
                missing,
            });
        }

        let mut seen: IndexSet<NodeId> = referenced.iter().map(|n| n.id.clone()).collect();
        let mut queue: VecDeque<Node> = referenced.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if !owner_viewable(&self.store, &current, ctx)? {
                return Err(forbidden(format!("not allowed to reference {}", current.id)));
            }
            let inputs = self.store.expand(&current, Edge::DependsOn)?;
            queue.extend(inputs.into_iter().filter(|n| seen.insert(n.id.clone())));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Owner lifecycle
    // -----------------------------------------------------------------------

    /// Stores a new entity and provisions a node for each empty slot.
    ///
    /// A pre-linked slot must point at an existing node owned by exactly that
    /// slot. Returns the entity as stored, with every slot linked.
    pub fn on_entity_create(&mut self, entity: Entity) -> Result<Entity, EngineError> {
        let config = &self.config;
        let stored = self.store.run_in_transaction(|tx| {
            for (slot, linked) in &entity.slots {
                if let Some(node_id) = linked {
                    check_slot(&*tx, &entity, slot, node_id)?;
                }
            }
            tx.save_entity(&entity)?;

            let mut provisioned = Vec::new();
            for (slot, linked) in &entity.slots {
                if linked.is_some() {
                    continue;
                }
                let node = Node::new(NodeId::generate(), config.default_formula.clone())
                    .with_owner(entity.owner_ref(slot));
                let node = save_and_evaluate(tx, config, node)?;
                provisioned.push((slot.clone(), node.id));
            }

            // Provisioning touched the stored copy; link slots on that one.
            let mut stored = tx
                .find_entity(&entity.collection, &entity.id)?
                .ok_or_else(|| EngineError::EntityNotFound {
                    collection: entity.collection.clone(),
                    id: entity.id.clone(),
                })?;
            for (slot, node_id) in provisioned {
                stored.slots.insert(slot, Some(node_id));
            }
            tx.save_entity(&stored)?;
            Ok::<_, EngineError>(stored)
        })?;
        tracing::info!(
            collection = %stored.collection,
            entity = %stored.id,
            slots = stored.slots.len(),
            "created entity"
        );
        Ok(stored)
    }

    /// Deletes an entity together with every node its slots link.
    pub fn on_entity_delete(&mut self, collection: &str, id: &str) -> Result<(), EngineError> {
        let config = &self.config;
        self.store.run_in_transaction(|tx| {
            let entity = tx
                .find_entity(collection, id)?
                .ok_or_else(|| EngineError::EntityNotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (slot, linked) in &entity.slots {
                let Some(node_id) = linked else {
                    continue;
                };
                if tx.find_node(node_id)?.is_none() {
                    return Err(EngineError::SlotNodeMissing {
                        collection: entity.collection.clone(),
                        entity: entity.id.clone(),
                        slot: slot.clone(),
                        node: node_id.clone(),
                    });
                }
                cascade_delete(tx, config, node_id)?;
            }
            tx.delete_entity(collection, id)?;
            Ok::<_, EngineError>(())
        })?;
        tracing::info!(collection, entity = id, "deleted entity");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Reports cycles, dangling references, depends_on drift and missing
    /// owners across the whole store.
    pub fn verify(&self) -> Result<IntegrityReport, EngineError> {
        let nodes = self.store.list_nodes()?;
        let mut report = inspect(&nodes);
        for node in &nodes {
            if let Some(owner) = &node.owner {
                if self.store.find_entity(&owner.collection, &owner.row)?.is_none() {
                    report.missing_owners.push(node.id.clone());
                }
            }
        }
        Ok(report)
    }

    /// Re-evaluates every node, dependencies first, in one transaction.
    /// Returns how many nodes changed.
    pub fn recompute_all(&mut self) -> Result<usize, EngineError> {
        let changed = self.store.run_in_transaction(|tx| {
            let nodes = tx.list_nodes()?;
            let order = DependencyGraph::build(&nodes).evaluation_order()?;
            let mut changed = 0;
            for id in order {
                let Some(mut node) = tx.find_node(&id)? else {
                    continue;
                };
                let env = stored_environment(&*tx, &node)?;
                let outcome = evaluate(&node.id, &node.formula, &env)?;
                if store_if_changed(tx, &mut node, outcome)? {
                    changed += 1;
                }
            }
            Ok::<_, EngineError>(changed)
        })?;
        tracing::info!(changed, "recomputed all nodes");
        Ok(changed)
    }
}

/// Create-or-update path shared by client saves and slot provisioning.
fn save_and_evaluate(
    tx: &mut dyn Transaction,
    config: &EngineConfig,
    mut node: Node,
) -> Result<Node, EngineError> {
    match tx.find_node(&node.id)? {
        Some(existing) => {
            if existing.owner.is_some() && existing.owner != node.owner {
                return Err(EngineError::OwnerImmutable { node: node.id });
            }
            if existing.formula == node.formula && existing.owner == node.owner {
                return Ok(existing);
            }
            node.value = existing.value;
            node.error = existing.error;
            node.depends_on = existing.depends_on;
        }
        None => {
            node.value.clear();
            node.error.clear();
            node.depends_on.clear();
        }
    }

    tx.save_node(&node)?;
    let env = resolve(tx, &mut node)?;
    propagate(tx, config, node, &env, false)
}

fn check_slot<R>(reader: &R, entity: &Entity, slot: &str, node_id: &NodeId) -> Result<(), EngineError>
where
    R: RecordReader + ?Sized,
{
    let slot_error = |hijack: bool| {
        let (collection, entity, slot, node) = (
            entity.collection.clone(),
            entity.id.clone(),
            slot.to_string(),
            node_id.clone(),
        );
        if hijack {
            EngineError::SlotHijack {
                collection,
                entity,
                slot,
                node,
            }
        } else {
            EngineError::SlotNodeMissing {
                collection,
                entity,
                slot,
                node,
            }
        }
    };
    let node = reader.find_node(node_id)?.ok_or_else(|| slot_error(false))?;
    if node.owner.as_ref() != Some(&entity.owner_ref(slot)) {
        return Err(slot_error(true));
    }
    Ok(())
}
