//! Read-time access masking.
//!
//! A computed value leaks its inputs, so a requester sees a node's value only
//! if they can view the owner of every node it transitively depends on.
//! Masking works on the returned copy and never writes.

use std::collections::{BTreeSet, VecDeque};

use calcgraph_core::{encode_value, Node, NodeId};
use calcgraph_storage::{Edge, RecordReader};

use crate::access::AccessContext;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Returns the first node in `node`'s dependency closure whose owner the
/// requester cannot view, in breadth-first order.
///
/// A dependency without an owner, or whose owner entity is gone, blocks.
pub fn first_blocked<R>(
    reader: &R,
    node: &Node,
    ctx: &dyn AccessContext,
) -> Result<Option<NodeId>, EngineError>
where
    R: RecordReader + ?Sized,
{
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut queue: VecDeque<Node> = VecDeque::new();
    enqueue_inputs(reader, node, &mut visited, &mut queue)?;
    while let Some(dep) = queue.pop_front() {
        if !owner_viewable(reader, &dep, ctx)? {
            return Ok(Some(dep.id));
        }
        enqueue_inputs(reader, &dep, &mut visited, &mut queue)?;
    }
    Ok(None)
}

/// Queues the unvisited nodes `node` depends on. Dependencies that no longer
/// exist are skipped.
fn enqueue_inputs<R>(
    reader: &R,
    node: &Node,
    visited: &mut BTreeSet<NodeId>,
    queue: &mut VecDeque<Node>,
) -> Result<(), EngineError>
where
    R: RecordReader + ?Sized,
{
    let inputs = reader.expand(node, Edge::DependsOn)?;
    for id in &node.depends_on {
        if !inputs.iter().any(|input| &input.id == id) {
            tracing::debug!(node = %node.id, missing = %id, "skipped missing dependency while masking");
        }
    }
    for input in inputs {
        if visited.insert(input.id.clone()) {
            queue.push_back(input);
        }
    }
    Ok(())
}

/// True if `node` has an owner entity that exists and `ctx` can view.
pub fn owner_viewable<R>(reader: &R, node: &Node, ctx: &dyn AccessContext) -> Result<bool, EngineError>
where
    R: RecordReader + ?Sized,
{
    let Some(owner) = &node.owner else {
        return Ok(false);
    };
    Ok(reader
        .find_entity(&owner.collection, &owner.row)?
        .is_some_and(|entity| ctx.can_view(&entity)))
}

/// Masks `node` if any transitive dependency is hidden from the requester.
pub fn mask<R>(
    reader: &R,
    config: &EngineConfig,
    mut node: Node,
    ctx: &dyn AccessContext,
) -> Result<Node, EngineError>
where
    R: RecordReader + ?Sized,
{
    if ctx.is_superuser() {
        return Ok(node);
    }
    if let Some(blocked) = first_blocked(reader, &node, ctx)? {
        tracing::warn!(node = %node.id, blocked = %blocked, "masked value on read");
        node.value = encode_value(&serde_json::Value::String(config.unauthorized_token.clone()))?;
        node.error =
            format!("not authorized to read one or more dependencies (first blocked: {blocked})");
    }
    Ok(node)
}
