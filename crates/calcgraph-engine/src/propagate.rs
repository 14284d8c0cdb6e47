//! Breadth-first change propagation.
//!
//! After a node is re-evaluated, every node that transitively depends on it
//! is re-evaluated in breadth-first order, each from the values currently
//! stored for its own dependencies. Only nodes whose stored result actually
//! changes are written and touch their owner.

use std::collections::VecDeque;

use calcgraph_core::{Node, NodeId};
use calcgraph_expr::Env;
use calcgraph_storage::{Edge, RecordReader, Transaction};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluate::{evaluate, Outcome};
use crate::owner::touch_owner;
use crate::resolver::stored_environment;

/// Evaluates `root` against `env`, stores it if its result changed, then
/// re-evaluates its dependents.
///
/// An unchanged root stops here unless `force` is set. Returns the root as
/// stored.
pub fn propagate(
    tx: &mut dyn Transaction,
    config: &EngineConfig,
    mut root: Node,
    env: &Env,
    force: bool,
) -> Result<Node, EngineError> {
    let outcome = evaluate(&root.id, &root.formula, env)?;
    let dirty = store_if_changed(tx, &mut root, outcome)?;
    if !dirty && !force {
        tracing::debug!(node = %root.id, "result unchanged, propagation skipped");
        return Ok(root);
    }

    // (node to visit, node it was reached from)
    let mut queue: VecDeque<(NodeId, NodeId)> = VecDeque::new();
    enqueue_dependents(&*tx, &root, &mut queue)?;

    let mut visits = 0usize;
    while let Some((id, via)) = queue.pop_front() {
        if id == root.id {
            return Err(EngineError::CircularDependency {
                from: via,
                to: root.id.clone(),
            });
        }
        visits += 1;
        if visits > config.max_propagation_visits {
            return Err(EngineError::PropagationLimit {
                root: root.id.clone(),
                limit: config.max_propagation_visits,
            });
        }

        let Some(mut node) = tx.find_node(&id)? else {
            continue;
        };
        let env = stored_environment(&*tx, &node)?;
        let outcome = evaluate(&node.id, &node.formula, &env)?;
        let changed = store_if_changed(tx, &mut node, outcome)?;
        tracing::debug!(node = %node.id, via = %via, changed, "propagated");

        enqueue_dependents(&*tx, &node, &mut queue)?;
    }

    tracing::debug!(root = %root.id, visits, "propagation finished");
    Ok(root)
}

/// Writes `outcome` into `node` and persists it if it differs from the stored
/// pair, touching the owner. Returns whether anything was written.
pub(crate) fn store_if_changed(
    tx: &mut dyn Transaction,
    node: &mut Node,
    outcome: Outcome,
) -> Result<bool, EngineError> {
    if node.result_matches(&outcome.value, &outcome.error) {
        return Ok(false);
    }
    node.value = outcome.value;
    node.error = outcome.error;
    tx.save_node(node)?;
    touch_owner(tx, node)?;
    Ok(true)
}

fn enqueue_dependents<R>(
    reader: &R,
    node: &Node,
    queue: &mut VecDeque<(NodeId, NodeId)>,
) -> Result<(), EngineError>
where
    R: RecordReader + ?Sized,
{
    for dependent in reader.expand(node, Edge::Dependents)? {
        queue.push_back((dependent.id, node.id.clone()));
    }
    Ok(())
}
