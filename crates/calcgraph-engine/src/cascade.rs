//! Deletion cascade.
//!
//! Deleting a node rewrites every direct dependent's formula so the dead
//! reference is visible in its text, then degrades everything downstream to
//! `#REF!` through a forced propagation.

use calcgraph_core::{encode_sentinel, NodeId, Sentinel};
use calcgraph_expr::replace_reference;
use calcgraph_storage::{Edge, Transaction};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluate::MISSING_REFERENCE;
use crate::owner::touch_owner;
use crate::propagate::propagate;
use crate::resolver::stored_environment;

/// Deletes node `id` and rewrites its dependents. Fails with `NodeNotFound`
/// if the node does not exist.
pub fn cascade_delete(
    tx: &mut dyn Transaction,
    config: &EngineConfig,
    id: &NodeId,
) -> Result<(), EngineError> {
    let target = tx
        .find_node(id)?
        .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;

    let direct: Vec<NodeId> = tx
        .expand(&target, Edge::Dependents)?
        .into_iter()
        .map(|n| n.id)
        .collect();
    for dependent_id in &direct {
        // Re-read: an earlier iteration's propagation may have rewritten it.
        let Some(mut dependent) = tx.find_node(dependent_id)? else {
            continue;
        };
        dependent.formula = replace_reference(&dependent.formula, id.as_str(), Sentinel::Ref.token());
        dependent.depends_on.remove(id);

        let value = encode_sentinel(Sentinel::Ref);
        let changed = !dependent.result_matches(&value, MISSING_REFERENCE);
        dependent.value = value;
        dependent.error = MISSING_REFERENCE.to_string();
        tx.save_node(&dependent)?;
        if changed {
            touch_owner(tx, &dependent)?;
        }
        tracing::debug!(node = %dependent.id, deleted = %id, "rewrote dead reference");

        let env = stored_environment(&*tx, &dependent)?;
        propagate(tx, config, dependent, &env, true)?;
    }

    tx.delete_node(id)?;
    tracing::debug!(node = %id, dependents = direct.len(), "deleted node");
    Ok(())
}
