//! Owner touch.
//!
//! An owning entity's modification marker moves whenever one of its nodes
//! stores a different result.

use calcgraph_core::Node;
use calcgraph_storage::Transaction;

use crate::error::EngineError;

/// Refreshes `updated` and bumps `revision` on `node`'s owner entity.
///
/// A node without an owner is a no-op. An owner reference naming an entity
/// that does not exist fails with `OwnerMissing`.
pub fn touch_owner(tx: &mut dyn Transaction, node: &Node) -> Result<(), EngineError> {
    let Some(owner) = &node.owner else {
        return Ok(());
    };
    let mut entity = tx
        .find_entity(&owner.collection, &owner.row)?
        .ok_or_else(|| EngineError::OwnerMissing {
            node: node.id.clone(),
            owner: owner.clone(),
        })?;
    entity.touch();
    tx.save_entity(&entity)?;
    tracing::debug!(node = %node.id, owner = %owner, revision = entity.revision, "touched owner");
    Ok(())
}
