//! Dependency resolution.
//!
//! Turns a formula's identifiers into the node's `depends_on` set and into
//! the environment the formula is evaluated against.

use std::collections::{BTreeSet, VecDeque};

use calcgraph_core::{Node, NodeId};
use calcgraph_expr::{extract_identifiers, Env, Value};
use calcgraph_storage::{Edge, RecordReader, Transaction};

use crate::error::EngineError;

/// Resolves `node.formula`, stores the new `depends_on` with a raw save, and
/// returns the evaluation environment.
///
/// Fails with `SelfReference` if the formula names the node itself,
/// `MissingDependency` if any referenced node does not exist, and
/// `CircularDependency` if a referenced node already depends on this one.
pub fn resolve(tx: &mut dyn Transaction, node: &mut Node) -> Result<Env, EngineError> {
    let names = extract_identifiers(&node.formula);
    if names.contains(node.id.as_str()) {
        return Err(EngineError::SelfReference {
            node: node.id.clone(),
            formula: node.formula.clone(),
        });
    }

    // A name that is not a valid id cannot exist as a node.
    let ids: Vec<NodeId> = names
        .iter()
        .filter_map(|name| NodeId::new(name.as_str()).ok())
        .collect();
    let found = tx.find_nodes(&ids)?;
    if found.len() < names.len() {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !found.iter().any(|n| n.id.as_str() == name.as_str()))
            .cloned()
            .collect();
        return Err(EngineError::MissingDependency {
            node: node.id.clone(),
            missing,
        });
    }

    check_acyclic(&*tx, &node.id, &found)?;

    node.depends_on = found.iter().map(|n| n.id.clone()).collect();
    tx.save_node(node)?;
    tracing::debug!(node = %node.id, deps = node.depends_on.len(), "resolved dependencies");

    environment_of(&found)
}

/// Builds an environment from the stored values of `node`'s dependencies.
pub fn stored_environment<R>(reader: &R, node: &Node) -> Result<Env, EngineError>
where
    R: RecordReader + ?Sized,
{
    environment_of(&reader.expand(node, Edge::DependsOn)?)
}

fn environment_of(deps: &[Node]) -> Result<Env, EngineError> {
    deps.iter()
        .map(|dep| {
            let json = dep
                .decoded_value()
                .map_err(|source| EngineError::InvalidStoredValue {
                    node: dep.id.clone(),
                    source,
                })?;
            Ok((dep.id.to_string(), Value::from_json(&json)))
        })
        .collect()
}

/// Fails if `id` is reachable from any of `deps` through stored edges, which
/// would close a cycle once `id` depends on them.
fn check_acyclic<R>(reader: &R, id: &NodeId, deps: &[Node]) -> Result<(), EngineError>
where
    R: RecordReader + ?Sized,
{
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut queue: VecDeque<Node> = deps.iter().cloned().collect();
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.id.clone()) {
            continue;
        }
        if current.depends_on.contains(id) {
            return Err(EngineError::CircularDependency {
                from: id.clone(),
                to: current.id,
            });
        }
        let inputs = reader.expand(&current, Edge::DependsOn)?;
        queue.extend(inputs.into_iter().filter(|n| !visited.contains(&n.id)));
    }
    Ok(())
}
