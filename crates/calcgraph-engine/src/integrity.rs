//! Whole-graph checks and full recomputation.
//!
//! Builds a petgraph view of every stored node with an edge from each
//! dependency to its dependent.

use std::collections::{BTreeMap, BTreeSet};

use calcgraph_core::{Node, NodeId};
use calcgraph_expr::extract_identifiers;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::error::EngineError;

/// Findings of [`crate::Engine::verify`]. An empty report means the stored
/// graph satisfies every invariant the engine maintains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Strongly connected components with more than one node.
    pub cycles: Vec<Vec<NodeId>>,
    /// `(node, dependency)` pairs where the dependency does not exist.
    pub dangling: Vec<(NodeId, NodeId)>,
    /// Nodes whose `depends_on` differs from their formula's identifiers.
    pub drift: Vec<NodeId>,
    /// Nodes naming an owner entity that does not exist.
    pub missing_owners: Vec<NodeId>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty()
            && self.dangling.is_empty()
            && self.drift.is_empty()
            && self.missing_owners.is_empty()
    }
}

/// Dependency graph over a snapshot of nodes.
pub(crate) struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    dangling: Vec<(NodeId, NodeId)>,
}

impl DependencyGraph {
    pub(crate) fn build(nodes: &[Node]) -> Self {
        let mut graph = DiGraph::new();
        let index: BTreeMap<&NodeId, NodeIndex> = nodes
            .iter()
            .map(|node| (&node.id, graph.add_node(node.id.clone())))
            .collect();

        let mut dangling = Vec::new();
        for node in nodes {
            for dep in &node.depends_on {
                match (index.get(dep), index.get(&node.id)) {
                    (Some(&from), Some(&to)) => {
                        graph.add_edge(from, to, ());
                    }
                    _ => dangling.push((node.id.clone(), dep.clone())),
                }
            }
        }
        DependencyGraph { graph, dangling }
    }

    pub(crate) fn cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut ids: Vec<NodeId> = component
                    .into_iter()
                    .map(|ix| self.graph[ix].clone())
                    .collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Node ids with every dependency before its dependents.
    pub(crate) fn evaluation_order(&self) -> Result<Vec<NodeId>, EngineError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|ix| self.graph[ix].clone()).collect())
            .map_err(|cycle| {
                let id = self.graph[cycle.node_id()].clone();
                EngineError::CircularDependency {
                    from: id.clone(),
                    to: id,
                }
            })
    }
}

/// Checks `nodes` for cycles, dangling references and drift. Owner checks
/// need a store and are filled in by the caller.
pub(crate) fn inspect(nodes: &[Node]) -> IntegrityReport {
    let graph = DependencyGraph::build(nodes);
    let drift = nodes
        .iter()
        .filter(|node| !depends_on_matches_formula(node))
        .map(|node| node.id.clone())
        .collect();

    IntegrityReport {
        cycles: graph.cycles(),
        dangling: graph.dangling.clone(),
        drift,
        missing_owners: Vec::new(),
    }
}

fn depends_on_matches_formula(node: &Node) -> bool {
    let referenced: BTreeSet<String> = extract_identifiers(&node.formula).into_iter().collect();
    let stored: BTreeSet<String> = node.depends_on.iter().map(|id| id.to_string()).collect();
    referenced == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, formula: &str, deps: &[&str]) -> Node {
        let mut n = Node::new(NodeId::new(id).unwrap(), formula);
        n.depends_on = deps.iter().map(|d| NodeId::new(*d).unwrap()).collect();
        n
    }

    #[test]
    fn clean_graph_orders_dependencies_first() {
        let nodes = vec![
            node("c", "b + 2", &["b"]),
            node("a", "6", &[]),
            node("b", "a + 1", &["a"]),
        ];
        assert!(inspect(&nodes).is_clean());
        let order = DependencyGraph::build(&nodes).evaluation_order().unwrap();
        let pos = |id: &str| order.iter().position(|n| n.as_str() == id).unwrap();
        assert!(pos("a") < pos("b") && pos("b") < pos("c"));
    }

    #[test]
    fn cycles_dangling_and_drift_are_reported() {
        let nodes = vec![
            node("a", "b", &["b"]),
            node("b", "a", &["a"]),
            node("c", "gone", &["gone"]),
            node("d", "a + c", &["a"]),
        ];
        let report = inspect(&nodes);
        assert_eq!(
            report.cycles,
            vec![vec![NodeId::new("a").unwrap(), NodeId::new("b").unwrap()]]
        );
        assert_eq!(
            report.dangling,
            vec![(NodeId::new("c").unwrap(), NodeId::new("gone").unwrap())]
        );
        assert_eq!(report.drift, vec![NodeId::new("d").unwrap()]);
        assert!(matches!(
            DependencyGraph::build(&nodes).evaluation_order(),
            Err(EngineError::CircularDependency { .. })
        ));
    }

    #[test]
    fn rewritten_dead_references_are_not_drift() {
        assert!(inspect(&[node("d", "#REF! + 1", &[])]).is_clean());
    }
}
