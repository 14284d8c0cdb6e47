//! The computed node and its owner triple.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encode::decode_value;
use crate::error::CoreError;
use crate::id::NodeId;

/// The external entity field a node augments: `collection/row/field`.
///
/// Write-once: once a node has an owner it can never change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub collection: String,
    pub row: String,
    pub field: String,
}

impl OwnerRef {
    pub fn new(
        collection: impl Into<String>,
        row: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        OwnerRef {
            collection: collection.into(),
            row: row.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection, self.row, self.field)
    }
}

impl FromStr for OwnerRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [collection, row, field]
                if !collection.is_empty() && !row.is_empty() && !field.is_empty() =>
            {
                Ok(OwnerRef::new(*collection, *row, *field))
            }
            _ => Err(CoreError::InvalidOwnerRef { raw: s.to_string() }),
        }
    }
}

/// A stored computed value.
///
/// `value` is JSON text (see [`crate::encode`]); `error` is empty iff `value`
/// is a genuine evaluation result rather than a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub formula: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub depends_on: BTreeSet<NodeId>,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

impl Node {
    /// Creates an unevaluated node with no owner.
    pub fn new(id: NodeId, formula: impl Into<String>) -> Self {
        Node {
            id,
            formula: formula.into(),
            value: String::new(),
            error: String::new(),
            depends_on: BTreeSet::new(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn decoded_value(&self) -> Result<serde_json::Value, CoreError> {
        decode_value(&self.value)
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_empty()
    }

    /// True when the stored `(value, error)` pair equals the given one.
    pub fn result_matches(&self, value: &str, error: &str) -> bool {
        self.value == value && self.error == error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_ref_parses_triple() {
        let owner: OwnerRef = "invoices/r1/total".parse().unwrap();
        assert_eq!(owner, OwnerRef::new("invoices", "r1", "total"));
        assert_eq!(owner.to_string(), "invoices/r1/total");
    }

    #[test]
    fn owner_ref_rejects_partial_triples() {
        assert!("invoices/r1".parse::<OwnerRef>().is_err());
        assert!("invoices//total".parse::<OwnerRef>().is_err());
        assert!("a/b/c/d".parse::<OwnerRef>().is_err());
    }

    #[test]
    fn new_node_is_unevaluated() {
        let node = Node::new(NodeId::new("a").unwrap(), "1");
        assert!(node.value.is_empty());
        assert!(node.is_healthy());
        assert_eq!(node.decoded_value().unwrap(), serde_json::Value::Null);
        assert!(node.result_matches("", ""));
    }
}
