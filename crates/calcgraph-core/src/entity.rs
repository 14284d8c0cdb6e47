//! The external record a node is created on behalf of.
//!
//! An [`Entity`] lives in some host collection. Its `slots` are the fields
//! that point at calculated nodes (single-select relations): one node per
//! slot, owned by the triple `(collection, id, slot)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::node::OwnerRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub collection: String,
    pub id: String,
    /// Modification marker refreshed whenever an owned node's output changes.
    pub updated: DateTime<Utc>,
    /// Bumped together with `updated`; strictly monotonic.
    pub revision: u64,
    #[serde(default)]
    pub slots: BTreeMap<String, Option<NodeId>>,
}

impl Entity {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Entity {
            collection: collection.into(),
            id: id.into(),
            updated: Utc::now(),
            revision: 0,
            slots: BTreeMap::new(),
        }
    }

    /// Declares an empty slot, to be provisioned on creation.
    pub fn with_slot(mut self, field: impl Into<String>) -> Self {
        self.slots.insert(field.into(), None);
        self
    }

    /// Declares a slot already linked to an existing node.
    pub fn with_linked_slot(mut self, field: impl Into<String>, node: NodeId) -> Self {
        self.slots.insert(field.into(), Some(node));
        self
    }

    /// The owner triple a node in `field` must carry.
    pub fn owner_ref(&self, field: &str) -> OwnerRef {
        OwnerRef::new(&self.collection, &self.id, field)
    }

    /// Refreshes the modification marker.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
        self.revision += 1;
    }

    /// Node ids currently linked from any slot, deduplicated in slot order.
    pub fn linked_nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for id in self.slots.values().flatten() {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }
}
