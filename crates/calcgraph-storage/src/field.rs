//! Declared field kinds of stored records.
//!
//! Each column a backend writes is described by a [`FieldKind`]. Both
//! backends run [`validate_node`] / [`validate_entity`] before writing, so a
//! record the in-memory store rejects is rejected by SQLite as well.
//! Relations are encoded as JSON arrays of ids.

use calcgraph_core::{Entity, Node};

use crate::error::StorageError;

/// Kind of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain text; `required` rejects the empty string.
    Text { required: bool },
    /// JSON text; the empty string means "unset".
    Json,
    /// Ids of other records; `max_select` of `None` is unbounded.
    Relation { max_select: Option<usize> },
}

/// A field value in its in-memory form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Json(String),
    Relation(Vec<String>),
}

impl FieldValue {
    fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Json(_) => "json",
            FieldValue::Relation(_) => "relation",
        }
    }
}

impl FieldKind {
    /// Checks `value` against this kind.
    pub fn validate(&self, field: &'static str, value: &FieldValue) -> Result<(), StorageError> {
        let invalid = |reason: String| StorageError::InvalidField { field, reason };
        match (self, value) {
            (FieldKind::Text { required }, FieldValue::Text(text)) => {
                if *required && text.is_empty() {
                    return Err(invalid("value is required".to_string()));
                }
                Ok(())
            }
            (FieldKind::Json, FieldValue::Json(raw)) => {
                if raw.is_empty() {
                    return Ok(());
                }
                serde_json::from_str::<serde_json::Value>(raw)
                    .map(|_| ())
                    .map_err(|e| invalid(format!("not valid JSON: {e}")))
            }
            (FieldKind::Relation { max_select }, FieldValue::Relation(ids)) => {
                if let Some(max) = max_select {
                    if ids.len() > *max {
                        return Err(invalid(format!(
                            "at most {max} related record(s) allowed, got {}",
                            ids.len()
                        )));
                    }
                }
                if let Some(empty) = ids.iter().position(String::is_empty) {
                    return Err(invalid(format!("empty id at position {empty}")));
                }
                Ok(())
            }
            (kind, value) => Err(invalid(format!(
                "expected {kind:?}, got {} value",
                value.kind_name()
            ))),
        }
    }

    /// Validates and encodes `value` for a text column.
    pub fn encode(&self, field: &'static str, value: &FieldValue) -> Result<String, StorageError> {
        self.validate(field, value)?;
        match value {
            FieldValue::Text(s) | FieldValue::Json(s) => Ok(s.clone()),
            FieldValue::Relation(ids) => Ok(serde_json::to_string(ids)?),
        }
    }

    /// Decodes a text column written by [`FieldKind::encode`].
    pub fn decode(&self, field: &'static str, raw: &str) -> Result<FieldValue, StorageError> {
        let value = match self {
            FieldKind::Text { .. } => FieldValue::Text(raw.to_string()),
            FieldKind::Json => FieldValue::Json(raw.to_string()),
            FieldKind::Relation { .. } if raw.is_empty() => FieldValue::Relation(Vec::new()),
            FieldKind::Relation { .. } => FieldValue::Relation(serde_json::from_str(raw)?),
        };
        self.validate(field, &value)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Record schemas
// ---------------------------------------------------------------------------

pub const FORMULA: FieldKind = FieldKind::Text { required: true };
pub const VALUE: FieldKind = FieldKind::Json;
pub const ERROR: FieldKind = FieldKind::Text { required: false };
pub const DEPENDS_ON: FieldKind = FieldKind::Relation { max_select: None };
/// Entity slots are single-select relations.
pub const SLOT: FieldKind = FieldKind::Relation {
    max_select: Some(1),
};

/// Validates every field of `node`.
pub fn validate_node(node: &Node) -> Result<(), StorageError> {
    FORMULA.validate("formula", &FieldValue::Text(node.formula.clone()))?;
    VALUE.validate("value", &FieldValue::Json(node.value.clone()))?;
    ERROR.validate("error", &FieldValue::Text(node.error.clone()))?;
    DEPENDS_ON.validate("depends_on", &relation(node.depends_on.iter().map(|id| id.as_str())))?;
    if let Some(owner) = &node.owner {
        let part = FieldKind::Text { required: true };
        part.validate("owner.collection", &FieldValue::Text(owner.collection.clone()))?;
        part.validate("owner.row", &FieldValue::Text(owner.row.clone()))?;
        part.validate("owner.field", &FieldValue::Text(owner.field.clone()))?;
    }
    Ok(())
}

/// Validates the key and slots of `entity`.
pub fn validate_entity(entity: &Entity) -> Result<(), StorageError> {
    let key = FieldKind::Text { required: true };
    key.validate("collection", &FieldValue::Text(entity.collection.clone()))?;
    key.validate("id", &FieldValue::Text(entity.id.clone()))?;
    for linked in entity.slots.values() {
        SLOT.validate("slot", &relation(linked.iter().map(|id| id.as_str())))?;
    }
    Ok(())
}

/// Builds a relation value from ids.
pub fn relation<'a>(ids: impl IntoIterator<Item = &'a str>) -> FieldValue {
    FieldValue::Relation(ids.into_iter().map(str::to_string).collect())
}
