//! SQLite implementation of the record-store traits.
//!
//! [`SqliteStore`] persists nodes and entities in a SQLite database with WAL
//! mode and automatic schema migrations. `depends_on` is stored twice: as a
//! JSON array on the node row, and as rows of `node_dependencies` so that
//! dependent lookups hit an index. Every transaction scope is one
//! `rusqlite::Transaction`; dropping it without a commit rolls back.

use std::collections::{BTreeMap, BTreeSet};

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::StorageError;
use crate::field::{relation, validate_entity, validate_node, FieldValue, DEPENDS_ON};
use crate::traits::{RecordReader, RecordStore, Transaction};

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }
}

/// One open transaction scope.
struct SqliteTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const NODE_COLUMNS: &str =
    "id, formula, value, error, depends_on, owner_collection, owner_row, owner_field";

/// A node row as raw column text, before ids are validated.
struct NodeRow {
    id: String,
    formula: String,
    value: String,
    error: String,
    depends_on: String,
    owner: (Option<String>, Option<String>, Option<String>),
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(NodeRow {
            id: row.get(0)?,
            formula: row.get(1)?,
            value: row.get(2)?,
            error: row.get(3)?,
            depends_on: row.get(4)?,
            owner: (row.get(5)?, row.get(6)?, row.get(7)?),
        })
    }

    fn into_node(self) -> Result<Node, StorageError> {
        let depends_on = match DEPENDS_ON.decode("depends_on", &self.depends_on)? {
            FieldValue::Relation(ids) => ids
                .into_iter()
                .map(NodeId::new)
                .collect::<Result<BTreeSet<_>, _>>()?,
            other => {
                return Err(StorageError::IntegrityError {
                    reason: format!("depends_on of {} decoded as {other:?}", self.id),
                })
            }
        };
        let owner = match self.owner {
            (Some(collection), Some(row), Some(field)) => {
                Some(OwnerRef::new(collection, row, field))
            }
            (None, None, None) => None,
            _ => {
                return Err(StorageError::IntegrityError {
                    reason: format!("node {} has a partial owner reference", self.id),
                })
            }
        };
        Ok(Node {
            id: NodeId::new(self.id)?,
            formula: self.formula,
            value: self.value,
            error: self.error,
            depends_on,
            owner,
        })
    }
}

/// An entity row as raw column text.
struct EntityRow {
    collection: String,
    id: String,
    updated: String,
    revision: i64,
    slots: String,
}

impl EntityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(EntityRow {
            collection: row.get(0)?,
            id: row.get(1)?,
            updated: row.get(2)?,
            revision: row.get(3)?,
            slots: row.get(4)?,
        })
    }

    fn into_entity(self) -> Result<Entity, StorageError> {
        let updated = DateTime::parse_from_rfc3339(&self.updated)
            .map_err(|e| StorageError::IntegrityError {
                reason: format!(
                    "entity {}/{} has invalid timestamp '{}': {e}",
                    self.collection, self.id, self.updated
                ),
            })?
            .with_timezone(&Utc);
        let revision = u64::try_from(self.revision).map_err(|_| StorageError::IntegrityError {
            reason: format!(
                "entity {}/{} has negative revision {}",
                self.collection, self.id, self.revision
            ),
        })?;
        let slots: BTreeMap<String, Option<NodeId>> = serde_json::from_str(&self.slots)?;
        Ok(Entity {
            collection: self.collection,
            id: self.id,
            updated,
            revision,
            slots,
        })
    }
}

// ---------------------------------------------------------------------------
// Queries shared by the store and its transactions
// ---------------------------------------------------------------------------

fn query_nodes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Node>, StorageError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, NodeRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(NodeRow::into_node).collect()
}

fn find_node(conn: &Connection, id: &NodeId) -> Result<Option<Node>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
            params![id.as_str()],
            NodeRow::from_row,
        )
        .optional()?;
    row.map(NodeRow::into_node).transpose()
}

fn find_nodes(conn: &Connection, ids: &[NodeId]) -> Result<Vec<Node>, StorageError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    query_nodes(
        conn,
        &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id IN ({placeholders}) ORDER BY id"),
        params_from_iter(ids.iter().map(NodeId::as_str)),
    )
}

fn find_dependents(conn: &Connection, id: &NodeId) -> Result<Vec<Node>, StorageError> {
    query_nodes(
        conn,
        &format!(
            "SELECT {} FROM nodes n \
             JOIN node_dependencies d ON d.node_id = n.id \
             WHERE d.dependency_id = ?1 ORDER BY n.id",
            prefixed_node_columns()
        ),
        params![id.as_str()],
    )
}

fn prefixed_node_columns() -> String {
    NODE_COLUMNS
        .split(", ")
        .map(|column| format!("n.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn find_node_by_owner(conn: &Connection, owner: &OwnerRef) -> Result<Option<Node>, StorageError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {NODE_COLUMNS} FROM nodes \
                 WHERE owner_collection = ?1 AND owner_row = ?2 AND owner_field = ?3"
            ),
            params![owner.collection, owner.row, owner.field],
            NodeRow::from_row,
        )
        .optional()?;
    row.map(NodeRow::into_node).transpose()
}

fn list_nodes(conn: &Connection) -> Result<Vec<Node>, StorageError> {
    query_nodes(
        conn,
        &format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY id"),
        [],
    )
}

fn find_entity(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> Result<Option<Entity>, StorageError> {
    let row = conn
        .query_row(
            "SELECT collection, id, updated, revision, slots FROM entities \
             WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            EntityRow::from_row,
        )
        .optional()?;
    row.map(EntityRow::into_entity).transpose()
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

macro_rules! impl_record_reader {
    ($ty:ty, $conn:ident) => {
        impl RecordReader for $ty {
            fn find_node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
                find_node(&self.$conn, id)
            }

            fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, StorageError> {
                find_nodes(&self.$conn, ids)
            }

            fn find_dependents(&self, id: &NodeId) -> Result<Vec<Node>, StorageError> {
                find_dependents(&self.$conn, id)
            }

            fn find_node_by_owner(
                &self,
                owner: &OwnerRef,
            ) -> Result<Option<Node>, StorageError> {
                find_node_by_owner(&self.$conn, owner)
            }

            fn list_nodes(&self) -> Result<Vec<Node>, StorageError> {
                list_nodes(&self.$conn)
            }

            fn find_entity(
                &self,
                collection: &str,
                id: &str,
            ) -> Result<Option<Entity>, StorageError> {
                find_entity(&self.$conn, collection, id)
            }
        }
    };
}

impl_record_reader!(SqliteStore, conn);
impl_record_reader!(SqliteTx<'_>, tx);

impl Transaction for SqliteTx<'_> {
    fn save_node(&mut self, node: &Node) -> Result<(), StorageError> {
        validate_node(node)?;

        if let Some(owner) = &node.owner {
            if let Some(holder) = find_node_by_owner(&self.tx, owner)? {
                if holder.id != node.id {
                    return Err(StorageError::IntegrityError {
                        reason: format!("owner {owner} already held by node {}", holder.id),
                    });
                }
            }
        }

        let depends_on = DEPENDS_ON.encode(
            "depends_on",
            &relation(node.depends_on.iter().map(NodeId::as_str)),
        )?;
        let (collection, row, field) = match &node.owner {
            Some(owner) => (
                Some(owner.collection.as_str()),
                Some(owner.row.as_str()),
                Some(owner.field.as_str()),
            ),
            None => (None, None, None),
        };
        self.tx.execute(
            &format!(
                "INSERT INTO nodes ({NODE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET \
                 formula = excluded.formula, value = excluded.value, error = excluded.error, \
                 depends_on = excluded.depends_on, owner_collection = excluded.owner_collection, \
                 owner_row = excluded.owner_row, owner_field = excluded.owner_field"
            ),
            params![
                node.id.as_str(),
                node.formula,
                node.value,
                node.error,
                depends_on,
                collection,
                row,
                field
            ],
        )?;

        self.tx.execute(
            "DELETE FROM node_dependencies WHERE node_id = ?1",
            params![node.id.as_str()],
        )?;
        let mut stmt = self
            .tx
            .prepare_cached("INSERT INTO node_dependencies (node_id, dependency_id) VALUES (?1, ?2)")?;
        for dependency in &node.depends_on {
            stmt.execute(params![node.id.as_str(), dependency.as_str()])?;
        }
        Ok(())
    }

    fn delete_node(&mut self, id: &NodeId) -> Result<(), StorageError> {
        let deleted = self
            .tx
            .execute("DELETE FROM nodes WHERE id = ?1", params![id.as_str()])?;
        if deleted == 0 {
            return Err(StorageError::NodeNotFound(id.clone()));
        }
        Ok(())
    }

    fn save_entity(&mut self, entity: &Entity) -> Result<(), StorageError> {
        validate_entity(entity)?;
        let revision = i64::try_from(entity.revision).map_err(|_| StorageError::IntegrityError {
            reason: format!(
                "entity {}/{} revision {} exceeds storage range",
                entity.collection, entity.id, entity.revision
            ),
        })?;
        self.tx.execute(
            "INSERT INTO entities (collection, id, updated, revision, slots) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(collection, id) DO UPDATE SET \
             updated = excluded.updated, revision = excluded.revision, slots = excluded.slots",
            params![
                entity.collection,
                entity.id,
                entity.updated.to_rfc3339_opts(SecondsFormat::Nanos, true),
                revision,
                serde_json::to_string(&entity.slots)?
            ],
        )?;
        Ok(())
    }

    fn delete_entity(&mut self, collection: &str, id: &str) -> Result<(), StorageError> {
        let deleted = self.tx.execute(
            "DELETE FROM entities WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        if deleted == 0 {
            return Err(StorageError::EntityNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn run_in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let mut scope = SqliteTx { tx };
        let out = f(&mut scope)?;
        scope.tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn node_round_trips_through_sqlite() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut node = Node::new(id("b"), "a + 1")
            .with_owner(OwnerRef::new("invoices", "r1", "total"));
        node.depends_on.insert(id("a"));
        node.value = "7".into();
        store
            .run_in_transaction::<_, StorageError, _>(|tx| tx.save_node(&node))
            .unwrap();
        assert_eq!(store.find_node(&id("b")).unwrap(), Some(node.clone()));
        assert_eq!(store.find_dependents(&id("a")).unwrap(), vec![node]);
    }

    #[test]
    fn dependency_rows_follow_resaves_and_deletes() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut node = Node::new(id("b"), "a");
        node.depends_on.insert(id("a"));
        store
            .run_in_transaction::<_, StorageError, _>(|tx| {
                tx.save_node(&node)?;
                node.depends_on.clear();
                node.formula = "1".into();
                tx.save_node(&node)
            })
            .unwrap();
        assert!(store.find_dependents(&id("a")).unwrap().is_empty());

        let mut dependent = Node::new(id("c"), "b");
        dependent.depends_on.insert(id("b"));
        store
            .run_in_transaction::<_, StorageError, _>(|tx| {
                tx.save_node(&dependent)?;
                tx.delete_node(&id("c"))
            })
            .unwrap();
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM node_dependencies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn entity_round_trips_through_sqlite() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut entity = Entity::new("orders", "o1")
            .with_slot("total")
            .with_linked_slot("tax", id("t1"));
        entity.touch();
        store
            .run_in_transaction::<_, StorageError, _>(|tx| tx.save_entity(&entity))
            .unwrap();
        assert_eq!(store.find_entity("orders", "o1").unwrap(), Some(entity));
    }
}
