//! Behaviour every record-store backend must share.

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};
use calcgraph_storage::{
    Edge, InMemoryStore, RecordReader, RecordStore, SqliteStore, StorageError,
};

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn node(name: &str, formula: &str, deps: &[&str]) -> Node {
    let mut n = Node::new(id(name), formula);
    n.depends_on = deps.iter().map(|d| id(d)).collect();
    n
}

fn save_all<S: RecordStore>(store: &mut S, nodes: &[Node]) {
    store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            for n in nodes {
                tx.save_node(n)?;
            }
            Ok(())
        })
        .unwrap();
}

fn batch_fetch_skips_missing_ids<S: RecordStore>(mut store: S) {
    save_all(&mut store, &[node("a", "1", &[]), node("b", "2", &[])]);
    let found = store.find_nodes(&[id("a"), id("zz"), id("b")]).unwrap();
    let ids: Vec<&str> = found.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(store.find_nodes(&[]).unwrap().is_empty());
}

fn expand_follows_both_directions<S: RecordStore>(mut store: S) {
    save_all(
        &mut store,
        &[
            node("a", "1", &[]),
            node("b", "a", &["a"]),
            node("c", "a + b", &["a", "b"]),
        ],
    );
    let a = store.find_node(&id("a")).unwrap().unwrap();
    let c = store.find_node(&id("c")).unwrap().unwrap();

    let dependents: Vec<NodeId> = store
        .expand(&a, Edge::Dependents)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(dependents, vec![id("b"), id("c")]);

    let mut inputs: Vec<NodeId> = store
        .expand(&c, Edge::DependsOn)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    inputs.sort();
    assert_eq!(inputs, vec![id("a"), id("b")]);
}

fn duplicate_owner_is_rejected<S: RecordStore>(mut store: S) {
    let owner = OwnerRef::new("orders", "o1", "total");
    save_all(&mut store, &[node("a", "1", &[]).with_owner(owner.clone())]);
    let err = store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            tx.save_node(&node("b", "2", &[]).with_owner(owner.clone()))
        })
        .unwrap_err();
    assert!(matches!(err, StorageError::IntegrityError { .. }));
    assert_eq!(
        store.find_node_by_owner(&owner).unwrap().map(|n| n.id),
        Some(id("a"))
    );
}

fn rollback_discards_all_writes<S: RecordStore>(mut store: S) {
    save_all(&mut store, &[node("a", "1", &[])]);
    let result: Result<(), StorageError> = store.run_in_transaction(|tx| {
        tx.save_node(&node("b", "2", &[]))?;
        tx.delete_node(&id("a"))?;
        tx.delete_node(&id("missing"))
    });
    assert!(matches!(result, Err(StorageError::NodeNotFound(_))));
    assert!(store.find_node(&id("a")).unwrap().is_some());
    assert!(store.find_node(&id("b")).unwrap().is_none());
}

fn invalid_fields_are_rejected<S: RecordStore>(mut store: S) {
    let mut bad = node("a", "1", &[]);
    bad.value = "{not json".into();
    let err = store
        .run_in_transaction::<_, StorageError, _>(|tx| tx.save_node(&bad))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidField { field: "value", .. }));
}

fn entities_save_and_delete<S: RecordStore>(mut store: S) {
    let entity = Entity::new("orders", "o1").with_slot("total");
    store
        .run_in_transaction::<_, StorageError, _>(|tx| tx.save_entity(&entity))
        .unwrap();
    assert_eq!(
        store.find_entity("orders", "o1").unwrap().map(|e| e.slots),
        Some(entity.slots.clone())
    );
    store
        .run_in_transaction::<_, StorageError, _>(|tx| tx.delete_entity("orders", "o1"))
        .unwrap();
    assert!(store.find_entity("orders", "o1").unwrap().is_none());
    let err = store
        .run_in_transaction::<_, StorageError, _>(|tx| tx.delete_entity("orders", "o1"))
        .unwrap_err();
    assert!(matches!(err, StorageError::EntityNotFound { .. }));
}

macro_rules! conformance {
    ($($case:ident),* $(,)?) => {
        mod in_memory {
            $(
                #[test]
                fn $case() {
                    super::$case(super::InMemoryStore::new());
                }
            )*
        }

        mod sqlite {
            $(
                #[test]
                fn $case() {
                    super::$case(super::SqliteStore::in_memory().unwrap());
                }
            )*
        }
    };
}

conformance!(
    batch_fetch_skips_missing_ids,
    expand_follows_both_directions,
    duplicate_owner_is_rejected,
    rollback_discards_all_writes,
    invalid_fields_are_rejected,
    entities_save_and_delete,
);

#[test]
fn sqlite_file_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calc.db");
    let path = path.to_str().unwrap();
    {
        let mut store = SqliteStore::new(path).unwrap();
        save_all(&mut store, &[node("a", "1", &[])]);
    }
    let store = SqliteStore::new(path).unwrap();
    assert_eq!(store.list_nodes().unwrap().len(), 1);
}
