//! Read masking, update authorization and whole-graph maintenance.

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};
use calcgraph_engine::{CollectionAccess, Engine, EngineError, Superuser};
use calcgraph_storage::{InMemoryStore, RecordReader, RecordStore, SqliteStore, StorageError};
use proptest::prelude::*;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn owned(name: &str, formula: &str, collection: &str, row: &str) -> Node {
    Node::new(id(name), formula).with_owner(OwnerRef::new(collection, row, name))
}

/// `salary` (private) <- `payroll` (public) <- `summary` (public), plus an
/// unrelated public `headcount` and an ownerless `scratch`.
fn seeded<S: RecordStore>(store: S) -> Engine<S> {
    let mut engine = Engine::new(store);
    engine.on_entity_create(Entity::new("private", "hr")).unwrap();
    engine.on_entity_create(Entity::new("public", "board")).unwrap();
    engine
        .on_create_or_update(owned("salary", "5000", "private", "hr"))
        .unwrap();
    engine
        .on_create_or_update(owned("payroll", "salary * 12", "public", "board"))
        .unwrap();
    engine
        .on_create_or_update(owned("summary", "payroll + 1", "public", "board"))
        .unwrap();
    engine
        .on_create_or_update(owned("headcount", "12", "public", "board"))
        .unwrap();
    engine
        .on_create_or_update(Node::new(id("scratch"), "1"))
        .unwrap();
    engine
}

fn public_reader() -> CollectionAccess {
    CollectionAccess::new().view("public")
}

fn transitive_dependency_masks_value<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let ctx = public_reader();

    let summary = engine.get_node(&id("summary")).unwrap();
    assert_eq!(summary.value, "60001");
    let masked = engine.on_view_read(summary, &ctx).unwrap();
    assert_eq!(masked.value, "\"#AUTH!\"");
    assert!(masked.error.contains("first blocked: salary"));

    let headcount = engine.get_node(&id("headcount")).unwrap();
    assert_eq!(engine.on_view_read(headcount, &ctx).unwrap().value, "12");
}

fn masking_never_writes<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let payroll = engine.get_node(&id("payroll")).unwrap();
    let _ = engine.on_view_read(payroll, &public_reader()).unwrap();
    assert_eq!(engine.get_node(&id("payroll")).unwrap().value, "60000");
}

fn masking_skips_dangling_dependency<S: RecordStore>(store: S) {
    let mut store = seeded(store).into_store();
    store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            let mut headcount = tx.find_node(&id("headcount"))?.unwrap();
            headcount.depends_on = [id("gone")].into_iter().collect();
            tx.save_node(&headcount)
        })
        .unwrap();

    let engine = Engine::new(store);
    let headcount = engine.get_node(&id("headcount")).unwrap();
    let read = engine.on_view_read(headcount, &public_reader()).unwrap();
    assert_eq!(read.value, "12");
    assert!(read.error.is_empty());
}

fn superuser_sees_everything<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let summary = engine.get_node(&id("summary")).unwrap();
    assert_eq!(engine.on_view_read(summary, &Superuser).unwrap().value, "60001");

    let all = engine.store().list_nodes().unwrap();
    let listed = engine.on_list_read(all.clone(), &Superuser).unwrap();
    assert_eq!(listed, all);
}

fn list_drops_hidden_and_ownerless<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let all = engine.store().list_nodes().unwrap();
    let listed = engine.on_list_read(all, &public_reader()).unwrap();

    let names: Vec<&str> = listed.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(names, vec!["headcount", "payroll", "summary"]);
    let payroll = listed.iter().find(|n| n.id == id("payroll")).unwrap();
    assert_eq!(payroll.value, "\"#AUTH!\"");
}

fn closure_rules_act_as_context<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let everything = |_: &Entity| true;
    let summary = engine.get_node(&id("summary")).unwrap();
    assert_eq!(engine.on_view_read(summary, &everything).unwrap().value, "60001");
}

fn update_requires_owner_update_right<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let mut headcount = engine.get_node(&id("headcount")).unwrap();
    headcount.formula = "13".into();

    let err = engine
        .authorize_update(&headcount, &public_reader())
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let editor = CollectionAccess::new().update("public");
    engine.authorize_update(&headcount, &editor).unwrap();
    engine.authorize_update(&headcount, &Superuser).unwrap();
}

fn update_cannot_reference_hidden_nodes<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let editor = CollectionAccess::new().update("public");

    let mut headcount = engine.get_node(&id("headcount")).unwrap();
    headcount.formula = "summary / 2".into();
    match engine.authorize_update(&headcount, &editor).unwrap_err() {
        EngineError::Forbidden { reason } => assert!(reason.contains("salary")),
        other => panic!("unexpected error: {other}"),
    }

    headcount.formula = "ghost + 1".into();
    assert!(matches!(
        engine.authorize_update(&headcount, &editor),
        Err(EngineError::MissingDependency { .. })
    ));
}

fn ownerless_node_cannot_be_authorized<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let scratch = engine.get_node(&id("scratch")).unwrap();
    let editor = CollectionAccess::new().update("public").update("private");
    assert!(matches!(
        engine.authorize_update(&scratch, &editor),
        Err(EngineError::Forbidden { .. })
    ));
}

fn verify_reports_clean_graph<S: RecordStore>(store: S) {
    let engine = seeded(store);
    let report = engine.verify().unwrap();
    assert!(report.is_clean(), "{report:?}");
}

fn verify_finds_corruption<S: RecordStore>(store: S) {
    let mut store = seeded(store).into_store();
    store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            let mut scratch = Node::new(id("scratch"), "headcount + 1");
            scratch.depends_on = [id("gone")].into_iter().collect();
            tx.save_node(&scratch)?;
            tx.delete_entity("private", "hr")
        })
        .unwrap();

    let report = Engine::new(store).verify().unwrap();
    assert_eq!(report.dangling, vec![(id("scratch"), id("gone"))]);
    assert_eq!(report.drift, vec![id("scratch")]);
    assert_eq!(report.missing_owners, vec![id("salary")]);
    assert!(report.cycles.is_empty());
    assert!(!report.is_clean());
}

fn recompute_repairs_stale_values<S: RecordStore>(store: S) {
    let mut store = seeded(store).into_store();
    store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            let mut payroll = tx.find_node(&id("payroll"))?.unwrap();
            payroll.value = "1".into();
            tx.save_node(&payroll)?;
            let mut summary = tx.find_node(&id("summary"))?.unwrap();
            summary.value = "2".into();
            tx.save_node(&summary)
        })
        .unwrap();

    let mut engine = Engine::new(store);
    assert_eq!(engine.recompute_all().unwrap(), 2);
    assert_eq!(engine.get_node(&id("summary")).unwrap().value, "60001");
    assert_eq!(engine.recompute_all().unwrap(), 0);
}

fn recompute_rejects_stored_cycle<S: RecordStore>(store: S) {
    let mut store = seeded(store).into_store();
    store
        .run_in_transaction::<_, StorageError, _>(|tx| {
            let mut salary = tx.find_node(&id("salary"))?.unwrap();
            salary.formula = "summary".into();
            salary.depends_on = [id("summary")].into_iter().collect();
            tx.save_node(&salary)
        })
        .unwrap();

    let mut engine = Engine::new(store);
    assert_eq!(engine.verify().unwrap().cycles.len(), 1);
    assert!(matches!(
        engine.recompute_all(),
        Err(EngineError::CircularDependency { .. })
    ));
}

macro_rules! backends {
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

backends!(
    transitive_dependency_masks_value,
    masking_never_writes,
    masking_skips_dangling_dependency,
    superuser_sees_everything,
    list_drops_hidden_and_ownerless,
    closure_rules_act_as_context,
    update_requires_owner_update_right,
    update_cannot_reference_hidden_nodes,
    ownerless_node_cannot_be_authorized,
    verify_reports_clean_graph,
    verify_finds_corruption,
    recompute_repairs_stale_values,
    recompute_rejects_stored_cycle,
);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn chain_tail_tracks_head(len in 2usize..12, start in -1000i64..1000, next in -1000i64..1000) {
        let mut engine = Engine::new(InMemoryStore::new());
        engine.on_create_or_update(Node::new(id("n0"), start.to_string())).unwrap();
        for i in 1..len {
            let node = Node::new(id(&format!("n{i}")), format!("n{} + 1", i - 1));
            engine.on_create_or_update(node).unwrap();
        }
        let tail = id(&format!("n{}", len - 1));
        prop_assert_eq!(engine.get_node(&tail).unwrap().value, (start + len as i64 - 1).to_string());

        let mut head = engine.get_node(&id("n0")).unwrap();
        head.formula = next.to_string();
        engine.on_create_or_update(head).unwrap();
        prop_assert_eq!(engine.get_node(&tail).unwrap().value, (next + len as i64 - 1).to_string());
        prop_assert!(engine.verify().unwrap().is_clean());
    }
}
