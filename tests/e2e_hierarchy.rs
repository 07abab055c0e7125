//! End-to-end tests for the graph-resident type hierarchy.
//!
//! Each test builds an Animal → Dog → Puppy hierarchy over a MemoryStore and
//! exercises counting, polymorphic enumeration, reverse type lookup, and
//! type confirmation through the public Session API.

use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use nodebind::{
    ConversionService, Entity, EntityDef, EntityManager, Error, FieldDef, GraphStore, MemoryStore,
    NodeId, Session, TypeRegistry,
};

fn zoo() -> (Arc<MemoryStore>, Arc<EntityManager>) {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            EntityDef::node("Animal")
                .field(FieldDef::text("name"))
                .field(FieldDef::int("age")),
        )
        .unwrap();
    registry
        .register(EntityDef::node("Dog").extends("Animal").field(FieldDef::bool("barks")))
        .unwrap();
    registry
        .register(EntityDef::node("Puppy").extends("Dog"))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let manager = EntityManager::new(store.clone(), registry, ConversionService::with_defaults());
    (store, manager)
}

fn session_in_tx(manager: &Arc<EntityManager>) -> Session {
    let session = manager.open_session();
    session.begin_tx().unwrap();
    session
}

fn ids_of(session: &Session, type_name: &str) -> HashSet<u64> {
    session
        .find_all(type_name)
        .unwrap()
        .map(|e| e.unwrap().node_id().unwrap().0)
        .collect()
}

// ============================================================================
// 1. Counters move by exactly one at every level of the hierarchy
// ============================================================================

#[test]
fn test_counts_across_three_levels() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let mut puppy = session.create("Puppy").unwrap();
    assert_eq!(session.count("Puppy").unwrap(), 1);
    assert_eq!(session.count("Dog").unwrap(), 1);
    assert_eq!(session.count("Animal").unwrap(), 1);

    session.create("Dog").unwrap();
    assert_eq!(session.count("Puppy").unwrap(), 1);
    assert_eq!(session.count("Dog").unwrap(), 2);
    assert_eq!(session.count("Animal").unwrap(), 2);

    session.create("Animal").unwrap();
    assert_eq!(session.count("Animal").unwrap(), 3);

    session.delete(&mut puppy).unwrap();
    assert_eq!(session.count("Puppy").unwrap(), 0);
    assert_eq!(session.count("Dog").unwrap(), 1);
    assert_eq!(session.count("Animal").unwrap(), 2);
}

// ============================================================================
// 2. Two Dogs and one plain Animal
// ============================================================================

#[test]
fn test_two_dogs_one_animal() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    session.create("Dog").unwrap();
    session.create("Dog").unwrap();
    session.create("Animal").unwrap();

    assert_eq!(session.count("Animal").unwrap(), 3);
    assert_eq!(session.count("Dog").unwrap(), 2);
    assert_eq!(session.find_all("Animal").unwrap().count(), 3);
    assert_eq!(session.find_all("Dog").unwrap().count(), 2);
}

// ============================================================================
// 3. Polymorphic enumeration returns exact sets, each instance once
// ============================================================================

#[test]
fn test_find_all_exact_sets() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let animal = session.create("Animal").unwrap();
    let dog = session.create("Dog").unwrap();
    let puppy = session.create("Puppy").unwrap();

    let animal_id = animal.node_id().unwrap().0;
    let dog_id = dog.node_id().unwrap().0;
    let puppy_id = puppy.node_id().unwrap().0;

    assert_eq!(
        ids_of(&session, "Animal"),
        HashSet::from([animal_id, dog_id, puppy_id])
    );
    assert_eq!(ids_of(&session, "Dog"), HashSet::from([dog_id, puppy_id]));
    assert_eq!(ids_of(&session, "Puppy"), HashSet::from([puppy_id]));

    // Each instance exactly once: set size equals sequence length.
    assert_eq!(session.find_all("Animal").unwrap().count(), 3);
}

#[test]
fn test_find_all_materializes_exact_types() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    session.create("Animal").unwrap();
    session.create("Dog").unwrap();

    let types: HashSet<String> = session
        .find_all("Animal")
        .unwrap()
        .map(|e| e.unwrap().type_name().to_string())
        .collect();
    assert_eq!(types, HashSet::from(["Animal".to_string(), "Dog".to_string()]));
}

#[test]
fn test_find_all_empty_without_instances() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    assert_eq!(session.find_all("Animal").unwrap().count(), 0);

    session.create("Animal").unwrap();
    // Subtype enumeration does not include supertype instances.
    assert_eq!(session.find_all("Dog").unwrap().count(), 0);
}

// ============================================================================
// 4. Reverse type lookup is exact
// ============================================================================

#[test]
fn test_stored_type_is_exact() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let dog = session.create("Dog").unwrap();
    let node = dog.node_id().unwrap();

    assert_eq!(session.stored_type(node).unwrap().name, "Dog");

    let loaded: Entity = session.load(node).unwrap();
    assert_eq!(loaded.type_name(), "Dog");
}

// ============================================================================
// 5. Type confirmation: supertypes succeed, unrelated types fail
// ============================================================================

#[test]
fn test_confirm_type() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let puppy = session.create("Puppy").unwrap();
    let animal = session.create("Animal").unwrap();
    let puppy_node = puppy.node_id().unwrap();
    let animal_node = animal.node_id().unwrap();

    // A Puppy is an Animal; the exact type comes back.
    assert_eq!(session.confirm_type(puppy_node, "Animal").unwrap().name, "Puppy");
    assert_eq!(session.confirm_type(puppy_node, "Puppy").unwrap().name, "Puppy");

    // A plain Animal is not a Dog.
    match session.confirm_type(animal_node, "Dog").unwrap_err() {
        Error::TypeMismatch { expected, actual, .. } => {
            assert_eq!(expected, "Dog");
            assert_eq!(actual, "Animal");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// 6. Counting never-instantiated and unregistered types
// ============================================================================

#[test]
fn test_count_without_instances() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    assert_eq!(session.count("Puppy").unwrap(), 0);

    let err = session.count("Unicorn").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ============================================================================
// 7. Type nodes survive at count zero and are reused
// ============================================================================

#[test]
fn test_type_nodes_survive_and_are_reused() {
    let (store, manager) = zoo();
    let session = session_in_tx(&manager);

    let mut dog = session.create("Dog").unwrap();
    session.commit().unwrap();

    let tx = store.begin_tx().unwrap();
    let nodes_with_one_dog = store.node_count(tx).unwrap();
    store.commit(tx).unwrap();

    session.begin_tx().unwrap();
    session.delete(&mut dog).unwrap();
    assert_eq!(session.count("Dog").unwrap(), 0);
    assert_eq!(session.count("Animal").unwrap(), 0);

    // Deleting the last instance keeps both type nodes; re-creating reuses them.
    session.create("Dog").unwrap();
    assert_eq!(session.count("Dog").unwrap(), 1);
    session.commit().unwrap();

    let tx = store.begin_tx().unwrap();
    assert_eq!(store.node_count(tx).unwrap(), nodes_with_one_dog);
    store.commit(tx).unwrap();
}

// ============================================================================
// 8. Counters never go negative
// ============================================================================

#[test]
fn test_decrement_clamps_at_zero() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let mut a = session.create("Animal").unwrap();
    let mut b = session.create("Animal").unwrap();
    session.delete(&mut a).unwrap();
    session.delete(&mut b).unwrap();

    assert_eq!(session.count("Animal").unwrap(), 0);
}

// ============================================================================
// 9. Rollback leaves counters and edges untouched
// ============================================================================

#[test]
fn test_rollback_restores_counters() {
    let (store, manager) = zoo();
    let session = session_in_tx(&manager);
    session.create("Dog").unwrap();
    session.commit().unwrap();

    let tx = store.begin_tx().unwrap();
    let committed_nodes = store.node_count(tx).unwrap();
    let committed_rels = store.relationship_count(tx).unwrap();
    store.commit(tx).unwrap();

    session.begin_tx().unwrap();
    session.create("Dog").unwrap();
    session.create("Puppy").unwrap();
    assert_eq!(session.count("Animal").unwrap(), 3);
    session.rollback().unwrap();

    session.begin_tx().unwrap();
    assert_eq!(session.count("Animal").unwrap(), 1);
    assert_eq!(session.count("Dog").unwrap(), 1);
    assert_eq!(session.count("Puppy").unwrap(), 0);
    assert_eq!(session.find_all("Animal").unwrap().count(), 1);
    session.commit().unwrap();

    let tx = store.begin_tx().unwrap();
    assert_eq!(store.node_count(tx).unwrap(), committed_nodes);
    assert_eq!(store.relationship_count(tx).unwrap(), committed_rels);
    store.commit(tx).unwrap();
}

// ============================================================================
// 10. Forest roots: two unrelated hierarchies do not interfere
// ============================================================================

#[test]
fn test_unrelated_roots_are_independent() {
    let mut registry = TypeRegistry::new();
    registry.register(EntityDef::node("Animal")).unwrap();
    registry
        .register(EntityDef::node("Dog").extends("Animal"))
        .unwrap();
    registry.register(EntityDef::node("Machine")).unwrap();

    let manager = EntityManager::new(
        Arc::new(MemoryStore::new()),
        registry,
        ConversionService::with_defaults(),
    );
    let session = session_in_tx(&manager);

    session.create("Dog").unwrap();
    session.create("Machine").unwrap();

    assert_eq!(session.count("Animal").unwrap(), 1);
    assert_eq!(session.count("Machine").unwrap(), 1);
    assert_eq!(ids_of(&session, "Machine").len(), 1);
}

// ============================================================================
// 11. Loading an unknown node is NotFound, not a type error
// ============================================================================

#[test]
fn test_load_unknown_node() {
    let (_, manager) = zoo();
    let session = session_in_tx(&manager);

    let err = session.load(NodeId(4040)).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
