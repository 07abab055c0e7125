//! End-to-end tests for the entity lifecycle state machine.
//!
//! Covers attach/detach/reattach across transaction boundaries, the
//! detachable, auto-attach, and partial policies, relationship-backed
//! entities, and the terminal destroyed state — all through the public
//! Session API over a MemoryStore.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use nodebind::{
    ConversionService, ElementRef, EntityDef, EntityManager, EntityStatus, Error, FieldDef,
    FieldValue, MemoryStore, NodeId, Session, TypeRegistry,
};

fn farm() -> Arc<EntityManager> {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            EntityDef::node("Animal")
                .field(FieldDef::text("name"))
                .field(FieldDef::int("age"))
                .field(FieldDef::transient("scratch")),
        )
        .unwrap();
    registry
        .register(EntityDef::node("Robot").auto_attach().field(FieldDef::text("model")))
        .unwrap();
    registry
        .register(EntityDef::node("Shadow").partial().field(FieldDef::text("note")))
        .unwrap();
    registry
        .register(EntityDef::relationship("Friendship", "FRIENDS").field(FieldDef::int("since")))
        .unwrap();
    registry
        .register(EntityDef::relationship("Rivalry", "RIVALS"))
        .unwrap();

    EntityManager::new(
        Arc::new(MemoryStore::new()),
        registry,
        ConversionService::with_defaults(),
    )
}

fn session_in_tx(manager: &Arc<EntityManager>) -> Session {
    let session = manager.open_session();
    session.begin_tx().unwrap();
    session
}

// ============================================================================
// 1. Creation needs an ambient transaction
// ============================================================================

#[test]
fn test_create_requires_transaction() {
    let manager = farm();
    let session = manager.open_session();

    let err = session.create("Animal").unwrap_err();
    assert!(matches!(err, Error::NotInTransaction(_)));
}

// ============================================================================
// 2. Attaching is idempotent
// ============================================================================

#[test]
fn test_attach_is_idempotent() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut animal = session.create("Animal").unwrap();
    assert_eq!(animal.status(), EntityStatus::Attached);
    let element = animal.element().unwrap();

    animal.attach(&session).unwrap();
    assert_eq!(animal.element().unwrap(), element);
    assert_eq!(session.count("Animal").unwrap(), 1);
}

// ============================================================================
// 3. Detach and reattach across transactions
// ============================================================================

#[test]
fn test_detach_and_reattach() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut animal = session.create("Animal").unwrap();
    animal.set(&session, "name", "Rex").unwrap();
    let id = animal.id().unwrap();
    session.commit().unwrap();

    animal.detach();
    assert_eq!(animal.status(), EntityStatus::Detached);
    assert_eq!(animal.element(), None);
    assert_eq!(animal.id(), Some(id));

    session.begin_tx().unwrap();
    animal.attach(&session).unwrap();
    assert_eq!(animal.status(), EntityStatus::Attached);
    assert_eq!(animal.element(), Some(id));
    assert_eq!(
        animal.get(&session, "name").unwrap(),
        Some(FieldValue::Text("Rex".into()))
    );
}

// ============================================================================
// 4. A known identifier whose element is gone is a stale reference
// ============================================================================

#[test]
fn test_stale_reference_is_fatal() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut ghost = session
        .reference("Animal", ElementRef::Node(NodeId(777)))
        .unwrap();
    assert_eq!(ghost.status(), EntityStatus::Detached);

    let err = ghost.attach(&session).unwrap_err();
    assert!(matches!(err, Error::StaleReference(_)));

    // Field access runs into the same wall — never a silent create.
    let err = ghost.get(&session, "name").unwrap_err();
    assert!(matches!(err, Error::StaleReference(_)));
}

// ============================================================================
// 5. Detached entities: cached reads, buffered writes
// ============================================================================

#[test]
fn test_detached_reads_cache_and_buffers_writes() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut animal = session.create("Animal").unwrap();
    animal.set(&session, "name", "Bella").unwrap();
    session.commit().unwrap();
    animal.detach();

    // A value seen while attached is served from the cache.
    assert_eq!(
        animal.get(&session, "name").unwrap(),
        Some(FieldValue::Text("Bella".into()))
    );

    // A field never loaded while attached cannot be invented.
    let err = animal.get(&session, "age").unwrap_err();
    assert!(matches!(err, Error::NotInTransaction(_)));

    // Writes are accepted and buffered, visible through the cache.
    animal.set(&session, "age", 4).unwrap();
    assert_eq!(animal.get(&session, "age").unwrap(), Some(FieldValue::Int(4)));

    // The buffer flushes on the next attach.
    session.begin_tx().unwrap();
    animal.attach(&session).unwrap();
    let node = animal.node_id().unwrap();
    let mut fresh = session.load(node).unwrap();
    assert_eq!(fresh.get(&session, "age").unwrap(), Some(FieldValue::Int(4)));
}

#[test]
fn test_never_persisted_detached_entity_fails() {
    let manager = farm();
    let session = manager.open_session();

    let mut animal = session.instantiate("Animal").unwrap();
    assert_eq!(animal.status(), EntityStatus::Unbound);

    let err = animal.get(&session, "name").unwrap_err();
    assert!(matches!(err, Error::NotInTransaction(_)));

    let err = animal.set(&session, "name", "Rex").unwrap_err();
    assert!(matches!(err, Error::DetachedWriteRejected(_)));

    // Transient fields live in the entity and work regardless.
    animal.set(&session, "scratch", "tmp").unwrap();
    assert_eq!(
        animal.get(&session, "scratch").unwrap(),
        Some(FieldValue::Text("tmp".into()))
    );
}

// ============================================================================
// 6. Auto-attach: one micro-transaction per unguarded access
// ============================================================================

#[test]
fn test_auto_attach_micro_transactions() {
    let manager = farm();
    let session = manager.open_session();

    // No begin_tx anywhere: every access opens and commits its own.
    let mut robot = session.create("Robot").unwrap();
    assert!(!session.in_transaction());

    robot.set(&session, "model", "R2").unwrap();
    assert!(!session.in_transaction());
    assert_eq!(
        robot.get(&session, "model").unwrap(),
        Some(FieldValue::Text("R2".into()))
    );

    // The micro-transactions really committed.
    let count = session.with_tx(|s| s.count("Robot")).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_auto_attach_propagates_open_transaction() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut robot = session.create("Robot").unwrap();
    robot.set(&session, "model", "C3").unwrap();
    // Still inside the caller's transaction: nothing committed on its own.
    assert!(session.in_transaction());
    session.rollback().unwrap();

    let count = session.with_tx(|s| s.count("Robot")).unwrap();
    assert_eq!(count, 0);
}

// ============================================================================
// 7. Partial projections gate on the external identifier
// ============================================================================

#[test]
fn test_partial_requires_external_id() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut shadow = session.instantiate("Shadow").unwrap();

    // A transaction is open, but without the external id it is not visible.
    let err = shadow.set(&session, "note", "x").unwrap_err();
    assert!(matches!(err, Error::DetachedWriteRejected(_)));
    let err = shadow.attach(&session).unwrap_err();
    assert!(matches!(err, Error::NotInTransaction(_)));

    shadow.set_external_id("row-42");
    shadow.set(&session, "note", "projected").unwrap();
    assert_eq!(shadow.status(), EntityStatus::Attached);
    assert_eq!(
        shadow.get(&session, "note").unwrap(),
        Some(FieldValue::Text("projected".into()))
    );
    assert_eq!(shadow.external_id(), Some("row-42"));
}

// ============================================================================
// 8. Destroyed is terminal
// ============================================================================

#[test]
fn test_destroyed_is_terminal() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut animal = session.create("Animal").unwrap();
    session.delete(&mut animal).unwrap();
    assert_eq!(animal.status(), EntityStatus::Destroyed);

    assert!(matches!(
        animal.get(&session, "name").unwrap_err(),
        Error::InvalidAccess(_)
    ));
    assert!(matches!(
        animal.set(&session, "name", "zombie").unwrap_err(),
        Error::InvalidAccess(_)
    ));
    assert!(matches!(
        animal.attach(&session).unwrap_err(),
        Error::InvalidAccess(_)
    ));
    assert!(matches!(
        session.delete(&mut animal).unwrap_err(),
        Error::InvalidAccess(_)
    ));
}

#[test]
fn test_delete_never_persisted_entity_fails() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let mut animal = session.instantiate("Animal").unwrap();
    let err = session.delete(&mut animal).unwrap_err();
    assert!(matches!(err, Error::InvalidAccess(_)));
}

// ============================================================================
// 9. Relationship-backed entities
// ============================================================================

#[test]
fn test_relationship_entity_lifecycle() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let a = session.create("Animal").unwrap().node_id().unwrap();
    let b = session.create("Animal").unwrap().node_id().unwrap();

    let mut friendship = session.create_between("Friendship", a, b).unwrap();
    friendship.set(&session, "since", 2020).unwrap();
    let rel = friendship.id().unwrap().as_rel().unwrap();
    session.commit().unwrap();

    session.begin_tx().unwrap();
    let mut loaded = session.load_relationship("Friendship", rel).unwrap();
    assert_eq!(
        loaded.get(&session, "since").unwrap(),
        Some(FieldValue::Int(2020))
    );

    session.delete(&mut loaded).unwrap();
    assert_eq!(loaded.status(), EntityStatus::Destroyed);
    // Deleting a relationship entity leaves the node hierarchy alone.
    assert_eq!(session.count("Animal").unwrap(), 2);
}

#[test]
fn test_relationship_entity_requires_endpoints() {
    let manager = farm();
    let session = session_in_tx(&manager);

    // Endpoints must exist in the store.
    let a = session.create("Animal").unwrap().node_id().unwrap();
    let err = session
        .create_between("Friendship", a, NodeId(999))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // And must be supplied at all before the entity can attach.
    let mut loose = session.instantiate("Friendship").unwrap();
    let err = loose.attach(&session).unwrap_err();
    assert!(matches!(err, Error::InvalidAccess(_)));
}

#[test]
fn test_load_relationship_checks_declared_type() {
    let manager = farm();
    let session = session_in_tx(&manager);

    let a = session.create("Animal").unwrap().node_id().unwrap();
    let b = session.create("Animal").unwrap().node_id().unwrap();
    let rivalry = session.create_between("Rivalry", a, b).unwrap();
    let rel = rivalry.id().unwrap().as_rel().unwrap();

    let err = session.load_relationship("Friendship", rel).unwrap_err();
    match err {
        Error::TypeMismatch { expected, actual, .. } => {
            assert_eq!(expected, "Friendship");
            assert_eq!(actual, "RIVALS");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// 10. Constructors reject the wrong backing kind
// ============================================================================

#[test]
fn test_backing_kind_checked_at_construction() {
    let manager = farm();
    let session = session_in_tx(&manager);

    assert!(matches!(
        session.create("Friendship").unwrap_err(),
        Error::InvalidAccess(_)
    ));

    let a = session.create("Animal").unwrap().node_id().unwrap();
    let b = session.create("Animal").unwrap().node_id().unwrap();
    assert!(matches!(
        session.create_between("Animal", a, b).unwrap_err(),
        Error::InvalidAccess(_)
    ));

    assert!(matches!(
        session
            .reference("Animal", ElementRef::Rel(nodebind::RelId(1)))
            .unwrap_err(),
        Error::InvalidAccess(_)
    ));
}
