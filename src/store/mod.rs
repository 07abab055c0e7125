//! # Graph Store Contract
//!
//! This is THE contract between the mapping layer and any storage engine.
//! Every store operation the entity lifecycle and the type hierarchy index
//! need is defined here — node/relationship CRUD, uniform property access,
//! single-hop traversal, and an element-scoped exclusive lock.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference store for testing/embedding |
//!
//! The contract is synchronous: the mapping layer executes on the caller's
//! thread inside an ambient transaction and has no internal suspension points.
//! Transactions are addressed by `TxId` tokens handed out by `begin_tx`; a
//! token stays valid until it is committed or rolled back.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::{Direction, ElementRef, Node, NodeId, RelId, Relationship};

pub use memory::MemoryStore;

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The universal storage contract.
///
/// Any engine that implements this trait can back the mapping layer. All
/// operations take the ambient transaction as an explicit token; an operation
/// against an unknown or finished token fails with `Error::NotInTransaction`.
pub trait GraphStore: Send + Sync + 'static {
    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    fn begin_tx(&self) -> Result<TxId>;

    /// Commit a transaction, releasing any exclusive locks it holds.
    fn commit(&self, tx: TxId) -> Result<()>;

    /// Roll back a transaction. The graph must be left exactly as it was
    /// before the transaction started.
    fn rollback(&self, tx: TxId) -> Result<()>;

    /// Whether the token refers to a live (unfinished) transaction.
    fn is_tx_active(&self, tx: TxId) -> bool;

    // ========================================================================
    // Reference node
    // ========================================================================

    /// The store's well-known entry node. It exists for the lifetime of the
    /// store and anchors bookkeeping structures that must be rediscoverable
    /// by a cold process (the type hierarchy hangs its type nodes off it).
    fn reference_node(&self, tx: TxId) -> Result<NodeId>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a bare node.
    fn create_node(&self, tx: TxId) -> Result<NodeId>;

    /// Get a node by ID. Returns `None` if not found.
    fn get_node(&self, tx: TxId, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns `true` if it existed.
    /// Fails with `ConstraintViolation` while the node has relationships.
    fn delete_node(&self, tx: TxId, id: NodeId) -> Result<bool>;

    /// Delete a node and all its relationships in one operation.
    ///
    /// Default: collect all relationships, delete each, then delete the node.
    fn detach_delete_node(&self, tx: TxId, id: NodeId) -> Result<bool> {
        let rels = self.relationships(tx, id, None, Direction::Both)?;
        for rel in &rels {
            self.delete_relationship(tx, rel.id)?;
        }
        self.delete_node(tx, id)
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two existing nodes.
    /// Fails with `NotFound` if either endpoint does not exist.
    fn create_relationship(
        &self,
        tx: TxId,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    fn get_relationship(&self, tx: TxId, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns `true` if it existed.
    fn delete_relationship(&self, tx: TxId, id: RelId) -> Result<bool>;

    // ========================================================================
    // Properties (uniform over nodes and relationships)
    // ========================================================================

    /// Read a property. Returns `None` when the element has no such property.
    fn get_property(
        &self,
        tx: TxId,
        element: ElementRef,
        key: &str,
    ) -> Result<Option<crate::model::Value>>;

    /// Set a property (upsert).
    fn set_property(
        &self,
        tx: TxId,
        element: ElementRef,
        key: &str,
        value: crate::model::Value,
    ) -> Result<()>;

    /// Remove a property. A missing property is not an error.
    fn remove_property(&self, tx: TxId, element: ElementRef, key: &str) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// All relationships of a node, optionally filtered by type and direction.
    fn relationships(
        &self,
        tx: TxId,
        node: NodeId,
        rel_type: Option<&str>,
        dir: Direction,
    ) -> Result<Vec<Relationship>>;

    /// The single relationship of the given type and direction, if any.
    ///
    /// Default: filter via `relationships` and fail with `ConstraintViolation`
    /// when more than one matches — callers rely on "single" meaning single.
    fn single_relationship(
        &self,
        tx: TxId,
        node: NodeId,
        rel_type: &str,
        dir: Direction,
    ) -> Result<Option<Relationship>> {
        let mut rels = self.relationships(tx, node, Some(rel_type), dir)?;
        if rels.len() > 1 {
            return Err(crate::Error::ConstraintViolation(format!(
                "expected a single `{rel_type}` relationship on node {node}, found {}",
                rels.len()
            )));
        }
        Ok(rels.pop())
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Take an exclusive lock on one element for the given transaction.
    ///
    /// Blocks until the lock is available. Re-acquiring a lock the same
    /// transaction already holds is a no-op. Locks are released when the
    /// transaction commits or rolls back, never earlier — counter
    /// read-modify-writes depend on this.
    fn lock_exclusive(&self, tx: TxId, element: ElementRef) -> Result<()>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Total number of nodes (including the reference node).
    fn node_count(&self, tx: TxId) -> Result<u64>;

    /// Total number of relationships.
    fn relationship_count(&self, tx: TxId) -> Result<u64>;
}
