//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`. It uses simple
//! HashMaps protected by RwLock, plus the two pieces of transactional
//! machinery the mapping layer depends on:
//!
//! - a per-transaction **undo log**, so `rollback()` restores the graph
//!   exactly as it was before the transaction started
//! - **element-scoped exclusive locks** that block contending transactions
//!   on a condvar and are released only at transaction end
//!
//! ## Limitations
//!
//! - **No MVCC**: writes are visible to other transactions as soon as they
//!   are applied; rollback undoes them after the fact.
//! - **No deadlock detection**: transactions that acquire element locks in
//!   conflicting orders will block forever. Callers must lock consistently.
//! - **Single-process only**: nothing is persisted.
//!
//! Use this store for testing the mapping layer and for embedding in
//! applications that don't need persistence.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};

use super::{GraphStore, TxId};
use crate::model::{Direction, ElementRef, Node, NodeId, RelId, Relationship, Value};
use crate::{Error, Result};

/// Node 0 is the reference node, created when the store is built.
const REFERENCE_NODE: NodeId = NodeId(0);

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph storage with undo-log transactions.
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
    rels: RwLock<HashMap<RelId, Relationship>>,
    /// node id → ids of relationships touching it
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// live transactions and their undo logs
    txs: Mutex<HashMap<TxId, TxState>>,
    /// element → transaction holding its exclusive lock
    locks: Mutex<HashMap<ElementRef, TxId>>,
    lock_released: Condvar,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

#[derive(Default)]
struct TxState {
    undo: Vec<UndoOp>,
}

/// Inverse of one applied mutation. Replayed in reverse order on rollback.
enum UndoOp {
    RemoveNode(NodeId),
    RestoreNode(Node),
    RemoveRel(RelId),
    RestoreRel(Relationship),
    RestoreProperty {
        element: ElementRef,
        key: String,
        prior: Option<Value>,
    },
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self {
            nodes: RwLock::new(HashMap::new()),
            rels: RwLock::new(HashMap::new()),
            adjacency: RwLock::new(HashMap::new()),
            txs: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            lock_released: Condvar::new(),
            next_node_id: AtomicU64::new(1),
            next_rel_id: AtomicU64::new(1),
            next_tx_id: AtomicU64::new(1),
        };
        // The reference node predates every transaction.
        store
            .nodes
            .write()
            .insert(REFERENCE_NODE, Node::new(REFERENCE_NODE));
        store.adjacency.write().insert(REFERENCE_NODE, Vec::new());
        store
    }

    fn inactive(tx: TxId) -> Error {
        Error::NotInTransaction(format!("transaction {tx} is not active"))
    }

    fn require_tx(&self, tx: TxId) -> Result<()> {
        if self.txs.lock().contains_key(&tx) {
            Ok(())
        } else {
            Err(Self::inactive(tx))
        }
    }

    fn record(&self, tx: TxId, op: UndoOp) -> Result<()> {
        let mut txs = self.txs.lock();
        txs.get_mut(&tx).ok_or_else(|| Self::inactive(tx))?.undo.push(op);
        Ok(())
    }

    fn release_locks(&self, tx: TxId) {
        self.locks.lock().retain(|_, owner| *owner != tx);
        self.lock_released.notify_all();
    }

    fn apply_undo(&self, ops: Vec<UndoOp>) {
        let mut nodes = self.nodes.write();
        let mut rels = self.rels.write();
        let mut adjacency = self.adjacency.write();

        for op in ops.into_iter().rev() {
            match op {
                UndoOp::RemoveNode(id) => {
                    nodes.remove(&id);
                    adjacency.remove(&id);
                }
                UndoOp::RestoreNode(node) => {
                    adjacency.entry(node.id).or_default();
                    nodes.insert(node.id, node);
                }
                UndoOp::RemoveRel(id) => {
                    if let Some(rel) = rels.remove(&id) {
                        if let Some(v) = adjacency.get_mut(&rel.src) {
                            v.retain(|r| *r != id);
                        }
                        if rel.src != rel.dst {
                            if let Some(v) = adjacency.get_mut(&rel.dst) {
                                v.retain(|r| *r != id);
                            }
                        }
                    }
                }
                UndoOp::RestoreRel(rel) => {
                    adjacency.entry(rel.src).or_default().push(rel.id);
                    if rel.src != rel.dst {
                        adjacency.entry(rel.dst).or_default().push(rel.id);
                    }
                    rels.insert(rel.id, rel);
                }
                UndoOp::RestoreProperty { element, key, prior } => {
                    let props = match element {
                        ElementRef::Node(id) => nodes.get_mut(&id).map(|n| &mut n.properties),
                        ElementRef::Rel(id) => rels.get_mut(&id).map(|r| &mut r.properties),
                    };
                    if let Some(props) = props {
                        match prior {
                            Some(v) => {
                                props.insert(key, v);
                            }
                            None => {
                                props.remove(&key);
                            }
                        }
                    }
                }
            }
        }
    }

    fn current_property(&self, element: ElementRef, key: &str) -> Result<Option<Value>> {
        match element {
            ElementRef::Node(id) => self
                .nodes
                .read()
                .get(&id)
                .map(|n| n.properties.get(key).cloned())
                .ok_or_else(|| Error::NotFound(format!("node {id}"))),
            ElementRef::Rel(id) => self
                .rels
                .read()
                .get(&id)
                .map(|r| r.properties.get(key).cloned())
                .ok_or_else(|| Error::NotFound(format!("relationship {id}"))),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// GraphStore impl
// ============================================================================

impl GraphStore for MemoryStore {
    fn begin_tx(&self) -> Result<TxId> {
        let id = TxId(self.next_tx_id.fetch_add(1, Ordering::Relaxed));
        self.txs.lock().insert(id, TxState::default());
        Ok(id)
    }

    fn commit(&self, tx: TxId) -> Result<()> {
        self.txs.lock().remove(&tx).ok_or_else(|| Self::inactive(tx))?;
        self.release_locks(tx);
        Ok(())
    }

    fn rollback(&self, tx: TxId) -> Result<()> {
        let state = self.txs.lock().remove(&tx).ok_or_else(|| Self::inactive(tx))?;
        self.apply_undo(state.undo);
        self.release_locks(tx);
        Ok(())
    }

    fn is_tx_active(&self, tx: TxId) -> bool {
        self.txs.lock().contains_key(&tx)
    }

    fn reference_node(&self, tx: TxId) -> Result<NodeId> {
        self.require_tx(tx)?;
        Ok(REFERENCE_NODE)
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn create_node(&self, tx: TxId) -> Result<NodeId> {
        let id = NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed));
        self.record(tx, UndoOp::RemoveNode(id))?;
        self.nodes.write().insert(id, Node::new(id));
        self.adjacency.write().insert(id, Vec::new());
        Ok(id)
    }

    fn get_node(&self, tx: TxId, id: NodeId) -> Result<Option<Node>> {
        self.require_tx(tx)?;
        Ok(self.nodes.read().get(&id).cloned())
    }

    fn delete_node(&self, tx: TxId, id: NodeId) -> Result<bool> {
        self.require_tx(tx)?;
        let Some(node) = self.nodes.read().get(&id).cloned() else {
            return Ok(false);
        };
        let rel_count = self.adjacency.read().get(&id).map_or(0, Vec::len);
        if rel_count > 0 {
            return Err(Error::ConstraintViolation(format!(
                "cannot delete node {id} with {rel_count} relationships; delete relationships first"
            )));
        }
        self.record(tx, UndoOp::RestoreNode(node))?;
        self.nodes.write().remove(&id);
        self.adjacency.write().remove(&id);
        Ok(true)
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    fn create_relationship(
        &self,
        tx: TxId,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
    ) -> Result<RelId> {
        self.require_tx(tx)?;
        {
            let nodes = self.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("target node {dst}")));
            }
        }

        let id = RelId(self.next_rel_id.fetch_add(1, Ordering::Relaxed));
        self.record(tx, UndoOp::RemoveRel(id))?;
        self.rels
            .write()
            .insert(id, Relationship::new(id, src, dst, rel_type));

        let mut adjacency = self.adjacency.write();
        adjacency.entry(src).or_default().push(id);
        if src != dst {
            adjacency.entry(dst).or_default().push(id);
        }
        Ok(id)
    }

    fn get_relationship(&self, tx: TxId, id: RelId) -> Result<Option<Relationship>> {
        self.require_tx(tx)?;
        Ok(self.rels.read().get(&id).cloned())
    }

    fn delete_relationship(&self, tx: TxId, id: RelId) -> Result<bool> {
        self.require_tx(tx)?;
        let Some(rel) = self.rels.read().get(&id).cloned() else {
            return Ok(false);
        };
        self.record(tx, UndoOp::RestoreRel(rel.clone()))?;
        self.rels.write().remove(&id);

        let mut adjacency = self.adjacency.write();
        if let Some(v) = adjacency.get_mut(&rel.src) {
            v.retain(|r| *r != id);
        }
        if rel.src != rel.dst {
            if let Some(v) = adjacency.get_mut(&rel.dst) {
                v.retain(|r| *r != id);
            }
        }
        Ok(true)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn get_property(&self, tx: TxId, element: ElementRef, key: &str) -> Result<Option<Value>> {
        self.require_tx(tx)?;
        self.current_property(element, key)
    }

    fn set_property(&self, tx: TxId, element: ElementRef, key: &str, value: Value) -> Result<()> {
        self.require_tx(tx)?;
        let prior = self.current_property(element, key)?;
        self.record(
            tx,
            UndoOp::RestoreProperty {
                element,
                key: key.to_string(),
                prior,
            },
        )?;
        match element {
            ElementRef::Node(id) => {
                let mut nodes = self.nodes.write();
                let node = nodes
                    .get_mut(&id)
                    .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
                node.properties.insert(key.to_string(), value);
            }
            ElementRef::Rel(id) => {
                let mut rels = self.rels.write();
                let rel = rels
                    .get_mut(&id)
                    .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
                rel.properties.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn remove_property(&self, tx: TxId, element: ElementRef, key: &str) -> Result<()> {
        self.require_tx(tx)?;
        let prior = self.current_property(element, key)?;
        if prior.is_none() {
            return Ok(());
        }
        self.record(
            tx,
            UndoOp::RestoreProperty {
                element,
                key: key.to_string(),
                prior,
            },
        )?;
        match element {
            ElementRef::Node(id) => {
                if let Some(node) = self.nodes.write().get_mut(&id) {
                    node.properties.remove(key);
                }
            }
            ElementRef::Rel(id) => {
                if let Some(rel) = self.rels.write().get_mut(&id) {
                    rel.properties.remove(key);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn relationships(
        &self,
        tx: TxId,
        node: NodeId,
        rel_type: Option<&str>,
        dir: Direction,
    ) -> Result<Vec<Relationship>> {
        self.require_tx(tx)?;
        let adjacency = self.adjacency.read();
        let rels = self.rels.read();

        let rel_ids = adjacency.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for rid in rel_ids {
            if let Some(rel) = rels.get(&rid) {
                let matches_dir = match dir {
                    Direction::Outgoing => rel.src == node,
                    Direction::Incoming => rel.dst == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.is_none_or(|t| rel.rel_type == t);
                if matches_dir && matches_type {
                    result.push(rel.clone());
                }
            }
        }
        Ok(result)
    }

    // ========================================================================
    // Locking
    // ========================================================================

    fn lock_exclusive(&self, tx: TxId, element: ElementRef) -> Result<()> {
        self.require_tx(tx)?;
        let mut locks = self.locks.lock();
        loop {
            match locks.get(&element) {
                None => {
                    locks.insert(element, tx);
                    return Ok(());
                }
                Some(owner) if *owner == tx => return Ok(()),
                Some(_) => self.lock_released.wait(&mut locks),
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    fn node_count(&self, tx: TxId) -> Result<u64> {
        self.require_tx(tx)?;
        Ok(self.nodes.read().len() as u64)
    }

    fn relationship_count(&self, tx: TxId) -> Result<u64> {
        self.require_tx(tx)?;
        Ok(self.rels.read().len() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================
