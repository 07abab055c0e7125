//! # Type Hierarchy Index
//!
//! Represents the class hierarchy of stored entities directly in the graph:
//! one *type node* per class that has ever had an instance, anchored to the
//! store's reference node by a `SUBREF_<name>` relationship. Instance nodes
//! point at their exact type node with `INSTANCE_OF`; a type node points at
//! its superclass's type node with `SUBCLASS_OF` (out-degree ≤ 1, so the
//! hierarchy forms a forest). Each type node carries a `count` property
//! holding its subtree total — direct instances plus every instance of a
//! subtype.
//!
//! Type nodes are created lazily and never deleted, even at count zero.
//! Counter updates take an exclusive lock on the type node for the whole
//! read-modify-write; the store releases it at transaction end, which
//! serializes concurrent creators and removers of the same class.
//!
//! This index depends on the store and the injected type registry only. It
//! meets the entity lifecycle at exactly two points: after creation and
//! before removal.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::model::{Direction, ElementRef, NodeId, Value};
use crate::schema::{EntityDef, TypeRegistry};
use crate::store::{GraphStore, TxId};
use crate::{Error, Result};

/// Relationship from an instance node to its exact type node.
pub const INSTANCE_OF: &str = "INSTANCE_OF";
/// Relationship from a type node to its superclass's type node.
pub const SUBCLASS_OF: &str = "SUBCLASS_OF";
/// Prefix of the relationship anchoring a type node to the reference node.
pub const SUBREF_PREFIX: &str = "SUBREF_";
/// Instance counter property on type nodes (subtree total).
pub const COUNTER_KEY: &str = "count";
/// Class name property on type nodes.
pub const CLASS_KEY: &str = "class";

/// The graph-resident type index.
pub struct TypeHierarchy {
    registry: Arc<TypeRegistry>,
    /// class name → type node, memoized across transactions
    subrefs: RwLock<HashMap<String, NodeId>>,
}

impl TypeHierarchy {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            subrefs: RwLock::new(HashMap::new()),
        }
    }

    fn anchor_rel_type(name: &str) -> String {
        format!("{SUBREF_PREFIX}{name}")
    }

    // ========================================================================
    // Type node resolution
    // ========================================================================

    fn memoized(&self, store: &dyn GraphStore, tx: TxId, name: &str) -> Result<Option<NodeId>> {
        let hit = self.subrefs.read().get(name).copied();
        if let Some(id) = hit {
            // A rolled-back creation can leave a dangling memo entry.
            if store.get_node(tx, id)?.is_some() {
                return Ok(Some(id));
            }
            self.subrefs.write().remove(name);
        }
        Ok(None)
    }

    fn probe(&self, store: &dyn GraphStore, tx: TxId, name: &str) -> Result<Option<NodeId>> {
        let root = store.reference_node(tx)?;
        let rel =
            store.single_relationship(tx, root, &Self::anchor_rel_type(name), Direction::Outgoing)?;
        Ok(rel.map(|r| {
            self.subrefs.write().insert(name.to_string(), r.dst);
            r.dst
        }))
    }

    /// Look up the type node for a class, without creating it.
    fn find_subref(&self, store: &dyn GraphStore, tx: TxId, name: &str) -> Result<Option<NodeId>> {
        if let Some(id) = self.memoized(store, tx, name)? {
            return Ok(Some(id));
        }
        self.probe(store, tx, name)
    }

    /// Resolve or create the type node for a class. Creation double-checks
    /// under the reference node's exclusive lock, so concurrent creators of
    /// the first instance reuse one node instead of duplicating it.
    fn obtain_subref(&self, store: &dyn GraphStore, tx: TxId, name: &str) -> Result<NodeId> {
        if let Some(id) = self.find_subref(store, tx, name)? {
            return Ok(id);
        }
        let root = store.reference_node(tx)?;
        store.lock_exclusive(tx, root.into())?;
        if let Some(id) = self.probe(store, tx, name)? {
            return Ok(id);
        }

        let node = store.create_node(tx)?;
        store.create_relationship(tx, root, node, &Self::anchor_rel_type(name))?;
        store.set_property(tx, node.into(), CLASS_KEY, Value::from(name))?;
        debug!(class = name, type_node = %node, "created type node");
        self.subrefs.write().insert(name.to_string(), node);
        Ok(node)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    fn counter(store: &dyn GraphStore, tx: TxId, node: NodeId) -> Result<i64> {
        Ok(store
            .get_property(tx, node.into(), COUNTER_KEY)?
            .and_then(|v| v.as_int())
            .unwrap_or(0))
    }

    fn increment(store: &dyn GraphStore, tx: TxId, node: NodeId) -> Result<i64> {
        store.lock_exclusive(tx, node.into())?;
        let value = Self::counter(store, tx, node)? + 1;
        store.set_property(tx, node.into(), COUNTER_KEY, Value::Int(value))?;
        Ok(value)
    }

    fn decrement_clamped(store: &dyn GraphStore, tx: TxId, node: NodeId) -> Result<i64> {
        store.lock_exclusive(tx, node.into())?;
        let value = (Self::counter(store, tx, node)? - 1).max(0);
        store.set_property(tx, node.into(), COUNTER_KEY, Value::Int(value))?;
        Ok(value)
    }

    // ========================================================================
    // Lifecycle hooks
    // ========================================================================

    /// Register a freshly created instance: link it to its exact type node,
    /// bump that counter, then walk the declared superclass chain — ensuring
    /// a single `SUBCLASS_OF` link per level and bumping each ancestor.
    pub fn post_entity_creation(
        &self,
        store: &dyn GraphStore,
        tx: TxId,
        def: &Arc<EntityDef>,
        node: NodeId,
    ) -> Result<()> {
        let subref = self.obtain_subref(store, tx, &def.name)?;
        store.create_relationship(tx, node, subref, INSTANCE_OF)?;
        let count = Self::increment(store, tx, subref)?;
        debug!(class = %def.name, instance = %node, count, "registered instance");

        let mut child = subref;
        for ancestor in self.registry.superclass_chain(&def.name) {
            let parent = self.obtain_subref(store, tx, &ancestor.name)?;
            if store
                .single_relationship(tx, child, SUBCLASS_OF, Direction::Outgoing)?
                .is_none()
            {
                store.create_relationship(tx, child, parent, SUBCLASS_OF)?;
            }
            let count = Self::increment(store, tx, parent)?;
            debug!(class = %ancestor.name, count, "incremented supertype counter");
            child = parent;
        }
        Ok(())
    }

    /// Unregister an instance about to be removed: read and delete its
    /// `INSTANCE_OF` link, then decrement the exact type node and every
    /// ancestor reachable over `SUBCLASS_OF`, clamped at zero.
    ///
    /// Must run while the instance node still exists — the link is the only
    /// way to find the right type node.
    pub fn pre_entity_removal(&self, store: &dyn GraphStore, tx: TxId, node: NodeId) -> Result<()> {
        let instance_of = store
            .single_relationship(tx, node, INSTANCE_OF, Direction::Outgoing)?
            .ok_or_else(|| {
                Error::NotFound(format!("no {INSTANCE_OF} relationship on node {node}"))
            })?;
        let subref = instance_of.dst;
        store.delete_relationship(tx, instance_of.id)?;
        debug!(instance = %node, "removed instance link");

        let mut current = Some(subref);
        while let Some(type_node) = current {
            let count = Self::decrement_clamped(store, tx, type_node)?;
            debug!(type_node = %type_node, count, "decremented counter");
            current = store
                .single_relationship(tx, type_node, SUBCLASS_OF, Direction::Outgoing)?
                .map(|r| r.dst);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The subtree total for a class, or zero if it never had an instance.
    /// Never creates a type node.
    pub fn count(&self, store: &dyn GraphStore, tx: TxId, name: &str) -> Result<u64> {
        match self.find_subref(store, tx, name)? {
            Some(node) => Ok(Self::counter(store, tx, node)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Lazily enumerate all instances of a class and its subtypes, yielding
    /// `(instance node, exact class name)` pairs. Order across sibling
    /// subtypes is unspecified; each instance appears exactly once.
    pub fn instances<'a>(
        &self,
        store: &'a dyn GraphStore,
        tx: TxId,
        name: &str,
    ) -> Result<TypeInstances<'a>> {
        let start = self.find_subref(store, tx, name)?;
        Ok(TypeInstances {
            store,
            tx,
            pending: start.into_iter().collect(),
            current: Vec::new().into_iter(),
        })
    }

    /// Reverse lookup: the declared type stored for an instance node. The
    /// registry is the source of truth — an unresolvable stored name is
    /// fatal, never defaulted.
    pub fn stored_type(
        &self,
        store: &dyn GraphStore,
        tx: TxId,
        node: NodeId,
    ) -> Result<Arc<EntityDef>> {
        let rel = store
            .single_relationship(tx, node, INSTANCE_OF, Direction::Outgoing)?
            .ok_or_else(|| Error::NotFound(format!("no type recorded for node {node}")))?;
        let class = store
            .get_property(tx, rel.dst.into(), CLASS_KEY)?
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| Error::NotFound(format!("type node {} has no class name", rel.dst)))?;
        self.registry.resolve(&class)
    }

    /// Resolve the stored type and require it to be `expected` or a subtype.
    pub fn confirm_type(
        &self,
        store: &dyn GraphStore,
        tx: TxId,
        node: NodeId,
        expected: &str,
    ) -> Result<Arc<EntityDef>> {
        let actual = self.stored_type(store, tx, node)?;
        if self.registry.is_subtype_of(&actual.name, expected) {
            Ok(actual)
        } else {
            Err(Error::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.name.clone(),
                element: ElementRef::Node(node),
            })
        }
    }
}

// ============================================================================
// Enumeration
// ============================================================================

/// Walks the subtype tree lazily: a type node's instance links are fetched
/// only when the walk reaches it, and subtypes are discovered by following
/// `SUBCLASS_OF` backward from each visited node.
pub struct TypeInstances<'a> {
    store: &'a dyn GraphStore,
    tx: TxId,
    /// type nodes not yet expanded
    pending: Vec<NodeId>,
    current: std::vec::IntoIter<(NodeId, String)>,
}

impl TypeInstances<'_> {
    fn expand(&mut self, subref: NodeId) -> Result<Vec<(NodeId, String)>> {
        for rel in self
            .store
            .relationships(self.tx, subref, Some(SUBCLASS_OF), Direction::Incoming)?
        {
            self.pending.push(rel.src);
        }
        let class = self
            .store
            .get_property(self.tx, subref.into(), CLASS_KEY)?
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| Error::NotFound(format!("type node {subref} has no class name")))?;
        let rels = self
            .store
            .relationships(self.tx, subref, Some(INSTANCE_OF), Direction::Incoming)?;
        Ok(rels.into_iter().map(|r| (r.src, class.clone())).collect())
    }
}

impl Iterator for TypeInstances<'_> {
    type Item = Result<(NodeId, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(Ok(item));
            }
            let subref = self.pending.pop()?;
            match self.expand(subref) {
                Ok(batch) => self.current = batch.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
