//! # Session
//!
//! A [`Session`] is the explicit ambient-transaction handle: it owns at most
//! one live transaction against the shared store and threads it through every
//! entity operation. Sessions are cheap; open one per unit of work (or per
//! thread) rather than sharing one across threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::convert::ConversionService;
use crate::entity::Entity;
use crate::hierarchy::TypeInstances;
use crate::manager::EntityManager;
use crate::model::{ElementRef, NodeId, RelId};
use crate::schema::{Backing, EntityDef};
use crate::store::{GraphStore, TxId};
use crate::{Error, Result};

pub struct Session {
    manager: Arc<EntityManager>,
    tx: Mutex<Option<TxId>>,
}

impl Session {
    pub(crate) fn new(manager: Arc<EntityManager>) -> Self {
        Self {
            manager,
            tx: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<EntityManager> {
        &self.manager
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction on this session.
    pub fn begin_tx(&self) -> Result<()> {
        let mut tx = self.tx.lock();
        if tx.is_some_and(|t| self.manager.store().is_tx_active(t)) {
            return Err(Error::InvalidAccess(
                "a transaction is already active on this session".into(),
            ));
        }
        *tx = Some(self.manager.store().begin_tx()?);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .take()
            .ok_or_else(|| Error::NotInTransaction("nothing to commit".into()))?;
        self.manager.store().commit(tx)
    }

    pub fn rollback(&self) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .take()
            .ok_or_else(|| Error::NotInTransaction("nothing to roll back".into()))?;
        self.manager.store().rollback(tx)
    }

    pub fn in_transaction(&self) -> bool {
        self.current_tx().is_some()
    }

    pub(crate) fn current_tx(&self) -> Option<TxId> {
        let tx = self.tx.lock();
        tx.filter(|t| self.manager.store().is_tx_active(*t))
    }

    pub(crate) fn require_tx(&self) -> Result<TxId> {
        self.current_tx().ok_or_else(|| {
            Error::NotInTransaction("no transaction is active on this session".into())
        })
    }

    /// Run `f` inside the innermost real transaction: an open one is reused;
    /// otherwise a transaction is opened for the closure and committed on
    /// success, rolled back on failure.
    pub fn with_tx<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        if self.in_transaction() {
            return f(self);
        }
        self.begin_tx()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback();
                Err(err)
            }
        }
    }

    pub(crate) fn store(&self) -> &dyn GraphStore {
        self.manager.store()
    }

    pub(crate) fn conversions(&self) -> &ConversionService {
        self.manager.conversions()
    }

    // ========================================================================
    // Entity construction
    // ========================================================================

    /// Construct an unbound entity of a registered type. Nothing touches the
    /// store until the entity attaches.
    pub fn instantiate(&self, type_name: &str) -> Result<Entity> {
        let def = self.manager.registry().resolve(type_name)?;
        Ok(self.manager.unbound_entity(def))
    }

    /// Create a node-backed entity: construct, attach (creating the backing
    /// node), and register it with the type hierarchy.
    pub fn create(&self, type_name: &str) -> Result<Entity> {
        let def = self.manager.registry().resolve(type_name)?;
        if !def.is_node_backed() {
            return Err(Error::InvalidAccess(format!(
                "`{type_name}` is relationship-backed; use create_between"
            )));
        }
        let mut entity = self.manager.unbound_entity(def);
        entity.attach_on_create(self)?;
        Ok(entity)
    }

    /// Create a relationship-backed entity between two existing nodes.
    pub fn create_between(&self, type_name: &str, src: NodeId, dst: NodeId) -> Result<Entity> {
        let def = self.manager.registry().resolve(type_name)?;
        if def.is_node_backed() {
            return Err(Error::InvalidAccess(format!(
                "`{type_name}` is node-backed; use create"
            )));
        }
        let mut entity = self.manager.unbound_entity(def);
        entity.state_mut().set_endpoints(src, dst);
        entity.attach_on_create(self)?;
        Ok(entity)
    }

    /// Materialize the entity backing an existing node, typed by the graph
    /// (reverse type lookup).
    pub fn load(&self, node: NodeId) -> Result<Entity> {
        let tx = self.require_tx()?;
        if self.store().get_node(tx, node)?.is_none() {
            return Err(Error::NotFound(format!("node {node}")));
        }
        let def = self.manager.hierarchy().stored_type(self.store(), tx, node)?;
        Ok(self
            .manager
            .entity_for_element(def, ElementRef::Node(node)))
    }

    /// Materialize a relationship-backed entity from its relationship.
    pub fn load_relationship(&self, type_name: &str, id: RelId) -> Result<Entity> {
        let tx = self.require_tx()?;
        let def = self.manager.registry().resolve(type_name)?;
        let Backing::Relationship { rel_type } = &def.backing else {
            return Err(Error::InvalidAccess(format!(
                "`{type_name}` is node-backed; use load"
            )));
        };
        let rel = self
            .store()
            .get_relationship(tx, id)?
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        if rel.rel_type != *rel_type {
            return Err(Error::TypeMismatch {
                expected: type_name.to_string(),
                actual: rel.rel_type,
                element: ElementRef::Rel(id),
            });
        }
        Ok(self.manager.entity_for_element(def, ElementRef::Rel(id)))
    }

    /// A detached handle onto a persisted identifier — e.g. reconstructed
    /// from a reference stored elsewhere. The element is resolved on first
    /// attach; if it no longer exists, that attach fails with
    /// `StaleReference`.
    pub fn reference(&self, type_name: &str, id: ElementRef) -> Result<Entity> {
        let def = self.manager.registry().resolve(type_name)?;
        let compatible = match id {
            ElementRef::Node(_) => def.is_node_backed(),
            ElementRef::Rel(_) => !def.is_node_backed(),
        };
        if !compatible {
            return Err(Error::InvalidAccess(format!(
                "{id} cannot back an entity of type `{type_name}`"
            )));
        }
        Ok(self.manager.entity_reference(def, id))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Delete an entity's backing element. The type hierarchy is notified
    /// first (while the `INSTANCE_OF` link still exists), then the element
    /// and its remaining relationships are removed. The entity transitions
    /// to its terminal destroyed state.
    pub fn delete(&self, entity: &mut Entity) -> Result<()> {
        let tx = self.require_tx()?;
        if entity.id().is_none() {
            return Err(Error::InvalidAccess(
                "cannot delete a never-persisted entity".into(),
            ));
        }
        entity.attach(self)?;
        let element = entity.element().ok_or_else(|| {
            Error::InvalidAccess("entity did not resolve a backing element".into())
        })?;

        match element {
            ElementRef::Node(node) => {
                self.manager
                    .hierarchy()
                    .pre_entity_removal(self.store(), tx, node)?;
                self.store().detach_delete_node(tx, node)?;
            }
            ElementRef::Rel(rel) => {
                self.store().delete_relationship(tx, rel)?;
            }
        }
        entity.state_mut().destroy();
        Ok(())
    }

    // ========================================================================
    // Type queries
    // ========================================================================

    /// Instances of a registered class, counting subtypes. Zero for a class
    /// that never had an instance.
    pub fn count(&self, type_name: &str) -> Result<u64> {
        let tx = self.require_tx()?;
        self.manager.registry().resolve(type_name)?;
        self.manager.hierarchy().count(self.store(), tx, type_name)
    }

    /// Polymorphic enumeration: all instances of a class and its subtypes,
    /// as a lazy sequence of materialized entities.
    pub fn find_all(&self, type_name: &str) -> Result<Entities<'_>> {
        let tx = self.require_tx()?;
        let def = self.manager.registry().resolve(type_name)?;
        if !def.is_node_backed() {
            return Err(Error::InvalidAccess(format!(
                "`{type_name}` is relationship-backed; polymorphic enumeration covers node-backed types"
            )));
        }
        let inner = self
            .manager
            .hierarchy()
            .instances(self.store(), tx, type_name)?;
        Ok(Entities {
            session: self,
            inner,
        })
    }

    /// The declared type stored in the graph for a node.
    pub fn stored_type(&self, node: NodeId) -> Result<Arc<EntityDef>> {
        let tx = self.require_tx()?;
        self.manager.hierarchy().stored_type(self.store(), tx, node)
    }

    /// Resolve a node's stored type and require it to be `expected` or one
    /// of its subtypes.
    pub fn confirm_type(&self, node: NodeId, expected: &str) -> Result<Arc<EntityDef>> {
        let tx = self.require_tx()?;
        self.manager
            .hierarchy()
            .confirm_type(self.store(), tx, node, expected)
    }

    pub(crate) fn register_new_instance(&self, def: &Arc<EntityDef>, node: NodeId) -> Result<()> {
        let tx = self.require_tx()?;
        self.manager
            .hierarchy()
            .post_entity_creation(self.store(), tx, def, node)
    }
}

// ============================================================================
// Enumeration
// ============================================================================

/// Lazy sequence of materialized entities, produced by [`Session::find_all`].
pub struct Entities<'s> {
    session: &'s Session,
    inner: TypeInstances<'s>,
}

impl Iterator for Entities<'_> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next()?;
        Some(next.and_then(|(node, type_name)| {
            let def = self.session.manager.registry().resolve(&type_name)?;
            Ok(self
                .session
                .manager
                .entity_for_element(def, ElementRef::Node(node)))
        }))
    }
}
