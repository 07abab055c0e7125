//! Per-entity lifecycle state.
//!
//! The state accessor owns the entity's binding to its backing element: the
//! current element reference (cleared while detached), the last-known
//! persisted identifier, a shadow cache of field values, and the buffer of
//! writes made while detached.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::access::FieldAccessorSet;
use crate::convert::FieldValue;
use crate::model::{ElementRef, NodeId};
use crate::schema::{Backing, EntityDef};
use crate::session::Session;
use crate::{Error, Result};

/// Where an entity stands relative to its backing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    /// No backing element yet.
    Unbound,
    /// Backing element set; all operations live.
    Attached,
    /// Element reference cleared; graph access is off-limits until reattach.
    Detached,
    /// Backing element deleted. Terminal.
    Destroyed,
}

pub struct EntityState {
    def: Arc<EntityDef>,
    accessors: Arc<FieldAccessorSet>,
    element: Option<ElementRef>,
    /// Persistent identity; survives detachment once assigned.
    known_id: Option<ElementRef>,
    /// Endpoint nodes for relationship-backed entities, set before attach.
    endpoints: Option<(NodeId, NodeId)>,
    /// Identifier of the primary (non-graph) counterpart of a partial entity.
    external_id: Option<String>,
    status: EntityStatus,
    /// Last-known field values. An entry of `None` records a known-absent field.
    cache: HashMap<String, Option<FieldValue>>,
    /// Writes buffered while detached, flushed on the next attach.
    pending: Vec<(String, Option<FieldValue>)>,
}

impl EntityState {
    pub(crate) fn new(def: Arc<EntityDef>, accessors: Arc<FieldAccessorSet>) -> Self {
        Self {
            def,
            accessors,
            element: None,
            known_id: None,
            endpoints: None,
            external_id: None,
            status: EntityStatus::Unbound,
            cache: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// State for an entity materialized from an existing element.
    pub(crate) fn for_element(
        def: Arc<EntityDef>,
        accessors: Arc<FieldAccessorSet>,
        element: ElementRef,
    ) -> Self {
        let mut state = Self::new(def, accessors);
        state.element = Some(element);
        state.known_id = Some(element);
        state.status = EntityStatus::Attached;
        state
    }

    /// State for a detached handle onto a persisted identifier. The element
    /// is resolved on the first attach; a missing element is a stale
    /// reference, never a silent create.
    pub(crate) fn for_reference(
        def: Arc<EntityDef>,
        accessors: Arc<FieldAccessorSet>,
        id: ElementRef,
    ) -> Self {
        let mut state = Self::new(def, accessors);
        state.known_id = Some(id);
        state.status = EntityStatus::Detached;
        state
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub(crate) fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    pub(crate) fn status(&self) -> EntityStatus {
        self.status
    }

    pub(crate) fn element(&self) -> Option<ElementRef> {
        self.element
    }

    pub(crate) fn known_id(&self) -> Option<ElementRef> {
        self.known_id
    }

    pub(crate) fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub(crate) fn set_external_id(&mut self, id: String) {
        self.external_id = Some(id);
    }

    pub(crate) fn set_endpoints(&mut self, src: NodeId, dst: NodeId) {
        self.endpoints = Some((src, dst));
    }

    pub(crate) fn guard_destroyed(&self) -> Result<()> {
        if self.status == EntityStatus::Destroyed {
            return Err(Error::InvalidAccess(format!(
                "entity of type `{}` has been deleted",
                self.def.name
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle transitions
    // ========================================================================

    /// Bind to a backing element. Idempotent: a bound state is left alone.
    ///
    /// With a known identifier the element is resolved from the store (a
    /// missing element is a `StaleReference`); without one a new element is
    /// created. Returns whether a genuinely new element was created.
    pub(crate) fn create_and_assign_state(&mut self, session: &Session) -> Result<bool> {
        if self.element.is_some() {
            return Ok(false);
        }
        let tx = session.current_tx().ok_or_else(|| {
            Error::NotInTransaction(format!(
                "attaching `{}` requires an active transaction",
                self.def.name
            ))
        })?;
        let store = session.store();

        if let Some(id) = self.known_id {
            match id {
                ElementRef::Node(n) => {
                    store.get_node(tx, n)?.ok_or(Error::StaleReference(id))?;
                }
                ElementRef::Rel(r) => {
                    store.get_relationship(tx, r)?.ok_or(Error::StaleReference(id))?;
                }
            }
            self.element = Some(id);
            self.status = EntityStatus::Attached;
            info!(entity = %self.def.name, element = %id, "entity reattached");
            return Ok(false);
        }

        let element = match &self.def.backing {
            Backing::Node => ElementRef::Node(store.create_node(tx)?),
            Backing::Relationship { rel_type } => {
                let (src, dst) = self.endpoints.ok_or_else(|| {
                    Error::InvalidAccess(format!(
                        "relationship entity `{}` needs both endpoint nodes before it can attach",
                        self.def.name
                    ))
                })?;
                ElementRef::Rel(store.create_relationship(tx, src, dst, rel_type)?)
            }
        };
        self.element = Some(element);
        self.known_id = Some(element);
        self.status = EntityStatus::Attached;
        debug!(entity = %self.def.name, element = %element, "backing element created");
        Ok(true)
    }

    /// Bind to a backing element and settle any deferred work: register a
    /// genuinely new node-backed instance with the type hierarchy, then
    /// flush writes buffered while detached.
    pub(crate) fn ensure_attached(&mut self, session: &Session) -> Result<()> {
        let created = self.create_and_assign_state(session)?;
        if created && self.def.is_node_backed() {
            if let Some(ElementRef::Node(node)) = self.element {
                session.register_new_instance(&self.def, node)?;
            }
        }
        self.flush_pending(session)
    }

    fn flush_pending(&mut self, session: &Session) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        debug!(entity = %self.def.name, writes = pending.len(), "flushing buffered writes");
        for (field, value) in pending {
            self.write_field(session, &field, value)?;
        }
        Ok(())
    }

    /// Drop the element binding. The persistent identifier and the value
    /// cache survive; graph access does not.
    pub(crate) fn detach(&mut self) {
        if self.status == EntityStatus::Attached {
            self.status = EntityStatus::Detached;
        }
        self.element = None;
    }

    pub(crate) fn destroy(&mut self) {
        self.status = EntityStatus::Destroyed;
        self.element = None;
    }

    // ========================================================================
    // Field dispatch
    // ========================================================================

    fn accessor(&self, field: &str) -> Result<Arc<dyn crate::access::FieldAccessor>> {
        self.accessors
            .accessor(field)
            .cloned()
            .ok_or_else(|| Error::UnknownField {
                entity: self.def.name.clone(),
                field: field.to_string(),
            })
    }

    pub(crate) fn is_local_field(&self, field: &str) -> Result<bool> {
        Ok(self.accessor(field)?.is_local())
    }

    pub(crate) fn local_read(&self, field: &str) -> Option<FieldValue> {
        self.cache.get(field).cloned().flatten()
    }

    pub(crate) fn local_write(&mut self, field: &str, value: Option<FieldValue>) {
        self.cache.insert(field.to_string(), value);
    }

    /// The last value seen for a field, if any access ever completed.
    pub(crate) fn cached(&self, field: &str) -> Option<Option<FieldValue>> {
        self.cache.get(field).cloned()
    }

    pub(crate) fn buffer_write(&mut self, field: &str, value: Option<FieldValue>) {
        self.pending.push((field.to_string(), value.clone()));
        self.cache.insert(field.to_string(), value);
    }

    /// Read through the bound accessor. Requires a live element for
    /// store-backed fields; local fields come from the cache.
    pub(crate) fn read_field(
        &mut self,
        session: &Session,
        field: &str,
    ) -> Result<Option<FieldValue>> {
        let accessor = self.accessor(field)?;
        if accessor.is_local() {
            return Ok(self.local_read(field));
        }
        let element = self.element.ok_or_else(|| {
            Error::InvalidAccess(format!(
                "reading field `{field}` requires `{}` to be attached",
                self.def.name
            ))
        })?;
        let value = accessor.read(session, element)?;
        self.cache.insert(field.to_string(), value.clone());
        Ok(value)
    }

    /// Write through the bound accessor, immediately. No buffering here —
    /// buffering is a detached-lifecycle concern, not a field concern.
    pub(crate) fn write_field(
        &mut self,
        session: &Session,
        field: &str,
        value: Option<FieldValue>,
    ) -> Result<()> {
        let accessor = self.accessor(field)?;
        if accessor.is_local() {
            self.local_write(field, value);
            return Ok(());
        }
        let element = self.element.ok_or_else(|| {
            Error::InvalidAccess(format!(
                "writing field `{field}` requires `{}` to be attached",
                self.def.name
            ))
        })?;
        accessor.write(session, element, value.as_ref())?;
        self.cache.insert(field.to_string(), value);
        Ok(())
    }
}
