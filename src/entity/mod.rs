//! # Entities
//!
//! An [`Entity`] is the in-memory face of one backing element. It owns its
//! per-instance lifecycle state and routes every field access through the
//! lifecycle policy selected for its type — which in turn dispatches to the
//! shared field accessors. Construction-time wiring replaces any notion of
//! intercepting raw field access.

pub mod lifecycle;
pub mod state;

use std::sync::Arc;

use crate::Result;
use crate::convert::FieldValue;
use crate::model::{ElementRef, NodeId};
use crate::schema::EntityDef;
use crate::session::Session;

pub use lifecycle::{
    AutoAttachPolicy, BasePolicy, DetachablePolicy, LifecyclePolicy, select_policy,
};
pub use state::{EntityState, EntityStatus};

/// A typed domain object backed by a graph element.
///
/// All operations that touch the store take the [`Session`] explicitly — the
/// session carries the ambient transaction.
pub struct Entity {
    state: EntityState,
    policy: Arc<dyn LifecyclePolicy>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("type_name", &self.type_name())
            .field("status", &self.state.status())
            .finish()
    }
}

impl Entity {
    pub(crate) fn new(state: EntityState, policy: Arc<dyn LifecyclePolicy>) -> Self {
        Self { state, policy }
    }

    pub fn type_name(&self) -> &str {
        &self.state.def().name
    }

    pub fn def(&self) -> &Arc<EntityDef> {
        self.state.def()
    }

    pub fn status(&self) -> EntityStatus {
        self.state.status()
    }

    /// The persistent identity, once assigned. Survives detachment.
    pub fn id(&self) -> Option<ElementRef> {
        self.state.known_id()
    }

    /// Shorthand for node-backed entities.
    pub fn node_id(&self) -> Option<NodeId> {
        self.id().and_then(|e| e.as_node())
    }

    /// The live element binding; `None` while detached.
    pub fn element(&self) -> Option<ElementRef> {
        self.state.element()
    }

    // ========================================================================
    // Field access
    // ========================================================================

    pub fn get(&mut self, session: &Session, field: &str) -> Result<Option<FieldValue>> {
        self.state.guard_destroyed()?;
        let policy = Arc::clone(&self.policy);
        policy.read(session, &mut self.state, field)
    }

    pub fn set(
        &mut self,
        session: &Session,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        self.state.guard_destroyed()?;
        let policy = Arc::clone(&self.policy);
        policy.write(session, &mut self.state, field, Some(value.into()))
    }

    /// Clear a field: removes the property or relationship backing it.
    pub fn clear(&mut self, session: &Session, field: &str) -> Result<()> {
        self.state.guard_destroyed()?;
        let policy = Arc::clone(&self.policy);
        policy.write(session, &mut self.state, field, None)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Ensure this entity is attached to its backing element, creating or
    /// resolving it as needed. Returns the entity for chaining.
    pub fn attach(&mut self, session: &Session) -> Result<&mut Self> {
        self.state.guard_destroyed()?;
        let policy = Arc::clone(&self.policy);
        policy.attach(session, &mut self.state, false)?;
        Ok(self)
    }

    pub(crate) fn attach_on_create(&mut self, session: &Session) -> Result<()> {
        self.state.guard_destroyed()?;
        let policy = Arc::clone(&self.policy);
        policy.attach(session, &mut self.state, true)
    }

    /// Drop the element binding, keeping the persistent identity and the
    /// value cache.
    pub fn detach(&mut self) {
        self.state.detach();
    }

    /// Record the identifier of the primary (non-graph) counterpart. Partial
    /// entity types refuse graph access until this is set.
    pub fn set_external_id(&mut self, id: impl Into<String>) {
        self.state.set_external_id(id.into());
    }

    pub fn external_id(&self) -> Option<&str> {
        self.state.external_id()
    }

    pub(crate) fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }
}
