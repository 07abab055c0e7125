//! Lifecycle policies.
//!
//! How field access behaves relative to the ambient transaction is a
//! per-type strategy, chosen once from the type's declared flags and shared
//! by all its instances. Policies compose: the detachable and auto-attach
//! strategies wrap the base strategy rather than reimplementing dispatch.

use std::sync::Arc;

use tracing::trace;

use super::state::EntityState;
use crate::convert::FieldValue;
use crate::schema::EntityDef;
use crate::session::Session;
use crate::{Error, Result};

/// One common lifecycle interface for every policy.
pub trait LifecyclePolicy: Send + Sync {
    fn read(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
    ) -> Result<Option<FieldValue>>;

    fn write(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
        value: Option<FieldValue>,
    ) -> Result<()>;

    fn attach(&self, session: &Session, state: &mut EntityState, on_create: bool) -> Result<()>;
}

/// Select the policy stack for a type from its declared configuration.
///
/// Partial projections get the detachable strategy in id-gated mode;
/// auto-attach types get the nested-transaction strategy; everything else
/// gets plain detachable semantics.
pub fn select_policy(def: &EntityDef) -> Arc<dyn LifecyclePolicy> {
    let base = Arc::new(BasePolicy);
    if def.partial {
        Arc::new(DetachablePolicy::partial(base))
    } else if def.auto_attach {
        Arc::new(AutoAttachPolicy::new(base))
    } else {
        Arc::new(DetachablePolicy::new(base))
    }
}

// ============================================================================
// Base
// ============================================================================

/// Direct dispatch to the field accessors. Assumes an ambient transaction and
/// a live attachment; graph access on a detached entity is refused, not
/// served from stale data.
pub struct BasePolicy;

impl LifecyclePolicy for BasePolicy {
    fn read(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
    ) -> Result<Option<FieldValue>> {
        state.read_field(session, field)
    }

    fn write(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
        value: Option<FieldValue>,
    ) -> Result<()> {
        state.write_field(session, field, value)
    }

    fn attach(&self, session: &Session, state: &mut EntityState, on_create: bool) -> Result<()> {
        if on_create {
            trace!(entity = %state.def().name, "attach on create");
        }
        state.ensure_attached(session)
    }
}

// ============================================================================
// Detachable
// ============================================================================

/// Makes entities usable outside a transaction.
///
/// Inside a transaction this attaches and delegates. Outside, an entity with
/// a known identifier serves reads from its value cache and buffers writes
/// until the next attach; an entity that was never persisted can do neither.
pub struct DetachablePolicy {
    inner: Arc<dyn LifecyclePolicy>,
    /// Partial projections: a transaction only counts as visible once the
    /// external identifier of the primary counterpart is known.
    require_external_id: bool,
}

impl DetachablePolicy {
    pub fn new(inner: Arc<dyn LifecyclePolicy>) -> Self {
        Self {
            inner,
            require_external_id: false,
        }
    }

    pub fn partial(inner: Arc<dyn LifecyclePolicy>) -> Self {
        Self {
            inner,
            require_external_id: true,
        }
    }

    fn tx_visible(&self, session: &Session, state: &EntityState) -> bool {
        session.in_transaction()
            && (!self.require_external_id || state.external_id().is_some())
    }
}

impl LifecyclePolicy for DetachablePolicy {
    fn read(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
    ) -> Result<Option<FieldValue>> {
        if self.tx_visible(session, state) {
            self.inner.attach(session, state, false)?;
            return self.inner.read(session, state, field);
        }
        if state.is_local_field(field)? {
            return Ok(state.local_read(field));
        }
        if state.known_id().is_none() {
            return Err(Error::NotInTransaction(format!(
                "reading field `{field}` on a never-persisted entity"
            )));
        }
        // Cached values (including known-absent ones) may be served; a field
        // never loaded while attached would require the element — fail fast
        // instead of inventing a value.
        match state.cached(field) {
            Some(value) => Ok(value),
            None => Err(Error::NotInTransaction(format!(
                "field `{field}` was never loaded while attached"
            ))),
        }
    }

    fn write(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
        value: Option<FieldValue>,
    ) -> Result<()> {
        if self.tx_visible(session, state) {
            self.inner.attach(session, state, false)?;
            return self.inner.write(session, state, field, value);
        }
        if state.is_local_field(field)? {
            state.local_write(field, value);
            return Ok(());
        }
        if state.known_id().is_some() {
            trace!(field, "buffering write on detached entity");
            state.buffer_write(field, value);
            Ok(())
        } else {
            Err(Error::DetachedWriteRejected(field.to_string()))
        }
    }

    fn attach(&self, session: &Session, state: &mut EntityState, on_create: bool) -> Result<()> {
        if self.tx_visible(session, state) {
            self.inner.attach(session, state, on_create)
        } else {
            Err(Error::NotInTransaction(format!(
                "attaching `{}` requires an active transaction",
                state.def().name
            )))
        }
    }
}

// ============================================================================
// Auto-attach (nested transaction)
// ============================================================================

/// Gives callers transaction-free ergonomics: when no transaction is visible
/// on the session, each access runs in its own micro-transaction, committed
/// before returning (rolled back on failure). An already-open transaction is
/// propagated, never nested.
pub struct AutoAttachPolicy {
    inner: Arc<dyn LifecyclePolicy>,
}

impl AutoAttachPolicy {
    pub fn new(inner: Arc<dyn LifecyclePolicy>) -> Self {
        Self { inner }
    }
}

impl LifecyclePolicy for AutoAttachPolicy {
    fn read(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
    ) -> Result<Option<FieldValue>> {
        if !session.in_transaction() {
            trace!(field, "micro-transaction for read");
        }
        session.with_tx(|s| {
            self.inner.attach(s, state, false)?;
            self.inner.read(s, state, field)
        })
    }

    fn write(
        &self,
        session: &Session,
        state: &mut EntityState,
        field: &str,
        value: Option<FieldValue>,
    ) -> Result<()> {
        if !session.in_transaction() {
            trace!(field, "micro-transaction for write");
        }
        session.with_tx(|s| {
            self.inner.attach(s, state, false)?;
            self.inner.write(s, state, field, value)
        })
    }

    fn attach(&self, session: &Session, state: &mut EntityState, on_create: bool) -> Result<()> {
        session.with_tx(|s| self.inner.attach(s, state, on_create))
    }
}
