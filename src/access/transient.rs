//! Transient fields.
//!
//! Claimed by the first factory in the chain, so a transient declaration
//! wins over every persistence strategy. The entity state serves these
//! fields from its own value cache; the store is never involved.

use std::sync::Arc;

use super::{AccessorFactory, FieldAccessor};
use crate::Result;
use crate::convert::FieldValue;
use crate::model::ElementRef;
use crate::schema::{EntityDef, FieldDef};
use crate::session::Session;

pub struct TransientAccessor;

impl FieldAccessor for TransientAccessor {
    fn read(&self, _session: &Session, _element: ElementRef) -> Result<Option<FieldValue>> {
        Ok(None)
    }

    fn write(
        &self,
        _session: &Session,
        _element: ElementRef,
        _value: Option<&FieldValue>,
    ) -> Result<()> {
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

pub struct TransientAccessorFactory;

impl AccessorFactory for TransientAccessorFactory {
    fn accepts(&self, _def: &EntityDef, field: &FieldDef) -> bool {
        field.is_transient()
    }

    fn build(&self, _def: &EntityDef, _field: &FieldDef) -> Arc<dyn FieldAccessor> {
        Arc::new(TransientAccessor)
    }
}
