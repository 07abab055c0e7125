//! Converting property access.
//!
//! Wraps the plain property accessor: values are serialized to a store
//! primitive on write and deserialized back to the declared kind on read.
//! Entity-reference and to-many relationship fields must never reach this
//! accessor — the reference factory is ordered earlier in the chain and
//! claims them, and this factory only looks at simple property kinds.

use std::sync::Arc;

use super::property::PropertyAccessor;
use super::{AccessorFactory, FieldAccessor};
use crate::convert::{ConvertDirection, ConversionService, FieldValue};
use crate::model::ElementRef;
use crate::schema::{EntityDef, FieldDef, FieldKind, ValueKind};
use crate::session::Session;
use crate::{Error, Result};

pub struct ConvertingAccessor {
    key: String,
    kind: ValueKind,
    inner: PropertyAccessor,
}

impl ConvertingAccessor {
    pub fn new(key: impl Into<String>, kind: ValueKind) -> Self {
        let key = key.into();
        Self {
            inner: PropertyAccessor::new(&key, kind.clone()),
            key,
            kind,
        }
    }

    // Converter-internal errors carry no field name; attach ours.
    fn named(&self, err: Error) -> Error {
        match err {
            Error::ConversionFailure { field, detail } if field.is_empty() => {
                Error::ConversionFailure {
                    field: self.key.clone(),
                    detail,
                }
            }
            other => other,
        }
    }
}

impl FieldAccessor for ConvertingAccessor {
    fn read(&self, session: &Session, element: ElementRef) -> Result<Option<FieldValue>> {
        match self.inner.read_raw(session, element)? {
            Some(raw) => session
                .conversions()
                .from_store(&self.key, &self.kind, &raw)
                .map(Some)
                .map_err(|e| self.named(e)),
            None => Ok(None),
        }
    }

    fn write(
        &self,
        session: &Session,
        element: ElementRef,
        value: Option<&FieldValue>,
    ) -> Result<()> {
        let raw = match value {
            Some(v) => Some(
                session
                    .conversions()
                    .to_store(&self.key, &self.kind, v)
                    .map_err(|e| self.named(e))?,
            ),
            None => None,
        };
        self.inner.write_raw(session, element, raw)
    }
}

/// Accepts simple-valued fields the conversion service can move in *both*
/// directions. One-directional coverage is not enough: such fields fall
/// through to the unbound fallback and fail at first access.
pub struct ConvertingAccessorFactory {
    conversions: Arc<ConversionService>,
}

impl ConvertingAccessorFactory {
    pub fn new(conversions: Arc<ConversionService>) -> Self {
        Self { conversions }
    }
}

impl AccessorFactory for ConvertingAccessorFactory {
    fn accepts(&self, _def: &EntityDef, field: &FieldDef) -> bool {
        let FieldKind::Property(kind) = &field.kind else {
            return false;
        };
        !kind.is_native()
            && self.conversions.can_convert(kind, ConvertDirection::ToStore)
            && self.conversions.can_convert(kind, ConvertDirection::FromStore)
    }

    fn build(&self, _def: &EntityDef, field: &FieldDef) -> Arc<dyn FieldAccessor> {
        let FieldKind::Property(kind) = &field.kind else {
            unreachable!("factory only accepts property fields");
        };
        Arc::new(ConvertingAccessor::new(&field.name, kind.clone()))
    }
}
