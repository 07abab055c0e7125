//! Plain property access for natively storable kinds.

use std::sync::Arc;

use super::{AccessorFactory, FieldAccessor};
use crate::convert::FieldValue;
use crate::model::{ElementRef, Value};
use crate::schema::{EntityDef, FieldDef, FieldKind, ValueKind};
use crate::session::Session;
use crate::{Error, Result};

/// Reads and writes one element property under the field's name.
pub struct PropertyAccessor {
    key: String,
    kind: ValueKind,
}

impl PropertyAccessor {
    pub fn new(key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }

    /// Raw property read, shared with the converting accessor.
    pub(crate) fn read_raw(
        &self,
        session: &Session,
        element: ElementRef,
    ) -> Result<Option<Value>> {
        let tx = session.require_tx()?;
        session.store().get_property(tx, element, &self.key)
    }

    /// Raw property write, shared with the converting accessor.
    pub(crate) fn write_raw(
        &self,
        session: &Session,
        element: ElementRef,
        raw: Option<Value>,
    ) -> Result<()> {
        let tx = session.require_tx()?;
        match raw {
            Some(value) => session.store().set_property(tx, element, &self.key, value),
            None => session.store().remove_property(tx, element, &self.key),
        }
    }

    fn decode(&self, raw: Value) -> Result<FieldValue> {
        match (&self.kind, raw) {
            (ValueKind::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(b)),
            (ValueKind::Int, Value::Int(i)) => Ok(FieldValue::Int(i)),
            (ValueKind::Float, Value::Float(f)) => Ok(FieldValue::Float(f)),
            (ValueKind::Text, Value::String(s)) => Ok(FieldValue::Text(s)),
            (kind, raw) => Err(Error::ConversionFailure {
                field: self.key.clone(),
                detail: format!(
                    "stored {} where `{}` was declared",
                    raw.type_name(),
                    kind.name()
                ),
            }),
        }
    }

    fn encode(&self, value: &FieldValue) -> Result<Value> {
        if !value.matches_kind(&self.kind) {
            return Err(Error::ConversionFailure {
                field: self.key.clone(),
                detail: format!(
                    "{} value for a field declared `{}`",
                    value.describe(),
                    self.kind.name()
                ),
            });
        }
        match value {
            FieldValue::Bool(b) => Ok(Value::Bool(*b)),
            FieldValue::Int(i) => Ok(Value::Int(*i)),
            FieldValue::Float(f) => Ok(Value::Float(*f)),
            FieldValue::Text(s) => Ok(Value::String(s.clone())),
            other => Err(Error::ConversionFailure {
                field: self.key.clone(),
                detail: format!("{} is not natively storable", other.describe()),
            }),
        }
    }
}

impl FieldAccessor for PropertyAccessor {
    fn read(&self, session: &Session, element: ElementRef) -> Result<Option<FieldValue>> {
        self.read_raw(session, element)?
            .map(|raw| self.decode(raw))
            .transpose()
    }

    fn write(
        &self,
        session: &Session,
        element: ElementRef,
        value: Option<&FieldValue>,
    ) -> Result<()> {
        let raw = value.map(|v| self.encode(v)).transpose()?;
        self.write_raw(session, element, raw)
    }
}

pub struct PropertyAccessorFactory;

impl AccessorFactory for PropertyAccessorFactory {
    fn accepts(&self, _def: &EntityDef, field: &FieldDef) -> bool {
        matches!(&field.kind, FieldKind::Property(kind) if kind.is_native())
    }

    fn build(&self, _def: &EntityDef, field: &FieldDef) -> Arc<dyn FieldAccessor> {
        let FieldKind::Property(kind) = &field.kind else {
            unreachable!("factory only accepts property fields");
        };
        Arc::new(PropertyAccessor::new(&field.name, kind.clone()))
    }
}
