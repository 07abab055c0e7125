//! # Field Accessor Pipeline
//!
//! Every declared field of an entity type is bound, once, to a shared
//! [`FieldAccessor`] chosen by an ordered chain of factories:
//!
//! 1. transient fields — never persisted, always claimed first
//! 2. relationship-typed fields — entity references, to-one and to-many
//! 3. plain property fields — natively storable kinds
//! 4. converting property fields — kinds the conversion service covers
//!
//! The first factory that accepts a field wins; factories stay mutually
//! exclusive through this ordering, not through cross-checks. A field no
//! factory accepts is bound to a fallback accessor that fails with
//! `ConversionFailure` on its first access — never at registration time.

pub mod convert;
pub mod property;
pub mod reference;
pub mod transient;

use std::sync::Arc;

use hashbrown::HashMap;

use crate::convert::{ConversionService, FieldValue};
use crate::model::ElementRef;
use crate::schema::{EntityDef, FieldDef, FieldKind};
use crate::session::Session;
use crate::{Error, Result};

pub use convert::{ConvertingAccessor, ConvertingAccessorFactory};
pub use property::{PropertyAccessor, PropertyAccessorFactory};
pub use reference::{MultiReferenceAccessor, ReferenceAccessorFactory, SingleReferenceAccessor};
pub use transient::{TransientAccessor, TransientAccessorFactory};

// ============================================================================
// Traits
// ============================================================================

/// One field's read/write strategy against a backing element.
///
/// Accessors are stateless: built once per (entity type, field) and shared by
/// every instance of the type. Per-entity state stays in the entity state.
pub trait FieldAccessor: Send + Sync {
    /// Read the field from the element. `Ok(None)` when the element has no
    /// corresponding property and no relationship is materialized.
    fn read(&self, session: &Session, element: ElementRef) -> Result<Option<FieldValue>>;

    /// Write through immediately (no buffering). `None` clears the field.
    fn write(
        &self,
        session: &Session,
        element: ElementRef,
        value: Option<&FieldValue>,
    ) -> Result<()>;

    /// Local fields are served from the entity's own value cache; the store
    /// is never touched for them.
    fn is_local(&self) -> bool {
        false
    }
}

/// Builds accessors for the fields it accepts.
pub trait AccessorFactory: Send + Sync {
    fn accepts(&self, def: &EntityDef, field: &FieldDef) -> bool;
    fn build(&self, def: &EntityDef, field: &FieldDef) -> Arc<dyn FieldAccessor>;
}

// ============================================================================
// Pipeline
// ============================================================================

/// The ordered factory chain.
pub struct AccessorPipeline {
    factories: Vec<Box<dyn AccessorFactory>>,
}

impl AccessorPipeline {
    /// The standard chain, in fixed priority order.
    pub fn standard(conversions: Arc<ConversionService>) -> Self {
        Self {
            factories: vec![
                Box::new(TransientAccessorFactory),
                Box::new(ReferenceAccessorFactory),
                Box::new(PropertyAccessorFactory),
                Box::new(ConvertingAccessorFactory::new(conversions)),
            ],
        }
    }

    /// Bind every field of a type to its accessor.
    pub fn bind(&self, def: &EntityDef, fields: &[FieldDef]) -> FieldAccessorSet {
        let mut by_field = HashMap::new();
        for field in fields {
            let accessor = self
                .factories
                .iter()
                .find(|factory| factory.accepts(def, field))
                .map(|factory| factory.build(def, field))
                .unwrap_or_else(|| unbound(field));
            by_field.insert(field.name.clone(), accessor);
        }
        FieldAccessorSet { by_field }
    }
}

/// The bound accessors of one entity type, keyed by field name.
pub struct FieldAccessorSet {
    by_field: HashMap<String, Arc<dyn FieldAccessor>>,
}

impl FieldAccessorSet {
    pub fn accessor(&self, field: &str) -> Option<&Arc<dyn FieldAccessor>> {
        self.by_field.get(field)
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

// ============================================================================
// Fallback
// ============================================================================

fn unbound(field: &FieldDef) -> Arc<dyn FieldAccessor> {
    let detail = match &field.kind {
        FieldKind::Property(kind) => format!(
            "no converter registered for kind `{}` in both directions",
            kind.name()
        ),
        FieldKind::Reference { .. } => {
            "entity reference fields require a node-backed entity".to_string()
        }
        FieldKind::Transient => "transient field left unbound".to_string(),
    };
    Arc::new(UnboundAccessor {
        field: field.name.clone(),
        detail,
    })
}

/// Bound to fields no factory accepted. Surfaces the problem at the first
/// field access attempt instead of at registration.
struct UnboundAccessor {
    field: String,
    detail: String,
}

impl UnboundAccessor {
    fn error(&self) -> Error {
        Error::ConversionFailure {
            field: self.field.clone(),
            detail: self.detail.clone(),
        }
    }
}

impl FieldAccessor for UnboundAccessor {
    fn read(&self, _session: &Session, _element: ElementRef) -> Result<Option<FieldValue>> {
        Err(self.error())
    }

    fn write(
        &self,
        _session: &Session,
        _element: ElementRef,
        _value: Option<&FieldValue>,
    ) -> Result<()> {
        Err(self.error())
    }
}
