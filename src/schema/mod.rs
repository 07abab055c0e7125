//! # Entity Schema
//!
//! Declared metadata for mapped types: which fields exist, how each maps onto
//! the graph (transient / relationship / property), how instances are backed
//! (node or relationship), and how types relate in the class hierarchy.
//!
//! Everything here is declared explicitly through builders and registered in
//! a [`TypeRegistry`] before the first entity is created. There is no runtime
//! reflection: a type name that is not in the registry simply does not exist
//! as far as the mapping layer is concerned.

pub mod registry;

use serde::{Deserialize, Serialize};

use crate::model::Direction;

pub use registry::TypeRegistry;

// ============================================================================
// Value kinds
// ============================================================================

/// The declared value shape of a simple (property-backed) field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    /// RFC 3339 timestamp; stored as a string through the conversion service.
    DateTime,
    /// Application-defined kind; needs converters registered for both
    /// directions before its fields become readable/writable.
    Custom(String),
}

impl ValueKind {
    /// Whether values of this kind map directly onto a store primitive
    /// without going through the conversion service.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            ValueKind::Bool | ValueKind::Int | ValueKind::Float | ValueKind::Text
        )
    }

    pub fn name(&self) -> &str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::DateTime => "datetime",
            ValueKind::Custom(name) => name,
        }
    }
}

// ============================================================================
// Field definitions
// ============================================================================

/// How a declared field maps onto the graph.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Never persisted; lives only in the entity's value cache.
    Transient,
    /// A reference to one (or many) node-backed entities, stored as
    /// relationships of the given type.
    Reference {
        rel_type: String,
        direction: Direction,
        target: String,
        many: bool,
    },
    /// A simple value stored as an element property.
    Property(ValueKind),
}

/// One declared field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn text(name: impl Into<String>) -> Self {
        Self::property(name, ValueKind::Text)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::property(name, ValueKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::property(name, ValueKind::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::property(name, ValueKind::Bool)
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::property(name, ValueKind::DateTime)
    }

    pub fn custom(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::property(name, ValueKind::Custom(kind.into()))
    }

    pub fn property(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Property(kind),
        }
    }

    pub fn transient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Transient,
        }
    }

    /// A to-one entity reference, stored as a single relationship.
    pub fn reference(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Reference {
                rel_type: rel_type.into(),
                direction,
                target: target.into(),
                many: false,
            },
        }
    }

    /// A to-many entity reference, stored as one relationship per target.
    pub fn references(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Reference {
                rel_type: rel_type.into(),
                direction,
                target: target.into(),
                many: true,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, FieldKind::Transient)
    }
}

// ============================================================================
// Entity definitions
// ============================================================================

/// What kind of store element backs instances of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    Node,
    Relationship { rel_type: String },
}

/// A registered entity type: name, place in the hierarchy, backing element
/// kind, lifecycle flags, and declared fields.
#[derive(Debug, Clone)]
pub struct EntityDef {
    pub name: String,
    pub parent: Option<String>,
    pub backing: Backing,
    /// The graph element is a supplementary projection of an object stored
    /// primarily elsewhere; attachment requires an external identifier.
    pub partial: bool,
    /// Field access outside a transaction transparently opens one scoped to
    /// that single access.
    pub auto_attach: bool,
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// A node-backed entity type.
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            backing: Backing::Node,
            partial: false,
            auto_attach: false,
            fields: Vec::new(),
        }
    }

    /// A relationship-backed entity type. Instances live on relationships of
    /// the given type and require both endpoints at creation.
    pub fn relationship(name: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            backing: Backing::Relationship {
                rel_type: rel_type.into(),
            },
            partial: false,
            auto_attach: false,
            fields: Vec::new(),
        }
    }

    /// Declare the immediate supertype. The parent must already be registered
    /// when this definition is.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn auto_attach(mut self) -> Self {
        self.auto_attach = true;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// The field declared directly on this type, if any.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_node_backed(&self) -> bool {
        self.backing == Backing::Node
    }
}
