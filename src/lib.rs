//! # nodebind — Typed Entity Mapping for Property Graph Stores
//!
//! Maps typed domain objects onto nodes and relationships of a transactional
//! graph store. Each entity gets a persistent identity, lazily-populated typed
//! fields, and polymorphic queryability by declared type — without a separate
//! schema catalog: the type hierarchy itself lives in the graph.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the mapping layer
//!    and any storage engine
//! 2. **Explicit metadata**: entity types are registered up front in a
//!    `TypeRegistry` — no reflection, no annotation scanning
//! 3. **Pipeline-resolved fields**: every declared field is bound once to a
//!    shared accessor chosen by an ordered factory chain
//! 4. **Graph-resident typing**: one counting node per class, linked by
//!    `SUBCLASS_OF` edges, answers `count` and `find_all` queries
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use nodebind::{
//!     ConversionService, EntityDef, EntityManager, FieldDef, MemoryStore, TypeRegistry,
//! };
//!
//! # fn example() -> nodebind::Result<()> {
//! let mut registry = TypeRegistry::new();
//! registry.register(EntityDef::node("Animal").field(FieldDef::text("name")))?;
//! registry.register(EntityDef::node("Dog").extends("Animal"))?;
//!
//! let manager = EntityManager::new(
//!     Arc::new(MemoryStore::new()),
//!     registry,
//!     ConversionService::with_defaults(),
//! );
//!
//! let session = manager.open_session();
//! session.begin_tx()?;
//! let mut rex = session.create("Dog")?;
//! rex.set(&session, "name", "Rex")?;
//! assert_eq!(session.count("Animal")?, 1);
//! session.commit()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Subsystems
//!
//! | Subsystem | Module | Description |
//! |-----------|--------|-------------|
//! | Store contract | `store` | `GraphStore` trait + in-memory reference store |
//! | Schema | `schema` | Entity/field descriptors and the type registry |
//! | Field access | `access` | Ordered accessor pipeline, conversion, references |
//! | Lifecycle | `entity` | Attach/detach state machine and policies |
//! | Type hierarchy | `hierarchy` | Counting nodes, `INSTANCE_OF`/`SUBCLASS_OF` edges |

// ============================================================================
// Modules
// ============================================================================

pub mod access;
pub mod convert;
pub mod entity;
pub mod hierarchy;
pub mod manager;
pub mod model;
pub mod schema;
pub mod session;
pub mod store;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Direction, ElementRef, Node, NodeId, PropertyMap, RelId, Relationship, Value};

// ============================================================================
// Re-exports: Store
// ============================================================================

pub use store::{GraphStore, MemoryStore, TxId};

// ============================================================================
// Re-exports: Schema & conversion
// ============================================================================

pub use convert::{ConvertDirection, ConversionService, FieldValue, ValueConverter};
pub use schema::{Backing, EntityDef, FieldDef, FieldKind, TypeRegistry, ValueKind};

// ============================================================================
// Re-exports: Entities
// ============================================================================

pub use entity::{Entity, EntityStatus};
pub use manager::EntityManager;
pub use session::{Entities, Session};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A state-mutating operation was attempted with no ambient transaction.
    #[error("not in transaction: {0}")]
    NotInTransaction(String),

    /// An identifier was present but the element no longer exists in the store.
    #[error("stale reference: {0} no longer exists in the store")]
    StaleReference(model::ElementRef),

    /// A field value could not be moved between its declared kind and the
    /// store primitive representation.
    #[error("cannot convert field `{field}`: {detail}")]
    ConversionFailure { field: String, detail: String },

    /// The type stored for an element is not the expected type or a subtype.
    #[error("type mismatch: {element} holds a `{actual}`, which is not a `{expected}`")]
    TypeMismatch {
        expected: String,
        actual: String,
        element: model::ElementRef,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// A write was attempted on a never-persisted entity outside a transaction.
    #[error("detached write rejected for field `{0}`: entity has never been persisted and no transaction is active")]
    DetachedWriteRejected(String),

    /// Graph access through a detached or destroyed entity.
    #[error("invalid access: {0}")]
    InvalidAccess(String),

    #[error("unknown field `{field}` on entity type `{entity}`")]
    UnknownField { entity: String, field: String },

    /// Entity type registration rejected (duplicate name, missing parent, ...).
    #[error("schema error: {0}")]
    Schema(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
