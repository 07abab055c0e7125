//! # Property Graph Model
//!
//! Clean DTOs for the elements the mapping layer persists into.
//! These types cross every boundary: store ↔ accessors ↔ hierarchy ↔ user.
//!
//! Design rule: pure data — no I/O, no state, no store handles here.

pub mod element;
pub mod node;
pub mod property_map;
pub mod relationship;
pub mod value;

pub use element::ElementRef;
pub use node::{Node, NodeId};
pub use property_map::PropertyMap;
pub use relationship::{Direction, RelId, Relationship};
pub use value::Value;
