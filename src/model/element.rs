//! Reference to a backing element — the node or relationship that holds an
//! entity's persisted state.

use serde::{Deserialize, Serialize};

use super::{NodeId, RelId};

/// Store-assigned identity of a node or relationship.
///
/// Property and lock operations on the store are uniform over both element
/// kinds, so they address elements through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Node(NodeId),
    Rel(RelId),
}

impl ElementRef {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ElementRef::Node(id) => Some(*id),
            ElementRef::Rel(_) => None,
        }
    }

    pub fn as_rel(&self) -> Option<RelId> {
        match self {
            ElementRef::Rel(id) => Some(*id),
            ElementRef::Node(_) => None,
        }
    }
}

impl From<NodeId> for ElementRef {
    fn from(id: NodeId) -> Self {
        ElementRef::Node(id)
    }
}

impl From<RelId> for ElementRef {
    fn from(id: RelId) -> Self {
        ElementRef::Rel(id)
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementRef::Node(id) => write!(f, "node {id}"),
            ElementRef::Rel(id) => write!(f, "relationship {id}"),
        }
    }
}
