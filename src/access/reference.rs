//! Entity reference fields, stored as relationships.
//!
//! A to-one reference is a single relationship of the declared type; a
//! to-many reference is one relationship per target. Writes reconcile the
//! materialized relationships against the supplied value immediately.

use std::sync::Arc;

use hashbrown::HashSet;

use super::{AccessorFactory, FieldAccessor};
use crate::convert::FieldValue;
use crate::model::{Direction, ElementRef, NodeId};
use crate::schema::{EntityDef, FieldDef, FieldKind};
use crate::session::Session;
use crate::{Error, Result};

fn node_of(field: &str, element: ElementRef) -> Result<NodeId> {
    element.as_node().ok_or_else(|| {
        Error::InvalidAccess(format!(
            "entity reference field `{field}` requires a node-backed entity"
        ))
    })
}

fn not_a_reference(field: &str, value: &FieldValue) -> Error {
    Error::ConversionFailure {
        field: field.to_string(),
        detail: format!("expected an entity reference, got {}", value.describe()),
    }
}

// ============================================================================
// To-one
// ============================================================================

pub struct SingleReferenceAccessor {
    field: String,
    rel_type: String,
    direction: Direction,
}

impl SingleReferenceAccessor {
    fn endpoints(&self, node: NodeId, target: NodeId) -> (NodeId, NodeId) {
        match self.direction {
            Direction::Incoming => (target, node),
            Direction::Outgoing | Direction::Both => (node, target),
        }
    }
}

impl FieldAccessor for SingleReferenceAccessor {
    fn read(&self, session: &Session, element: ElementRef) -> Result<Option<FieldValue>> {
        let node = node_of(&self.field, element)?;
        let tx = session.require_tx()?;
        let rel = session
            .store()
            .single_relationship(tx, node, &self.rel_type, self.direction)?;
        Ok(rel
            .and_then(|r| r.other_node(node))
            .map(FieldValue::Ref))
    }

    fn write(
        &self,
        session: &Session,
        element: ElementRef,
        value: Option<&FieldValue>,
    ) -> Result<()> {
        let node = node_of(&self.field, element)?;
        let tx = session.require_tx()?;
        let store = session.store();

        let existing = store.single_relationship(tx, node, &self.rel_type, self.direction)?;

        match value {
            None => {
                if let Some(rel) = existing {
                    store.delete_relationship(tx, rel.id)?;
                }
                Ok(())
            }
            Some(FieldValue::Ref(target)) => {
                if let Some(rel) = existing {
                    if rel.other_node(node) == Some(*target) {
                        return Ok(());
                    }
                    store.delete_relationship(tx, rel.id)?;
                }
                let (src, dst) = self.endpoints(node, *target);
                store.create_relationship(tx, src, dst, &self.rel_type)?;
                Ok(())
            }
            Some(other) => Err(not_a_reference(&self.field, other)),
        }
    }
}

// ============================================================================
// To-many
// ============================================================================

pub struct MultiReferenceAccessor {
    field: String,
    rel_type: String,
    direction: Direction,
}

impl MultiReferenceAccessor {
    fn endpoints(&self, node: NodeId, target: NodeId) -> (NodeId, NodeId) {
        match self.direction {
            Direction::Incoming => (target, node),
            Direction::Outgoing | Direction::Both => (node, target),
        }
    }
}

impl FieldAccessor for MultiReferenceAccessor {
    fn read(&self, session: &Session, element: ElementRef) -> Result<Option<FieldValue>> {
        let node = node_of(&self.field, element)?;
        let tx = session.require_tx()?;
        let rels = session
            .store()
            .relationships(tx, node, Some(&self.rel_type), self.direction)?;

        let targets: Vec<NodeId> = rels.iter().filter_map(|r| r.other_node(node)).collect();
        if targets.is_empty() {
            Ok(None)
        } else {
            Ok(Some(FieldValue::Refs(targets)))
        }
    }

    fn write(
        &self,
        session: &Session,
        element: ElementRef,
        value: Option<&FieldValue>,
    ) -> Result<()> {
        let node = node_of(&self.field, element)?;
        let tx = session.require_tx()?;
        let store = session.store();

        let desired: HashSet<NodeId> = match value {
            None => HashSet::new(),
            Some(FieldValue::Refs(targets)) => targets.iter().copied().collect(),
            Some(other) => return Err(not_a_reference(&self.field, other)),
        };

        let existing = store.relationships(tx, node, Some(&self.rel_type), self.direction)?;
        let mut kept = HashSet::new();
        for rel in existing {
            match rel.other_node(node) {
                Some(target) if desired.contains(&target) && !kept.contains(&target) => {
                    kept.insert(target);
                }
                _ => {
                    store.delete_relationship(tx, rel.id)?;
                }
            }
        }

        for target in desired.difference(&kept) {
            let (src, dst) = self.endpoints(node, *target);
            store.create_relationship(tx, src, dst, &self.rel_type)?;
        }
        Ok(())
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Accepts reference fields on node-backed types, ahead of the property
/// factories — so an entity-typed field can never be claimed by a converter.
pub struct ReferenceAccessorFactory;

impl AccessorFactory for ReferenceAccessorFactory {
    fn accepts(&self, def: &EntityDef, field: &FieldDef) -> bool {
        def.is_node_backed() && matches!(field.kind, FieldKind::Reference { .. })
    }

    fn build(&self, _def: &EntityDef, field: &FieldDef) -> Arc<dyn FieldAccessor> {
        let FieldKind::Reference {
            rel_type,
            direction,
            many,
            ..
        } = &field.kind
        else {
            unreachable!("factory only accepts reference fields");
        };

        if *many {
            Arc::new(MultiReferenceAccessor {
                field: field.name.clone(),
                rel_type: rel_type.clone(),
                direction: *direction,
            })
        } else {
            Arc::new(SingleReferenceAccessor {
                field: field.name.clone(),
                rel_type: rel_type.clone(),
                direction: *direction,
            })
        }
    }
}
