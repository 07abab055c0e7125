//! The type registry: every mapped entity type, resolvable by name.
//!
//! The registry is the single source of truth for reverse type lookup — a
//! class name read back from the graph that the registry cannot resolve is a
//! fatal condition, never silently defaulted.

use std::sync::Arc;

use hashbrown::HashMap;

use super::{Backing, EntityDef, FieldDef};
use crate::{Error, Result};

/// Registry of entity type definitions.
///
/// Built up front, then shared read-only for the lifetime of the manager.
/// Parents must be registered before their children, which makes declared
/// hierarchy cycles unrepresentable.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<EntityDef>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition.
    pub fn register(&mut self, def: EntityDef) -> Result<()> {
        if self.types.contains_key(&def.name) {
            return Err(Error::Schema(format!(
                "entity type `{}` is already registered",
                def.name
            )));
        }
        if let Some(parent) = &def.parent {
            let parent_def = self.types.get(parent).ok_or_else(|| {
                Error::Schema(format!(
                    "parent `{parent}` of `{}` is not registered; register parents first",
                    def.name
                ))
            })?;
            if !parent_def.is_node_backed() || !def.is_node_backed() {
                return Err(Error::Schema(format!(
                    "`{}` extends `{parent}`: hierarchies are only supported between node-backed types",
                    def.name
                )));
            }
        }
        self.types.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Resolve a type name to its definition.
    pub fn resolve(&self, name: &str) -> Result<Arc<EntityDef>> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("entity type `{name}`")))
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityDef>> {
        self.types.get(name).cloned()
    }

    /// Whether `name` is `ancestor` or a (transitive) subtype of it.
    pub fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.types.get(&n).and_then(|d| d.parent.clone());
        }
        false
    }

    /// Ancestors of `name`, nearest first. Empty for root types.
    pub fn superclass_chain(&self, name: &str) -> Vec<Arc<EntityDef>> {
        let mut chain = Vec::new();
        let mut current = self.get(name).and_then(|d| d.parent.clone());
        while let Some(parent) = current {
            match self.get(&parent) {
                Some(def) => {
                    current = def.parent.clone();
                    chain.push(def);
                }
                None => break,
            }
        }
        chain
    }

    /// The effective field set of a type: its own fields plus inherited ones,
    /// with a subtype's declaration shadowing a supertype's of the same name.
    pub fn effective_fields(&self, name: &str) -> Vec<FieldDef> {
        let mut defs: Vec<Arc<EntityDef>> = self.superclass_chain(name);
        defs.reverse(); // root first, so nearer declarations win below
        if let Some(own) = self.get(name) {
            defs.push(own);
        }

        let mut fields: Vec<FieldDef> = Vec::new();
        for def in defs {
            for field in &def.fields {
                fields.retain(|f| f.name != field.name);
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Find the relationship-backed type mapped to the given relationship type.
    pub fn by_rel_type(&self, rel_type: &str) -> Option<Arc<EntityDef>> {
        self.types
            .values()
            .find(|d| matches!(&d.backing, Backing::Relationship { rel_type: rt } if rt == rel_type))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoo() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(EntityDef::node("Animal").field(FieldDef::text("name")))
            .unwrap();
        registry
            .register(EntityDef::node("Dog").extends("Animal").field(FieldDef::bool("barks")))
            .unwrap();
        registry
            .register(EntityDef::node("Puppy").extends("Dog"))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = zoo();
        let err = registry.register(EntityDef::node("Dog")).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_parent_must_exist() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(EntityDef::node("Cat").extends("Animal"))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_subtype_chain() {
        let registry = zoo();
        assert!(registry.is_subtype_of("Puppy", "Animal"));
        assert!(registry.is_subtype_of("Puppy", "Puppy"));
        assert!(registry.is_subtype_of("Dog", "Animal"));
        assert!(!registry.is_subtype_of("Animal", "Dog"));
        assert!(!registry.is_subtype_of("Animal", "Nothing"));
    }

    #[test]
    fn test_superclass_chain_nearest_first() {
        let registry = zoo();
        let chain: Vec<String> = registry
            .superclass_chain("Puppy")
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(chain, ["Dog", "Animal"]);
        assert!(registry.superclass_chain("Animal").is_empty());
    }

    #[test]
    fn test_effective_fields_include_inherited() {
        let registry = zoo();
        let names: Vec<String> = registry
            .effective_fields("Puppy")
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert!(names.contains(&"name".to_string()));
        assert!(names.contains(&"barks".to_string()));
    }

    #[test]
    fn test_field_shadowing_prefers_subtype() {
        let mut registry = TypeRegistry::new();
        registry
            .register(EntityDef::node("Base").field(FieldDef::text("tag")))
            .unwrap();
        registry
            .register(EntityDef::node("Derived").extends("Base").field(FieldDef::int("tag")))
            .unwrap();

        let fields = registry.effective_fields("Derived");
        let tags: Vec<&FieldDef> = fields.iter().filter(|f| f.name == "tag").collect();
        assert_eq!(tags.len(), 1);
        assert!(matches!(
            tags[0].kind,
            crate::schema::FieldKind::Property(crate::schema::ValueKind::Int)
        ));
    }

    #[test]
    fn test_rel_type_lookup() {
        let mut registry = TypeRegistry::new();
        registry
            .register(EntityDef::relationship("Friendship", "FRIENDS"))
            .unwrap();
        assert_eq!(registry.by_rel_type("FRIENDS").unwrap().name, "Friendship");
        assert!(registry.by_rel_type("ENEMIES").is_none());
    }

    #[test]
    fn test_hierarchy_requires_node_backing() {
        let mut registry = TypeRegistry::new();
        registry.register(EntityDef::node("Thing")).unwrap();
        let err = registry
            .register(EntityDef::relationship("Link", "LINKS").extends("Thing"))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
