//! # EntityManager
//!
//! The shared wiring of the mapping layer: the store, the type registry, the
//! conversion service, the accessor pipeline with its per-type bound sets,
//! the per-type lifecycle policies, and the type hierarchy index. One
//! manager per store; sessions are opened from it.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::access::{AccessorPipeline, FieldAccessorSet};
use crate::convert::ConversionService;
use crate::entity::{Entity, EntityState, LifecyclePolicy, select_policy};
use crate::hierarchy::TypeHierarchy;
use crate::model::ElementRef;
use crate::schema::{EntityDef, TypeRegistry};
use crate::session::Session;
use crate::store::GraphStore;

pub struct EntityManager {
    store: Arc<dyn GraphStore>,
    registry: Arc<TypeRegistry>,
    conversions: Arc<ConversionService>,
    pipeline: AccessorPipeline,
    /// Accessors are built once per type and shared by all its instances.
    accessor_sets: RwLock<HashMap<String, Arc<FieldAccessorSet>>>,
    /// Lifecycle policies, selected once per type from its declared flags.
    policies: RwLock<HashMap<String, Arc<dyn LifecyclePolicy>>>,
    hierarchy: TypeHierarchy,
}

impl EntityManager {
    pub fn new(
        store: Arc<dyn GraphStore>,
        registry: TypeRegistry,
        conversions: ConversionService,
    ) -> Arc<Self> {
        let registry = Arc::new(registry);
        let conversions = Arc::new(conversions);
        Arc::new(Self {
            pipeline: AccessorPipeline::standard(Arc::clone(&conversions)),
            hierarchy: TypeHierarchy::new(Arc::clone(&registry)),
            accessor_sets: RwLock::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            store,
            registry,
            conversions,
        })
    }

    pub fn open_session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub(crate) fn conversions(&self) -> &ConversionService {
        &self.conversions
    }

    pub(crate) fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    // ========================================================================
    // Per-type shared state
    // ========================================================================

    fn accessor_set(&self, def: &Arc<EntityDef>) -> Arc<FieldAccessorSet> {
        if let Some(set) = self.accessor_sets.read().get(&def.name) {
            return Arc::clone(set);
        }
        let fields = self.registry.effective_fields(&def.name);
        let set = Arc::new(self.pipeline.bind(def, &fields));
        Arc::clone(
            self.accessor_sets
                .write()
                .entry(def.name.clone())
                .or_insert(set),
        )
    }

    fn policy(&self, def: &Arc<EntityDef>) -> Arc<dyn LifecyclePolicy> {
        if let Some(policy) = self.policies.read().get(&def.name) {
            return Arc::clone(policy);
        }
        let policy = select_policy(def);
        Arc::clone(
            self.policies
                .write()
                .entry(def.name.clone())
                .or_insert(policy),
        )
    }

    // ========================================================================
    // Entity construction
    // ========================================================================

    pub(crate) fn unbound_entity(&self, def: Arc<EntityDef>) -> Entity {
        let state = EntityState::new(Arc::clone(&def), self.accessor_set(&def));
        Entity::new(state, self.policy(&def))
    }

    pub(crate) fn entity_for_element(&self, def: Arc<EntityDef>, element: ElementRef) -> Entity {
        let state = EntityState::for_element(Arc::clone(&def), self.accessor_set(&def), element);
        Entity::new(state, self.policy(&def))
    }

    pub(crate) fn entity_reference(&self, def: Arc<EntityDef>, id: ElementRef) -> Entity {
        let state = EntityState::for_reference(Arc::clone(&def), self.accessor_set(&def), id);
        Entity::new(state, self.policy(&def))
    }
}
