// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scene: the unit of isolation owning entities, stores, archetypes,
//! systems and the event bus.
//!
//! All mutation happens on the thread calling [`Scene::update`]. Entity
//! operations are atomic: they either apply fully or reject with no
//! partial mask bit set, and lifecycle events fire only after storage,
//! mask and archetype agree.

use tracing::{error, warn};

use crate::archetype::{ArchetypeIndex, EMPTY_ARCHETYPE};
use crate::bitset::BitSet;
use crate::component::{
    self, component_id, component_id_or_register, Component, ComponentTypeId, SoaComponent,
};
use crate::entity::{Entities, Entity};
use crate::error::{EcsError, Result};
use crate::event_bus::EventBus;
use crate::events::{
    ComponentAdded, ComponentRemoved, EntityCreated, EntityDestroyed, SystemErrorEvent,
    COMPONENT_ADDED, COMPONENT_REMOVED, ENTITY_CREATED, ENTITY_DESTROYED, SYSTEM_ERROR,
};
use crate::query::{Matcher, QueryResult};
use crate::schedule::Scheduler;
use crate::soa::SoaStore;
use crate::storage::{AosStore, ComponentStore};
use crate::system::{BoxedSystem, SystemId};

/// Central ECS container. Multiple scenes coexist in one process and
/// share the component registry, so type ids agree across them.
pub struct Scene {
    entities: Entities,
    /// Per-type stores indexed by ComponentTypeId; created on first add.
    stores: Vec<Option<Box<dyn ComponentStore>>>,
    archetypes: ArchetypeIndex,
    scheduler: Scheduler,
    bus: EventBus,
    tick: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            entities: Entities::new(),
            stores: Vec::new(),
            archetypes: ArchetypeIndex::new(),
            scheduler: Scheduler::new(),
            bus: EventBus::new(),
            tick: 0,
        }
    }

    /// Alias mirroring the lifecycle naming used by embedders.
    pub fn create() -> Self {
        Self::new()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    // ========== Entities ==========

    /// Create an entity with no components. It lands in the empty-mask
    /// archetype and starts enabled.
    pub fn create_entity(&mut self) -> Entity {
        self.spawn_internal(None)
    }

    /// Create an entity carrying a debug name.
    pub fn create_entity_named(&mut self, name: &str) -> Entity {
        self.spawn_internal(Some(name.to_string()))
    }

    fn spawn_internal(&mut self, name: Option<String>) -> Entity {
        let entity = self.entities.allocate(name);
        if let Some(archetype) = self.archetypes.get_mut(EMPTY_ARCHETYPE) {
            archetype.insert(entity.index);
        }
        self.bus.emit_sync(ENTITY_CREATED, &EntityCreated { entity });
        entity
    }

    /// Destroy an entity: removes it from every store named by its mask
    /// and from its archetype, then retires the handle.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        let Some(meta) = self.entities.get(entity) else {
            return Err(self.stale_noop(entity, "destroy_entity"));
        };
        let archetype = meta.archetype;
        let bits: Vec<usize> = meta.mask.ones().collect();

        for bit in bits {
            if let Some(Some(store)) = self.stores.get_mut(bit) {
                store.remove_entity(entity.index);
            }
        }
        if let Some(archetype) = self.archetypes.get_mut(archetype) {
            archetype.remove(entity.index);
        }
        self.entities.deallocate(entity);
        self.bus
            .emit_sync(ENTITY_DESTROYED, &EntityDestroyed { entity });
        Ok(())
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Enable or disable an entity. Disabled entities are skipped by
    /// queries unless the caller opts in.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Result<()> {
        match self.entities.get_mut(entity) {
            Some(meta) => {
                meta.enabled = enabled;
                Ok(())
            }
            None => Err(self.stale_failure(entity)),
        }
    }

    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.entities
            .get(entity)
            .map(|meta| meta.enabled)
            .unwrap_or(false)
    }

    pub fn entity_name(&self, entity: Entity) -> Option<&str> {
        self.entities.get(entity)?.name.as_deref()
    }

    /// The entity's current component mask.
    pub fn entity_mask(&self, entity: Entity) -> Option<&BitSet> {
        self.entities.get(entity).map(|meta| &meta.mask)
    }

    /// Id of the archetype the entity currently belongs to.
    pub fn entity_archetype(&self, entity: Entity) -> Option<usize> {
        self.entities.get(entity).map(|meta| meta.archetype)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Iterate every live entity handle in index order.
    pub fn iter_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_alive()
    }

    // ========== Components ==========

    /// Add (or overwrite) a component on an entity. First-time adds set
    /// the mask bit, move the entity to its new archetype, and emit
    /// `component:added`; overwrites touch the store only.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        let Some(meta) = self.entities.get(entity) else {
            return Err(self.stale_failure(entity));
        };
        let id = component_id_or_register::<T>()?;
        let bit = id.bit();
        let already_present = meta.mask.contains(bit);
        let old_archetype = meta.archetype;
        let mut new_mask = meta.mask.clone();

        let Some(store) = self.store_mut(id) else {
            return Err(EcsError::UnregisteredComponent(std::any::type_name::<T>()));
        };
        if !store.insert_boxed(entity.index, Box::new(component)) {
            return Err(EcsError::ComponentNotFound);
        }

        if !already_present {
            new_mask.set(bit);
            let new_archetype = self.archetypes.get_or_create(&new_mask);
            if let Some(meta) = self.entities.get_mut(entity) {
                meta.mask.set(bit);
                meta.archetype = new_archetype;
            }
            self.archetypes
                .move_entity(entity.index, old_archetype, new_archetype);
            self.bus.emit_sync(
                COMPONENT_ADDED,
                &ComponentAdded {
                    entity,
                    type_id: id,
                },
            );
        }
        Ok(())
    }

    /// Remove a component from an entity and return it. Returns Ok(None)
    /// when the entity does not carry the component.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<Option<T>> {
        let Some(meta) = self.entities.get(entity) else {
            return Err(self.stale_noop(entity, "remove_component"));
        };
        let Some(id) = component_id::<T>() else {
            return Ok(None);
        };
        let bit = id.bit();
        if !meta.mask.contains(bit) {
            return Ok(None);
        }
        let old_archetype = meta.archetype;
        let mut new_mask = meta.mask.clone();
        new_mask.clear(bit);

        let removed = self
            .stores
            .get_mut(bit)
            .and_then(|slot| slot.as_mut())
            .and_then(|store| store.remove_boxed(entity.index))
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed);

        let new_archetype = self.archetypes.get_or_create(&new_mask);
        if let Some(meta) = self.entities.get_mut(entity) {
            meta.mask.clear(bit);
            meta.archetype = new_archetype;
        }
        self.archetypes
            .move_entity(entity.index, old_archetype, new_archetype);
        self.bus.emit_sync(
            COMPONENT_REMOVED,
            &ComponentRemoved {
                entity,
                type_id: id,
            },
        );
        Ok(removed)
    }

    /// Mask-bit check; O(words) and never touches the store.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        let Some(meta) = self.entities.get(entity) else {
            return false;
        };
        component_id::<T>()
            .map(|id| meta.mask.contains(id.bit()))
            .unwrap_or(false)
    }

    /// Borrow an AoS component. SoA components are rebuilt by value; use
    /// [`Scene::get_soa`] for those.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let meta = self.entities.get(entity)?;
        let id = component_id::<T>()?;
        if !meta.mask.contains(id.bit()) {
            return None;
        }
        self.aos_store::<T>()?.get(entity.index)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let meta = self.entities.get(entity)?;
        let id = component_id::<T>()?;
        if !meta.mask.contains(id.bit()) {
            return None;
        }
        self.stores
            .get_mut(id.0 as usize)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<AosStore<T>>()?
            .get_mut(entity.index)
    }

    /// Reconstruct a SoA component view from its columns and side table.
    pub fn get_soa<T: SoaComponent>(&self, entity: Entity) -> Option<T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.soa_store::<T>()?.get(entity.index)
    }

    /// Borrow the AoS store for `T` (bulk iteration).
    pub fn aos_store<T: Component>(&self) -> Option<&AosStore<T>> {
        let id = component_id::<T>()?;
        self.stores
            .get(id.0 as usize)?
            .as_ref()?
            .as_any()
            .downcast_ref()
    }

    /// Borrow the SoA store for `T` (columns, compact, vectorized ops).
    pub fn soa_store<T: SoaComponent>(&self) -> Option<&SoaStore<T>> {
        let id = component_id::<T>()?;
        self.stores
            .get(id.0 as usize)?
            .as_ref()?
            .as_any()
            .downcast_ref()
    }

    pub fn soa_store_mut<T: SoaComponent>(&mut self) -> Option<&mut SoaStore<T>> {
        let id = component_id::<T>()?;
        self.stores
            .get_mut(id.0 as usize)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut()
    }

    fn store_mut(&mut self, id: ComponentTypeId) -> Option<&mut Box<dyn ComponentStore>> {
        let index = id.0 as usize;
        if index >= self.stores.len() {
            self.stores.resize_with(index + 1, || None);
        }
        if self.stores[index].is_none() {
            self.stores[index] = component::make_store(id);
        }
        self.stores[index].as_mut()
    }

    // ========== Queries ==========

    /// Evaluate a matcher, skipping disabled entities.
    pub fn query(&self, matcher: &Matcher) -> QueryResult<'_> {
        QueryResult::new(&self.archetypes, &self.entities, matcher, false)
    }

    /// Evaluate a matcher including disabled entities.
    pub fn query_with_disabled(&self, matcher: &Matcher) -> QueryResult<'_> {
        QueryResult::new(&self.archetypes, &self.entities, matcher, true)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub(crate) fn archetype_index(&self) -> &ArchetypeIndex {
        &self.archetypes
    }

    // ========== Systems ==========

    /// Register a system; `on_added` runs before it is stored.
    pub fn add_system(&mut self, mut system: BoxedSystem) -> SystemId {
        system.on_added(self);
        self.scheduler.add(system)
    }

    /// Deregister a system; `on_removed` runs after it left the schedule.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        match self.scheduler.remove(id) {
            Some(mut system) => {
                system.on_removed(self);
                true
            }
            None => false,
        }
    }

    pub fn set_system_enabled(&mut self, id: SystemId, enabled: bool) -> bool {
        self.scheduler.set_enabled(id, enabled)
    }

    pub fn system_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Run one tick: drain due event batches, then run enabled systems in
    /// update order. Structural changes by one system are visible to every
    /// later system in the same tick. System failures are reported as
    /// `system:error` events; the tick always completes.
    pub fn update(&mut self, delta_time: f32) {
        self.tick += 1;
        self.bus.pump();

        let mut entries = self.scheduler.take_entries();
        for entry in &mut entries {
            if !entry.enabled {
                continue;
            }
            let name = entry.system.name();

            if let Err(err) = entry.system.on_begin(self, delta_time) {
                self.report_system_error(name, &err);
                continue;
            }

            entry.cache.refresh(&self.archetypes);
            let matched = entry.cache.matched().to_vec();
            let snapshot = QueryResult::from_matched(
                &self.archetypes,
                &self.entities,
                matched,
                entry.system.include_disabled(),
            )
            .entities_snapshot();

            if let Err(err) = entry.system.process(&snapshot, self, delta_time) {
                self.report_system_error(name, &err);
            }
            if let Err(err) = entry.system.on_end(self, delta_time) {
                self.report_system_error(name, &err);
            }
        }
        self.scheduler.restore_entries(entries);
    }

    fn report_system_error(&mut self, system: &'static str, err: &EcsError) {
        error!(system, %err, "system failed during tick");
        self.bus.emit_sync(
            SYSTEM_ERROR,
            &SystemErrorEvent {
                system,
                message: err.to_string(),
            },
        );
    }

    // ========== Event bus ==========

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    // ========== Lifecycle ==========

    /// Reset entities, stores and archetypes; systems and event listeners
    /// stay registered. Held handles become stale.
    pub fn clear(&mut self) {
        self.entities.clear();
        for store in self.stores.iter_mut().flatten() {
            store.clear();
        }
        self.archetypes.clear();
    }

    /// Tear the scene down: systems get `on_removed`, pending batched
    /// events are dropped with a warning.
    pub fn destroy(mut self) {
        let entries = self.scheduler.drain();
        for mut entry in entries {
            entry.system.on_removed(&mut self);
        }
        self.bus.discard_pending();
    }

    /// Point-in-time counters for diagnostics.
    pub fn stats(&self) -> SceneStats {
        SceneStats {
            entities: self.entities.alive_count(),
            archetypes: self.archetypes.len(),
            systems: self.scheduler.len(),
            tick: self.tick,
        }
    }

    fn stale_failure(&self, entity: Entity) -> EcsError {
        EcsError::StaleEntity {
            entity,
            current_generation: self.entities.generation_at(entity.index).unwrap_or(0),
        }
    }

    fn stale_noop(&self, entity: Entity, operation: &str) -> EcsError {
        warn!(?entity, operation, "stale entity handle; operation skipped");
        self.stale_failure(entity)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time scene counters.
#[derive(Debug, Clone, Copy)]
pub struct SceneStats {
    pub entities: usize,
    pub archetypes: usize,
    pub systems: usize,
    pub tick: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Spin {
        rate: f32,
    }

    #[test]
    fn test_create_and_destroy_entity() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        assert!(scene.is_alive(entity));
        assert_eq!(scene.entity_count(), 1);
        assert_eq!(scene.entity_archetype(entity), Some(EMPTY_ARCHETYPE));

        scene.destroy_entity(entity).unwrap();
        assert!(!scene.is_alive(entity));
        assert_eq!(scene.entity_count(), 0);

        // Stale handle: destroy again reports StaleEntity
        let err = scene.destroy_entity(entity).unwrap_err();
        assert!(matches!(err, EcsError::StaleEntity { .. }));
    }

    #[test]
    fn test_add_get_remove_component() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();

        scene
            .add_component(entity, Position { x: 1.0, y: 2.0 })
            .unwrap();
        assert!(scene.has_component::<Position>(entity));
        assert_eq!(
            scene.get_component::<Position>(entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );

        let removed = scene.remove_component::<Position>(entity).unwrap();
        assert_eq!(removed, Some(Position { x: 1.0, y: 2.0 }));
        assert!(!scene.has_component::<Position>(entity));
        assert!(scene.get_component::<Position>(entity).is_none());

        // Removing an absent component is Ok(None)
        assert_eq!(scene.remove_component::<Position>(entity).unwrap(), None);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        scene
            .add_component(entity, Position { x: 0.0, y: 0.0 })
            .unwrap();
        let archetype = scene.entity_archetype(entity);

        scene
            .add_component(entity, Position { x: 5.0, y: 5.0 })
            .unwrap();
        assert_eq!(scene.entity_archetype(entity), archetype);
        assert_eq!(
            scene.get_component::<Position>(entity),
            Some(&Position { x: 5.0, y: 5.0 })
        );
    }

    #[test]
    fn test_archetype_moves_on_mask_change() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        let empty = scene.entity_archetype(entity).unwrap();

        scene
            .add_component(entity, Position { x: 0.0, y: 0.0 })
            .unwrap();
        let with_position = scene.entity_archetype(entity).unwrap();
        assert_ne!(with_position, empty);

        scene.add_component(entity, Spin { rate: 1.0 }).unwrap();
        let with_both = scene.entity_archetype(entity).unwrap();
        assert_ne!(with_both, with_position);

        scene.remove_component::<Position>(entity).unwrap();
        let with_spin = scene.entity_archetype(entity).unwrap();
        assert_ne!(with_spin, with_both);

        // Mask and archetype agree at every step
        let mask = scene.entity_mask(entity).unwrap();
        assert_eq!(
            scene
                .archetype_index()
                .get(with_spin)
                .map(|archetype| archetype.mask() == mask),
            Some(true)
        );
    }

    #[test]
    fn test_stale_add_fails() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        scene.destroy_entity(entity).unwrap();

        let err = scene
            .add_component(entity, Position { x: 0.0, y: 0.0 })
            .unwrap_err();
        assert!(matches!(err, EcsError::StaleEntity { .. }));
        assert!(!scene.has_component::<Position>(entity));
    }

    #[test]
    fn test_destroy_clears_all_stores() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        scene
            .add_component(entity, Position { x: 1.0, y: 1.0 })
            .unwrap();
        scene.add_component(entity, Spin { rate: 2.0 }).unwrap();

        scene.destroy_entity(entity).unwrap();
        assert!(scene.get_component::<Position>(entity).is_none());
        assert!(scene.get_component::<Spin>(entity).is_none());

        // Reused index must not resurrect old components
        let recycled = scene.create_entity();
        assert_eq!(recycled.index, entity.index);
        assert!(!scene.has_component::<Position>(recycled));
    }

    #[test]
    fn test_clear_keeps_systems_and_listeners() {
        let mut scene = Scene::new();
        let entity = scene.create_entity();
        scene
            .add_component(entity, Position { x: 1.0, y: 1.0 })
            .unwrap();

        scene.clear();
        assert_eq!(scene.entity_count(), 0);
        assert!(!scene.is_alive(entity));
        assert_eq!(scene.archetype_count(), 1);

        let fresh = scene.create_entity();
        assert!(!scene.has_component::<Position>(fresh));
    }
}
