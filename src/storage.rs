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

//! Component stores: the type-erased store contract and the default
//! Array-of-Structs sparse-set store.
//!
//! Stores are keyed by raw entity index; generation checks and mask upkeep
//! belong to the scene, never to a store.

use std::any::Any;

use rustc_hash::FxHashMap;

use crate::component::Component;

/// Type-erased per-type component store owned by a scene.
pub trait ComponentStore: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Insert or overwrite through the erased surface. Returns false when
    /// the boxed value is not this store's component type.
    fn insert_boxed(&mut self, entity_index: u32, value: Box<dyn Any>) -> bool;

    /// Remove and return the component through the erased surface.
    fn remove_boxed(&mut self, entity_index: u32) -> Option<Box<dyn Any>>;

    /// Drop the entity's component if present. Returns whether it was there.
    fn remove_entity(&mut self, entity_index: u32) -> bool;

    fn contains(&self, entity_index: u32) -> bool;

    /// Count of live components.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Entity indices currently present, in dense order.
    fn entity_indices(&self) -> Vec<u32>;
}

/// Array-of-Structs store: sparse entity→dense map over a dense value
/// vector and a parallel entity-index vector. O(1) insert, lookup and
/// swap-and-pop removal.
pub struct AosStore<T: Component> {
    sparse: FxHashMap<u32, usize>,
    dense: Vec<T>,
    entities: Vec<u32>,
}

impl<T: Component> AosStore<T> {
    pub fn new() -> Self {
        Self {
            sparse: FxHashMap::default(),
            dense: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Insert or overwrite. Returns the previous value on overwrite.
    pub fn insert(&mut self, entity_index: u32, value: T) -> Option<T> {
        if let Some(&dense_idx) = self.sparse.get(&entity_index) {
            return Some(std::mem::replace(&mut self.dense[dense_idx], value));
        }
        self.sparse.insert(entity_index, self.dense.len());
        self.dense.push(value);
        self.entities.push(entity_index);
        None
    }

    pub fn get(&self, entity_index: u32) -> Option<&T> {
        let &dense_idx = self.sparse.get(&entity_index)?;
        self.dense.get(dense_idx)
    }

    pub fn get_mut(&mut self, entity_index: u32) -> Option<&mut T> {
        let &dense_idx = self.sparse.get(&entity_index)?;
        self.dense.get_mut(dense_idx)
    }

    /// Swap-and-pop removal; the last dense entry moves into the hole.
    pub fn remove(&mut self, entity_index: u32) -> Option<T> {
        let dense_idx = self.sparse.remove(&entity_index)?;
        let value = self.dense.swap_remove(dense_idx);
        self.entities.swap_remove(dense_idx);
        if dense_idx < self.entities.len() {
            // Fix up the entry that was swapped into the hole
            self.sparse.insert(self.entities[dense_idx], dense_idx);
        }
        Some(value)
    }

    /// Iterate (entity index, component) pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.entities.iter().copied().zip(self.dense.iter_mut())
    }
}

impl<T: Component> Default for AosStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentStore for AosStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn insert_boxed(&mut self, entity_index: u32, value: Box<dyn Any>) -> bool {
        match value.downcast::<T>() {
            Ok(value) => {
                self.insert(entity_index, *value);
                true
            }
            Err(_) => false,
        }
    }

    fn remove_boxed(&mut self, entity_index: u32) -> Option<Box<dyn Any>> {
        self.remove(entity_index)
            .map(|value| Box::new(value) as Box<dyn Any>)
    }

    fn remove_entity(&mut self, entity_index: u32) -> bool {
        self.remove(entity_index).is_some()
    }

    fn contains(&self, entity_index: u32) -> bool {
        self.sparse.contains_key(&entity_index)
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.entities.clear();
    }

    fn entity_indices(&self) -> Vec<u32> {
        self.entities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn test_insert_get_remove() {
        let mut store = AosStore::new();
        assert!(store.insert(0, Velocity { dx: 1.0, dy: 2.0 }).is_none());
        assert!(store.insert(7, Velocity { dx: 3.0, dy: 4.0 }).is_none());

        assert_eq!(store.get(0), Some(&Velocity { dx: 1.0, dy: 2.0 }));
        assert_eq!(store.len(), 2);

        let removed = store.remove(0).unwrap();
        assert_eq!(removed, Velocity { dx: 1.0, dy: 2.0 });
        assert_eq!(store.len(), 1);
        assert!(store.get(0).is_none());
        // Swapped entry still reachable
        assert_eq!(store.get(7), Some(&Velocity { dx: 3.0, dy: 4.0 }));
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let mut store = AosStore::new();
        store.insert(3, Velocity { dx: 0.0, dy: 0.0 });
        let old = store.insert(3, Velocity { dx: 9.0, dy: 9.0 });
        assert_eq!(old, Some(Velocity { dx: 0.0, dy: 0.0 }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_swap_and_pop_fixes_sparse() {
        let mut store = AosStore::new();
        for i in 0..10u32 {
            store.insert(
                i,
                Velocity {
                    dx: i as f32,
                    dy: 0.0,
                },
            );
        }
        // Remove from the middle; entity 9 is swapped into slot 4
        store.remove(4);
        assert_eq!(store.get(9).map(|v| v.dx), Some(9.0));
        for i in (0..10u32).filter(|&i| i != 4) {
            assert_eq!(store.get(i).map(|v| v.dx), Some(i as f32));
        }
    }

    #[test]
    fn test_erased_contract() {
        let mut store = AosStore::new();
        store.insert(1, Velocity { dx: 1.0, dy: 1.0 });
        let erased: &mut dyn ComponentStore = &mut store;
        assert!(erased.contains(1));
        assert!(erased.remove_entity(1));
        assert!(!erased.remove_entity(1));
        assert!(erased.is_empty());
    }
}
