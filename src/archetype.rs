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

//! Archetypes: entity groups keyed by component mask.

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::bitset::BitSet;

/// Group of entities sharing one component mask.
pub struct Archetype {
    mask: BitSet,
    entities: Vec<u32>,
    positions: FxHashMap<u32, usize>,
}

impl Archetype {
    fn new(mask: BitSet) -> Self {
        Self {
            mask,
            entities: Vec::new(),
            positions: FxHashMap::default(),
        }
    }

    /// Component mask shared by every member.
    pub fn mask(&self) -> &BitSet {
        &self.mask
    }

    /// Member entity indices. Grows in insertion order; removal swaps the
    /// last member into the hole.
    pub fn entities(&self) -> &[u32] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity_index: u32) -> bool {
        self.positions.contains_key(&entity_index)
    }

    pub(crate) fn insert(&mut self, entity_index: u32) {
        if self.positions.contains_key(&entity_index) {
            return;
        }
        self.positions.insert(entity_index, self.entities.len());
        self.entities.push(entity_index);
    }

    pub(crate) fn remove(&mut self, entity_index: u32) -> bool {
        let Some(position) = self.positions.remove(&entity_index) else {
            return false;
        };
        self.entities.swap_remove(position);
        if position < self.entities.len() {
            // Fix up the member that was swapped into the hole
            self.positions.insert(self.entities[position], position);
        }
        true
    }
}

/// Canonical set of archetypes for one scene.
///
/// Archetypes are created lazily when the first entity with a given mask
/// appears; the empty-mask archetype is bootstrapped at index 0 so fresh
/// entities always have a home. The version counter advances whenever an
/// archetype is added, which is what matcher caches key their lazy
/// refresh on.
pub struct ArchetypeIndex {
    archetypes: Vec<Archetype>,
    by_mask: AHashMap<BitSet, usize>,
    version: u32,
}

/// Id of the bootstrapped empty-mask archetype.
pub const EMPTY_ARCHETYPE: usize = 0;

impl ArchetypeIndex {
    pub fn new() -> Self {
        let mut index = Self {
            archetypes: Vec::with_capacity(64),
            by_mask: AHashMap::with_capacity(64),
            version: 0,
        };
        index.get_or_create(&BitSet::new());
        index
    }

    /// Archetype id for the mask, creating it on first sight.
    pub fn get_or_create(&mut self, mask: &BitSet) -> usize {
        if let Some(&id) = self.by_mask.get(mask) {
            return id;
        }

        // Push first so the map never points at a missing archetype
        self.archetypes.push(Archetype::new(mask.clone()));
        let id = self.archetypes.len() - 1;
        self.by_mask.insert(mask.clone(), id);
        self.version = self.version.wrapping_add(1);
        id
    }

    pub fn get(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Bumped on every archetype creation; matcher caches compare this.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Move an entity between archetypes after a mask change.
    /// Exactly one remove and one insert; no-op when from == to.
    pub(crate) fn move_entity(&mut self, entity_index: u32, from: usize, to: usize) {
        if from == to {
            return;
        }
        if let Some(archetype) = self.archetypes.get_mut(from) {
            archetype.remove(entity_index);
        }
        if let Some(archetype) = self.archetypes.get_mut(to) {
            archetype.insert(entity_index);
        }
    }

    /// Drop all archetypes and recreate the empty one.
    pub fn clear(&mut self) {
        self.archetypes.clear();
        self.by_mask.clear();
        self.get_or_create(&BitSet::new());
    }
}

impl Default for ArchetypeIndex {
    fn default() -> Self {
        Self::new()
    }
}
