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

//! Entity handles and the generational entity table.

use serde::{Deserialize, Serialize};

use crate::bitset::BitSet;

/// Lightweight entity handle: dense index plus generation.
///
/// The generation increments whenever the index is destroyed, so a held
/// handle detects use-after-free instead of touching a recycled entity.
/// Handles serialize as plain data so embedders can ship them across
/// worker and replication boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub index: u32,
    pub generation: u32,
}

/// Per-index record in the entity table.
#[derive(Debug)]
pub(crate) struct EntityMeta {
    pub generation: u32,
    pub alive: bool,
    pub enabled: bool,
    pub mask: BitSet,
    /// Current archetype id; cached, derivable from the mask.
    pub archetype: usize,
    pub name: Option<String>,
}

/// Entity allocator: index table with a free stack.
#[derive(Default)]
pub(crate) struct Entities {
    meta: Vec<EntityMeta>,
    free: Vec<u32>,
    alive: usize,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing a destroyed index when one is free.
    pub fn allocate(&mut self, name: Option<String>) -> Entity {
        if let Some(index) = self.free.pop() {
            let meta = &mut self.meta[index as usize];
            meta.alive = true;
            meta.enabled = true;
            meta.mask.clear_all();
            meta.archetype = 0;
            meta.name = name;
            self.alive += 1;
            return Entity {
                index,
                generation: meta.generation,
            };
        }

        let index = self.meta.len() as u32;
        self.meta.push(EntityMeta {
            generation: 1,
            alive: true,
            enabled: true,
            mask: BitSet::new(),
            archetype: 0,
            name,
        });
        self.alive += 1;
        Entity {
            index,
            generation: 1,
        }
    }

    /// Free the index and bump its generation; stale handles die here.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        let Some(meta) = self.meta.get_mut(entity.index as usize) else {
            return false;
        };
        if !meta.alive || meta.generation != entity.generation {
            return false;
        }
        meta.alive = false;
        meta.generation = meta.generation.wrapping_add(1);
        meta.mask.clear_all();
        meta.name = None;
        self.free.push(entity.index);
        self.alive -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.meta
            .get(entity.index as usize)
            .map(|meta| meta.alive && meta.generation == entity.generation)
            .unwrap_or(false)
    }

    /// Record for a live handle; None when the handle is stale.
    pub fn get(&self, entity: Entity) -> Option<&EntityMeta> {
        let meta = self.meta.get(entity.index as usize)?;
        (meta.alive && meta.generation == entity.generation).then_some(meta)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityMeta> {
        let meta = self.meta.get_mut(entity.index as usize)?;
        (meta.alive && meta.generation == entity.generation).then_some(meta)
    }

    /// Current generation stored at the index, for diagnostics.
    pub fn generation_at(&self, index: u32) -> Option<u32> {
        self.meta.get(index as usize).map(|meta| meta.generation)
    }

    /// Live handle for a raw index, if the index is alive.
    pub fn handle(&self, index: u32) -> Option<Entity> {
        let meta = self.meta.get(index as usize)?;
        meta.alive.then_some(Entity {
            index,
            generation: meta.generation,
        })
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Iterate live handles in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.meta.iter().enumerate().filter_map(|(index, meta)| {
            meta.alive.then_some(Entity {
                index: index as u32,
                generation: meta.generation,
            })
        })
    }

    pub fn clear(&mut self) {
        // Generations survive a clear so pre-clear handles stay stale
        for (index, meta) in self.meta.iter_mut().enumerate() {
            if meta.alive {
                meta.alive = false;
                meta.generation = meta.generation.wrapping_add(1);
                meta.mask.clear_all();
                meta.name = None;
                self.free.push(index as u32);
            }
        }
        self.alive = 0;
    }
}
