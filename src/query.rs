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

//! Declarative matchers and the query engine.
//!
//! A matcher compiles down to three masks; matching an archetype is three
//! bitwise tests. Per-matcher archetype lists are cached and refreshed
//! lazily from the archetype index version.

use tracing::error;

use crate::archetype::ArchetypeIndex;
use crate::bitset::BitSet;
use crate::component::{component_id_or_register, Component, ComponentTypeId};
use crate::entity::{Entities, Entity};

/// Declarative filter over component masks.
///
/// `all` bits must be present, `any` (when non-empty) must intersect,
/// `none` must not intersect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matcher {
    all: BitSet,
    any: BitSet,
    none: BitSet,
}

impl Matcher {
    /// Matcher that matches every entity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Require component `T` to be present.
    pub fn all<T: Component>(self) -> Self {
        self.all_id(Self::id_of::<T>())
    }

    /// Require at least one `any` component once any `any` bit is set.
    pub fn any<T: Component>(self) -> Self {
        self.any_id(Self::id_of::<T>())
    }

    /// Reject entities holding component `T`.
    pub fn none<T: Component>(self) -> Self {
        self.none_id(Self::id_of::<T>())
    }

    pub fn all_id(mut self, id: Option<ComponentTypeId>) -> Self {
        if let Some(id) = id {
            self.all.set(id.bit());
        }
        self
    }

    pub fn any_id(mut self, id: Option<ComponentTypeId>) -> Self {
        if let Some(id) = id {
            self.any.set(id.bit());
        }
        self
    }

    pub fn none_id(mut self, id: Option<ComponentTypeId>) -> Self {
        if let Some(id) = id {
            self.none.set(id.bit());
        }
        self
    }

    fn id_of<T: Component>() -> Option<ComponentTypeId> {
        match component_id_or_register::<T>() {
            Ok(id) => Some(id),
            Err(err) => {
                error!(%err, "matcher references an unregistrable component; clause dropped");
                None
            }
        }
    }

    /// The compiled mask test.
    pub fn matches(&self, mask: &BitSet) -> bool {
        mask.contains_all(&self.all)
            && (self.any.is_empty() || mask.intersects(&self.any))
            && !mask.intersects(&self.none)
    }
}

/// Per-matcher cache of matching archetype ids.
///
/// Archetypes only ever append while a scene is running, so a refresh
/// normally just scans the tail; a scene clear (archetype count shrank)
/// forces a full rebuild.
#[derive(Debug, Clone)]
pub struct CachedMatch {
    matcher: Matcher,
    matched: Vec<usize>,
    seen_len: usize,
    seen_version: u32,
}

impl CachedMatch {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            matched: Vec::new(),
            seen_len: 0,
            seen_version: 0,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Bring the cached list up to date with the index.
    pub fn refresh(&mut self, index: &ArchetypeIndex) {
        if self.seen_version == index.version() && self.seen_len == index.len() {
            return;
        }

        let appended = index.len().wrapping_sub(self.seen_len) as u32;
        let incremental = index.len() >= self.seen_len
            && index.version().wrapping_sub(self.seen_version) == appended;

        if !incremental {
            self.matched.clear();
            self.seen_len = 0;
        }

        for (id, archetype) in index
            .archetypes()
            .iter()
            .enumerate()
            .skip(self.seen_len)
        {
            if self.matcher.matches(archetype.mask()) {
                self.matched.push(id);
            }
        }
        self.seen_len = index.len();
        self.seen_version = index.version();
    }

    /// Matching archetype ids as of the last refresh.
    pub fn matched(&self) -> &[usize] {
        &self.matched
    }
}

/// Result of evaluating a matcher against a scene.
///
/// `iter` is a live view over the matched archetypes' entity arrays:
/// archetypes added while iterating are not observed, and structural
/// changes to already-visited entities of the same archetype during the
/// pass are undefined. Code that mutates structure mid-pass should work
/// from [`QueryResult::entities_snapshot`] instead.
pub struct QueryResult<'s> {
    archetypes: &'s ArchetypeIndex,
    entities: &'s Entities,
    matched: Vec<usize>,
    include_disabled: bool,
}

impl<'s> QueryResult<'s> {
    pub(crate) fn new(
        archetypes: &'s ArchetypeIndex,
        entities: &'s Entities,
        matcher: &Matcher,
        include_disabled: bool,
    ) -> Self {
        let matched = archetypes
            .archetypes()
            .iter()
            .enumerate()
            .filter(|(_, archetype)| matcher.matches(archetype.mask()))
            .map(|(id, _)| id)
            .collect();
        Self {
            archetypes,
            entities,
            matched,
            include_disabled,
        }
    }

    pub(crate) fn from_matched(
        archetypes: &'s ArchetypeIndex,
        entities: &'s Entities,
        matched: Vec<usize>,
        include_disabled: bool,
    ) -> Self {
        Self {
            archetypes,
            entities,
            matched,
            include_disabled,
        }
    }

    /// Lazily iterate matching entity handles.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.matched
            .iter()
            .filter_map(|&id| self.archetypes.get(id))
            .flat_map(|archetype| archetype.entities().iter().copied())
            .filter_map(move |index| {
                let entity = self.entities.handle(index)?;
                if !self.include_disabled {
                    let meta = self.entities.get(entity)?;
                    if !meta.enabled {
                        return None;
                    }
                }
                Some(entity)
            })
    }

    /// Owned copy of the current matches, safe to mutate against.
    pub fn entities_snapshot(&self) -> Vec<Entity> {
        self.iter().collect()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Ids of the matched archetypes.
    pub fn matched_archetypes(&self) -> &[usize] {
        &self.matched
    }
}
