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

//! Scene ECS - bitmask archetype Entity Component System
//!
//! Scenes own generational entities, per-type AoS or SoA stores, an
//! archetype index keyed by component mask, matcher queries, an ordered
//! system scheduler, and a batching event bus. Heavy per-frame work can
//! be offloaded through worker entity systems.

pub mod archetype;
pub mod bitset;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod scene;
pub mod soa;
pub mod storage;

pub mod event_bus;
pub mod events;
pub mod schedule;
pub mod system;

#[cfg(feature = "parallel")]
pub mod worker;

pub mod prelude;

// Re-exports for convenience
pub use archetype::{Archetype, ArchetypeIndex};
pub use bitset::BitSet;
pub use component::{
    component_id, register_component, register_soa_component, ComponentMeta, ComponentTypeId,
    FieldDescriptor, FieldKind, FieldValue, SoaComponent, StorageKind,
};
pub use entity::Entity;
pub use error::{EcsError, Result};
pub use event_bus::{BatchConfig, Event, EventBus, EventStats, ListenerId, SubscribeOptions};
pub use query::{CachedMatch, Matcher, QueryResult};
pub use scene::{Scene, SceneStats};
pub use schedule::Scheduler;
pub use soa::SoaStore;
pub use storage::AosStore;
pub use system::{BoxedSystem, System, SystemId};

#[cfg(feature = "parallel")]
pub use worker::{DispatchMode, PendingPolicy, WorkerEntitySystem, WorkerSystem};
