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

//! Component traits and the process-wide type registry.
//!
//! Every component class is registered once per process and receives a dense
//! `ComponentTypeId` whose value doubles as its bit index in entity masks.
//! Type ids are stable across all scenes; scenes look up store factories and
//! field schemas here.

use std::any::TypeId;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::soa::SoaStore;
use crate::storage::{AosStore, ComponentStore};

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Dense component type id; the numeric value is also the mask bit index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Bit index of this type in entity masks (identity mapping).
    pub fn bit(self) -> usize {
        self.0 as usize
    }
}

/// Storage strategy for a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Dense vector of component instances (default).
    Aos,
    /// One packed column per scalar field plus side tables.
    Soa,
}

/// Per-field storage behaviour for SoA component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Packed f32 column (default for numerics).
    F32,
    /// Packed f64 column.
    F64,
    /// Packed i32 column.
    I32,
    /// 0/1 in an f32 column.
    Bool,
    /// Parallel string vector.
    Text,
    /// Numerics that must not lose precision in a packed column; side-stored.
    HighPrecision,
    /// Map serialized to a JSON column entry.
    SerializedMap,
    /// Set serialized to a JSON column entry.
    SerializedSet,
    /// Array serialized to a JSON column entry.
    SerializedArray,
    /// Owned on write and read; side-stored.
    DeepCopy,
    /// Anything else; side-stored.
    Complex,
}

impl FieldKind {
    /// Whether values of this kind live in the per-entity side table
    /// instead of a packed column.
    pub fn is_side_stored(self) -> bool {
        matches!(
            self,
            FieldKind::HighPrecision | FieldKind::DeepCopy | FieldKind::Complex
        )
    }

    /// Whether values of this kind are JSON-encoded into a string column.
    pub fn is_serialized(self) -> bool {
        matches!(
            self,
            FieldKind::SerializedMap | FieldKind::SerializedSet | FieldKind::SerializedArray
        )
    }
}

/// Field schema entry for a SoA component type.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Value of one component field, as carried through SoA get/set.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    F32(f32),
    F64(f64),
    I32(i32),
    Bool(bool),
    Text(String),
    /// Payload of a SerializedMap/Set/Array field.
    Serialized(serde_json::Value),
    /// Payload of a side-stored field.
    Complex(ComplexValue),
}

/// Tagged value kinds storable in the SoA complex-field side table.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Object(serde_json::Value),
}

/// Column-storable component with a static field schema.
///
/// Implementors enumerate their fields once and move values in and out by
/// name; the SoA store drives both through the schema. `Default` supplies
/// the blank instance that `get` reconstructs into.
pub trait SoaComponent: Component + Default + Clone {
    /// Static field schema; order fixes column order.
    fn fields() -> &'static [FieldDescriptor];

    /// Read one field by name. Returns None for unknown names.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Write one field by name. Returns false for unknown names.
    fn set_field(&mut self, name: &str, value: FieldValue) -> bool;
}

/// Registry record for one component type.
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    pub name: &'static str,
    pub id: ComponentTypeId,
    pub storage: StorageKind,
    /// Field schema; empty for AoS types.
    pub fields: &'static [FieldDescriptor],
}

struct ComponentInfo {
    meta: ComponentMeta,
    rust_type: TypeId,
    make_store: fn() -> Box<dyn ComponentStore>,
}

/// Process-wide component registry.
///
/// Scenes share one registry so that a type's id (and therefore its mask
/// bit) is identical in every scene of the process.
#[derive(Default)]
pub struct ComponentRegistry {
    by_rust_type: FxHashMap<TypeId, ComponentTypeId>,
    by_name: FxHashMap<&'static str, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    fn register_info(
        &mut self,
        rust_type: TypeId,
        name: &'static str,
        storage: StorageKind,
        fields: &'static [FieldDescriptor],
        make_store: fn() -> Box<dyn ComponentStore>,
    ) -> Result<ComponentTypeId> {
        // Idempotent per Rust type
        if let Some(&id) = self.by_rust_type.get(&rust_type) {
            return Ok(id);
        }

        // A different type under the same name would make lookups ambiguous
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateTypeName(name.to_string()));
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            meta: ComponentMeta {
                name,
                id,
                storage,
                fields,
            },
            rust_type,
            make_store,
        });
        self.by_rust_type.insert(rust_type, id);
        self.by_name.insert(name, id);
        Ok(id)
    }

    fn lookup(&self, rust_type: TypeId) -> Option<ComponentTypeId> {
        self.by_rust_type.get(&rust_type).copied()
    }

    fn describe(&self, id: ComponentTypeId) -> Option<ComponentMeta> {
        self.infos.get(id.0 as usize).map(|info| info.meta.clone())
    }

    fn registered_count(&self) -> usize {
        self.infos.len()
    }
}

static REGISTRY: Lazy<RwLock<ComponentRegistry>> =
    Lazy::new(|| RwLock::new(ComponentRegistry::default()));

/// Strip module path (and any generic tail) from a Rust type name.
fn short_type_name<T: 'static>() -> &'static str {
    let full: &'static str = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// Register `T` with Array-of-Structs storage. Idempotent.
pub fn register_component<T: Component>() -> Result<ComponentTypeId> {
    REGISTRY.write().register_info(
        TypeId::of::<T>(),
        short_type_name::<T>(),
        StorageKind::Aos,
        &[],
        || Box::new(AosStore::<T>::new()),
    )
}

/// Register `T` with Structure-of-Arrays storage. Idempotent.
pub fn register_soa_component<T: SoaComponent>() -> Result<ComponentTypeId> {
    REGISTRY.write().register_info(
        TypeId::of::<T>(),
        short_type_name::<T>(),
        StorageKind::Soa,
        T::fields(),
        || Box::new(SoaStore::<T>::new()),
    )
}

/// Id previously assigned to `T`, if any.
pub fn component_id<T: Component>() -> Option<ComponentTypeId> {
    REGISTRY.read().lookup(TypeId::of::<T>())
}

/// Id for `T`, registering it (AoS) on first use.
pub fn component_id_or_register<T: Component>() -> Result<ComponentTypeId> {
    if let Some(id) = component_id::<T>() {
        return Ok(id);
    }
    register_component::<T>()
}

/// Registry record for a type id.
pub fn describe(id: ComponentTypeId) -> Option<ComponentMeta> {
    REGISTRY.read().describe(id)
}

/// Number of registered component types.
pub fn registered_type_count() -> usize {
    REGISTRY.read().registered_count()
}

/// Build a fresh store for the given type id (scene-internal).
pub(crate) fn make_store(id: ComponentTypeId) -> Option<Box<dyn ComponentStore>> {
    let registry = REGISTRY.read();
    registry
        .infos
        .get(id.0 as usize)
        .map(|info| (info.make_store)())
}

#[allow(dead_code)]
pub(crate) fn rust_type_of(id: ComponentTypeId) -> Option<TypeId> {
    REGISTRY.read().infos.get(id.0 as usize).map(|i| i.rust_type)
}
