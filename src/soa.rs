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

//! Structure-of-Arrays component store.
//!
//! Each packed field owns one column sized to the rounded capacity; map,
//! set and array fields are JSON-encoded into string columns; complex
//! fields live in a per-entity side table. Slots are recycled through a
//! free stack, which fragments the columns until `compact()` repacks them.
//!
//! Invariants: every live entity has a unique slot below `capacity`; every
//! slot below `capacity` is live or on the free stack; all column lengths
//! equal `capacity` and `capacity >= len()`.

use std::marker::PhantomData;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, error};

use crate::component::{
    ComplexValue, FieldDescriptor, FieldKind, FieldValue, SoaComponent,
};
use crate::storage::ComponentStore;

const SLOT_GRANULARITY: usize = 64;
const DEAD: u32 = u32::MAX;

/// Round a slot count up to whole 64-slot blocks.
fn rounded_capacity(slots: usize) -> usize {
    slots.div_ceil(SLOT_GRANULARITY) * SLOT_GRANULARITY
}

/// One packed column. Booleans ride in f32 columns as 0/1; serialized
/// fields as JSON text.
enum Column {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    Bool(Vec<f32>),
    Text(Vec<String>),
    Serialized(Vec<String>),
}

impl Column {
    fn for_kind(kind: FieldKind) -> Option<Column> {
        match kind {
            FieldKind::F32 => Some(Column::F32(Vec::new())),
            FieldKind::F64 => Some(Column::F64(Vec::new())),
            FieldKind::I32 => Some(Column::I32(Vec::new())),
            FieldKind::Bool => Some(Column::Bool(Vec::new())),
            FieldKind::Text => Some(Column::Text(Vec::new())),
            FieldKind::SerializedMap | FieldKind::SerializedSet | FieldKind::SerializedArray => {
                Some(Column::Serialized(Vec::new()))
            }
            // Side-stored kinds own no column
            FieldKind::HighPrecision | FieldKind::DeepCopy | FieldKind::Complex => None,
        }
    }

    fn grow_to(&mut self, capacity: usize) {
        match self {
            Column::F32(v) | Column::Bool(v) => v.resize(capacity, 0.0),
            Column::F64(v) => v.resize(capacity, 0.0),
            Column::I32(v) => v.resize(capacity, 0),
            Column::Text(v) | Column::Serialized(v) => v.resize(capacity, String::new()),
        }
    }

    fn write(&mut self, slot: usize, field: &'static str, value: FieldValue) {
        match (self, value) {
            (Column::F32(v), value) => {
                if let Some(n) = value.as_f64() {
                    v[slot] = n as f32;
                } else {
                    debug!(field, "non-numeric value written to f32 column; skipped");
                }
            }
            (Column::F64(v), value) => {
                if let Some(n) = value.as_f64() {
                    v[slot] = n;
                } else {
                    debug!(field, "non-numeric value written to f64 column; skipped");
                }
            }
            (Column::I32(v), value) => {
                if let Some(n) = value.as_f64() {
                    v[slot] = n as i32;
                } else {
                    debug!(field, "non-numeric value written to i32 column; skipped");
                }
            }
            (Column::Bool(v), FieldValue::Bool(b)) => v[slot] = if b { 1.0 } else { 0.0 },
            (Column::Bool(v), value) => {
                v[slot] = if value.as_f64().unwrap_or(0.0) != 0.0 {
                    1.0
                } else {
                    0.0
                };
            }
            (Column::Text(v), FieldValue::Text(s)) => v[slot] = s,
            (Column::Text(_), _) => {
                debug!(field, "non-text value written to text column; skipped");
            }
            (Column::Serialized(v), FieldValue::Serialized(json)) => {
                match serde_json::to_string(&json) {
                    Ok(encoded) => v[slot] = encoded,
                    Err(err) => {
                        error!(field, %err, "failed to serialize field; storing empty object");
                        v[slot] = "{}".to_string();
                    }
                }
            }
            (Column::Serialized(v), _) => {
                debug!(field, "non-serialized value written to serialized column");
                v[slot] = "{}".to_string();
            }
        }
    }

    fn read(&self, slot: usize, field: &'static str) -> FieldValue {
        match self {
            Column::F32(v) => FieldValue::F32(v[slot]),
            Column::F64(v) => FieldValue::F64(v[slot]),
            Column::I32(v) => FieldValue::I32(v[slot]),
            Column::Bool(v) => FieldValue::Bool(v[slot] != 0.0),
            Column::Text(v) => FieldValue::Text(v[slot].clone()),
            Column::Serialized(v) => {
                let raw = &v[slot];
                if raw.is_empty() {
                    return FieldValue::Serialized(serde_json::Value::Null);
                }
                match serde_json::from_str(raw) {
                    Ok(json) => FieldValue::Serialized(json),
                    Err(err) => {
                        error!(field, %err, "failed to deserialize field; returning null");
                        FieldValue::Serialized(serde_json::Value::Null)
                    }
                }
            }
        }
    }

}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::F32(n) => Some(*n as f64),
            FieldValue::F64(n) => Some(*n),
            FieldValue::I32(n) => Some(*n as f64),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Immutable view of one packed numeric column.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSlice<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
    I32(&'a [i32]),
}

impl<'a> ColumnSlice<'a> {
    pub fn as_f32(self) -> Option<&'a [f32]> {
        match self {
            ColumnSlice::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<&'a [f64]> {
        match self {
            ColumnSlice::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(self) -> Option<&'a [i32]> {
        match self {
            ColumnSlice::I32(v) => Some(v),
            _ => None,
        }
    }
}

/// Mutable view of one packed numeric column, handed out by
/// [`SoaColumns::take`].
pub enum ColumnSliceMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
    I32(&'a mut [i32]),
}

/// Per-call field map for vectorized batch operations. Columns are taken
/// by name, at most once each, so several can be held simultaneously.
pub struct SoaColumns<'a> {
    fields: Vec<(&'static str, Option<ColumnSliceMut<'a>>)>,
}

impl<'a> SoaColumns<'a> {
    /// Take the named column out of the map. Subsequent takes of the same
    /// name return None.
    pub fn take(&mut self, name: &str) -> Option<ColumnSliceMut<'a>> {
        self.fields
            .iter_mut()
            .find(|(n, _)| *n == name)
            .and_then(|(_, slot)| slot.take())
    }

    /// Convenience: take an f32 column (bool columns are f32 0/1).
    pub fn take_f32(&mut self, name: &str) -> Option<&'a mut [f32]> {
        match self.take(name)? {
            ColumnSliceMut::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn take_f64(&mut self, name: &str) -> Option<&'a mut [f64]> {
        match self.take(name)? {
            ColumnSliceMut::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn take_i32(&mut self, name: &str) -> Option<&'a mut [i32]> {
        match self.take(name)? {
            ColumnSliceMut::I32(v) => Some(v),
            _ => None,
        }
    }
}

type ComplexEntry = SmallVec<[(&'static str, ComplexValue); 4]>;

/// Structure-of-Arrays store for one component type.
pub struct SoaStore<T: SoaComponent> {
    columns: Vec<(FieldDescriptor, Column)>,
    complex_fields: FxHashMap<u32, ComplexEntry>,
    slot_of: FxHashMap<u32, usize>,
    entity_at: Vec<u32>,
    free_slots: Vec<usize>,
    capacity: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SoaComponent> SoaStore<T> {
    pub fn new() -> Self {
        let columns = T::fields()
            .iter()
            .filter_map(|desc| Column::for_kind(desc.kind).map(|col| (*desc, col)))
            .collect();
        Self {
            columns,
            complex_fields: FxHashMap::default(),
            slot_of: FxHashMap::default(),
            entity_at: Vec::new(),
            free_slots: Vec::new(),
            capacity: 0,
            _marker: PhantomData,
        }
    }

    /// Live component count.
    pub fn len(&self) -> usize {
        self.slot_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_of.is_empty()
    }

    /// Current column capacity (always >= len, multiple of 64).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot currently assigned to the entity, if present.
    pub fn slot(&self, entity_index: u32) -> Option<usize> {
        self.slot_of.get(&entity_index).copied()
    }

    fn grow(&mut self, min_capacity: usize) {
        let target = rounded_capacity(min_capacity.max(self.capacity * 2).max(SLOT_GRANULARITY));
        self.capacity = target;
        self.entity_at.resize(target, DEAD);
        for (_, column) in &mut self.columns {
            column.grow_to(target);
        }
    }

    fn allocate_slot(&mut self, entity_index: u32) -> usize {
        if let Some(slot) = self.free_slots.pop() {
            self.entity_at[slot] = entity_index;
            self.slot_of.insert(entity_index, slot);
            return slot;
        }
        let slot = self.slot_of.len() + self.free_slots.len();
        if slot >= self.capacity {
            self.grow(slot + 1);
        }
        self.entity_at[slot] = entity_index;
        self.slot_of.insert(entity_index, slot);
        slot
    }

    /// Insert or overwrite the entity's component, scattering each field
    /// into its column or the side table.
    pub fn insert(&mut self, entity_index: u32, component: T) {
        let slot = match self.slot_of.get(&entity_index) {
            Some(&slot) => slot,
            None => self.allocate_slot(entity_index),
        };

        let mut side: ComplexEntry = SmallVec::new();
        for desc in T::fields() {
            let Some(value) = component.field(desc.name) else {
                continue;
            };
            if desc.kind.is_side_stored() {
                if let FieldValue::Complex(complex) = value {
                    side.push((desc.name, complex));
                } else if let Some(n) = value.as_f64() {
                    // HighPrecision numerics arrive as plain numbers
                    side.push((desc.name, ComplexValue::Number(n)));
                }
                continue;
            }
            if let Some((_, column)) = self
                .columns
                .iter_mut()
                .find(|(d, _)| d.name == desc.name)
            {
                column.write(slot, desc.name, value);
            }
        }

        if side.is_empty() {
            self.complex_fields.remove(&entity_index);
        } else {
            self.complex_fields.insert(entity_index, side);
        }
    }

    /// Reconstruct a component view by gathering every field.
    pub fn get(&self, entity_index: u32) -> Option<T> {
        let &slot = self.slot_of.get(&entity_index)?;
        let mut component = T::default();
        for desc in T::fields() {
            if desc.kind.is_side_stored() {
                let value = self
                    .complex_fields
                    .get(&entity_index)
                    .and_then(|entry| entry.iter().find(|(name, _)| *name == desc.name))
                    .map(|(_, complex)| match (desc.kind, complex) {
                        (FieldKind::HighPrecision, ComplexValue::Number(n)) => {
                            FieldValue::F64(*n)
                        }
                        (_, complex) => FieldValue::Complex(complex.clone()),
                    });
                if let Some(value) = value {
                    component.set_field(desc.name, value);
                }
                continue;
            }
            if let Some((_, column)) = self.columns.iter().find(|(d, _)| d.name == desc.name) {
                component.set_field(desc.name, column.read(slot, desc.name));
            }
        }
        Some(component)
    }

    pub fn contains(&self, entity_index: u32) -> bool {
        self.slot_of.contains_key(&entity_index)
    }

    /// Remove and return the entity's component.
    pub fn remove(&mut self, entity_index: u32) -> Option<T> {
        let component = self.get(entity_index)?;
        self.discard(entity_index);
        Some(component)
    }

    /// Free the entity's slot without reconstructing the component.
    pub fn discard(&mut self, entity_index: u32) -> bool {
        let Some(slot) = self.slot_of.remove(&entity_index) else {
            return false;
        };
        self.entity_at[slot] = DEAD;
        self.free_slots.push(slot);
        self.complex_fields.remove(&entity_index);
        true
    }

    /// Borrow one packed numeric column. Returns None for text, serialized
    /// and side-stored fields.
    pub fn field_column(&self, name: &str) -> Option<ColumnSlice<'_>> {
        let (_, column) = self.columns.iter().find(|(d, _)| d.name == name)?;
        match column {
            Column::F32(v) | Column::Bool(v) => Some(ColumnSlice::F32(v)),
            Column::F64(v) => Some(ColumnSlice::F64(v)),
            Column::I32(v) => Some(ColumnSlice::I32(v)),
            Column::Text(_) | Column::Serialized(_) => None,
        }
    }

    /// Run a vectorized batch operation over the packed numeric columns.
    ///
    /// `op` receives the field map and the live slot indices (ascending).
    /// It may read and write any active index but must not add or remove
    /// entities; columns are guaranteed not to resize during the call.
    pub fn perform_vectorized<F>(&mut self, op: F)
    where
        F: FnOnce(&mut SoaColumns<'_>, &[usize]),
    {
        let mut active: Vec<usize> = self.slot_of.values().copied().collect();
        active.sort_unstable();

        let mut fields = Vec::with_capacity(self.columns.len());
        for (desc, column) in &mut self.columns {
            let slice = match column {
                Column::F32(v) | Column::Bool(v) => Some(ColumnSliceMut::F32(v.as_mut_slice())),
                Column::F64(v) => Some(ColumnSliceMut::F64(v.as_mut_slice())),
                Column::I32(v) => Some(ColumnSliceMut::I32(v.as_mut_slice())),
                Column::Text(_) | Column::Serialized(_) => None,
            };
            if let Some(slice) = slice {
                fields.push((desc.name, Some(slice)));
            }
        }

        let mut view = SoaColumns { fields };
        op(&mut view, &active);
    }

    /// Repack live slots into `[0, len)` in ascending entity order.
    /// Invalidates any slot indices observed before the call.
    pub fn compact(&mut self) {
        let mut entities: Vec<u32> = self.slot_of.keys().copied().collect();
        entities.sort_unstable();

        // Gather before reassigning: slot moves are not order-safe in place
        // once the free list has punched holes in the middle.
        let snapshot: Vec<(u32, T)> = entities
            .iter()
            .filter_map(|&entity| self.get(entity).map(|component| (entity, component)))
            .collect();

        self.slot_of.clear();
        self.free_slots.clear();
        self.complex_fields.clear();
        for entity in &mut self.entity_at {
            *entity = DEAD;
        }

        // With the free stack empty, allocation is sequential from slot 0.
        for (entity, component) in snapshot {
            self.insert(entity, component);
        }
    }

    /// Iterate (entity index, reconstructed component) in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, T)> + '_ {
        self.entity_at
            .iter()
            .copied()
            .filter(|&entity| entity != DEAD)
            .filter_map(move |entity| self.get(entity).map(|component| (entity, component)))
    }
}

impl<T: SoaComponent> Default for SoaStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SoaComponent> ComponentStore for SoaStore<T> {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn insert_boxed(&mut self, entity_index: u32, value: Box<dyn std::any::Any>) -> bool {
        match value.downcast::<T>() {
            Ok(value) => {
                self.insert(entity_index, *value);
                true
            }
            Err(_) => false,
        }
    }

    fn remove_boxed(&mut self, entity_index: u32) -> Option<Box<dyn std::any::Any>> {
        self.remove(entity_index)
            .map(|value| Box::new(value) as Box<dyn std::any::Any>)
    }

    fn remove_entity(&mut self, entity_index: u32) -> bool {
        self.discard(entity_index)
    }

    fn contains(&self, entity_index: u32) -> bool {
        self.slot_of.contains_key(&entity_index)
    }

    fn len(&self) -> usize {
        self.slot_of.len()
    }

    fn clear(&mut self) {
        self.slot_of.clear();
        self.complex_fields.clear();
        self.free_slots.clear();
        for entity in &mut self.entity_at {
            *entity = DEAD;
        }
    }

    fn entity_indices(&self) -> Vec<u32> {
        self.entity_at
            .iter()
            .copied()
            .filter(|&entity| entity != DEAD)
            .collect()
    }
}
