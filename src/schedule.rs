//! System scheduler: ordered registration, enable/disable, stable
//! (update_order, registration) execution order.
//!
//! The scheduler only owns the entries; the per-tick loop lives in
//! `Scene::update`, which takes the entries out, runs them against
//! itself, and hands them back so mid-tick registrations merge cleanly.

use crate::query::CachedMatch;
use crate::system::{BoxedSystem, SystemId};

pub(crate) struct SystemEntry {
    pub system: BoxedSystem,
    pub id: SystemId,
    pub enabled: bool,
    pub order: i32,
    pub seq: u64,
    pub cache: CachedMatch,
}

/// Ordered system registry for one scene.
pub struct Scheduler {
    entries: Vec<SystemEntry>,
    next_id: u32,
    /// Registration sequence; breaks update_order ties first-come-first.
    next_seq: u64,
    sorted: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            next_seq: 0,
            sorted: true,
        }
    }

    /// Register a system. Update order and matcher are read once here.
    pub fn add(&mut self, system: BoxedSystem) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        let order = system.update_order();
        let cache = CachedMatch::new(system.matcher());
        self.entries.push(SystemEntry {
            system,
            id,
            enabled: true,
            order,
            seq,
            cache,
        });
        self.sorted = false;
        id
    }

    /// Deregister and return the system.
    pub fn remove(&mut self, id: SystemId) -> Option<BoxedSystem> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(position).system)
    }

    /// Enable or disable a system. Returns false for unknown ids.
    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, id: SystemId) -> bool {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.enabled)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            // Stable within an order: seq is registration order
            self.entries.sort_by_key(|entry| (entry.order, entry.seq));
            self.sorted = true;
        }
    }

    /// Take the entries out for one tick, in execution order.
    pub(crate) fn take_entries(&mut self) -> Vec<SystemEntry> {
        self.ensure_sorted();
        std::mem::take(&mut self.entries)
    }

    /// Return entries after a tick, merging any registered mid-tick.
    pub(crate) fn restore_entries(&mut self, mut entries: Vec<SystemEntry>) {
        let added_mid_tick = std::mem::take(&mut self.entries);
        entries.extend(added_mid_tick);
        self.entries = entries;
        if !self.entries.is_empty() {
            self.sorted = false;
        }
    }

    /// Drain every entry (scene teardown).
    pub(crate) fn drain(&mut self) -> Vec<SystemEntry> {
        std::mem::take(&mut self.entries)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::error::Result;
    use crate::query::Matcher;
    use crate::scene::Scene;
    use crate::system::System;

    struct NamedSystem {
        name: &'static str,
        order: i32,
    }

    impl System for NamedSystem {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matcher(&self) -> Matcher {
            Matcher::empty()
        }

        fn update_order(&self) -> i32 {
            self.order
        }

        fn process(&mut self, _: &[Entity], _: &mut Scene, _: f32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_execution_order_stable() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Box::new(NamedSystem {
            name: "late",
            order: 100,
        }));
        scheduler.add(Box::new(NamedSystem {
            name: "early",
            order: -100,
        }));
        scheduler.add(Box::new(NamedSystem {
            name: "tie-a",
            order: 0,
        }));
        scheduler.add(Box::new(NamedSystem {
            name: "tie-b",
            order: 0,
        }));

        let entries = scheduler.take_entries();
        let names: Vec<&str> = entries.iter().map(|e| e.system.name()).collect();
        assert_eq!(names, vec!["early", "tie-a", "tie-b", "late"]);
        scheduler.restore_entries(entries);
        assert_eq!(scheduler.len(), 4);
    }

    #[test]
    fn test_enable_disable_and_remove() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.add(Box::new(NamedSystem {
            name: "solo",
            order: 0,
        }));

        assert!(scheduler.is_enabled(id));
        assert!(scheduler.set_enabled(id, false));
        assert!(!scheduler.is_enabled(id));

        let system = scheduler.remove(id).unwrap();
        assert_eq!(system.name(), "solo");
        assert!(scheduler.remove(id).is_none());
        assert!(!scheduler.set_enabled(id, true));
    }

    #[test]
    fn test_restore_merges_mid_tick_additions() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Box::new(NamedSystem {
            name: "a",
            order: 0,
        }));

        let taken = scheduler.take_entries();
        // Registered while the tick is running
        scheduler.add(Box::new(NamedSystem {
            name: "b",
            order: -1,
        }));
        scheduler.restore_entries(taken);

        let names: Vec<&str> = scheduler
            .take_entries()
            .iter()
            .map(|e| e.system.name())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
