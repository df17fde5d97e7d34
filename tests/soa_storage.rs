use std::collections::BTreeSet;

use scene_ecs::prelude::*;

#[derive(Debug, Clone, Default, PartialEq)]
struct Point {
    x: f32,
    y: f32,
}

impl SoaComponent for Point {
    fn fields() -> &'static [FieldDescriptor] {
        &[
            FieldDescriptor {
                name: "x",
                kind: FieldKind::F32,
            },
            FieldDescriptor {
                name: "y",
                kind: FieldKind::F32,
            },
        ]
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "x" => Some(FieldValue::F32(self.x)),
            "y" => Some(FieldValue::F32(self.y)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> bool {
        match (name, value) {
            ("x", FieldValue::F32(v)) => self.x = v,
            ("y", FieldValue::F32(v)) => self.y = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Loadout {
    slots: Vec<String>,
    stats: serde_json::Value,
}

impl SoaComponent for Loadout {
    fn fields() -> &'static [FieldDescriptor] {
        &[
            FieldDescriptor {
                name: "slots",
                kind: FieldKind::SerializedArray,
            },
            FieldDescriptor {
                name: "stats",
                kind: FieldKind::SerializedMap,
            },
        ]
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "slots" => Some(FieldValue::Serialized(serde_json::json!(self.slots))),
            "stats" => Some(FieldValue::Serialized(self.stats.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> bool {
        match (name, value) {
            ("slots", FieldValue::Serialized(json)) => {
                self.slots = serde_json::from_value(json).unwrap_or_default();
            }
            ("stats", FieldValue::Serialized(json)) => self.stats = json,
            _ => return false,
        }
        true
    }
}

#[test]
fn test_soa_round_trip_thousand_entities() {
    register_soa_component::<Point>().unwrap();
    let mut scene = Scene::new();

    let mut entities = Vec::new();
    for i in 0..1000i32 {
        let entity = scene.create_entity();
        scene
            .add_component(
                entity,
                Point {
                    x: i as f32,
                    y: -i as f32,
                },
            )
            .unwrap();
        entities.push(entity);
    }

    for (i, &entity) in entities.iter().enumerate() {
        let point = scene.get_soa::<Point>(entity).unwrap();
        assert_eq!(point.x, i as f32);
        assert_eq!(point.y, -(i as f32));
    }

    let store = scene.soa_store::<Point>().unwrap();
    let xs = store.field_column("x").unwrap().as_f32().unwrap();
    assert!(xs.len() >= 1000);
    for &entity in &entities {
        let slot = store.slot(entity.index).unwrap();
        assert_eq!(xs[slot], entity.index as f32);
    }
}

#[test]
fn test_soa_compact_after_random_removals() {
    register_soa_component::<Point>().unwrap();
    let mut scene = Scene::new();

    let mut entities = Vec::new();
    for i in 0..1000i32 {
        let entity = scene.create_entity();
        scene
            .add_component(
                entity,
                Point {
                    x: i as f32,
                    y: -i as f32,
                },
            )
            .unwrap();
        entities.push(entity);
    }

    // Deterministic pseudo-random selection of 500 victims
    let mut victims = BTreeSet::new();
    let mut state = 0x2545_f491u64;
    while victims.len() < 500 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        victims.insert((state >> 33) as usize % entities.len());
    }
    for &i in &victims {
        scene.remove_component::<Point>(entities[i]).unwrap();
    }

    let store = scene.soa_store_mut::<Point>().unwrap();
    assert_eq!(store.len(), 500);
    store.compact();

    // Survivors sit in slots [0, 500) in ascending entity order
    let survivors: Vec<u32> = (0..entities.len())
        .filter(|i| !victims.contains(i))
        .map(|i| entities[i].index)
        .collect();
    let xs = store.field_column("x").unwrap().as_f32().unwrap().to_vec();
    for (slot, &index) in survivors.iter().enumerate() {
        assert_eq!(store.slot(index), Some(slot));
        assert_eq!(xs[slot], index as f32);
    }
}

#[test]
fn test_soa_vectorized_batch_update() {
    register_soa_component::<Point>().unwrap();
    let mut scene = Scene::new();

    let mut entities = Vec::new();
    for i in 0..256i32 {
        let entity = scene.create_entity();
        scene
            .add_component(
                entity,
                Point {
                    x: i as f32,
                    y: 0.0,
                },
            )
            .unwrap();
        entities.push(entity);
    }

    let store = scene.soa_store_mut::<Point>().unwrap();
    store.perform_vectorized(|columns, active| {
        let xs = columns.take_f32("x").unwrap();
        let ys = columns.take_f32("y").unwrap();
        for &slot in active {
            ys[slot] = xs[slot] * 0.5;
        }
    });

    for &entity in &entities {
        let point = scene.get_soa::<Point>(entity).unwrap();
        assert_eq!(point.y, point.x * 0.5);
    }
}

#[test]
fn test_serialized_fields_preserve_elements() {
    register_soa_component::<Loadout>().unwrap();
    let mut scene = Scene::new();

    let entity = scene.create_entity();
    let loadout = Loadout {
        slots: vec!["sword".into(), "shield".into(), "torch".into()],
        stats: serde_json::json!({"strength": 10, "agility": 7}),
    };
    scene.add_component(entity, loadout.clone()).unwrap();

    let restored = scene.get_soa::<Loadout>(entity).unwrap();
    // Array round trip preserves order, map round trip preserves entries
    assert_eq!(restored.slots, loadout.slots);
    assert_eq!(restored.stats, loadout.stats);
}

#[test]
fn test_soa_remove_returns_component_and_clears_mask() {
    register_soa_component::<Point>().unwrap();
    let mut scene = Scene::new();

    let entity = scene.create_entity();
    scene
        .add_component(entity, Point { x: 3.0, y: 4.0 })
        .unwrap();
    assert!(scene.has_component::<Point>(entity));

    let removed = scene.remove_component::<Point>(entity).unwrap();
    assert_eq!(removed, Some(Point { x: 3.0, y: 4.0 }));
    assert!(!scene.has_component::<Point>(entity));
    assert!(scene.get_soa::<Point>(entity).is_none());
}
