//! Persistence boundary: registry-driven snapshots round-trip through
//! JSON and files.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use pulse_ecs::prelude::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Position(Vec2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Velocity(Vec2);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Name(String);

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry
        .register::<Position>("position")
        .register::<Velocity>("velocity")
        .register::<Name>("name");
    registry
}

#[test]
fn snapshot_enumerates_every_live_entity() {
    let mut world = World::new();
    world
        .spawn((Position(Vec2::new(1.0, 2.0)), Velocity(Vec2::new(0.1, 0.2))))
        .unwrap();
    world.spawn((Position(Vec2::ZERO),)).unwrap();
    let dead = world.spawn((Position(Vec2::ONE),)).unwrap();
    world.despawn(dead).unwrap();

    let snapshot = world.snapshot(&registry()).unwrap();
    assert_eq!(snapshot.entities.len(), 2);
}

#[test]
fn json_round_trip_preserves_component_values() {
    let mut world = World::new();
    let ids: Vec<_> = (0..25)
        .map(|i| {
            world
                .spawn((
                    Position(Vec2::new(i as f32, -(i as f32))),
                    Velocity(Vec2::new(0.5, 0.25)),
                    Name(format!("entity_{i}")),
                ))
                .unwrap()
        })
        .collect();

    let registry = registry();
    let json = world.snapshot(&registry).unwrap().to_json_pretty().unwrap();

    let mut restored_world = World::new();
    let restored_ids = WorldSnapshot::from_json(&json)
        .unwrap()
        .restore(&mut restored_world, &registry)
        .unwrap();

    assert_eq!(restored_ids.len(), ids.len());
    for (old, new) in ids.iter().zip(restored_ids.iter()) {
        assert_eq!(
            world.get::<Position>(*old).unwrap(),
            restored_world.get::<Position>(*new).unwrap()
        );
        assert_eq!(
            world.get::<Velocity>(*old).unwrap(),
            restored_world.get::<Velocity>(*new).unwrap()
        );
        assert_eq!(
            world.get::<Name>(*old).unwrap(),
            restored_world.get::<Name>(*new).unwrap()
        );
    }
}

#[test]
fn unregistered_component_fails_capture() {
    #[derive(Debug, Clone, Copy)]
    struct Opaque;

    let mut world = World::new();
    world.spawn((Position(Vec2::ZERO), Opaque)).unwrap();

    let err = world.snapshot(&registry()).unwrap_err();
    match err {
        EcsError::UnregisteredComponent(name) => assert!(name.contains("Opaque")),
        other => panic!("expected UnregisteredComponent, got {other:?}"),
    }
}

#[test]
fn unknown_name_fails_restore() {
    let json = r#"{
        "entities": [
            { "id": { "index": 1, "generation": 1 },
              "components": { "mystery": null } }
        ]
    }"#;

    let snapshot = WorldSnapshot::from_json(json).unwrap();
    let mut world = World::new();
    let err = snapshot.restore(&mut world, &registry()).unwrap_err();
    assert_eq!(err, EcsError::UnregisteredComponent("mystery".to_string()));
}

#[test]
fn snapshot_survives_a_file_round_trip() {
    let mut world = World::new();
    world
        .spawn((Position(Vec2::new(3.5, -7.25)), Name("saved".into())))
        .unwrap();

    let registry = registry();
    let snapshot = world.snapshot(&registry).unwrap();

    let path = std::env::temp_dir().join("pulse_ecs_snapshot_test.json");
    snapshot.save(&path).unwrap();
    let loaded = WorldSnapshot::load(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let mut restored = World::new();
    let ids = loaded.restore(&mut restored, &registry).unwrap();
    assert_eq!(restored.get::<Name>(ids[0]).unwrap().0, "saved");
    assert_eq!(
        restored.get::<Position>(ids[0]).unwrap(),
        &Position(Vec2::new(3.5, -7.25))
    );
}
