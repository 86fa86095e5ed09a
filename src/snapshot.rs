//! Persistence boundary: world snapshots through an explicit registry
//!
//! The core does not define an on-disk schema; it exposes enumerable
//! access to every live entity and component value. A
//! [`ComponentRegistry`] maps a caller-chosen *stable* name to a
//! component type's serialize/insert capabilities, replacing reflective
//! runtime type lookup with an explicit capability table.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::path::Path;

use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::archetype::Archetype;
use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

type ExtractFn = Box<dyn Fn(&Archetype, usize) -> Result<serde_json::Value> + Send + Sync>;
type InsertFn = Box<dyn Fn(&mut World, EntityId, &serde_json::Value) -> Result<()> + Send + Sync>;

struct RegistryEntry {
    name: String,
    extract: ExtractFn,
    insert: InsertFn,
}

/// Capability table mapping stable component names to (de)serializers
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Vec<RegistryEntry>,
    by_type: AHashMap<TypeId, usize>,
    by_name: AHashMap<String, usize>,
}

impl ComponentRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under a stable name.
    ///
    /// The name, not the Rust type path, is what snapshots carry; renaming
    /// a type does not invalidate old snapshots as long as the registered
    /// name stays fixed.
    pub fn register<T>(&mut self, name: &str) -> &mut Self
    where
        T: Component + Serialize + DeserializeOwned,
    {
        let extract: ExtractFn = Box::new(|archetype, row| {
            let column = archetype
                .column(TypeId::of::<T>())
                .ok_or(EcsError::MissingComponent)?;
            let value = column.get::<T>(row).ok_or(EcsError::MissingComponent)?;
            serde_json::to_value(value).map_err(|e| EcsError::SerializationError(e.to_string()))
        });
        let insert: InsertFn = Box::new(|world, entity, value| {
            let component: T = serde_json::from_value(value.clone())
                .map_err(|e| EcsError::DeserializationError(e.to_string()))?;
            world.add_component(entity, component)
        });

        let index = self.entries.len();
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            extract,
            insert,
        });
        self.by_type.insert(TypeId::of::<T>(), index);
        self.by_name.insert(name.to_string(), index);
        self
    }

    /// Number of registered component types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn by_type(&self, type_id: TypeId) -> Option<&RegistryEntry> {
        self.by_type.get(&type_id).map(|&i| &self.entries[i])
    }

    fn by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }
}

/// Entity handle as recorded in a snapshot (diagnostics; restore mints
/// fresh handles)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandleRecord {
    pub index: u32,
    pub generation: u32,
}

/// One entity's components, keyed by registered name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: HandleRecord,
    pub components: BTreeMap<String, serde_json::Value>,
}

/// Full snapshot of world state: every live entity with every component
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldSnapshot {
    pub entities: Vec<EntityRecord>,
}

impl WorldSnapshot {
    /// Capture all live entities and component values.
    ///
    /// Fails with [`EcsError::UnregisteredComponent`] when any live
    /// component type has no registry entry.
    pub fn capture(world: &World, registry: &ComponentRegistry) -> Result<Self> {
        let mut entities = Vec::with_capacity(world.entity_count() as usize);

        for archetype in world.archetypes() {
            for row in 0..archetype.len() {
                let entity = archetype.entities()[row];
                let mut components = BTreeMap::new();

                for &type_id in archetype.signature().iter() {
                    let entry = registry.by_type(type_id).ok_or_else(|| {
                        let name = archetype
                            .column(type_id)
                            .map(|column| column.type_name())
                            .unwrap_or("<unknown>");
                        EcsError::UnregisteredComponent(name.to_string())
                    })?;
                    components.insert(entry.name.clone(), (entry.extract)(archetype, row)?);
                }

                entities.push(EntityRecord {
                    id: HandleRecord {
                        index: entity.index(),
                        generation: entity.generation(),
                    },
                    components,
                });
            }
        }

        Ok(Self { entities })
    }

    /// Rebuild every recorded entity inside `world` with fresh handles.
    ///
    /// Returns the new handles in snapshot order.
    pub fn restore(&self, world: &mut World, registry: &ComponentRegistry) -> Result<Vec<EntityId>> {
        let mut ids = Vec::with_capacity(self.entities.len());

        for record in &self.entities {
            let entity = world.spawn_empty()?;
            for (name, value) in &record.components {
                let entry = registry
                    .by_name(name)
                    .ok_or_else(|| EcsError::UnregisteredComponent(name.clone()))?;
                (entry.insert)(world, entity, value)?;
            }
            ids.push(entity);
        }

        Ok(ids)
    }

    /// Serialize snapshot to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| EcsError::SerializationError(e.to_string()))
    }

    /// Serialize snapshot to JSON with pretty printing
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EcsError::SerializationError(e.to_string()))
    }

    /// Deserialize snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EcsError::DeserializationError(e.to_string()))
    }

    /// Save snapshot to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .map_err(|e| EcsError::IoError(format!("failed to write snapshot: {e}")))
    }

    /// Load snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| EcsError::IoError(format!("failed to read snapshot: {e}")))?;
        Self::from_json(&data)
    }
}

impl World {
    /// Snapshot all live entities and component values through a registry
    pub fn snapshot(&self, registry: &ComponentRegistry) -> Result<WorldSnapshot> {
        WorldSnapshot::capture(self, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Label {
        name: String,
    }

    fn demo_registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry
            .register::<Position>("position")
            .register::<Label>("label");
        registry
    }

    #[test]
    fn test_capture_records_all_components() {
        let mut world = World::new();
        world
            .spawn((
                Position { x: 1.0, y: 2.0 },
                Label {
                    name: "alpha".into(),
                },
            ))
            .unwrap();
        world.spawn((Position { x: 3.0, y: 4.0 },)).unwrap();

        let snapshot = world.snapshot(&demo_registry()).unwrap();
        assert_eq!(snapshot.entities.len(), 2);

        let with_label = snapshot
            .entities
            .iter()
            .find(|record| record.components.contains_key("label"))
            .unwrap();
        assert_eq!(with_label.components.len(), 2);
    }

    #[test]
    fn test_unregistered_component_is_an_error() {
        let mut world = World::new();
        world.spawn((Position { x: 0.0, y: 0.0 }, 42u64)).unwrap();

        let err = world.snapshot(&demo_registry()).unwrap_err();
        assert!(matches!(err, EcsError::UnregisteredComponent(_)));
    }

    #[test]
    fn test_json_round_trip_restores_values() {
        let mut world = World::new();
        world
            .spawn((
                Position { x: 5.0, y: 6.0 },
                Label { name: "beta".into() },
            ))
            .unwrap();

        let registry = demo_registry();
        let json = world.snapshot(&registry).unwrap().to_json().unwrap();

        let mut restored = World::new();
        let parsed = WorldSnapshot::from_json(&json).unwrap();
        let ids = parsed.restore(&mut restored, &registry).unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(
            restored.get::<Position>(ids[0]).unwrap(),
            &Position { x: 5.0, y: 6.0 }
        );
        assert_eq!(restored.get::<Label>(ids[0]).unwrap().name, "beta");
    }
}
