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

//! World: central entity and archetype storage
//!
//! Every live entity resolves to exactly one (archetype, row). Destroying
//! an entity swap-removes its row and fixes the swapped entity's location
//! in the same operation; slot reuse bumps the handle generation so stale
//! handles fail with [`EcsError::InvalidEntity`].

use ahash::AHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::any::TypeId;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeSignature};
use crate::command::CommandBuffer;
use crate::component::{Bundle, Component, MAX_BUNDLE_COMPONENTS};
use crate::entity::{EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::event_bus::{Event, EventBus};
use crate::query::{Query, QueryFetch, QueryFetchMut, QueryFilter, QueryMut};

/// Archetype id of the bootstrap archetype for component-less entities
const EMPTY_ARCHETYPE: usize = 0;

/// Central ECS world: owns all archetypes, the entity lookup table, the
/// event bus, and the deferred command buffer.
pub struct World {
    /// Entity locations keyed by generational ids
    locations: SlotMap<EntityId, EntityLocation>,

    /// All archetypes in the world
    archetypes: Vec<Archetype>,

    /// Maps sorted component signatures to archetype indices
    archetype_index: AHashMap<ArchetypeSignature, usize>,

    /// Typed pub/sub bus for the input boundary
    events: EventBus,

    /// Structural mutations queued while the world is frozen
    commands: CommandBuffer,

    /// Set by the pipeline for the duration of the update phases; direct
    /// structural changes are rejected while true
    frozen: bool,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        let mut world = Self {
            locations: SlotMap::with_key(),
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            events: EventBus::new(),
            commands: CommandBuffer::new(),
            frozen: false,
        };

        // Bootstrap the empty archetype (entities with no components).
        // Always index 0, which simplifies spawn_empty.
        world.get_or_create_archetype(&ArchetypeSignature::new(), |_| {});
        world
    }

    /// Spawn a new entity with the given bundle of components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let type_ids = B::type_ids();

        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.spawn",
            bundle_components = type_ids.len(),
            archetype_count = self.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let archetype_id =
            self.get_or_create_archetype(&type_ids, |arch| B::register_columns(arch));

        let id = self.locations.insert(EntityLocation {
            archetype_id,
            row: 0, // fixed up below once the row is known
        });

        let archetype = &mut self.archetypes[archetype_id];
        let row = archetype.push_entity(id);

        let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
        for (ptr, &type_id) in ptrs.iter_mut().zip(type_ids.iter()) {
            if let Some(column) = archetype.column_mut(type_id) {
                *ptr = column.push_uninit();
            }
        }
        debug_assert!(ptrs[..type_ids.len()].iter().all(|p| !p.is_null()));

        // SAFETY: one freshly reserved, aligned slot per bundle field.
        unsafe {
            bundle.write_components(&ptrs[..type_ids.len()]);
        }

        if let Some(location) = self.locations.get_mut(id) {
            location.row = row;
        }

        Ok(id)
    }

    /// Spawn an entity with no components.
    pub fn spawn_empty(&mut self) -> Result<EntityId> {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let id = self.locations.insert(EntityLocation {
            archetype_id: EMPTY_ARCHETYPE,
            row: 0,
        });
        let row = self.archetypes[EMPTY_ARCHETYPE].push_entity(id);
        if let Some(location) = self.locations.get_mut(id) {
            location.row = row;
        }
        Ok(id)
    }

    /// Spawn multiple entities with the same component layout in a batch.
    ///
    /// Cheaper than repeated `spawn`: the archetype is resolved once and
    /// storage is reserved up front.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
    {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let bundles = bundles.into_iter();
        let count = bundles.len();

        // Bound batches to keep a corrupt caller from OOMing the process
        if count > 10_000_000 {
            return Err(EcsError::BatchTooLarge);
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let type_ids = B::type_ids();
        let archetype_id =
            self.get_or_create_archetype(&type_ids, |arch| B::register_columns(arch));

        let archetype = &mut self.archetypes[archetype_id];
        archetype.reserve_rows(count);

        let mut ids = Vec::with_capacity(count);
        for bundle in bundles {
            let id = self.locations.insert(EntityLocation { archetype_id, row: 0 });
            let row = archetype.push_entity(id);

            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (ptr, &type_id) in ptrs.iter_mut().zip(type_ids.iter()) {
                if let Some(column) = archetype.column_mut(type_id) {
                    *ptr = column.push_uninit();
                }
            }

            // SAFETY: one freshly reserved, aligned slot per bundle field.
            unsafe {
                bundle.write_components(&ptrs[..type_ids.len()]);
            }

            if let Some(location) = self.locations.get_mut(id) {
                location.row = row;
            }
            ids.push(id);
        }

        Ok(ids)
    }

    /// Destroy an entity, freeing its row via swap-with-last.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let location = self
            .locations
            .remove(entity)
            .ok_or(EcsError::InvalidEntity)?;

        let archetype = &mut self.archetypes[location.archetype_id];
        if let Some(swapped) = archetype.swap_remove_row(location.row, |_| true) {
            if let Some(swapped_location) = self.locations.get_mut(swapped) {
                swapped_location.row = location.row;
            }
        }
        Ok(())
    }

    /// Check if an entity handle is still live.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.locations.contains_key(entity)
    }

    /// Get an immutable reference to a component on an entity.
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T> {
        let location = self.locations.get(entity).ok_or(EcsError::InvalidEntity)?;
        let archetype = &self.archetypes[location.archetype_id];
        let column = archetype
            .column(TypeId::of::<T>())
            .ok_or(EcsError::MissingComponent)?;
        column.get::<T>(location.row).ok_or(EcsError::MissingComponent)
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T> {
        let location = self.locations.get(entity).ok_or(EcsError::InvalidEntity)?;
        let archetype = &mut self.archetypes[location.archetype_id];
        let column = archetype
            .column_mut(TypeId::of::<T>())
            .ok_or(EcsError::MissingComponent)?;
        column
            .get_mut::<T>(location.row)
            .ok_or(EcsError::MissingComponent)
    }

    /// Check if entity has a specific component.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.locations
            .get(entity)
            .map(|location| self.archetypes[location.archetype_id].has_column(TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Add a component to an entity, migrating it to the matching
    /// archetype. Existing component values move with it bit-for-bit;
    /// if the entity already has `T` the value is overwritten in place.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let location = *self.locations.get(entity).ok_or(EcsError::InvalidEntity)?;
        let type_id = TypeId::of::<T>();

        let old_archetype = &mut self.archetypes[location.archetype_id];
        if let Some(column) = old_archetype.column_mut(type_id) {
            if let Some(slot) = column.get_mut::<T>(location.row) {
                *slot = component;
                return Ok(());
            }
        }

        // New signature = old + T, canonically sorted
        let mut new_signature = old_archetype.signature().clone();
        new_signature.push(type_id);
        new_signature.sort();

        // Capture empty column layouts before self.archetypes can move
        let old_archetype = &self.archetypes[location.archetype_id];
        let mut columns = Vec::with_capacity(new_signature.len());
        for &tid in old_archetype.signature() {
            if let Some(column) = old_archetype.column(tid) {
                columns.push(column.clone_empty());
            }
        }

        let new_archetype_id = self.get_or_create_archetype(&new_signature, |arch| {
            for column in columns {
                arch.add_column(column);
            }
            arch.register_column::<T>();
        });

        self.move_entity(entity, location, new_archetype_id, |archetype, _row| {
            if let Some(column) = archetype.column_mut(type_id) {
                let ptr = column.push_uninit();
                // SAFETY: freshly reserved, aligned slot for T.
                unsafe {
                    std::ptr::write(ptr as *mut T, component);
                }
            }
        })
    }

    /// Remove a component from an entity, returning its value and
    /// migrating the entity to the smaller archetype.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<T> {
        if self.frozen {
            return Err(EcsError::ConcurrentStructuralChange);
        }

        let location = *self.locations.get(entity).ok_or(EcsError::InvalidEntity)?;
        let type_id = TypeId::of::<T>();

        let old_archetype = &self.archetypes[location.archetype_id];
        if !old_archetype.has_column(type_id) {
            return Err(EcsError::MissingComponent);
        }

        let mut new_signature = old_archetype.signature().clone();
        new_signature.retain(|tid| *tid != type_id);

        let mut columns = Vec::with_capacity(new_signature.len());
        for &tid in &new_signature {
            if let Some(column) = old_archetype.column(tid) {
                columns.push(column.clone_empty());
            }
        }

        // Read the removed value out before the row's bytes are recycled;
        // move_entity then forgets (never drops) the source row.
        let value = {
            let archetype = &self.archetypes[location.archetype_id];
            let column = archetype
                .column(type_id)
                .ok_or(EcsError::MissingComponent)?;
            if location.row >= column.len() {
                return Err(EcsError::MissingComponent);
            }
            // SAFETY: row bounds checked; the source slot is forgotten by
            // the migration below, so ownership moves exactly once.
            unsafe { std::ptr::read(column.row_ptr(location.row) as *const T) }
        };

        let new_archetype_id = self.get_or_create_archetype(&new_signature, |arch| {
            for column in columns {
                arch.add_column(column);
            }
        });

        self.move_entity(entity, location, new_archetype_id, |_, _| {})?;
        Ok(value)
    }

    /// Move an entity's surviving component data to another archetype.
    ///
    /// Copies every column present in the destination signature, lets
    /// `write_new` initialize columns that have no source (add_component),
    /// then swap-removes the source row *without dropping* — every source
    /// value has either been copied out or read out by the caller.
    fn move_entity<F>(
        &mut self,
        entity: EntityId,
        old_location: EntityLocation,
        new_archetype_id: usize,
        write_new: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Archetype, usize),
    {
        if old_location.archetype_id == new_archetype_id {
            return Ok(());
        }

        // Split borrows so both archetypes are reachable at once
        let (old_archetype, new_archetype) = if old_location.archetype_id < new_archetype_id {
            let (left, right) = self.archetypes.split_at_mut(new_archetype_id);
            (&mut left[old_location.archetype_id], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(old_location.archetype_id);
            (&mut right[0], &mut left[new_archetype_id])
        };

        let new_row = new_archetype.push_entity(entity);
        let new_signature: SmallVec<[TypeId; 8]> =
            SmallVec::from_slice(new_archetype.signature());

        for &type_id in &new_signature {
            if let Some(old_column) = old_archetype.column(type_id) {
                let item_size = old_column.item_size();
                let src = old_column.row_ptr(old_location.row);
                if let Some(new_column) = new_archetype.column_mut(type_id) {
                    let dst = new_column.push_uninit();
                    // SAFETY: src/dst are distinct allocations of the same
                    // component layout; src row stays untouched until the
                    // swap-remove below forgets it.
                    unsafe {
                        std::ptr::copy_nonoverlapping(src, dst, item_size);
                    }
                }
            }
        }

        write_new(new_archetype, new_row);

        if let Some(swapped) = old_archetype.swap_remove_row(old_location.row, |_| false) {
            if let Some(swapped_location) = self.locations.get_mut(swapped) {
                swapped_location.row = old_location.row;
            }
        }

        if let Some(location) = self.locations.get_mut(entity) {
            location.archetype_id = new_archetype_id;
            location.row = new_row;
        }

        Ok(())
    }

    /// Get entity location (diagnostics)
    pub fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.locations.get(entity).copied()
    }

    /// Iterate all live entity ids
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.locations.keys()
    }

    /// Get archetype by id
    pub fn archetype(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Get archetype mutably
    pub fn archetype_mut(&mut self, id: usize) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    /// All archetypes
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Number of archetypes
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities
    pub fn entity_count(&self) -> u32 {
        self.locations.len() as u32
    }

    /// Create an immutable query over the world
    pub fn query<'w, Q>(&'w self) -> Query<'w, Q>
    where
        Q: QueryFilter + QueryFetch<'w>,
    {
        Query::new(self)
    }

    /// Create a mutable query over the world
    pub fn query_mut<'w, Q>(&'w mut self) -> QueryMut<'w, Q>
    where
        Q: QueryFilter + QueryFetchMut<'w>,
    {
        QueryMut::new(self)
    }

    // ========== Frame freeze & deferred commands ==========

    /// Whether direct structural changes are currently rejected
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Deferred command buffer; structural work queued here while the
    /// world is frozen is applied at the end-of-frame barrier
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// Apply every queued command against this world
    pub fn apply_commands(&mut self) -> Result<()> {
        let mut buffer = std::mem::take(&mut self.commands);
        let result = buffer.apply(self);
        // Keep any commands queued *during* application for the next barrier
        debug_assert!(buffer.is_empty());
        result
    }

    // ========== Event bus (input boundary) ==========

    /// Immutable access to the event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable access to the event bus
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Subscribe a handler for an event type (convenience)
    pub fn subscribe<E, F>(&mut self, handler: F)
    where
        E: Event,
        F: FnMut(&E) -> crate::error::Result<()> + Send + 'static,
    {
        self.events.subscribe::<E, F>(handler);
    }

    /// Publish an event to all subscribers, synchronously (convenience)
    pub fn publish<E: Event>(&mut self, event: &E) -> Result<()> {
        self.events.publish(event)
    }

    /// Get or create the archetype for a component signature.
    ///
    /// The signature is sorted so (A, B) and (B, A) land in the same
    /// archetype; `on_create` initializes the columns of a new archetype.
    fn get_or_create_archetype<F>(&mut self, signature: &[TypeId], on_create: F) -> usize
    where
        F: FnOnce(&mut Archetype),
    {
        let mut sorted: ArchetypeSignature = SmallVec::from_slice(signature);
        sorted.sort();

        if let Some(&id) = self.archetype_index.get(&sorted) {
            return id;
        }

        let mut archetype = Archetype::new(sorted.clone());
        on_create(&mut archetype);

        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(sorted, id);
        id
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[test]
    fn test_spawn_despawn() {
        let mut world = World::new();

        let entity = world.spawn((Position { x: 1.0, y: 2.0 },)).unwrap();
        assert!(world.contains(entity));
        assert_eq!(world.entity_count(), 1);

        world.despawn(entity).unwrap();
        assert!(!world.contains(entity));
        assert_eq!(world.despawn(entity), Err(EcsError::InvalidEntity));
    }

    #[test]
    fn test_get_errors() {
        let mut world = World::new();
        let entity = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();

        assert!(world.get::<Position>(entity).is_ok());
        assert_eq!(
            world.get::<Velocity>(entity),
            Err(EcsError::MissingComponent)
        );

        world.despawn(entity).unwrap();
        assert_eq!(world.get::<Position>(entity), Err(EcsError::InvalidEntity));
    }

    #[test]
    fn test_archetype_segregation() {
        let mut world = World::new();

        struct A;
        struct B;
        struct C;

        world.spawn((A, B)).unwrap();
        world.spawn((A, C)).unwrap();
        world.spawn((B, C)).unwrap();

        // empty archetype + three distinct signatures
        assert_eq!(world.archetype_count(), 4);
    }

    #[test]
    fn test_signature_order_is_canonical() {
        let mut world = World::new();

        #[derive(Clone, Copy)]
        struct A(#[allow(dead_code)] u8);
        #[derive(Clone, Copy)]
        struct B(#[allow(dead_code)] u8);

        world.spawn((A(1), B(2))).unwrap();
        world.spawn((B(4), A(3))).unwrap();

        // (A, B) and (B, A) share an archetype
        assert_eq!(world.archetype_count(), 2);
    }

    #[test]
    fn test_swap_remove_fixes_locations() {
        let mut world = World::new();

        let a = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
        let b = world.spawn((Position { x: 1.0, y: 0.0 },)).unwrap();
        let c = world.spawn((Position { x: 2.0, y: 0.0 },)).unwrap();

        // Removing the first row swaps the last entity into it
        world.despawn(a).unwrap();

        assert_eq!(world.get::<Position>(b).unwrap().x, 1.0);
        assert_eq!(world.get::<Position>(c).unwrap().x, 2.0);
        assert_eq!(world.location(c).unwrap().row, 0);
    }

    #[test]
    fn test_add_component_migrates() {
        let mut world = World::new();

        let entity = world.spawn((Position { x: 3.0, y: 4.0 },)).unwrap();
        world
            .add_component(entity, Velocity { x: 1.0, y: 0.0 })
            .unwrap();

        assert_eq!(
            world.get::<Position>(entity).unwrap(),
            &Position { x: 3.0, y: 4.0 }
        );
        assert_eq!(
            world.get::<Velocity>(entity).unwrap(),
            &Velocity { x: 1.0, y: 0.0 }
        );
    }

    #[test]
    fn test_add_existing_component_overwrites() {
        let mut world = World::new();
        let entity = world.spawn((Position { x: 1.0, y: 1.0 },)).unwrap();
        let archetypes_before = world.archetype_count();

        world
            .add_component(entity, Position { x: 9.0, y: 9.0 })
            .unwrap();

        assert_eq!(world.get::<Position>(entity).unwrap().x, 9.0);
        assert_eq!(world.archetype_count(), archetypes_before);
    }

    #[test]
    fn test_remove_component_returns_value() {
        let mut world = World::new();
        let entity = world
            .spawn((Position { x: 5.0, y: 6.0 }, Velocity { x: 7.0, y: 8.0 }))
            .unwrap();

        let velocity = world.remove_component::<Velocity>(entity).unwrap();
        assert_eq!(velocity, Velocity { x: 7.0, y: 8.0 });
        assert_eq!(
            world.get::<Velocity>(entity),
            Err(EcsError::MissingComponent)
        );
        assert_eq!(world.get::<Position>(entity).unwrap().x, 5.0);

        assert_eq!(
            world.remove_component::<Velocity>(entity),
            Err(EcsError::MissingComponent)
        );
    }

    #[test]
    fn test_frozen_world_rejects_structural_changes() {
        let mut world = World::new();
        let entity = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();

        world.set_frozen(true);
        assert_eq!(
            world.spawn((Position { x: 1.0, y: 1.0 },)).unwrap_err(),
            EcsError::ConcurrentStructuralChange
        );
        assert_eq!(
            world.despawn(entity).unwrap_err(),
            EcsError::ConcurrentStructuralChange
        );
        assert_eq!(
            world
                .add_component(entity, Velocity { x: 0.0, y: 0.0 })
                .unwrap_err(),
            EcsError::ConcurrentStructuralChange
        );

        // Non-structural access stays allowed
        assert!(world.get_mut::<Position>(entity).is_ok());

        world.set_frozen(false);
        assert!(world.spawn((Position { x: 1.0, y: 1.0 },)).is_ok());
    }

    #[test]
    fn test_spawn_batch() {
        let mut world = World::new();
        let ids = world
            .spawn_batch((0..100).map(|i| (Position {
                x: i as f32,
                y: 0.0,
            },)))
            .unwrap();

        assert_eq!(ids.len(), 100);
        assert_eq!(world.entity_count(), 100);
        assert_eq!(world.entities().count(), 100);
        assert_eq!(world.get::<Position>(ids[42]).unwrap().x, 42.0);
        assert!(world.has::<Position>(ids[0]));
        assert!(!world.has::<Velocity>(ids[0]));
    }

    #[test]
    fn test_spawn_empty_entity() {
        let mut world = World::new();
        let entity = world.spawn_empty().unwrap();
        assert!(world.contains(entity));
        assert_eq!(world.get::<Position>(entity), Err(EcsError::MissingComponent));
    }
}
