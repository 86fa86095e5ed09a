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

//! Query engine with archetype filtering
//!
//! Type-safe component queries with superset archetype matching. A query
//! state snapshots the archetypes that exist when it is built; iteration
//! is restartable and finite.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;

use smallvec::{smallvec, SmallVec};

use crate::archetype::{Archetype, Chunk, ComponentColumn, CHUNK_ROWS};
use crate::component::Component;
use crate::entity::EntityId;
use crate::world::World;

const MAX_FILTER_COMPONENTS: usize = 8;

/// Query filter trait for type-level archetype matching
pub trait QueryFilter {
    /// Check if archetype matches this query (superset of required types)
    fn matches_archetype(archetype: &Archetype) -> bool;

    /// Get required component type IDs
    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]>;
}

/// Trait for fetching component data (immutable)
///
/// # Safety
/// Implementations must ensure that `fetch` is safe to call with the state
/// returned by `prepare` for any row below the archetype's length.
pub unsafe trait QueryFetch<'w>: QueryFilter {
    /// The type of data returned by the query
    type Item;
    /// State used to fetch data (e.g. column references)
    type State;

    /// Prepare to fetch from an archetype
    fn prepare(archetype: &'w Archetype) -> Option<Self::State>;

    /// Fetch data for a specific row
    ///
    /// # Safety
    /// `row` must be valid for the archetype used in `prepare`.
    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item>;
}

/// Trait for fetching component data (mutable)
///
/// # Safety
/// As [`QueryFetch`], and `fetch` must not be called twice for the same row
/// (aliasing).
pub unsafe trait QueryFetchMut<'w>: QueryFilter {
    /// The type of data returned by the query
    type Item;
    /// State used to fetch data (e.g. column pointers)
    type State;

    /// Prepare to fetch from an archetype
    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State>;

    /// Fetch data for a specific row
    ///
    /// # Safety
    /// - `row` must be valid for the archetype used in `prepare`
    /// - Must not be called multiple times for the same row (aliasing)
    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item>;
}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w T {
    type Item = &'w T;
    type State = &'w ComponentColumn;

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        archetype.column(TypeId::of::<T>())
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        state.get::<T>(row)
    }
}

unsafe impl<'w, T: Component> QueryFetchMut<'w> for &'w mut T {
    type Item = &'w mut T;
    type State = *mut ComponentColumn;

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        let column = archetype.column_mut(TypeId::of::<T>())?;
        Some(column as *mut ComponentColumn)
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        // SAFETY: the column pointer is valid for 'w; the caller promises
        // each row is fetched at most once.
        let column = unsafe { &mut **state };
        column.get_mut::<T>(row)
    }
}

/// QueryFetchMut for immutable reference - allows mixed mutability tuples
/// such as `world.query_mut::<(&mut Position, &Velocity)>()`
unsafe impl<'w, T: Component> QueryFetchMut<'w> for &'w T {
    type Item = &'w T;
    type State = *const ComponentColumn;

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        archetype
            .column(TypeId::of::<T>())
            .map(|col| col as *const ComponentColumn)
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        // SAFETY: the pointer is valid for the lifetime 'w.
        let column = unsafe { &**state };
        column.get::<T>(row)
    }
}

/// Marker type for fetching the entity id in queries
///
/// ```ignore
/// for (entity, pos) in world.query::<(Entity, &Position)>().iter() { ... }
/// ```
pub struct Entity;

impl QueryFilter for Entity {
    fn matches_archetype(_archetype: &Archetype) -> bool {
        true
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![]
    }
}

unsafe impl<'w> QueryFetch<'w> for Entity {
    type Item = EntityId;
    type State = &'w [EntityId];

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        Some(archetype.entities())
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        state.get(row).copied()
    }
}

unsafe impl<'w> QueryFetchMut<'w> for Entity {
    type Item = EntityId;
    type State = *const [EntityId];

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        Some(archetype.entities() as *const [EntityId])
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        // SAFETY: the pointer is valid for the lifetime 'w.
        let slice = unsafe { &**state };
        slice.get(row).copied()
    }
}

/// Filter for entities with component T (presence only, no data access)
pub struct With<T>(PhantomData<T>);

impl<T: 'static> QueryFilter for With<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.signature().contains(&TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }
}

unsafe impl<'w, T: 'static> QueryFetch<'w> for With<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w Archetype) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

/// Filter for entities without component T
pub struct Without<T>(PhantomData<T>);

impl<T: 'static> QueryFilter for Without<T> {
    fn matches_archetype(archetype: &Archetype) -> bool {
        !archetype.signature().contains(&TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![] // Without never requires storage access
    }
}

unsafe impl<'w, T: 'static> QueryFetch<'w> for Without<T> {
    type Item = ();
    type State = ();

    fn prepare(_archetype: &'w Archetype) -> Option<Self::State> {
        Some(())
    }

    unsafe fn fetch(_state: &Self::State, _row: usize) -> Option<Self::Item> {
        Some(())
    }
}

impl<T: 'static> QueryFilter for &T {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.signature().contains(&TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }
}

impl<T: 'static> QueryFilter for &mut T {
    fn matches_archetype(archetype: &Archetype) -> bool {
        archetype.signature().contains(&TypeId::of::<T>())
    }

    fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
        smallvec![TypeId::of::<T>()]
    }
}

// Tuple QueryFilter implementations
macro_rules! impl_query_filter {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T: QueryFilter),*> QueryFilter for ($($T,)*) {
            fn matches_archetype(archetype: &Archetype) -> bool {
                $($T::matches_archetype(archetype))&&*
            }

            fn type_ids() -> SmallVec<[TypeId; MAX_FILTER_COMPONENTS]> {
                let mut ids = SmallVec::new();
                $(ids.extend($T::type_ids());)*
                ids
            }
        }
    };
}

impl_query_filter!(A, B);
impl_query_filter!(A, B, C);
impl_query_filter!(A, B, C, D);

unsafe impl<'w, A: QueryFetch<'w>, B: QueryFetch<'w>> QueryFetch<'w> for (A, B) {
    type Item = (A::Item, B::Item);
    type State = (A::State, B::State);

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        Some((A::prepare(archetype)?, B::prepare(archetype)?))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        Some((A::fetch(&state.0, row)?, B::fetch(&state.1, row)?))
    }
}

unsafe impl<'w, A: QueryFetch<'w>, B: QueryFetch<'w>, C: QueryFetch<'w>> QueryFetch<'w>
    for (A, B, C)
{
    type Item = (A::Item, B::Item, C::Item);
    type State = (A::State, B::State, C::State);

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        Some((
            A::prepare(archetype)?,
            B::prepare(archetype)?,
            C::prepare(archetype)?,
        ))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        Some((
            A::fetch(&state.0, row)?,
            B::fetch(&state.1, row)?,
            C::fetch(&state.2, row)?,
        ))
    }
}

unsafe impl<'w, A: QueryFetch<'w>, B: QueryFetch<'w>, C: QueryFetch<'w>, D: QueryFetch<'w>>
    QueryFetch<'w> for (A, B, C, D)
{
    type Item = (A::Item, B::Item, C::Item, D::Item);
    type State = (A::State, B::State, C::State, D::State);

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        Some((
            A::prepare(archetype)?,
            B::prepare(archetype)?,
            C::prepare(archetype)?,
            D::prepare(archetype)?,
        ))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Option<Self::Item> {
        Some((
            A::fetch(&state.0, row)?,
            B::fetch(&state.1, row)?,
            C::fetch(&state.2, row)?,
            D::fetch(&state.3, row)?,
        ))
    }
}

unsafe impl<'w, A: QueryFetchMut<'w>, B: QueryFetchMut<'w>> QueryFetchMut<'w> for (A, B) {
    type Item = (A::Item, B::Item);
    type State = (A::State, B::State);

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        // SAFETY: each element prepares a distinct column; the pointer
        // reborrow hands each prepare the same archetype without holding
        // overlapping unique borrows.
        let ptr = archetype as *mut Archetype;
        let state_a = A::prepare(unsafe { &mut *ptr })?;
        let state_b = B::prepare(unsafe { &mut *ptr })?;
        Some((state_a, state_b))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        Some((A::fetch(&mut state.0, row)?, B::fetch(&mut state.1, row)?))
    }
}

unsafe impl<'w, A: QueryFetchMut<'w>, B: QueryFetchMut<'w>, C: QueryFetchMut<'w>> QueryFetchMut<'w>
    for (A, B, C)
{
    type Item = (A::Item, B::Item, C::Item);
    type State = (A::State, B::State, C::State);

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        let ptr = archetype as *mut Archetype;
        let state_a = A::prepare(unsafe { &mut *ptr })?;
        let state_b = B::prepare(unsafe { &mut *ptr })?;
        let state_c = C::prepare(unsafe { &mut *ptr })?;
        Some((state_a, state_b, state_c))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        Some((
            A::fetch(&mut state.0, row)?,
            B::fetch(&mut state.1, row)?,
            C::fetch(&mut state.2, row)?,
        ))
    }
}

unsafe impl<
        'w,
        A: QueryFetchMut<'w>,
        B: QueryFetchMut<'w>,
        C: QueryFetchMut<'w>,
        D: QueryFetchMut<'w>,
    > QueryFetchMut<'w> for (A, B, C, D)
{
    type Item = (A::Item, B::Item, C::Item, D::Item);
    type State = (A::State, B::State, C::State, D::State);

    fn prepare(archetype: &'w mut Archetype) -> Option<Self::State> {
        let ptr = archetype as *mut Archetype;
        let state_a = A::prepare(unsafe { &mut *ptr })?;
        let state_b = B::prepare(unsafe { &mut *ptr })?;
        let state_c = C::prepare(unsafe { &mut *ptr })?;
        let state_d = D::prepare(unsafe { &mut *ptr })?;
        Some((state_a, state_b, state_c, state_d))
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Option<Self::Item> {
        Some((
            A::fetch(&mut state.0, row)?,
            B::fetch(&mut state.1, row)?,
            C::fetch(&mut state.2, row)?,
            D::fetch(&mut state.3, row)?,
        ))
    }
}

/// Cached query state
///
/// Snapshots which archetypes match the filter at build time. Build once
/// (e.g. in a stage's `initialize`) and reuse every frame; call
/// [`QueryState::refresh`] when new component combinations may have been
/// introduced since.
pub struct QueryState<F> {
    matched: Vec<usize>,
    seen_archetypes: usize,
    _phantom: PhantomData<F>,
}

impl<F: QueryFilter> QueryState<F> {
    /// Create query state by scanning the archetypes existing right now
    pub fn new(world: &World) -> Self {
        let matched = world
            .archetypes()
            .iter()
            .enumerate()
            .filter_map(|(id, arch)| F::matches_archetype(arch).then_some(id))
            .collect();

        Self {
            matched,
            seen_archetypes: world.archetype_count(),
            _phantom: PhantomData,
        }
    }

    /// Incrementally pick up archetypes created since the last scan
    pub fn refresh(&mut self, world: &World) {
        let current = world.archetype_count();
        if current > self.seen_archetypes {
            for (id, arch) in world
                .archetypes()
                .iter()
                .enumerate()
                .skip(self.seen_archetypes)
            {
                if F::matches_archetype(arch) {
                    self.matched.push(id);
                }
            }
            self.seen_archetypes = current;
        }
    }

    /// Number of matched archetypes
    pub fn matched_archetype_count(&self) -> usize {
        self.matched.len()
    }

    /// Indices of the matched archetypes
    pub fn matched_archetypes(&self) -> &[usize] {
        &self.matched
    }

    /// Iterate query results
    pub fn iter<'w>(&self, world: &'w World) -> QueryIter<'w, F>
    where
        F: QueryFetch<'w>,
    {
        QueryIter::new(world, &self.matched)
    }

    /// Iterate query results mutably
    pub fn iter_mut<'w>(&self, world: &'w mut World) -> QueryIterMut<'w, F>
    where
        F: QueryFetchMut<'w>,
    {
        QueryIterMut::new(world, &self.matched)
    }

    /// Iterate matched rows as read-only chunk views
    pub fn chunks<'w>(&self, world: &'w World) -> ChunkIter<'w> {
        ChunkIter::new(world, self.matched.clone())
    }
}

/// Immutable query iterator
pub struct QueryIter<'w, Q>
where
    Q: QueryFetch<'w>,
{
    archetypes: Vec<&'w Archetype>,
    archetype_index: usize,
    row: usize,
    state: Option<Q::State>,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> QueryIter<'w, Q>
where
    Q: QueryFetch<'w>,
{
    fn new(world: &'w World, matched: &[usize]) -> Self {
        let archetypes = matched
            .iter()
            .filter_map(|&id| world.archetype(id))
            .collect();
        Self {
            archetypes,
            archetype_index: 0,
            row: 0,
            state: None,
            _phantom: PhantomData,
        }
    }
}

impl<'w, Q> Iterator for QueryIter<'w, Q>
where
    Q: QueryFetch<'w>,
{
    type Item = <Q as QueryFetch<'w>>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.is_none() {
                let archetype = *self.archetypes.get(self.archetype_index)?;
                self.state = Q::prepare(archetype);
                self.row = 0;

                if self.state.is_none() {
                    self.archetype_index += 1;
                    continue;
                }
            }

            let archetype = self.archetypes[self.archetype_index];
            if self.row < archetype.len() {
                let row = self.row;
                self.row += 1;
                // SAFETY: row bounds checked against the prepared archetype.
                match unsafe { Q::fetch(self.state.as_ref()?, row) } {
                    Some(item) => return Some(item),
                    None => continue,
                }
            } else {
                self.state = None;
                self.archetype_index += 1;
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl<'w, Q> ExactSizeIterator for QueryIter<'w, Q>
where
    Q: QueryFetch<'w>,
{
    fn len(&self) -> usize {
        let mut count = 0;
        for (i, archetype) in self.archetypes.iter().enumerate().skip(self.archetype_index) {
            if i == self.archetype_index {
                count += archetype.len().saturating_sub(self.row);
            } else {
                count += archetype.len();
            }
        }
        count
    }
}

/// Mutable query iterator
pub struct QueryIterMut<'w, Q>
where
    Q: QueryFetchMut<'w>,
{
    archetypes: Vec<NonNull<Archetype>>,
    archetype_index: usize,
    row: usize,
    state: Option<Q::State>,
    _phantom: PhantomData<&'w mut Q>,
}

impl<'w, Q> QueryIterMut<'w, Q>
where
    Q: QueryFetchMut<'w>,
{
    fn new(world: &'w mut World, matched: &[usize]) -> Self {
        let mut archetypes = Vec::with_capacity(matched.len());
        for &id in matched {
            if let Some(archetype) = world.archetype_mut(id) {
                archetypes.push(NonNull::from(archetype));
            }
        }

        Self {
            archetypes,
            archetype_index: 0,
            row: 0,
            state: None,
            _phantom: PhantomData,
        }
    }
}

impl<'w, Q> Iterator for QueryIterMut<'w, Q>
where
    Q: QueryFetchMut<'w>,
{
    type Item = <Q as QueryFetchMut<'w>>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.is_none() {
                let archetype_ptr = self.archetypes.get_mut(self.archetype_index)?.as_ptr();
                // SAFETY: the pointer comes from an exclusive world borrow
                // held for 'w; each archetype appears at most once in the
                // matched list, so no two states alias.
                let archetype = unsafe { &mut *archetype_ptr };

                self.state = Q::prepare(archetype);
                self.row = 0;

                if self.state.is_none() {
                    self.archetype_index += 1;
                    continue;
                }
            }

            let archetype_ptr = self.archetypes[self.archetype_index].as_ptr();
            // SAFETY: same as above; shared read of the row count only.
            let archetype_len = unsafe { (*archetype_ptr).len() };

            if self.row < archetype_len {
                let row = self.row;
                self.row += 1;
                // SAFETY: bounds checked; each row fetched exactly once.
                match unsafe { Q::fetch(self.state.as_mut()?, row) } {
                    Some(item) => return Some(item),
                    None => continue,
                }
            } else {
                self.state = None;
                self.archetype_index += 1;
            }
        }
    }
}

impl<'w, Q> ExactSizeIterator for QueryIterMut<'w, Q>
where
    Q: QueryFetchMut<'w>,
{
    fn len(&self) -> usize {
        let mut count = 0;
        for (i, archetype_ptr) in self.archetypes.iter().enumerate().skip(self.archetype_index) {
            // SAFETY: pointers are valid for the iterator's lifetime.
            let len = unsafe { archetype_ptr.as_ref().len() };
            if i == self.archetype_index {
                count += len.saturating_sub(self.row);
            } else {
                count += len;
            }
        }
        count
    }
}

/// Lazy sequence of read-only chunk views over matched archetypes
pub struct ChunkIter<'w> {
    world: &'w World,
    matched: Vec<usize>,
    archetype_index: usize,
    start: usize,
}

impl<'w> ChunkIter<'w> {
    fn new(world: &'w World, matched: Vec<usize>) -> Self {
        Self {
            world,
            matched,
            archetype_index: 0,
            start: 0,
        }
    }
}

impl<'w> Iterator for ChunkIter<'w> {
    type Item = Chunk<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &archetype_id = self.matched.get(self.archetype_index)?;
            let archetype = self.world.archetype(archetype_id)?;
            if self.start < archetype.len() {
                let len = CHUNK_ROWS.min(archetype.len() - self.start);
                let chunk = archetype.chunk_at(self.start, len);
                self.start += len;
                return Some(chunk);
            }
            self.archetype_index += 1;
            self.start = 0;
        }
    }
}

/// Stateless immutable query wrapper
///
/// Builds a temporary [`QueryState`] per call; persistent stages should
/// hold a `QueryState` instead.
pub struct Query<'w, Q>
where
    Q: QueryFilter,
{
    world: &'w World,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> Query<'w, Q>
where
    Q: QueryFilter,
{
    /// Create query
    pub fn new(world: &'w World) -> Self {
        Self {
            world,
            _phantom: PhantomData,
        }
    }

    /// Iterate query results
    pub fn iter(&self) -> QueryIter<'w, Q>
    where
        Q: QueryFetch<'w>,
    {
        QueryState::<Q>::new(self.world).iter(self.world)
    }

    /// Iterate matched rows as read-only chunk views
    pub fn chunks(&self) -> ChunkIter<'w> {
        QueryState::<Q>::new(self.world).chunks(self.world)
    }

    /// Count matching entities
    pub fn count(&self) -> usize
    where
        Q: QueryFetch<'w>,
    {
        self.iter().len()
    }
}

/// Stateful mutable query wrapper
pub struct QueryMut<'w, Q>
where
    Q: QueryFilter,
{
    world: &'w mut World,
    _phantom: PhantomData<Q>,
}

impl<'w, Q> QueryMut<'w, Q>
where
    Q: QueryFilter,
{
    /// Create mutable query wrapper
    pub fn new(world: &'w mut World) -> Self {
        Self {
            world,
            _phantom: PhantomData,
        }
    }

    /// Iterate results, consuming the wrapper
    pub fn iter(self) -> QueryIterMut<'w, Q>
    where
        Q: QueryFetchMut<'w>,
    {
        let state = QueryState::<Q>::new(&*self.world);
        state.iter_mut(self.world)
    }

    /// Count matching entities
    pub fn count(&self) -> usize {
        let state = QueryState::<Q>::new(&*self.world);
        state
            .matched
            .iter()
            .filter_map(|&id| self.world.archetype(id))
            .map(|arch| arch.len())
            .sum()
    }

    /// Run `func` over every matched chunk, serially
    pub fn for_each_chunk_mut<F>(&mut self, mut func: F)
    where
        F: FnMut(crate::archetype::ChunkMut<'_>),
    {
        let state = QueryState::<Q>::new(&*self.world);
        for &archetype_id in &state.matched {
            if let Some(archetype) = self.world.archetype_mut(archetype_id) {
                for chunk in archetype.chunks_mut() {
                    func(chunk);
                }
            }
        }
    }

    /// Run `func` over every matched chunk across rayon workers
    ///
    /// Workers receive disjoint row windows; structural world access is
    /// unreachable from inside a chunk view, which keeps iteration and
    /// structural changes mutually excluded.
    #[cfg(feature = "parallel")]
    pub fn par_for_each_chunk<F>(&mut self, func: F)
    where
        F: Fn(crate::archetype::ChunkMut<'_>) + Send + Sync,
    {
        crate::parallel::par_for_each_chunk::<Q, F>(self.world, func);
    }
}

impl<'w, Q> IntoIterator for QueryMut<'w, Q>
where
    Q: QueryFilter + QueryFetchMut<'w> + 'w,
{
    type Item = <Q as QueryFetchMut<'w>>::Item;
    type IntoIter = QueryIterMut<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct A(i32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct B(#[allow(dead_code)] i32);

    #[test]
    fn test_query_state_snapshot() {
        let mut world = World::new();
        world.spawn((A(1),)).unwrap();

        let state = QueryState::<&A>::new(&world);
        assert_eq!(state.matched_archetype_count(), 1);

        // Archetypes created after the snapshot are invisible until refresh.
        world.spawn((A(2), B(2))).unwrap();
        assert_eq!(state.matched_archetype_count(), 1);

        let mut state = state;
        state.refresh(&world);
        assert_eq!(state.matched_archetype_count(), 2);
    }

    #[test]
    fn test_query_filters() {
        let mut world = World::new();
        world.spawn((A(1), B(1))).unwrap();
        world.spawn((A(2),)).unwrap();
        world.spawn((B(3),)).unwrap();

        assert_eq!(world.query::<(&A, With<B>)>().count(), 1);
        assert_eq!(world.query::<(&A, Without<B>)>().count(), 1);
        assert_eq!(world.query::<&A>().count(), 2);
    }

    #[test]
    fn test_entity_fetch() {
        let mut world = World::new();
        let id = world.spawn((A(7),)).unwrap();

        let mut seen = Vec::new();
        for (entity, a) in world.query::<(Entity, &A)>().iter() {
            seen.push((entity, a.0));
        }
        assert_eq!(seen, vec![(id, 7)]);
    }

    #[test]
    fn test_query_state_iter_mut() {
        let mut world = World::new();
        world.spawn((A(1),)).unwrap();
        world.spawn((A(2),)).unwrap();

        let state = QueryState::<&mut A>::new(&world);
        for a in state.iter_mut(&mut world) {
            a.0 += 10;
        }

        let sum: i32 = world.query::<&A>().iter().map(|a| a.0).sum();
        assert_eq!(sum, 23);
    }

    #[test]
    fn test_chunk_iteration_covers_all_rows() {
        let mut world = World::new();
        for i in 0..300 {
            world.spawn((A(i),)).unwrap();
        }

        let total: usize = world.query::<&A>().chunks().map(|c| c.len()).sum();
        assert_eq!(total, 300);

        let max = world
            .query::<&A>()
            .chunks()
            .map(|c| c.len())
            .max()
            .unwrap_or(0);
        assert!(max <= CHUNK_ROWS);
    }

    #[test]
    fn test_serial_chunk_mutation() {
        let mut world = World::new();
        for i in 0..200 {
            world.spawn((A(i),)).unwrap();
        }

        world.query_mut::<&mut A>().for_each_chunk_mut(|mut chunk| {
            if let Some(values) = chunk.column_mut::<A>() {
                for value in values {
                    value.0 += 1;
                }
            }
        });

        let sum: i32 = world.query::<&A>().iter().map(|a| a.0).sum();
        // 0..200 shifted up by one
        assert_eq!(sum, (1..=200).sum::<i32>());
    }
}
