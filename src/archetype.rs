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

//! Archetype storage: Structure-of-Arrays columns with row allocation,
//! swap-remove compaction, and fixed-capacity chunk views.

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::EntityId;

/// Component signature: the sorted set of component types in an archetype
pub type ArchetypeSignature = SmallVec<[TypeId; 8]>;

/// Rows exposed per chunk view during iteration
pub const CHUNK_ROWS: usize = 128;

/// Archetype: one contiguous column per component type, index-aligned by
/// entity row
pub struct Archetype {
    signature: ArchetypeSignature,
    entities: Vec<EntityId>,
    columns: Vec<ComponentColumn>,
    column_index: FxHashMap<TypeId, usize>,
}

impl Archetype {
    /// Create new archetype for a sorted signature
    pub fn new(signature: ArchetypeSignature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            columns: Vec::new(),
            column_index: FxHashMap::default(),
        }
    }

    /// Get signature
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get all entities, row-ordered
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Check whether a column for the type exists
    pub fn has_column(&self, type_id: TypeId) -> bool {
        self.column_index.contains_key(&type_id)
    }

    /// Get column immutably
    pub fn column(&self, type_id: TypeId) -> Option<&ComponentColumn> {
        let idx = *self.column_index.get(&type_id)?;
        self.columns.get(idx)
    }

    /// Get column mutably
    pub fn column_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentColumn> {
        let idx = *self.column_index.get(&type_id)?;
        self.columns.get_mut(idx)
    }

    /// Register a column for component type T (no-op if already present)
    pub fn register_column<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if !self.column_index.contains_key(&type_id) {
            let idx = self.columns.len();
            self.columns.push(ComponentColumn::new::<T>());
            self.column_index.insert(type_id, idx);
        }
    }

    /// Add a pre-built (empty) column, used when cloning layouts during
    /// archetype migration
    pub(crate) fn add_column(&mut self, column: ComponentColumn) {
        let type_id = column.type_id();
        if !self.column_index.contains_key(&type_id) {
            let idx = self.columns.len();
            self.columns.push(column);
            self.column_index.insert(type_id, idx);
        }
    }

    /// Append an entity row; component values must be pushed into every
    /// column before the archetype is observed again
    pub(crate) fn push_entity(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Reserve space for additional rows
    pub fn reserve_rows(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Swap-remove a row. `drop_value` decides per column whether the
    /// removed value is dropped (despawn) or forgotten (its bytes were
    /// moved elsewhere during migration).
    ///
    /// Returns the entity that was swapped into `row`, if any, so the
    /// caller can update its location in the same operation.
    pub(crate) fn swap_remove_row<F>(&mut self, row: usize, drop_value: F) -> Option<EntityId>
    where
        F: Fn(TypeId) -> bool,
    {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.columns {
            let drop_it = drop_value(column.type_id());
            // SAFETY: row was in bounds above and every column is
            // row-aligned with `entities`.
            unsafe {
                column.swap_remove(row, drop_it);
            }
        }

        self.entities.get(row).copied()
    }

    /// Read-only chunk view over a row window (query engine plumbing)
    pub(crate) fn chunk_at(&self, start: usize, len: usize) -> Chunk<'_> {
        debug_assert!(start + len <= self.entities.len());
        Chunk {
            archetype: self,
            start,
            len,
        }
    }

    /// Iterate fixed-capacity read-only chunk views over the rows
    pub fn chunks(&self) -> impl Iterator<Item = Chunk<'_>> {
        let total = self.entities.len();
        let mut start = 0;
        std::iter::from_fn(move || {
            if start >= total {
                return None;
            }
            let len = CHUNK_ROWS.min(total - start);
            let chunk = Chunk {
                archetype: self,
                start,
                len,
            };
            start += len;
            Some(chunk)
        })
    }

    /// Collect fixed-capacity mutable chunk views over the rows
    ///
    /// The views cover disjoint row windows, so they may be processed
    /// concurrently by data-parallel workers.
    pub fn chunks_mut(&mut self) -> Vec<ChunkMut<'_>> {
        let total = self.entities.len();
        let archetype = NonNull::from(&mut *self);
        let mut chunks = Vec::with_capacity((total + CHUNK_ROWS - 1) / CHUNK_ROWS);
        let mut start = 0;
        while start < total {
            let len = CHUNK_ROWS.min(total - start);
            chunks.push(ChunkMut {
                archetype,
                start,
                len,
                _marker: PhantomData,
            });
            start += len;
        }
        chunks
    }
}

/// Read-only view of up to [`CHUNK_ROWS`] rows of one archetype
pub struct Chunk<'a> {
    archetype: &'a Archetype,
    start: usize,
    len: usize,
}

impl<'a> Chunk<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entities of this chunk, row-aligned with the column slices
    pub fn entities(&self) -> &'a [EntityId] {
        &self.archetype.entities()[self.start..self.start + self.len]
    }

    /// Typed column slice for this chunk's row window
    pub fn column<T: Component>(&self) -> Option<&'a [T]> {
        let column = self.archetype.column(TypeId::of::<T>())?;
        let slice = column.as_slice::<T>()?;
        Some(&slice[self.start..self.start + self.len])
    }
}

/// Mutable view of up to [`CHUNK_ROWS`] rows of one archetype
///
/// Views returned by [`Archetype::chunks_mut`] address disjoint row
/// windows; writes through different views never alias.
pub struct ChunkMut<'a> {
    archetype: NonNull<Archetype>,
    start: usize,
    len: usize,
    _marker: PhantomData<&'a mut Archetype>,
}

// SAFETY: each view addresses a disjoint row window of columns owned by
// the archetype; the &'a mut borrow guarantees no other access.
unsafe impl Send for ChunkMut<'_> {}

impl<'a> ChunkMut<'a> {
    fn archetype(&self) -> &Archetype {
        // SAFETY: pointer originates from a live &'a mut Archetype.
        unsafe { self.archetype.as_ref() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entities of this chunk, row-aligned with the column slices
    pub fn entities(&self) -> &[EntityId] {
        &self.archetype().entities()[self.start..self.start + self.len]
    }

    /// Typed read-only column slice for this chunk's row window
    pub fn column<T: Component>(&self) -> Option<&[T]> {
        let column = self.archetype().column(TypeId::of::<T>())?;
        let slice = column.as_slice::<T>()?;
        Some(&slice[self.start..self.start + self.len])
    }

    /// Typed mutable column slice for this chunk's row window
    pub fn column_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        let start = self.start;
        let len = self.len;
        let column = self.archetype().column(TypeId::of::<T>())?;
        if column.type_id() != TypeId::of::<T>() || start + len > column.len() {
            return None;
        }
        // SAFETY: the window is in bounds, the element type matches, and
        // the &mut self borrow prevents overlapping slices from this view.
        Some(unsafe {
            std::slice::from_raw_parts_mut((column.data_ptr() as *mut T).add(start), len)
        })
    }

    /// One written column and one read column at once, e.g. integrating
    /// velocities into positions
    pub fn split_mut<W: Component, R: Component>(&mut self) -> Option<(&mut [W], &[R])> {
        if TypeId::of::<W>() == TypeId::of::<R>() {
            return None;
        }
        let start = self.start;
        let len = self.len;
        let archetype = self.archetype();
        let write_col = archetype.column(TypeId::of::<W>())?;
        let read_col = archetype.column(TypeId::of::<R>())?;
        if start + len > write_col.len() || start + len > read_col.len() {
            return None;
        }
        let read = &read_col.as_slice::<R>()?[start..start + len];
        // SAFETY: W != R so the slices address distinct columns; the
        // window is in bounds and exclusive through &mut self.
        let write = unsafe {
            std::slice::from_raw_parts_mut((write_col.data_ptr() as *mut W).add(start), len)
        };
        Some((write, read))
    }
}

/// Type-erased, alignment-correct component column
pub struct ComponentColumn {
    ptr: NonNull<u8>,
    cap: usize,
    len: usize,
    item_layout: Layout,
    type_id: TypeId,
    type_name: &'static str,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

// SAFETY: components are Send + Sync by trait bound; the column is just
// their storage.
unsafe impl Send for ComponentColumn {}
unsafe impl Sync for ComponentColumn {}

impl ComponentColumn {
    /// Create new column for type T
    pub fn new<T: Component>() -> Self {
        let item_layout = Layout::new::<T>();
        Self {
            ptr: NonNull::<T>::dangling().cast::<u8>(),
            cap: if item_layout.size() == 0 { usize::MAX } else { 0 },
            len: 0,
            item_layout,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe {
                    std::ptr::drop_in_place(ptr as *mut T);
                })
            } else {
                None
            },
        }
    }

    /// A fresh, empty column with the same element type
    pub(crate) fn clone_empty(&self) -> Self {
        Self {
            // SAFETY: alignment is a nonzero power of two, so this is a
            // valid dangling pointer for the element type.
            ptr: unsafe { NonNull::new_unchecked(self.item_layout.align() as *mut u8) },
            cap: if self.item_layout.size() == 0 {
                usize::MAX
            } else {
                0
            },
            len: 0,
            item_layout: self.item_layout,
            type_id: self.type_id,
            type_name: self.type_name,
            drop_fn: self.drop_fn,
        }
    }

    /// TypeId of the stored component
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the stored component (diagnostics)
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Size in bytes of one element
    pub fn item_size(&self) -> usize {
        self.item_layout.size()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensure capacity for `additional` more rows
    pub fn reserve(&mut self, additional: usize) {
        let size = self.item_layout.size();
        if size == 0 {
            return;
        }
        let needed = self.len + additional;
        if needed <= self.cap {
            return;
        }
        let new_cap = needed.next_power_of_two().max(4);
        let new_bytes = match size.checked_mul(new_cap) {
            Some(bytes) => bytes,
            None => panic!("component column capacity overflow"),
        };
        // SAFETY: size and alignment come from a valid Layout; old
        // capacity/layout were produced the same way.
        unsafe {
            let new_layout =
                Layout::from_size_align_unchecked(new_bytes, self.item_layout.align());
            let new_ptr = if self.cap == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = Layout::from_size_align_unchecked(
                    size * self.cap,
                    self.item_layout.align(),
                );
                alloc::realloc(self.ptr.as_ptr(), old_layout, new_bytes)
            };
            match NonNull::new(new_ptr) {
                Some(ptr) => self.ptr = ptr,
                None => alloc::handle_alloc_error(new_layout),
            }
        }
        self.cap = new_cap;
    }

    /// Append an uninitialized row and return a pointer to it; the caller
    /// must write a value of the element type before the row is read
    pub(crate) fn push_uninit(&mut self) -> *mut u8 {
        self.reserve(1);
        let size = self.item_layout.size();
        // SAFETY: reserve guaranteed room for one more row.
        let ptr = unsafe { self.ptr.as_ptr().add(self.len * size) };
        self.len += 1;
        ptr
    }

    /// Raw pointer to a row (bounds unchecked beyond debug)
    pub(crate) fn row_ptr(&self, row: usize) -> *mut u8 {
        debug_assert!(row < self.len);
        // SAFETY: caller keeps row < len; for zero-sized types the
        // dangling base pointer is valid for zero-size access.
        unsafe { self.ptr.as_ptr().add(row * self.item_layout.size()) }
    }

    /// Base data pointer (for chunk slicing)
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Get component at row
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        if self.type_id != TypeId::of::<T>() || row >= self.len {
            return None;
        }
        // SAFETY: type checked above, row in bounds, storage aligned to T.
        Some(unsafe { &*(self.row_ptr(row) as *const T) })
    }

    /// Get mutable component at row
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        if self.type_id != TypeId::of::<T>() || row >= self.len {
            return None;
        }
        // SAFETY: type checked above, row in bounds, storage aligned to T.
        Some(unsafe { &mut *(self.row_ptr(row) as *mut T) })
    }

    /// All rows as a typed slice
    pub fn as_slice<T: Component>(&self) -> Option<&[T]> {
        if self.type_id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: type checked above; ptr is aligned to T and valid for
        // len elements (dangling-but-aligned for ZSTs).
        Some(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const T, self.len) })
    }

    /// All rows as a typed mutable slice
    pub fn as_slice_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        if self.type_id != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: as `as_slice`, plus exclusivity through &mut self.
        Some(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut T, self.len) })
    }

    /// Swap-remove a row, dropping the removed value or forgetting it
    /// (when its bytes were already moved to another column)
    ///
    /// # Safety
    /// `row` must be a valid row index.
    pub(crate) unsafe fn swap_remove(&mut self, row: usize, drop_value: bool) {
        debug_assert!(row < self.len);
        let size = self.item_layout.size();
        let base = self.ptr.as_ptr();
        let last = self.len - 1;

        if drop_value {
            if let Some(drop_fn) = self.drop_fn {
                drop_fn(base.add(row * size));
            }
        }
        if row < last && size > 0 {
            std::ptr::copy_nonoverlapping(base.add(last * size), base.add(row * size), size);
        }
        self.len = last;
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        let size = self.item_layout.size();
        if let Some(drop_fn) = self.drop_fn {
            for row in 0..self.len {
                // SAFETY: every row below len holds an initialized value.
                unsafe {
                    drop_fn(self.ptr.as_ptr().add(row * size));
                }
            }
        }
        if size > 0 && self.cap > 0 {
            // SAFETY: the buffer was allocated with this exact layout.
            unsafe {
                let layout =
                    Layout::from_size_align_unchecked(size * self.cap, self.item_layout.align());
                alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}
