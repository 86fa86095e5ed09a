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

//! Entity identifiers and location metadata.

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Unique entity identifier backed by slotmap's generational keys.
    ///
    /// The key version doubles as the generation counter: destroying an
    /// entity and reusing its slot leaves old handles detectably stale.
    pub struct EntityId;
}

impl EntityId {
    /// Slot index portion of the handle (diagnostics only).
    pub fn index(self) -> u32 {
        (self.data().as_ffi() & 0xffff_ffff) as u32
    }

    /// Generation portion of the handle (diagnostics only).
    pub fn generation(self) -> u32 {
        (self.data().as_ffi() >> 32) as u32
    }
}

/// Entity location in archetype storage (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub row: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_generation_bumps_on_reuse() {
        let mut map: SlotMap<EntityId, ()> = SlotMap::with_key();
        let first = map.insert(());
        map.remove(first);
        let second = map.insert(());

        // Same slot, different generation: stale handle stays invalid.
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(!map.contains_key(first));
        assert!(map.contains_key(second));
    }
}
