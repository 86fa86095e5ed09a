//! Data-parallel chunk iteration (feature `parallel`)
//!
//! A stage may fan its own chunk iteration out across rayon workers.
//! Workers receive disjoint row windows and cannot reach structural world
//! operations from a chunk view, so iteration and structural change stay
//! mutually excluded; the stage must only write columns it declared in
//! its [`StageAccess`](crate::pipeline::StageAccess).

use rayon::prelude::*;

use crate::archetype::ChunkMut;
use crate::query::{QueryFilter, QueryState};
use crate::world::World;

/// Run `func` over every chunk matched by filter `Q`, across rayon workers.
///
/// Archetypes are processed in parallel and, within an archetype, chunks
/// are processed in parallel as well; rayon's work stealing balances the
/// two levels.
pub fn par_for_each_chunk<Q, F>(world: &mut World, func: F)
where
    Q: QueryFilter,
    F: Fn(ChunkMut<'_>) + Send + Sync,
{
    let state = QueryState::<Q>::new(&*world);
    let matched = state.matched_archetypes().to_vec();

    // Workers index distinct archetypes through a shared world address.
    let world_addr = world as *mut World as usize;

    matched.par_iter().for_each(|&archetype_id| {
        // SAFETY:
        // 1. The caller holds exclusive access to the world for the whole
        //    call, so no other code observes it.
        // 2. Each archetype id appears once in the matched list, so no two
        //    workers touch the same archetype.
        // 3. Chunk views cover disjoint row windows.
        let world = unsafe { &mut *(world_addr as *mut World) };
        if let Some(archetype) = world.archetype_mut(archetype_id) {
            archetype
                .chunks_mut()
                .into_par_iter()
                .for_each(|chunk| func(chunk));
        }
    });
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
    fn test_parallel_matches_serial_integration() {
        let mut world = World::new();
        for i in 0..1000 {
            world
                .spawn((
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                    Velocity { x: 1.0, y: 2.0 },
                ))
                .unwrap();
        }

        world
            .query_mut::<(&mut Position, &Velocity)>()
            .par_for_each_chunk(|mut chunk| {
                if let Some((positions, velocities)) = chunk.split_mut::<Position, Velocity>() {
                    for (pos, vel) in positions.iter_mut().zip(velocities.iter()) {
                        pos.x += vel.x;
                        pos.y += vel.y;
                    }
                }
            });

        for (i, (pos, _)) in world
            .query::<(&Position, &Velocity)>()
            .iter()
            .enumerate()
        {
            assert_eq!(pos.x, i as f32 + 1.0);
            assert_eq!(pos.y, 2.0);
        }
    }
}
