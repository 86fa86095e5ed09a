//! Data-parallel chunk iteration agrees with the serial path.
#![cfg(feature = "parallel")]

use pulse_ecs::World;

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

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tag;

fn seeded_world() -> World {
    let mut world = World::new();
    for i in 0..2500 {
        let pos = Position {
            x: i as f32,
            y: (i % 7) as f32,
        };
        let vel = Velocity {
            x: 0.5,
            y: -0.25,
        };
        // Two archetypes so the parallel path crosses archetype boundaries
        if i % 2 == 0 {
            world.spawn((pos, vel)).unwrap();
        } else {
            world.spawn((pos, vel, Tag)).unwrap();
        }
    }
    world
}

#[test]
fn parallel_integration_matches_serial() {
    let mut serial = seeded_world();
    let mut parallel = seeded_world();

    for (pos, vel) in serial.query_mut::<(&mut Position, &Velocity)>().iter() {
        pos.x += vel.x;
        pos.y += vel.y;
    }

    parallel
        .query_mut::<(&mut Position, &Velocity)>()
        .par_for_each_chunk(|mut chunk| {
            if let Some((positions, velocities)) = chunk.split_mut::<Position, Velocity>() {
                for (pos, vel) in positions.iter_mut().zip(velocities.iter()) {
                    pos.x += vel.x;
                    pos.y += vel.y;
                }
            }
        });

    let expected: Vec<Position> = serial.query::<&Position>().iter().copied().collect();
    let actual: Vec<Position> = parallel.query::<&Position>().iter().copied().collect();
    assert_eq!(expected, actual);
}

#[test]
fn parallel_workers_see_disjoint_rows() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut world = seeded_world();
    let touched = AtomicUsize::new(0);

    world
        .query_mut::<(&mut Position, &Velocity)>()
        .par_for_each_chunk(|mut chunk| {
            if let Some(positions) = chunk.column_mut::<Position>() {
                touched.fetch_add(positions.len(), Ordering::Relaxed);
            }
        });

    // Every row visited exactly once across all workers
    assert_eq!(touched.load(Ordering::Relaxed), 2500);
}
