//! Demo: 1000 bouncing sprites driven by the frame pipeline
//!
//! Mirrors the classic sample loop: seed entities with position,
//! velocity, and sprite inside a bounds rectangle, integrate movement,
//! cycle colors, forward synthetic keyboard events through the event
//! bus, let a read-only render query walk the world once per frame, and
//! finish with a JSON snapshot.

use std::sync::{Arc, Mutex};

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use pulse_ecs::prelude::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Position(Vec2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Velocity(Vec2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct Sprite {
    /// Opaque texture handle owned by the external renderer
    texture: u32,
    color: [f32; 4],
}

const BOUNDS: Vec2 = Vec2::new(800.0, 600.0);
const ENTITIES: usize = 1000;
const FRAMES: u32 = 300;
const DT: f32 = 1.0 / 60.0;

/// Integrates velocities into positions, bouncing at the bounds.
struct MovementStage;

impl Stage for MovementStage {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn access(&self) -> StageAccess {
        StageAccess::empty().writes::<Position>().reads::<Velocity>()
    }

    fn update(&mut self, world: &mut World, dt: f32) -> Result<()> {
        #[cfg(feature = "parallel")]
        world
            .query_mut::<(&mut Position, &Velocity)>()
            .par_for_each_chunk(|mut chunk| {
                if let Some((positions, velocities)) = chunk.split_mut::<Position, Velocity>() {
                    for (pos, vel) in positions.iter_mut().zip(velocities.iter()) {
                        integrate(pos, vel, dt);
                    }
                }
            });

        #[cfg(not(feature = "parallel"))]
        for (pos, vel) in world.query_mut::<(&mut Position, &Velocity)>().iter() {
            integrate(pos, vel, dt);
        }

        // Bounce: velocities flip where positions left the bounds
        for (pos, vel) in world.query_mut::<(&mut Position, &mut Velocity)>().iter() {
            if pos.0.x < 0.0 || pos.0.x > BOUNDS.x {
                vel.0.x = -vel.0.x;
                pos.0.x = pos.0.x.clamp(0.0, BOUNDS.x);
            }
            if pos.0.y < 0.0 || pos.0.y > BOUNDS.y {
                vel.0.y = -vel.0.y;
                pos.0.y = pos.0.y.clamp(0.0, BOUNDS.y);
            }
        }
        Ok(())
    }
}

fn integrate(pos: &mut Position, vel: &Velocity, dt: f32) {
    pos.0 += vel.0 * dt * 60.0;
}

/// Cycles every sprite's color with elapsed time.
struct ColorStage {
    elapsed: f32,
}

impl Stage for ColorStage {
    fn name(&self) -> &'static str {
        "color"
    }

    fn access(&self) -> StageAccess {
        StageAccess::empty().writes::<Sprite>()
    }

    fn update(&mut self, world: &mut World, dt: f32) -> Result<()> {
        self.elapsed += dt;
        let phase = self.elapsed.sin() * 0.5 + 0.5;
        for sprite in world.query_mut::<&mut Sprite>().iter() {
            sprite.color = [phase, sprite.color[1], 1.0 - phase, 1.0];
        }
        Ok(())
    }
}

/// Folds bus-delivered key events into edge-tracked keyboard state and
/// reports aggregates every second of simulated time.
struct DebugStage {
    keyboard: Arc<Mutex<KeyboardInput>>,
    frames: u32,
}

impl Stage for DebugStage {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn after_update(&mut self, world: &mut World, _dt: f32) -> Result<()> {
        self.frames += 1;
        let mut keyboard = self
            .keyboard
            .lock()
            .map_err(|_| EcsError::StageError("keyboard state poisoned".into()))?;

        if keyboard.just_pressed(KeyCode::Space) {
            println!("[debug] space pressed on frame {}", self.frames);
        }
        if self.frames % 60 == 0 {
            println!(
                "[debug] frame {:>4}: {} entities, {} events published",
                self.frames,
                world.entity_count(),
                world.events().published_count()
            );
        }
        keyboard.clear_just_changed();
        Ok(())
    }
}

/// Read-only render pass: the external renderer would draw these; the
/// demo just aggregates what it would see.
fn render_pass(world: &World) -> (usize, Vec2) {
    let mut drawn = 0;
    let mut centroid = Vec2::ZERO;
    for chunk in world.query::<(&Position, &Sprite)>().chunks() {
        if let Some(positions) = chunk.column::<Position>() {
            for pos in positions {
                centroid += pos.0;
            }
            drawn += positions.len();
        }
    }
    if drawn > 0 {
        centroid /= drawn as f32;
    }
    (drawn, centroid)
}

fn main() -> Result<()> {
    let mut app = App::with_seed(42);
    let mut time = Time::new();

    // Event bus: the input collaborator publishes, the debug stage reads
    let keyboard = Arc::new(Mutex::new(KeyboardInput::new()));
    let sink = keyboard.clone();
    app.world.subscribe::<KeyEvent, _>(move |event| {
        let mut state = sink
            .lock()
            .map_err(|_| EcsError::StageError("keyboard state poisoned".into()))?;
        if event.pressed {
            state.press(event.key);
        } else {
            state.release(event.key);
        }
        Ok(())
    });

    app.add_stage(Box::new(MovementStage))
        .add_stage(Box::new(ColorStage { elapsed: 0.0 }))
        .add_stage(Box::new(DebugStage {
            keyboard,
            frames: 0,
        }));

    // Spawn script: 1000 entities inside the bounds
    app.spawn_script(ENTITIES, |rng| {
        (
            Position(Vec2::new(
                rng.gen_range(0.0..BOUNDS.x),
                rng.gen_range(0.0..BOUNDS.y),
            )),
            Velocity(Vec2::new(
                rng.gen_range(-0.25..0.25),
                rng.gen_range(-0.25..0.25),
            )),
            Sprite {
                texture: 1,
                color: [
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                    1.0,
                ],
            },
        )
    })?;
    println!("spawned {} entities", app.world.entity_count());

    for frame in 0..FRAMES {
        // Synthetic input: tap space once a second
        if frame % 60 == 30 {
            app.world.publish(&KeyEvent {
                key: KeyCode::Space,
                pressed: true,
            })?;
        } else if frame % 60 == 31 {
            app.world.publish(&KeyEvent {
                key: KeyCode::Space,
                pressed: false,
            })?;
        }

        app.frame(DT)?;
        time.update();

        let (drawn, centroid) = render_pass(&app.world);
        if frame % 60 == 0 {
            println!(
                "[render] frame {frame:>4}: {drawn} sprites, centroid ({:.1}, {:.1})",
                centroid.x, centroid.y
            );
        }
    }

    // Persistence boundary: snapshot the whole world as JSON
    let mut registry = ComponentRegistry::new();
    registry
        .register::<Position>("position")
        .register::<Velocity>("velocity")
        .register::<Sprite>("sprite");
    let json = app.world.snapshot(&registry)?.to_json()?;
    println!(
        "snapshot: {} entities, {} bytes of JSON",
        ENTITIES,
        json.len()
    );
    println!(
        "simulated {} frames in {:.1}ms wall clock",
        time.frame_count(),
        time.elapsed_seconds() * 1000.0
    );

    app.shutdown()
}
