//! System pipeline: ordered stages with lifecycle hooks
//!
//! Stages run phase-by-phase: every stage's `before_update`, then every
//! `update`, then every `after_update`, so later stages observe all
//! earlier stages' `before_update` side effects before any update runs.
//! A hook failure is fatal to the frame and propagates to the caller.
//!
//! The world is frozen for direct structural change while the phases run;
//! stages queue spawns/despawns on `world.commands_mut()` and the pipeline
//! applies the buffer at the end-of-frame barrier.

use std::any::TypeId;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::Result;
use crate::world::World;

/// Component access declared by a stage
///
/// Workers of a data-parallel stage may only write columns listed in
/// `writes`; two stages can share a rayon pool only when their accesses
/// do not conflict.
#[derive(Debug, Clone, Default)]
pub struct StageAccess {
    pub reads: Vec<TypeId>,
    pub writes: Vec<TypeId>,
}

impl StageAccess {
    /// Create empty access
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder: declare a read component
    pub fn reads<T: 'static>(mut self) -> Self {
        self.reads.push(TypeId::of::<T>());
        self
    }

    /// Builder: declare a written component
    pub fn writes<T: 'static>(mut self) -> Self {
        self.writes.push(TypeId::of::<T>());
        self
    }

    /// Whether this stage declared write access to a component type
    pub fn allows_write(&self, type_id: TypeId) -> bool {
        self.writes.contains(&type_id)
    }

    /// Check if this access conflicts with another
    /// (write/write or write/read on the same component)
    pub fn conflicts_with(&self, other: &StageAccess) -> bool {
        for write in &self.writes {
            if other.writes.contains(write) || other.reads.contains(write) {
                return true;
            }
        }
        for write in &other.writes {
            if self.reads.contains(write) {
                return true;
            }
        }
        false
    }

    /// Check if two accesses can run concurrently
    pub fn can_run_parallel(&self, other: &StageAccess) -> bool {
        !self.conflicts_with(other)
    }
}

/// One ordered unit of per-frame logic
///
/// All hooks default to no-ops so a stage implements only what it needs.
pub trait Stage: Send + Sync {
    /// Stage name for diagnostics and timing reports
    fn name(&self) -> &'static str;

    /// Component access metadata
    fn access(&self) -> StageAccess {
        StageAccess::empty()
    }

    /// Runs once, in declared order, before the first frame
    fn initialize(&mut self, _world: &mut World) -> Result<()> {
        Ok(())
    }

    /// First phase of every frame
    fn before_update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Second phase of every frame
    fn update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Third phase of every frame
    fn after_update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Runs once, in declared order, at shutdown
    fn dispose(&mut self, _world: &mut World) -> Result<()> {
        Ok(())
    }
}

/// Boxed stage
pub type BoxedStage = Box<dyn Stage>;

/// Accumulated timing for one stage
#[derive(Debug, Clone, Copy, Default)]
pub struct StageStats {
    pub total: Duration,
    pub frames: u64,
}

impl StageStats {
    pub fn average(&self) -> Duration {
        if self.frames == 0 {
            Duration::ZERO
        } else {
            self.total / self.frames as u32
        }
    }
}

/// Ordered list of stages driven once per frame
pub struct Pipeline {
    stages: Vec<BoxedStage>,
    initialized: bool,
    timings: FxHashMap<usize, StageStats>,
    last_frame: Duration,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            initialized: false,
            timings: FxHashMap::default(),
            last_frame: Duration::ZERO,
        }
    }

    /// Append a stage; stages run in the order they were added
    pub fn add_stage(&mut self, stage: BoxedStage) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Builder-style variant of [`Pipeline::add_stage`]
    pub fn with_stage(mut self, stage: BoxedStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in declared order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Wall-clock duration of the most recent frame
    pub fn last_frame_duration(&self) -> Duration {
        self.last_frame
    }

    /// Accumulated timing for the stage at `index`
    pub fn stage_stats(&self, index: usize) -> Option<StageStats> {
        self.timings.get(&index).copied()
    }

    /// Run one frame: `before_update`, `update`, `after_update` for all
    /// stages, phase-by-phase, then apply deferred commands.
    pub fn run_frame(&mut self, world: &mut World, dt: f32) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("pipeline.run_frame", stages = self.stages.len(), dt = dt);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        if !self.initialized {
            for stage in self.stages.iter_mut() {
                stage.initialize(world)?;
            }
            self.initialized = true;
        }

        let frame_start = Instant::now();
        world.set_frozen(true);
        let phases = self.run_phases(world, dt);
        world.set_frozen(false);
        phases?;

        // End-of-frame barrier: structural work queued by the stages
        world.apply_commands()?;

        self.last_frame = frame_start.elapsed();
        Ok(())
    }

    fn run_phases(&mut self, world: &mut World, dt: f32) -> Result<()> {
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let start = Instant::now();
            let result = stage.before_update(world, dt);
            Self::record(&mut self.timings, index, start.elapsed());
            result?;
        }
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let start = Instant::now();
            let result = stage.update(world, dt);
            Self::record(&mut self.timings, index, start.elapsed());
            result?;
        }
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let start = Instant::now();
            let result = stage.after_update(world, dt);
            Self::record(&mut self.timings, index, start.elapsed());
            result?;
        }
        // Count a frame once per stage, not once per hook
        for index in 0..self.stages.len() {
            if let Some(stats) = self.timings.get_mut(&index) {
                stats.frames += 1;
            }
        }
        Ok(())
    }

    fn record(timings: &mut FxHashMap<usize, StageStats>, index: usize, elapsed: Duration) {
        let stats = timings.entry(index).or_default();
        stats.total += elapsed;
    }

    /// Run `dispose` for every stage in declared order
    pub fn dispose_all(&mut self, world: &mut World) -> Result<()> {
        for stage in self.stages.iter_mut() {
            stage.dispose(world)?;
        }
        self.initialized = false;
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_stage_access_conflicts() {
        let a = StageAccess::empty().writes::<i32>();
        let b = StageAccess::empty().writes::<i32>();
        assert!(a.conflicts_with(&b));

        let a = StageAccess::empty().reads::<i32>();
        let b = StageAccess::empty().reads::<i32>();
        assert!(!a.conflicts_with(&b));
        assert!(a.can_run_parallel(&b));

        let a = StageAccess::empty().writes::<i32>();
        let b = StageAccess::empty().reads::<i32>();
        assert!(a.conflicts_with(&b));
        assert!(a.allows_write(TypeId::of::<i32>()));
    }

    struct TracingStage {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Stage for TracingStage {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn initialize(&mut self, _world: &mut World) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:init", self.tag));
            Ok(())
        }

        fn before_update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:before", self.tag));
            Ok(())
        }

        fn update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:update", self.tag));
            Ok(())
        }

        fn after_update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:after", self.tag));
            Ok(())
        }

        fn dispose(&mut self, _world: &mut World) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:dispose", self.tag));
            Ok(())
        }
    }

    #[test]
    fn test_phase_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new();
        let mut pipeline = Pipeline::new()
            .with_stage(Box::new(TracingStage {
                tag: "a",
                log: log.clone(),
            }))
            .with_stage(Box::new(TracingStage {
                tag: "b",
                log: log.clone(),
            }));

        pipeline.run_frame(&mut world, 0.016).unwrap();
        pipeline.dispose_all(&mut world).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:init", "b:init", "a:before", "b:before", "a:update", "b:update", "a:after",
                "b:after", "a:dispose", "b:dispose",
            ]
        );
    }

    #[test]
    fn test_initialize_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new();
        let mut pipeline = Pipeline::new().with_stage(Box::new(TracingStage {
            tag: "s",
            log: log.clone(),
        }));

        pipeline.run_frame(&mut world, 0.016).unwrap();
        pipeline.run_frame(&mut world, 0.016).unwrap();

        let inits = log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.ends_with(":init"))
            .count();
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_stage_timings_accumulate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new();
        let mut pipeline = Pipeline::new().with_stage(Box::new(TracingStage {
            tag: "timed",
            log,
        }));

        for _ in 0..3 {
            pipeline.run_frame(&mut world, 0.016).unwrap();
        }

        let stats = pipeline.stage_stats(0).unwrap();
        assert_eq!(stats.frames, 3);
        assert!(stats.average() <= stats.total);
        assert_eq!(pipeline.stage_names(), vec!["timed"]);
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
            Err(crate::error::EcsError::StageError("update failed".into()))
        }
    }

    #[test]
    fn test_hook_failure_is_fatal_and_unfreezes() {
        let mut world = World::new();
        let mut pipeline = Pipeline::new().with_stage(Box::new(FailingStage));

        assert!(pipeline.run_frame(&mut world, 0.016).is_err());
        // The frame aborted but the world is usable again
        assert!(!world.is_frozen());
        assert!(world.spawn((1u32,)).is_ok());
    }
}
