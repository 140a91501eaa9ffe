use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    components::{CollisionShape, Position, Velocity},
    math::Vec2,
    space::Space,
};

//

pub mod collision;
pub use collision::{Contact, Polygon, RegionSnapshot, Shape, SpatialIndex};

pub mod config;
pub use config::{ConfigError, PhysicsConfig};

pub mod forcefield;
pub use forcefield::ForceField;

pub mod hecs_sync;
pub use hecs_sync::IndexSync;

pub mod resolver;
pub use resolver::{EntityStep, Relocation, StepContext, StepError, StepOutcome};

//

/// Hooks that run around the step of every awake entity.
///
/// Hooks run on worker threads during the parallel part of the tick,
/// so they only get to read the world.
pub trait PhysicsExtension: Send + Sync {
    fn pre_step(&self, _world: &hecs::World, _entity: hecs::Entity) {}
    fn post_step(&self, _world: &hecs::World, _step: &EntityStep) {}
}

/// What happened during a call to [`Physics::apply`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// The number of the tick that ran, or None if the tick was skipped.
    pub tick: Option<u64>,
    /// Entities that were awake at the start of the tick.
    pub awake: usize,
    pub moved: usize,
    pub slept: usize,
    /// Entities whose cells in the spatial index changed.
    pub relocated: usize,
    pub errors: Vec<StepError>,
}

impl TickReport {
    #[inline]
    pub fn ran(&self) -> bool {
        self.tick.is_some()
    }
}

/// The physics system. Moves awake entities according to their velocity
/// and stops them from moving into each other.
pub struct Physics {
    config: PhysicsConfig,
    /// Overrides the default downwards gravity if set.
    force_field: Option<Box<dyn ForceField>>,
    extensions: Vec<Box<dyn PhysicsExtension>>,
    running: Arc<AtomicBool>,
    paused: bool,
    step_requested: AtomicBool,
    tick: AtomicU64,
}

impl Default for Physics {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl Physics {
    pub fn new(config: PhysicsConfig) -> Self {
        Physics {
            config,
            force_field: None,
            extensions: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            paused: false,
            step_requested: AtomicBool::new(false),
            tick: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Change the configuration. Changing the cell size here doesn't resize
    /// an existing index; see [`PhysicsWorld::set_config`][crate::PhysicsWorld::set_config].
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Use a custom force field instead of constant downwards gravity
    /// for gravity-affected entities.
    pub fn set_force_field(&mut self, field: impl ForceField + 'static) {
        self.force_field = Some(Box::new(field));
    }

    pub fn add_extension(&mut self, ext: impl PhysicsExtension + 'static) {
        self.extensions.push(Box::new(ext));
    }

    /// Number of ticks run so far.
    #[inline]
    pub fn physics_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Allow one tick to run when `stagger_mode` is on.
    #[inline]
    pub fn request_step(&self) {
        self.step_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn pause(&mut self) {
        self.paused = true;
    }

    #[inline]
    pub fn resume(&mut self) {
        self.paused = false;
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop the system. A tick in progress stops committing changes
    /// and no more ticks run until [`start`][Self::start] is called.
    #[inline]
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    #[inline]
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handle to the running flag, for stopping from another thread
    /// without locking the world.
    #[inline]
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Run one tick over every awake entity.
    ///
    /// Steps are computed in parallel while reading the world,
    /// then written back one entity at a time.
    /// Entities whose cells changed are relocated in the index at the end.
    pub fn apply(&self, space: &mut Space, index: &SpatialIndex) -> TickReport {
        let _span = tracy_span!("physics tick", "apply");

        if !self.is_running() || self.paused {
            return TickReport::default();
        }
        if self.config.stagger_mode && !self.step_requested.swap(false, Ordering::AcqRel) {
            return TickReport::default();
        }

        let awake: Vec<hecs::Entity> = index.awake().into_iter().collect();
        let results = self.compute_steps(space.world(), index, &awake);

        let _commit_span = tracy_span!("commit steps", "apply");
        let mut report = TickReport {
            awake: awake.len(),
            ..Default::default()
        };
        let mut relocations = Vec::new();
        let mut recomputes = Vec::new();
        let mut interrupted = false;
        for result in results {
            let step = match result {
                Ok(step) => step,
                Err(err) => {
                    log::warn!("{}", err);
                    report.errors.push(err);
                    continue;
                }
            };
            if !self.is_running() {
                interrupted = true;
                break;
            }
            let entity = step.entity;
            match step.outcome {
                StepOutcome::Sleep => {
                    space.set_quiet(entity, Velocity(Vec2::zero()));
                    index.sleep_entity(entity);
                    report.slept += 1;
                }
                StepOutcome::Move {
                    position,
                    velocity,
                    shape,
                    relocation,
                } => {
                    space.set_quiet(entity, Position(position));
                    space.set_quiet(entity, Velocity(velocity));
                    match (relocation, shape) {
                        (Relocation::Footprint(fp), Some(shape)) => {
                            space.set_quiet(entity, CollisionShape(shape));
                            relocations.push((entity, fp));
                        }
                        (Relocation::Recompute, Some(shape)) => {
                            space.set_quiet(entity, CollisionShape(shape.clone()));
                            recomputes.push((entity, shape));
                        }
                        (_, Some(shape)) => space.set_quiet(entity, CollisionShape(shape)),
                        (_, None) => {}
                    }
                    report.moved += 1;
                }
            }
        }

        // everything that got committed is relocated, even if the tick was interrupted
        let _relocate_span = tracy_span!("relocate", "apply");
        report.relocated = index.relocate_many(relocations) + index.update_many(&recomputes);

        if interrupted {
            log::debug!("physics stopped in the middle of a tick");
            return report;
        }
        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        report.tick = Some(tick);
        log::trace!(
            "tick {}: {} awake, {} moved, {} slept, {} relocated",
            tick,
            report.awake,
            report.moved,
            report.slept,
            report.relocated
        );
        report
    }

    fn compute_steps(
        &self,
        world: &hecs::World,
        index: &SpatialIndex,
        awake: &[hecs::Entity],
    ) -> Vec<Result<EntityStep, StepError>> {
        let _span = tracy_span!("compute steps", "compute_steps");
        let gravity;
        let force_field: &dyn ForceField = match &self.force_field {
            Some(field) => field.as_ref(),
            None => {
                gravity = forcefield::Gravity::downwards(self.config.gravity_level);
                &gravity
            }
        };
        let ctx = StepContext {
            world,
            index,
            config: &self.config,
            force_field: Some(force_field),
        };
        let step = |entity: &hecs::Entity| {
            if !self.is_running() {
                return None;
            }
            for ext in &self.extensions {
                ext.pre_step(world, *entity);
            }
            let result = resolver::step_entity(ctx, *entity);
            if let Ok(step) = &result {
                for ext in &self.extensions {
                    ext.post_step(world, step);
                }
            }
            Some(result)
        };

        #[cfg(feature = "parallel")]
        let results = awake.par_iter().filter_map(step).collect();
        #[cfg(not(feature = "parallel"))]
        let results = awake.iter().filter_map(step).collect();
        results
    }
}
