//! Running the physics tick at a fixed rate on its own thread.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use instant::Instant;
use parking_lot::{Mutex, RwLock};

use crate::{
    physics::{Polygon, RegionSnapshot},
    world::PhysicsWorld,
};

// limit on how far behind the loop is allowed to fall before it gives up catching up
const MAX_ACC_VALUE: u128 = 1_000_000_000 / 8;

/// A physics world ticking at a fixed rate on a dedicated thread.
///
/// The world is shared behind a mutex. With `lock_world` turned off in the config,
/// the thread also publishes a [`RegionSnapshot`] of the area around the camera
/// after every tick, so readers never have to wait for a tick to finish.
pub struct Simulation {
    world: Arc<Mutex<PhysicsWorld>>,
    camera: Arc<RwLock<Option<Polygon>>>,
    snapshot: Arc<RwLock<RegionSnapshot>>,
    running: Arc<AtomicBool>,
    physics_running: Arc<AtomicBool>,
    lock_world: bool,
    ticks: Arc<AtomicU64>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Simulation {
    /// Start ticking a world on a new thread.
    ///
    /// Whether readers lock the world is decided by `lock_world` at this point.
    pub fn spawn(world: PhysicsWorld) -> std::io::Result<Self> {
        let config = *world.config();
        let physics_running = world.physics().running_flag();
        let world = Arc::new(Mutex::new(world));
        let camera = Arc::new(RwLock::new(None));
        let snapshot = Arc::new(RwLock::new(RegionSnapshot::empty(config.cell_size)));
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let thread = thread::Builder::new()
            .name("physics".to_string())
            .spawn({
                let world = world.clone();
                let camera = camera.clone();
                let snapshot = snapshot.clone();
                let running = running.clone();
                let ticks = ticks.clone();
                move || run(world, camera, snapshot, running, ticks)
            })?;
        log::debug!("physics thread started at {} ticks per second", config.tick_rate);

        Ok(Self {
            world,
            camera,
            snapshot,
            running,
            physics_running,
            lock_world: config.lock_world,
            ticks,
            thread: Some(thread),
        })
    }

    /// Shared handle to the world. Locking it pauses the tick loop until released.
    #[inline]
    pub fn world(&self) -> &Arc<Mutex<PhysicsWorld>> {
        &self.world
    }

    /// Set the region that gets published as a snapshot after each tick.
    pub fn set_camera(&self, camera: Polygon) {
        *self.camera.write() = Some(camera);
    }

    /// The current contents of the index around the camera.
    ///
    /// With `lock_world` on, this locks the world and copies the region right now.
    /// Otherwise it returns the copy published after the latest tick.
    pub fn snapshot(&self) -> RegionSnapshot {
        if self.lock_world {
            let camera = self.camera.read().clone();
            let world = self.world.lock();
            match camera {
                Some(camera) => world.snapshot_region(&camera),
                None => RegionSnapshot::empty(world.index().cell_size()),
            }
        } else {
            self.snapshot.read().clone()
        }
    }

    /// Number of ticks run by the thread so far.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the thread and take the world back.
    pub fn stop(mut self) -> Option<PhysicsWorld> {
        self.shutdown();
        let world = self.world.clone();
        drop(self);
        let world = Arc::try_unwrap(world).ok()?.into_inner();
        world.physics().start();
        Some(world)
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        // stop a tick in progress from committing further
        self.physics_running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("physics thread panicked");
            }
            log::debug!("physics thread stopped after {} ticks", self.ticks());
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    world: Arc<Mutex<PhysicsWorld>>,
    camera: Arc<RwLock<Option<Polygon>>>,
    snapshot: Arc<RwLock<RegionSnapshot>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
) {
    let mut last_t = Instant::now();
    let mut acc: u128 = 0;

    while running.load(Ordering::Acquire) {
        // re-read every loop so config changes take effect
        let tick_nanos = world.lock().config().tick_duration().as_nanos().max(1);

        acc += last_t.elapsed().as_nanos();
        last_t = Instant::now();
        // limit acc to prevent spiral of death
        if acc > MAX_ACC_VALUE {
            acc = MAX_ACC_VALUE;
        }

        while acc >= tick_nanos && running.load(Ordering::Acquire) {
            #[cfg(feature = "tracy")]
            let _frame = tracy_client::Client::running()
                .map(|client| client.non_continuous_frame(tracy_client::frame_name!("tick")));

            let mut world = world.lock();
            let report = world.step();
            if report.ran() {
                ticks.fetch_add(1, Ordering::AcqRel);
            }
            if !world.config().lock_world {
                if let Some(camera) = camera.read().as_ref() {
                    *snapshot.write() = world.snapshot_region(camera);
                }
            }
            acc -= tick_nanos;
        }

        // sleep till next tick if we have time to kill
        let remaining = tick_nanos.saturating_sub(acc + last_t.elapsed().as_nanos());
        if remaining > 0 {
            thread::sleep(Duration::from_nanos(remaining as u64));
        }
    }
}
