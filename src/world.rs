use crate::{
    components::CollisionShape,
    physics::{
        ConfigError, IndexSync, Physics, PhysicsConfig, Polygon, RegionSnapshot, SpatialIndex,
        TickReport,
    },
    space::Space,
};

/// Everything needed to run the physics tick, bundled together:
/// the entities, the spatial index tracking them, and the physics system.
pub struct PhysicsWorld {
    pub space: Space,
    index: SpatialIndex,
    physics: Physics,
    sync: IndexSync,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            space: Space::new(),
            index: SpatialIndex::new(config.cell_size),
            physics: Physics::new(config),
            sync: IndexSync::new(),
        })
    }

    #[inline]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    #[inline]
    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    #[inline]
    pub fn physics_mut(&mut self) -> &mut Physics {
        &mut self.physics
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        self.physics.config()
    }

    /// Change the configuration, rebuilding the spatial index if the cell size changed.
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<(), ConfigError> {
        let old_cell_size = self.physics.config().cell_size;
        self.physics.set_config(config)?;
        if config.cell_size != old_cell_size {
            let space = &self.space;
            self.index.resize(config.cell_size, |e| {
                space.get::<CollisionShape>(e).map(|s| s.0)
            });
        }
        Ok(())
    }

    /// Apply pending changes to the index without running a tick.
    pub fn sync(&mut self) -> usize {
        self.sync.flush(&mut self.space, &self.index)
    }

    /// Run one physics tick.
    ///
    /// Changes made to the space since the last step are applied to the index first,
    /// and again after the tick in case extensions or callbacks queued any.
    pub fn step(&mut self) -> TickReport {
        self.sync.flush(&mut self.space, &self.index);
        let report = self.physics.apply(&mut self.space, &self.index);
        self.sync.flush(&mut self.space, &self.index);
        report
    }

    /// Copy the part of the index a camera polygon overlaps.
    pub fn snapshot_region(&self, camera: &Polygon) -> RegionSnapshot {
        self.index.snapshot_region(camera)
    }
}
