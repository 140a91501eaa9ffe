/// Error from a [`PhysicsConfig`] with values the simulation can't run with.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cell size must be positive and finite, got {0}")]
    CellSize(f64),
    #[error("Tick rate must be at least 1")]
    TickRate,
    #[error("Smoothing factor must be between 0 and 1, got {0}")]
    SmoothingFactor(f64),
    #[error("Gravity level must be finite, got {0}")]
    GravityLevel(f64),
}

/// Parameters to control the physics tick and the simulation loop.
///
/// Every field has a default, so a config document only needs to name
/// the values it changes.
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Whether entities with [`GravityAffected`][crate::components::GravityAffected]
    /// get pulled downwards every tick.
    pub gravity: bool,
    /// How much velocity gravity adds per tick.
    pub gravity_level: f64,
    /// If set, only entities whose set of grid cells actually changed
    /// get relocated in the spatial index after a tick.
    /// Otherwise every entity that moved is relocated.
    pub precise_mode: bool,
    /// If set, ticks only run when explicitly requested with
    /// [`Physics::request_step`][super::Physics::request_step].
    pub stagger_mode: bool,
    /// Velocity is multiplied by this after every tick.
    ///
    /// Lower values make things stop sooner. 1 means no damping.
    pub smoothing_factor: f64,
    /// Side length of a spatial index cell.
    ///
    /// A good value is a few times the size of a typical object.
    pub cell_size: f64,
    /// Ticks per second for [`Simulation`][crate::game::Simulation].
    pub tick_rate: u32,
    /// Whether rendering has to lock the world to look at it.
    ///
    /// If not set, the simulation publishes a copy of the index region
    /// around the camera after every tick instead.
    /// Reading it never waits for a tick, but it may be one tick behind.
    pub lock_world: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: false,
            gravity_level: 0.98,
            precise_mode: true,
            stagger_mode: false,
            smoothing_factor: 0.75,
            cell_size: 256.0,
            tick_rate: 60,
            lock_world: true,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(ConfigError::CellSize(self.cell_size));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::TickRate);
        }
        if !(0.0..=1.0).contains(&self.smoothing_factor) {
            return Err(ConfigError::SmoothingFactor(self.smoothing_factor));
        }
        if !self.gravity_level.is_finite() {
            return Err(ConfigError::GravityLevel(self.gravity_level));
        }
        Ok(())
    }

    /// Length of one tick.
    #[inline]
    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
