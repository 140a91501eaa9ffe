/// Open a profiler span that closes when the returned guard is dropped.
/// Expands to nothing unless the `tracy` feature is on.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {{
        #[cfg(feature = "tracy")]
        let span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0));
        #[cfg(not(feature = "tracy"))]
        let span = ();
        span
    }};
}

pub mod components;
pub use components::{
    Acceleration, Collidable, CollisionShape, ComponentKind, GravityAffected, IgnoreWith,
    Interactable, PhysicsComponent, Position, Solid, Tags, Velocity,
};

pub mod space;
pub use space::{ComponentEvent, Space};

pub mod math;
pub use math::{uv, Angle, Rotor2, Unit, Vec2};

pub mod physics;
pub use physics::{
    collision::{self, Contact, Footprint, Polygon, RegionSnapshot, Shape, SpatialIndex, AABB},
    forcefield, ConfigError, ForceField, IndexSync, Physics, PhysicsConfig, PhysicsExtension,
    TickReport,
};

pub mod world;
pub use world::PhysicsWorld;

pub mod game;
pub use game::Simulation;

// Re-exported hecs to guarantee versions match
pub use hecs;
