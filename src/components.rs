//! Components the physics tick reads from and writes to entities.

use std::sync::Arc;

use crate::{math::Vec2, physics::collision::Shape};

/// Names of the physics-relevant component types,
/// used in change events and when matching [`IgnoreWith`] lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Position,
    Velocity,
    Acceleration,
    CollisionShape,
    Collidable,
    Solid,
    GravityAffected,
    IgnoreWith,
    Interactable,
    Tags,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::Position,
        ComponentKind::Velocity,
        ComponentKind::Acceleration,
        ComponentKind::CollisionShape,
        ComponentKind::Collidable,
        ComponentKind::Solid,
        ComponentKind::GravityAffected,
        ComponentKind::IgnoreWith,
        ComponentKind::Interactable,
        ComponentKind::Tags,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Position => "Position",
            ComponentKind::Velocity => "Velocity",
            ComponentKind::Acceleration => "Acceleration",
            ComponentKind::CollisionShape => "CollisionShape",
            ComponentKind::Collidable => "Collidable",
            ComponentKind::Solid => "Solid",
            ComponentKind::GravityAffected => "GravityAffected",
            ComponentKind::IgnoreWith => "IgnoreWith",
            ComponentKind::Interactable => "Interactable",
            ComponentKind::Tags => "Tags",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A component type whose changes the spatial index cares about.
pub trait PhysicsComponent: hecs::Component {
    const KIND: ComponentKind;
}

macro_rules! physics_component {
    ($($ty:ident),* $(,)?) => {
        $(
            impl PhysicsComponent for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;
            }
        )*
    };
}

physics_component!(
    Position,
    Velocity,
    Acceleration,
    CollisionShape,
    Collidable,
    Solid,
    GravityAffected,
    IgnoreWith,
    Interactable,
    Tags,
);

//
// vectors
//

/// Position of the entity's centre in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position(pub Vec2);

/// Distance moved per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity(pub Vec2);

/// Starting value of the collision correction for an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Acceleration(pub Vec2);

#[derive(Clone, Debug, PartialEq)]
pub struct CollisionShape(pub Shape);

//
// flags
//

/// Whether the entity can collide with anything at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Collidable(pub bool);

/// Whether the entity blocks other solid entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Solid(pub bool);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GravityAffected(pub bool);

/// A comma-separated list of flag names.
/// Collisions with entities that have any of these flags are ignored.
///
/// Names are matched case-insensitively against the built-in flag components
/// (`Solid`, `Collidable`, `GravityAffected`, `Interactable`) and the entity's [`Tags`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IgnoreWith(pub String);

impl IgnoreWith {
    pub fn names(&self) -> impl '_ + Iterator<Item = &str> {
        self.0.split(',').map(str::trim).filter(|n| !n.is_empty())
    }

    /// Check if any ignored name is among the given flags.
    pub fn matches<'a>(&self, mut flags: impl Iterator<Item = &'a str>) -> bool {
        flags.any(|flag| self.names().any(|n| n.eq_ignore_ascii_case(flag)))
    }
}

/// Freeform flags, e.g. `"Bullet"`, that other entities can ignore with [`IgnoreWith`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(pub Vec<String>);

impl Tags {
    pub fn new<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self(tags.into_iter().map(Into::into).collect())
    }

    pub fn has(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Callback run when this entity touches another interactable entity during the physics tick.
///
/// Nothing happens unless both entities have one. Both callbacks are called
/// with `(mover, target)`: the entity being stepped first, the one it ran into second.
/// Runs on a worker thread while the world is being read,
/// so it must not expect to modify anything directly.
#[derive(Clone)]
pub struct Interactable(pub Arc<dyn Fn(hecs::Entity, hecs::Entity) + Send + Sync>);

impl Interactable {
    pub fn new(f: impl Fn(hecs::Entity, hecs::Entity) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, mover: hecs::Entity, target: hecs::Entity) {
        (self.0)(mover, target)
    }
}

impl std::fmt::Debug for Interactable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interactable(..)")
    }
}

/// Names of the flags an entity has, for matching against [`IgnoreWith`].
pub fn flag_names(entity: hecs::EntityRef<'_>) -> Vec<String> {
    let mut names = Vec::new();
    let mut flag = |set: bool, kind: ComponentKind| {
        if set {
            names.push(kind.name().to_string());
        }
    };
    flag(
        entity.get::<&Solid>().map_or(false, |s| s.0),
        ComponentKind::Solid,
    );
    flag(
        entity.get::<&Collidable>().map_or(false, |c| c.0),
        ComponentKind::Collidable,
    );
    flag(
        entity.get::<&GravityAffected>().map_or(false, |g| g.0),
        ComponentKind::GravityAffected,
    );
    flag(entity.has::<Interactable>(), ComponentKind::Interactable);
    if let Some(tags) = entity.get::<&Tags>() {
        names.extend(tags.0.iter().cloned());
    }
    names
}
