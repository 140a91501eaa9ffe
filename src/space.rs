//! An entity container that records every change to physics components.

use crate::components::{ComponentKind, PhysicsComponent};

/// A change to an entity that the spatial index may need to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentEvent {
    Added(hecs::Entity, ComponentKind),
    Updated(hecs::Entity, ComponentKind),
    Removed(hecs::Entity, ComponentKind),
    Despawned(hecs::Entity),
}

impl ComponentEvent {
    pub fn entity(&self) -> hecs::Entity {
        match self {
            ComponentEvent::Added(e, _)
            | ComponentEvent::Updated(e, _)
            | ComponentEvent::Removed(e, _)
            | ComponentEvent::Despawned(e) => *e,
        }
    }
}

/// A [`hecs::World`] that queues a [`ComponentEvent`] for every mutation
/// of a [`PhysicsComponent`].
///
/// Nothing is notified synchronously; the queue is drained by
/// [`IndexSync::flush`][crate::physics::IndexSync::flush].
#[derive(Default)]
pub struct Space {
    world: hecs::World,
    events: Vec<ComponentEvent>,
}

impl Space {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read access to the underlying world.
    #[inline]
    pub fn world(&self) -> &hecs::World {
        &self.world
    }

    /// Spawn an entity with a bundle of components.
    ///
    /// An `Added` event is queued for every physics component in the bundle.
    pub fn spawn(&mut self, components: impl hecs::DynamicBundle) -> hecs::Entity {
        let entity = self.world.spawn(components);
        if let Ok(eref) = self.world.entity(entity) {
            for kind in ComponentKind::ALL {
                if has_kind(eref, kind) {
                    self.events.push(ComponentEvent::Added(entity, kind));
                }
            }
        }
        entity
    }

    /// Returns false if the entity didn't exist.
    pub fn despawn(&mut self, entity: hecs::Entity) -> bool {
        if self.world.despawn(entity).is_err() {
            return false;
        }
        self.events.push(ComponentEvent::Despawned(entity));
        true
    }

    /// Add a component to an entity, replacing the old value if there was one.
    pub fn insert<C: PhysicsComponent>(
        &mut self,
        entity: hecs::Entity,
        component: C,
    ) -> Result<(), hecs::NoSuchEntity> {
        let existed = self.has::<C>(entity);
        self.world.insert_one(entity, component)?;
        self.events.push(if existed {
            ComponentEvent::Updated(entity, C::KIND)
        } else {
            ComponentEvent::Added(entity, C::KIND)
        });
        Ok(())
    }

    /// Replace the value of an existing component.
    /// Returns false if the entity doesn't have one.
    pub fn set<C: PhysicsComponent>(&mut self, entity: hecs::Entity, component: C) -> bool {
        match self.world.query_one_mut::<&mut C>(entity) {
            Ok(c) => {
                *c = component;
                self.events.push(ComponentEvent::Updated(entity, C::KIND));
                true
            }
            Err(_) => false,
        }
    }

    /// Write a component without queuing an event.
    ///
    /// Used by the physics tick, which keeps the spatial index up to date by itself.
    pub(crate) fn set_quiet<C: PhysicsComponent>(&mut self, entity: hecs::Entity, component: C) {
        if let Ok(c) = self.world.query_one_mut::<&mut C>(entity) {
            *c = component;
        }
    }

    pub fn remove<C: PhysicsComponent>(&mut self, entity: hecs::Entity) -> Option<C> {
        let removed = self.world.remove_one::<C>(entity).ok()?;
        self.events.push(ComponentEvent::Removed(entity, C::KIND));
        Some(removed)
    }

    /// Get a copy of a component.
    pub fn get<C: PhysicsComponent + Clone>(&self, entity: hecs::Entity) -> Option<C> {
        self.world
            .get::<&C>(entity)
            .ok()
            .map(|c| C::clone(&c))
    }

    #[inline]
    pub fn has<C: PhysicsComponent>(&self, entity: hecs::Entity) -> bool {
        self.world
            .entity(entity)
            .map_or(false, |eref| eref.has::<C>())
    }

    #[inline]
    pub fn contains(&self, entity: hecs::Entity) -> bool {
        self.world.contains(entity)
    }

    pub fn entities(&self) -> Vec<hecs::Entity> {
        self.world.iter().map(|eref| eref.entity()).collect()
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.world.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    /// Take all events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<ComponentEvent> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

fn has_kind(eref: hecs::EntityRef<'_>, kind: ComponentKind) -> bool {
    use crate::components::*;
    match kind {
        ComponentKind::Position => eref.has::<Position>(),
        ComponentKind::Velocity => eref.has::<Velocity>(),
        ComponentKind::Acceleration => eref.has::<Acceleration>(),
        ComponentKind::CollisionShape => eref.has::<CollisionShape>(),
        ComponentKind::Collidable => eref.has::<Collidable>(),
        ComponentKind::Solid => eref.has::<Solid>(),
        ComponentKind::GravityAffected => eref.has::<GravityAffected>(),
        ComponentKind::IgnoreWith => eref.has::<IgnoreWith>(),
        ComponentKind::Interactable => eref.has::<Interactable>(),
        ComponentKind::Tags => eref.has::<Tags>(),
    }
}
