use super::collision::SpatialIndex;
use crate::{
    components::{CollisionShape, ComponentKind, Position, Velocity},
    space::{ComponentEvent, Space},
};

/// Velocity changes smaller than this don't wake an entity up.
pub const WAKE_THRESHOLD: f64 = 0.001;

/// Keeps a [`SpatialIndex`] in sync with the entities in a [`Space`].
///
/// Entities are tracked while they have both a [`Position`] and a [`CollisionShape`].
/// Changes made outside the physics tick are applied in [`flush`][Self::flush],
/// which should be called before and after every tick.
#[derive(Default, Debug)]
pub struct IndexSync {
    /// Total number of events handled, mostly for diagnostics.
    pub handled: u64,
}

impl IndexSync {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply all events queued in the space to the index.
    ///
    /// Returns the number of events handled.
    pub fn flush(&mut self, space: &mut Space, index: &SpatialIndex) -> usize {
        let events = space.drain_events();
        if events.is_empty() {
            return 0;
        }

        // wakes are applied after everything else so that an entity spawned
        // with a velocity is already tracked when it gets woken up
        let mut wakes = Vec::new();
        for event in &events {
            match *event {
                ComponentEvent::Added(e, ComponentKind::Position | ComponentKind::CollisionShape) => {
                    if !index.contains(e) {
                        track(space, index, e);
                    }
                }
                ComponentEvent::Added(e, ComponentKind::Velocity)
                | ComponentEvent::Updated(e, ComponentKind::Velocity) => wakes.push(e),
                // replaced or moved by hand, so put the shape back on the position
                ComponentEvent::Updated(
                    e,
                    ComponentKind::Position | ComponentKind::CollisionShape,
                ) => {
                    if index.contains(e) {
                        track(space, index, e);
                    }
                }
                ComponentEvent::Removed(e, ComponentKind::Position | ComponentKind::CollisionShape)
                | ComponentEvent::Despawned(e) => {
                    index.remove_entity(e);
                }
                _ => {}
            }
        }

        for e in wakes {
            let moving = space
                .get::<Velocity>(e)
                .map_or(false, |v| v.0.mag() > WAKE_THRESHOLD);
            if moving && index.wake_entity(e) {
                log::trace!("woke up {:?}", e);
            }
        }

        self.handled += events.len() as u64;
        events.len()
    }
}

/// Centre an entity's shape on its position and (re)insert it in the index.
fn track(space: &mut Space, index: &SpatialIndex, entity: hecs::Entity) {
    let (Some(Position(pos)), Some(CollisionShape(shape))) = (
        space.get::<Position>(entity),
        space.get::<CollisionShape>(entity),
    ) else {
        return;
    };
    let shape = shape.with_centre(pos);
    if index.contains(entity) {
        index.update(entity, &shape);
    } else {
        index.add_entity(entity, Some(&shape));
    }
    space.set_quiet(entity, CollisionShape(shape));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::*,
        math::Vec2,
        physics::collision::{Footprint, Shape},
    };

    fn setup() -> (Space, SpatialIndex, IndexSync) {
        (Space::new(), SpatialIndex::new(256.0), IndexSync::new())
    }

    #[test]
    fn tracks_entities_with_position_and_shape() {
        let (mut space, index, mut sync) = setup();
        let shape = Shape::circle(Vec2::zero(), 10.0).unwrap();
        let e = space.spawn((CollisionShape(shape.clone()),));
        sync.flush(&mut space, &index);
        assert!(!index.contains(e));

        space.insert(e, Position(Vec2::new(300.0, 0.0))).unwrap();
        sync.flush(&mut space, &index);
        assert!(index.is_asleep(e));
        assert_eq!(index.footprint_of(e), Some(Footprint::from([(1, 0)])));
        // the shape got moved to the position
        let CollisionShape(centred) = space.get::<CollisionShape>(e).unwrap();
        assert!((centred.centre() - Vec2::new(300.0, 0.0)).mag() < 1e-9);

        space.remove::<CollisionShape>(e);
        sync.flush(&mut space, &index);
        assert!(!index.contains(e));
    }

    #[test]
    fn velocity_wakes() {
        let (mut space, index, mut sync) = setup();
        let e = space.spawn((
            Position(Vec2::zero()),
            CollisionShape(Shape::rect(Vec2::zero(), 10.0, 10.0).unwrap()),
            Velocity(Vec2::zero()),
        ));
        sync.flush(&mut space, &index);
        assert!(index.is_asleep(e));

        space.set(e, Velocity(Vec2::new(0.0005, 0.0)));
        sync.flush(&mut space, &index);
        assert!(index.is_asleep(e));

        space.set(e, Velocity(Vec2::new(2.0, 0.0)));
        assert_eq!(sync.flush(&mut space, &index), 1);
        assert!(index.is_awake(e));

        // spawning already moving works too
        let moving = space.spawn((
            Velocity(Vec2::new(1.0, 1.0)),
            Position(Vec2::zero()),
            CollisionShape(Shape::rect(Vec2::zero(), 10.0, 10.0).unwrap()),
        ));
        sync.flush(&mut space, &index);
        assert!(index.is_awake(moving));
    }

    #[test]
    fn manual_moves_and_despawns() {
        let (mut space, index, mut sync) = setup();
        let e = space.spawn((
            Position(Vec2::zero()),
            CollisionShape(Shape::rect(Vec2::zero(), 10.0, 10.0).unwrap()),
        ));
        sync.flush(&mut space, &index);

        space.set(e, Position(Vec2::new(0.0, 600.0)));
        sync.flush(&mut space, &index);
        assert_eq!(index.footprint_of(e), Some(Footprint::from([(0, 2)])));

        // a replacement shape gets centred on the position too
        space.set(
            e,
            CollisionShape(Shape::rect(Vec2::zero(), 400.0, 10.0).unwrap()),
        );
        sync.flush(&mut space, &index);
        assert_eq!(
            index.footprint_of(e),
            Some(Footprint::from([(-1, 2), (0, 2), (1, 2)]))
        );
        let CollisionShape(centred) = space.get::<CollisionShape>(e).unwrap();
        assert!((centred.centre() - Vec2::new(0.0, 600.0)).mag() < 1e-9);

        space.despawn(e);
        sync.flush(&mut space, &index);
        assert!(index.is_empty());
        assert!(index.occupied_cells().is_empty());
    }
}
