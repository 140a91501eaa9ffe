//! Per-entity work of the physics tick: collision correction and integration.
//!
//! Everything here only reads the world. The result of a step is an [`EntityStep`]
//! that gets written back after every entity has been processed.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{
    collision::{footprint, intersects_sat, Footprint, Polygon, Shape, SpatialIndex},
    config::PhysicsConfig,
    forcefield::ForceField,
};
use crate::{
    components::*,
    math::{self as m, Vec2},
};

/// Velocity components smaller than this are snapped to zero.
pub const REST_THRESHOLD: f64 = 0.05;
/// Corrections shorter than this are ignored.
pub const MIN_CORRECTION: f64 = 0.001;

/// Error that stops a single entity from being stepped.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Entity {0:?} no longer exists")]
    NoSuchEntity(hecs::Entity),
    #[error("Entity {entity:?} is awake but has no {kind} component")]
    MissingComponent {
        entity: hecs::Entity,
        kind: ComponentKind,
    },
    #[error("Interaction callback between {0:?} and {1:?} panicked")]
    CallbackPanicked(hecs::Entity, hecs::Entity),
}

/// How an entity's index footprint needs to change after it moved.
#[derive(Clone, Debug, PartialEq)]
pub enum Relocation {
    /// The entity stayed in the same cells.
    None,
    /// The entity moved to these cells.
    Footprint(Footprint),
    /// The footprint wasn't compared; recompute it from the new shape.
    Recompute,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The entity stopped moving and goes to sleep.
    Sleep,
    Move {
        position: Vec2,
        /// Velocity for the next tick, already damped.
        velocity: Vec2,
        shape: Option<Shape>,
        relocation: Relocation,
    },
}

/// The computed result of one tick for one entity, not yet written anywhere.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityStep {
    pub entity: hecs::Entity,
    pub outcome: StepOutcome,
}

/// Everything the per-entity step reads from.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub world: &'a hecs::World,
    pub index: &'a SpatialIndex,
    pub config: &'a PhysicsConfig,
    pub force_field: Option<&'a dyn ForceField>,
}

#[inline]
fn flag<T: hecs::Component>(eref: hecs::EntityRef<'_>, get: impl Fn(&T) -> bool) -> bool {
    eref.get::<&T>().map_or(false, |c| get(&*c))
}

/// The area a polygon covers while moving by `offset`.
pub fn swept(poly: &Polygon, offset: Vec2) -> Polygon {
    let moved = poly.translated(offset);
    poly.convex_hull(&moved).unwrap_or(moved)
}

/// Compute one tick for an entity without modifying anything.
pub fn step_entity(ctx: StepContext<'_>, entity: hecs::Entity) -> Result<EntityStep, StepError> {
    let eref = ctx
        .world
        .entity(entity)
        .map_err(|_| StepError::NoSuchEntity(entity))?;
    let missing = |kind| StepError::MissingComponent { entity, kind };
    let position = eref
        .get::<&Position>()
        .ok_or_else(|| missing(ComponentKind::Position))?
        .0;
    let mut vel = eref
        .get::<&Velocity>()
        .ok_or_else(|| missing(ComponentKind::Velocity))?
        .0;
    let shape = eref.get::<&CollisionShape>().map(|s| s.0.clone());

    if ctx.config.gravity && flag::<GravityAffected>(eref, |g| g.0) {
        if let Some(field) = ctx.force_field {
            vel += field.value_at(position);
        }
    }

    if let Some(shape) = &shape {
        if flag::<Collidable>(eref, |c| c.0) {
            let poly = shape.to_polygon();
            let query = swept(&poly, vel);
            let candidates = ctx
                .index
                .entities_in_filtered(&query, |e| is_collidable(ctx.world, e));
            if !candidates.is_empty() {
                let corr = correction(ctx, eref, position, vel, &poly, candidates)?;
                vel = m::truncate_vec(vel + corr, 2);
            }
        }
    }

    integrate(ctx, entity, position, vel, shape)
}

fn is_collidable(world: &hecs::World, entity: hecs::Entity) -> bool {
    world
        .get::<&Collidable>(entity)
        .map_or(false, |c| c.0)
}

fn integrate(
    ctx: StepContext<'_>,
    entity: hecs::Entity,
    position: Vec2,
    mut vel: Vec2,
    shape: Option<Shape>,
) -> Result<EntityStep, StepError> {
    if vel.x.abs() < REST_THRESHOLD {
        vel.x = 0.0;
    }
    if vel.y.abs() < REST_THRESHOLD {
        vel.y = 0.0;
    }
    if vel == Vec2::zero() {
        return Ok(EntityStep {
            entity,
            outcome: StepOutcome::Sleep,
        });
    }

    let new_pos = position + vel;
    let next_vel = m::truncate_vec(vel * ctx.config.smoothing_factor, 2);

    let shape = shape.map(|s| s.with_centre(new_pos));
    let relocation = match &shape {
        Some(_) if !ctx.config.precise_mode => Relocation::Recompute,
        Some(s) => {
            let new_fp = footprint::rasterize(&s.to_polygon(), ctx.index.cell_size());
            match ctx.index.footprint_of(entity) {
                Some(old_fp) if old_fp == new_fp => Relocation::None,
                // untracked entities are left alone when committing
                _ => Relocation::Footprint(new_fp),
            }
        }
        None => Relocation::None,
    };

    Ok(EntityStep {
        entity,
        outcome: StepOutcome::Move {
            position: new_pos,
            velocity: next_vel,
            shape,
            relocation,
        },
    })
}

struct Target {
    entity: hecs::Entity,
    dist_sq: f64,
    poly: Polygon,
    solid: bool,
    callback: Option<Interactable>,
}

/// Compute the change to an entity's velocity that keeps it
/// from moving into the solid things around it.
///
/// Candidates are handled nearest first. Each solid contact pushes the
/// velocity back along the contact normal, and the area swept by the
/// entity is recomputed before checking the next one.
/// The result never makes the entity faster than it was.
pub fn correction(
    ctx: StepContext<'_>,
    eref: hecs::EntityRef<'_>,
    position: Vec2,
    vel: Vec2,
    poly: &Polygon,
    candidates: impl IntoIterator<Item = hecs::Entity>,
) -> Result<Vec2, StepError> {
    let speed = vel.mag();
    if speed == 0.0 {
        return Ok(Vec2::zero());
    }
    let entity = eref.entity();
    let mut corr = eref
        .get::<&Acceleration>()
        .map_or(Vec2::zero(), |a| a.0);
    let ignore = eref.get::<&IgnoreWith>().map(|i| IgnoreWith::clone(&i));
    let solid = flag::<Solid>(eref, |s| s.0);
    let callback = eref.get::<&Interactable>().map(|i| Interactable::clone(&i));

    let mut targets: Vec<Target> = candidates
        .into_iter()
        .filter(|other| *other != entity)
        .filter_map(|other| {
            let oref = ctx.world.entity(other).ok()?;
            let other_pos = oref.get::<&Position>()?.0;
            let other_shape = oref.get::<&CollisionShape>()?;
            if !flag::<Collidable>(oref, |c| c.0) {
                return None;
            }
            let other_solid = flag::<Solid>(oref, |s| s.0);
            let other_callback = oref.get::<&Interactable>().map(|i| Interactable::clone(&i));
            // nothing would happen on contact
            if !other_solid && (callback.is_none() || other_callback.is_none()) {
                return None;
            }
            if let Some(ignore) = &ignore {
                let names = flag_names(oref);
                if ignore.matches(names.iter().map(String::as_str)) {
                    return None;
                }
            }
            Some(Target {
                entity: other,
                dist_sq: (other_pos - position).mag_sq(),
                poly: other_shape.0.to_polygon(),
                solid: other_solid,
                callback: other_callback,
            })
        })
        .collect();
    targets.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq));

    let mut query = swept(poly, vel);
    let mut solid_hit = false;
    for target in targets {
        let Some(contact) = intersects_sat(&query, &target.poly) else { continue };
        // point the normal at the target so corrections always push away from it
        let to_target = target.poly.centre() - poly.centre();
        let normal = if to_target.dot(*contact.normal) < 0.0 {
            -contact.normal
        } else {
            contact.normal
        };

        interact(entity, callback.as_ref(), target.entity, target.callback.as_ref())?;

        let push = *normal * contact.depth;
        if solid && target.solid && push.mag() > MIN_CORRECTION {
            corr -= push;
            corr = m::clamp_mag(corr, speed);
            query = swept(poly, vel + corr);
            solid_hit = true;
        }
    }

    corr = m::truncate_vec(m::clamp_mag(corr, speed), 2);
    if solid_hit && (vel + corr).mag() > speed {
        corr = m::clamp_mag(vel + corr, speed) - vel;
    }
    Ok(corr)
}

/// Run the callbacks of two entities in contact. Only happens if both have one.
///
/// The mover's callback runs first, then the target's.
/// Both are called with the mover first and the target second.
fn interact(
    mover: hecs::Entity,
    mover_callback: Option<&Interactable>,
    target: hecs::Entity,
    target_callback: Option<&Interactable>,
) -> Result<(), StepError> {
    let (Some(mover_cb), Some(target_cb)) = (mover_callback, target_callback) else {
        return Ok(());
    };
    catch_unwind(AssertUnwindSafe(|| {
        mover_cb.call(mover, target);
        target_cb.call(mover, target);
    }))
    .map_err(|_| StepError::CallbackPanicked(mover, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn rect(x: f64, y: f64, side: f64) -> Shape {
        Shape::rect(Vec2::new(x, y), side, side).unwrap()
    }

    fn solid_box(world: &mut hecs::World, index: &SpatialIndex, x: f64, y: f64) -> hecs::Entity {
        let shape = rect(x, y, 40.0);
        let e = world.spawn((
            Position(Vec2::new(x, y)),
            Velocity(Vec2::zero()),
            CollisionShape(shape.clone()),
            Collidable(true),
            Solid(true),
        ));
        index.add_entity(e, Some(&shape));
        e
    }

    fn ctx<'a>(
        world: &'a hecs::World,
        index: &'a SpatialIndex,
        config: &'a PhysicsConfig,
    ) -> StepContext<'a> {
        StepContext {
            world,
            index,
            config,
            force_field: None,
        }
    }

    #[test]
    fn overlapping_boxes_stop_along_x() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let a = solid_box(&mut world, &index, 150.0, 150.0);
        let b = solid_box(&mut world, &index, 152.0, 150.0);

        let c = ctx(&world, &index, &config);
        let poly = rect(150.0, 150.0, 40.0).to_polygon();
        let eref = world.entity(a).unwrap();
        let corr = correction(c, eref, Vec2::new(150.0, 150.0), Vec2::new(5.0, 0.0), &poly, [b])
            .unwrap();
        assert_eq!(corr, Vec2::new(-5.0, 0.0));
    }

    #[test]
    fn ignored_tags_are_passed_through() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let a = solid_box(&mut world, &index, 0.0, 0.0);
        let bullet = solid_box(&mut world, &index, 10.0, 0.0);
        world.insert_one(bullet, Tags::new(["Bullet"])).unwrap();
        world.insert_one(a, IgnoreWith("Bullet".to_string())).unwrap();

        let c = ctx(&world, &index, &config);
        let poly = rect(0.0, 0.0, 40.0).to_polygon();
        let corr = correction(
            c,
            world.entity(a).unwrap(),
            Vec2::zero(),
            Vec2::new(5.0, 0.0),
            &poly,
            [bullet],
        )
        .unwrap();
        assert_eq!(corr, Vec2::zero());
    }

    #[test]
    fn zero_velocity_means_zero_correction() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let a = solid_box(&mut world, &index, 0.0, 0.0);
        let b = solid_box(&mut world, &index, 10.0, 0.0);
        world.insert_one(a, Acceleration(Vec2::new(3.0, 0.0))).unwrap();
        let poly = rect(0.0, 0.0, 40.0).to_polygon();
        let corr = correction(
            ctx(&world, &index, &config),
            world.entity(a).unwrap(),
            Vec2::zero(),
            Vec2::zero(),
            &poly,
            [b],
        )
        .unwrap();
        assert_eq!(corr, Vec2::zero());
    }

    #[test]
    fn callbacks_need_both_sides_and_panics_are_caught() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = |name: &'static str| {
            let calls = calls.clone();
            Interactable::new(move |mover, target| calls.lock().push((name, mover, target)))
        };
        let a = solid_box(&mut world, &index, 0.0, 0.0);
        let b = solid_box(&mut world, &index, 30.0, 0.0);
        world.insert_one(a, recorder("a")).unwrap();
        let poly = rect(0.0, 0.0, 40.0).to_polygon();
        let run = |world: &hecs::World| {
            correction(
                ctx(world, &index, &config),
                world.entity(a).unwrap(),
                Vec2::zero(),
                Vec2::new(1.0, 0.0),
                &poly,
                [b],
            )
        };

        // only one side is interactable
        assert!(run(&world).is_ok());
        assert!(calls.lock().is_empty());

        world.insert_one(b, recorder("b")).unwrap();
        assert!(run(&world).is_ok());
        assert_eq!(*calls.lock(), vec![("a", a, b), ("b", a, b)]);

        world
            .insert_one(b, Interactable::new(|_, _| panic!("boom")))
            .unwrap();
        assert_eq!(run(&world), Err(StepError::CallbackPanicked(a, b)));
    }

    #[test]
    fn nearest_contact_is_resolved_first() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let a = solid_box(&mut world, &index, 0.0, 0.0);
        // straight ahead
        let near = solid_box(&mut world, &index, 45.0, 0.0);
        // barely clipped by the corner of the full sweep
        let far = solid_box(&mut world, &index, 47.0, 39.0);
        let poly = rect(0.0, 0.0, 40.0).to_polygon();
        let vel = Vec2::new(10.0, 0.0);
        let corr = |candidates: &[hecs::Entity]| {
            correction(
                ctx(&world, &index, &config),
                world.entity(a).unwrap(),
                Vec2::zero(),
                vel,
                &poly,
                candidates.iter().copied(),
            )
            .unwrap()
        };

        // on its own the far box pushes downwards
        assert!(corr(&[far]).y < -0.9);
        // stopping short of the near box also misses the far one
        assert_eq!(corr(&[far, near]), Vec2::new(-5.0, 0.0));
        assert_eq!(corr(&[near, far]), Vec2::new(-5.0, 0.0));
    }

    #[test]
    fn two_contacts_both_push() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let a = solid_box(&mut world, &index, 0.0, 0.0);
        let right = solid_box(&mut world, &index, 45.0, 0.0);
        let above = solid_box(&mut world, &index, 0.0, 46.0);
        let poly = rect(0.0, 0.0, 40.0).to_polygon();
        let vel = Vec2::new(10.0, 10.0);

        let corr = correction(
            ctx(&world, &index, &config),
            world.entity(a).unwrap(),
            Vec2::zero(),
            vel,
            &poly,
            [above, right],
        )
        .unwrap();
        // the nearer box on the right takes x, the one above then takes y
        // out of what's left of the sweep
        assert_eq!(corr, Vec2::new(-5.0, -4.0));
        assert!((vel + corr).mag() <= vel.mag());
    }

    #[test]
    fn step_slows_down_and_sleeps() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let e = world.spawn((Position(Vec2::zero()), Velocity(Vec2::new(1.0, 0.04))));

        let step = step_entity(ctx(&world, &index, &config), e).unwrap();
        assert_eq!(
            step.outcome,
            StepOutcome::Move {
                position: Vec2::new(1.0, 0.0),
                velocity: Vec2::new(0.75, 0.0),
                shape: None,
                relocation: Relocation::None,
            }
        );

        world.insert_one(e, Velocity(Vec2::new(0.049, -0.049))).unwrap();
        let step = step_entity(ctx(&world, &index, &config), e).unwrap();
        assert_eq!(step.outcome, StepOutcome::Sleep);

        world.remove_one::<Velocity>(e).unwrap();
        assert_eq!(
            step_entity(ctx(&world, &index, &config), e),
            Err(StepError::MissingComponent {
                entity: e,
                kind: ComponentKind::Velocity
            })
        );
    }

    #[test]
    fn moving_across_a_cell_border_relocates() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(256.0);
        let config = PhysicsConfig::default();
        let shape = rect(100.0, 0.0, 10.0);
        let e = world.spawn((
            Position(Vec2::new(100.0, 0.0)),
            Velocity(Vec2::new(50.0, 0.0)),
            CollisionShape(shape.clone()),
        ));
        index.add_entity(e, Some(&shape));

        let step = step_entity(ctx(&world, &index, &config), e).unwrap();
        match step.outcome {
            StepOutcome::Move { relocation, shape, .. } => {
                assert_eq!(relocation, Relocation::Footprint(Footprint::from([(1, 0)])));
                assert_eq!(shape.map(|s| s.centre()), Some(Vec2::new(150.0, 0.0)));
            }
            other => panic!("expected a move, got {:?}", other),
        }

        let imprecise = PhysicsConfig {
            precise_mode: false,
            ..Default::default()
        };
        let step = step_entity(ctx(&world, &index, &imprecise), e).unwrap();
        assert!(matches!(
            step.outcome,
            StepOutcome::Move {
                relocation: Relocation::Recompute,
                ..
            }
        ));
    }
}
