//! Separating axis tests between convex polygons.

use super::shape::Polygon;
use crate::math::{self as m, Unit};

/// Projections must overlap by more than this to count as touching.
pub const OVERLAP_EPSILON: f64 = 1e-6;

/// An intersection between two polygons.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// The normal, facing away from the first polygon
    pub normal: Unit<m::Vec2>,
    /// Penetration depth along the normal, always positive
    pub depth: f64,
}

impl Contact {
    /// The minimum translation vector: how far the second polygon
    /// would need to move along the normal to stop overlapping.
    #[inline]
    pub fn mtv(&self) -> m::Vec2 {
        *self.normal * self.depth
    }
}

#[derive(Clone, Copy, Debug)]
struct Projection {
    min: f64,
    max: f64,
}

impl Projection {
    fn of(poly: &Polygon, axis: m::Vec2) -> Self {
        let (min, max) = poly.project(axis);
        Projection { min, max }
    }

    #[inline]
    fn overlap(&self, other: &Self) -> f64 {
        self.max.min(other.max) - self.min.max(other.min)
    }

    #[inline]
    fn inside(&self, other: &Self) -> bool {
        self.min >= other.min && self.max <= other.max
    }
}

/// Check two convex polygons for intersection.
///
/// Every edge normal of both polygons is tested as a separating axis.
/// When the polygons overlap on all of them, the contact normal is the axis
/// with the smallest push-out distance, oriented from `a` towards `b`.
/// If one polygon is entirely inside the other, the normal instead points
/// from the centre of `a` to the centre of `b`.
pub fn intersects_sat(a: &Polygon, b: &Polygon) -> Option<Contact> {
    let mut min_depth = f64::MAX;
    let mut min_axis: Option<Unit<m::Vec2>> = None;
    let mut a_in_b = true;
    let mut b_in_a = true;

    for axis in a.edge_normals().chain(b.edge_normals()) {
        let proj_a = Projection::of(a, *axis);
        let proj_b = Projection::of(b, *axis);
        if proj_a.overlap(&proj_b) <= OVERLAP_EPSILON {
            return None;
        }
        a_in_b &= proj_a.inside(&proj_b);
        b_in_a &= proj_b.inside(&proj_a);

        // distance needed to push out in either direction, which also
        // covers the case where one projection contains the other
        let depth = (proj_b.max - proj_a.min).min(proj_a.max - proj_b.min);
        if depth < min_depth {
            min_depth = depth;
            min_axis = Some(axis);
        }
    }

    let min_axis = min_axis?;
    if min_depth <= 0.0 {
        return None;
    }

    let centre_dist = b.centre() - a.centre();
    let normal = if a_in_b || b_in_a {
        match Unit::try_new(centre_dist) {
            Some(dir) => dir,
            None => min_axis,
        }
    } else if centre_dist.dot(*min_axis) < 0.0 {
        -min_axis
    } else {
        min_axis
    };

    Some(Contact {
        normal,
        depth: min_depth,
    })
}

/// Boolean version of [`intersects_sat`].
pub fn overlaps(a: &Polygon, b: &Polygon) -> bool {
    a.edge_normals().chain(b.edge_normals()).all(|axis| {
        Projection::of(a, *axis).overlap(&Projection::of(b, *axis)) > OVERLAP_EPSILON
    })
}
