use itertools::Itertools;

use crate::math::{self as m, Angle, Vec2};

/// Number of vertices used to approximate a circle as a polygon.
pub const CIRCLE_RESOLUTION: usize = 16;

/// Error when constructing a shape from invalid input.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("A polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("Shape has a non-finite coordinate")]
    NonFinite,
    #[error("Shape dimensions must be positive, got {0}")]
    NonPositiveSize(f64),
    #[error("Polygon points don't form a convex shape")]
    NotConvex,
}

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }
}

//
// Polygon
//

/// A convex polygon.
///
/// Vertices are kept sorted counterclockwise around the vertex average,
/// which is also what [`centre`][Self::centre] returns.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    points: Vec<Vec2>,
    centre: Vec2,
    bounds: AABB,
}

impl Polygon {
    /// Create a polygon from the vertices of a convex shape, given in any order.
    ///
    /// Use [`hull_of`][Self::hull_of] to wrap arbitrary points instead.
    pub fn new(points: impl Into<Vec<Vec2>>) -> Result<Self, ShapeError> {
        let points = points.into();
        if points.len() < 3 {
            return Err(ShapeError::TooFewPoints(points.len()));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ShapeError::NonFinite);
        }
        let poly = Self::from_valid_points(points);
        if !poly.is_convex() {
            return Err(ShapeError::NotConvex);
        }
        Ok(poly)
    }

    /// The smallest convex polygon containing every given point.
    pub fn hull_of(points: impl IntoIterator<Item = Vec2>) -> Result<Self, ShapeError> {
        let mut all: Vec<Vec2> = points.into_iter().collect();
        if all.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ShapeError::NonFinite);
        }
        all.sort_by(|a, b| a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y)));
        all.dedup();

        // Andrew's monotone chain
        let mut hull: Vec<Vec2> = Vec::with_capacity(all.len() + 1);
        for pass in 0..2 {
            let start_len = hull.len();
            let iter: Box<dyn Iterator<Item = &Vec2>> = if pass == 0 {
                Box::new(all.iter())
            } else {
                Box::new(all.iter().rev())
            };
            for &p in iter {
                while hull.len() >= start_len + 2 {
                    let a = hull[hull.len() - 2];
                    let b = hull[hull.len() - 1];
                    if m::cross(b - a, p - a) <= 0.0 {
                        hull.pop();
                    } else {
                        break;
                    }
                }
                hull.push(p);
            }
            // last point of each chain is the first of the next
            hull.pop();
        }

        if hull.len() < 3 {
            return Err(ShapeError::TooFewPoints(hull.len()));
        }
        Ok(Self::from_valid_points(hull))
    }

    /// Create an axis-aligned rectangle polygon.
    pub fn rect(centre: Vec2, width: f64, height: f64) -> Result<Self, ShapeError> {
        RotatedRect::new(centre, width, height, Angle::default()).map(|r| r.to_polygon())
    }

    /// The polygon covering exactly an axis-aligned box.
    pub fn from_aabb(aabb: AABB) -> Self {
        let points = vec![
            aabb.min,
            Vec2::new(aabb.max.x, aabb.min.y),
            aabb.max,
            Vec2::new(aabb.min.x, aabb.max.y),
        ];
        Polygon {
            centre: (aabb.min + aabb.max) / 2.0,
            points,
            bounds: aabb,
        }
    }

    // caller guarantees at least 3 finite points
    fn from_valid_points(mut points: Vec<Vec2>) -> Self {
        let sum = points.iter().fold(Vec2::zero(), |acc, p| acc + *p);
        let centre = sum / points.len() as f64;
        points.sort_by(|a, b| {
            let ang_a = (a.y - centre.y).atan2(a.x - centre.x);
            let ang_b = (b.y - centre.y).atan2(b.x - centre.x);
            ang_a.total_cmp(&ang_b).then_with(|| {
                (*a - centre)
                    .mag_sq()
                    .total_cmp(&(*b - centre).mag_sq())
            })
        });
        let bounds = bounds_of(&points);
        Polygon {
            points,
            centre,
            bounds,
        }
    }

    #[inline]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    #[inline]
    pub fn centre(&self) -> Vec2 {
        self.centre
    }

    #[inline]
    pub fn bounding_box(&self) -> AABB {
        self.bounds
    }

    /// Iterate over the edges of the polygon as (start, end) pairs.
    pub fn edges(&self) -> impl '_ + Iterator<Item = (Vec2, Vec2)> {
        self.points
            .iter()
            .copied()
            .circular_tuple_windows::<(Vec2, Vec2)>()
    }

    /// Unit normals of every non-degenerate edge.
    pub fn edge_normals(&self) -> impl '_ + Iterator<Item = m::Unit<Vec2>> {
        self.edges()
            .filter_map(|(start, end)| m::Unit::try_new(m::left_normal(end - start)))
    }

    /// Project every vertex on an axis, returning (min, max).
    pub fn project(&self, axis: Vec2) -> (f64, f64) {
        self.points
            .iter()
            .map(|p| p.dot(axis))
            .fold((f64::MAX, f64::MIN), |(min, max), d| (min.min(d), max.max(d)))
    }

    /// A copy of this polygon moved by `offset`.
    pub fn translated(&self, offset: Vec2) -> Self {
        Polygon {
            points: self.points.iter().map(|p| *p + offset).collect(),
            centre: self.centre + offset,
            bounds: AABB {
                min: self.bounds.min + offset,
                max: self.bounds.max + offset,
            },
        }
    }

    /// A copy of this polygon moved so that its centre is at `centre`.
    #[inline]
    pub fn recentred(&self, centre: Vec2) -> Self {
        self.translated(centre - self.centre)
    }

    /// Smallest convex polygon containing both this one and `other`.
    ///
    /// Used to build the area an object sweeps through when it moves.
    pub fn convex_hull(&self, other: &Polygon) -> Result<Self, ShapeError> {
        Self::hull_of(self.points.iter().chain(&other.points).copied())
    }

    // every turn along the boundary goes counterclockwise (or straight)
    fn is_convex(&self) -> bool {
        self.points
            .iter()
            .copied()
            .circular_tuple_windows::<(Vec2, Vec2, Vec2)>()
            .all(|(a, b, c)| {
                let (e1, e2) = (b - a, c - b);
                m::cross(e1, e2) >= -1e-9 * e1.mag() * e2.mag()
            })
    }

    /// Check if a point is inside the polygon or on its boundary.
    pub fn contains(&self, point: Vec2) -> bool {
        if !self.bounds.contains_point(point) {
            return false;
        }
        self.edges()
            .all(|(start, end)| m::cross(end - start, point - start) >= -1e-9)
    }

    /// The vertex closest to a point.
    pub fn closest_vertex(&self, point: Vec2) -> Vec2 {
        self.points
            .iter()
            .copied()
            .min_by(|a, b| (*a - point).mag_sq().total_cmp(&(*b - point).mag_sq()))
            .unwrap_or(self.centre)
    }

    /// The point on the polygon's boundary closest to a point.
    pub fn closest_boundary_point(&self, point: Vec2) -> Vec2 {
        self.edges()
            .map(|(start, end)| {
                let edge = end - start;
                let len_sq = edge.mag_sq();
                if len_sq == 0.0 {
                    return start;
                }
                let t = ((point - start).dot(edge) / len_sq).clamp(0.0, 1.0);
                start + edge * t
            })
            .min_by(|a, b| (*a - point).mag_sq().total_cmp(&(*b - point).mag_sq()))
            .unwrap_or(self.centre)
    }
}

fn bounds_of(points: &[Vec2]) -> AABB {
    let mut min = Vec2::new(f64::MAX, f64::MAX);
    let mut max = Vec2::new(f64::MIN, f64::MIN);
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    AABB { min, max }
}

//
// Rect
//

/// A rectangle that can be rotated around its centre.
///
/// Stores its side lengths halved because this makes corner computation easier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatedRect {
    centre: Vec2,
    hw: f64,
    hh: f64,
    angle: f64,
}

impl RotatedRect {
    pub fn new(centre: Vec2, width: f64, height: f64, angle: Angle) -> Result<Self, ShapeError> {
        check_finite(centre)?;
        for side in [width, height] {
            if !side.is_finite() {
                return Err(ShapeError::NonFinite);
            }
            if side <= 0.0 {
                return Err(ShapeError::NonPositiveSize(side));
            }
        }
        Ok(Self {
            centre,
            hw: width / 2.0,
            hh: height / 2.0,
            angle: angle.rad(),
        })
    }

    #[inline]
    pub fn centre(&self) -> Vec2 {
        self.centre
    }

    #[inline]
    pub fn set_centre(&mut self, centre: Vec2) {
        self.centre = centre;
    }

    #[inline]
    pub fn angle(&self) -> Angle {
        Angle::Rad(self.angle)
    }

    #[inline]
    pub fn set_angle(&mut self, angle: Angle) {
        self.angle = angle.rad();
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.hw * 2.0
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.hh * 2.0
    }

    pub fn corners(&self) -> [Vec2; 4] {
        let rot = m::Rotor2::from_angle(self.angle);
        [
            Vec2::new(self.hw, self.hh),
            Vec2::new(-self.hw, self.hh),
            Vec2::new(-self.hw, -self.hh),
            Vec2::new(self.hw, -self.hh),
        ]
        .map(|corner| self.centre + rot * corner)
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::from_valid_points(self.corners().to_vec())
    }
}

//
// Circle
//

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    centre: Vec2,
    r: f64,
}

impl Circle {
    pub fn new(centre: Vec2, radius: f64) -> Result<Self, ShapeError> {
        check_finite(centre)?;
        if !radius.is_finite() {
            return Err(ShapeError::NonFinite);
        }
        if radius <= 0.0 {
            return Err(ShapeError::NonPositiveSize(radius));
        }
        Ok(Self { centre, r: radius })
    }

    #[inline]
    pub fn centre(&self) -> Vec2 {
        self.centre
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.r
    }

    pub fn to_polygon(&self) -> Polygon {
        let step = std::f64::consts::TAU / CIRCLE_RESOLUTION as f64;
        let points = (0..CIRCLE_RESOLUTION)
            .map(|i| {
                let ang = step * i as f64;
                self.centre + Vec2::new(ang.cos(), ang.sin()) * self.r
            })
            .collect();
        Polygon::from_valid_points(points)
    }
}

fn check_finite(v: Vec2) -> Result<(), ShapeError> {
    if v.x.is_finite() && v.y.is_finite() {
        Ok(())
    } else {
        Err(ShapeError::NonFinite)
    }
}

//
// Shape
//

/// The collision geometry of an object.
///
/// Every variant can be converted to a convex [`Polygon`],
/// which is what the spatial index and narrow phase work with.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Polygon(Polygon),
    Rect(RotatedRect),
    Circle(Circle),
}

impl Shape {
    /// Convenience constructor for an axis-aligned rectangle.
    pub fn rect(centre: Vec2, width: f64, height: f64) -> Result<Self, ShapeError> {
        RotatedRect::new(centre, width, height, Angle::default()).map(Shape::Rect)
    }

    pub fn circle(centre: Vec2, radius: f64) -> Result<Self, ShapeError> {
        Circle::new(centre, radius).map(Shape::Circle)
    }

    pub fn polygon(points: impl Into<Vec<Vec2>>) -> Result<Self, ShapeError> {
        Polygon::new(points).map(Shape::Polygon)
    }

    pub fn to_polygon(&self) -> Polygon {
        match self {
            Shape::Polygon(p) => p.clone(),
            Shape::Rect(r) => r.to_polygon(),
            Shape::Circle(c) => c.to_polygon(),
        }
    }

    pub fn centre(&self) -> Vec2 {
        match self {
            Shape::Polygon(p) => p.centre(),
            Shape::Rect(r) => r.centre(),
            Shape::Circle(c) => c.centre(),
        }
    }

    /// Move the shape so that its centre is at `centre`.
    pub fn set_centre(&mut self, centre: Vec2) {
        match self {
            Shape::Polygon(p) => *p = p.recentred(centre),
            Shape::Rect(r) => r.set_centre(centre),
            Shape::Circle(c) => c.centre = centre,
        }
    }

    /// A copy of the shape with its centre at `centre`.
    pub fn with_centre(&self, centre: Vec2) -> Self {
        let mut moved = self.clone();
        moved.set_centre(centre);
        moved
    }

    pub fn contains(&self, point: Vec2) -> bool {
        match self {
            Shape::Circle(c) => (point - c.centre).mag_sq() <= c.r * c.r,
            Shape::Rect(r) => r.to_polygon().contains(point),
            Shape::Polygon(p) => p.contains(point),
        }
    }

    /// The point on the shape's outline closest to `point`.
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        match self {
            Shape::Circle(c) => match m::Unit::try_new(point - c.centre) {
                Some(dir) => c.centre + *dir * c.r,
                None => c.centre + Vec2::unit_x() * c.r,
            },
            Shape::Rect(r) => r.to_polygon().closest_boundary_point(point),
            Shape::Polygon(p) => p.closest_boundary_point(point),
        }
    }
}

impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}

impl From<RotatedRect> for Shape {
    fn from(r: RotatedRect) -> Self {
        Shape::Rect(r)
    }
}

impl From<Circle> for Shape {
    fn from(c: Circle) -> Self {
        Shape::Circle(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vec2 {
        Vec2::new(x, y)
    }

    #[test]
    fn rejects_degenerate_polygons() {
        assert_eq!(
            Polygon::new(vec![v(0.0, 0.0), v(1.0, 0.0)]),
            Err(ShapeError::TooFewPoints(2))
        );
        assert_eq!(
            Polygon::new(vec![v(0.0, 0.0), v(1.0, f64::NAN), v(0.0, 1.0)]),
            Err(ShapeError::NonFinite)
        );
        assert!(matches!(
            Shape::circle(v(0.0, 0.0), 0.0),
            Err(ShapeError::NonPositiveSize(_))
        ));
    }

    #[test]
    fn concave_points_are_rejected_or_wrapped() {
        // a V with a notch cut into the top
        let v_shape = vec![
            v(-5.0, 10.0),
            v(-2.0, 10.0),
            v(0.0, 4.0),
            v(2.0, 10.0),
            v(5.0, 10.0),
            v(0.0, 0.0),
        ];
        assert_eq!(Polygon::new(v_shape.clone()), Err(ShapeError::NotConvex));
        assert!(matches!(
            Shape::polygon(v_shape.clone()),
            Err(ShapeError::NotConvex)
        ));

        let hull = Polygon::hull_of(v_shape).unwrap();
        assert_eq!(hull.points().len(), 3);
        // the notch is filled in
        assert!(hull.contains(v(0.0, 7.0)));

        // collinear points have no area to wrap
        assert_eq!(
            Polygon::hull_of([v(0.0, 0.0), v(1.0, 1.0), v(2.0, 2.0)]),
            Err(ShapeError::TooFewPoints(2))
        );
    }

    #[test]
    fn points_are_sorted_counterclockwise() {
        let p = Polygon::new(vec![v(1.0, 1.0), v(-1.0, -1.0), v(1.0, -1.0), v(-1.0, 1.0)])
            .unwrap();
        assert_eq!(p.centre(), v(0.0, 0.0));
        for (start, end) in p.edges() {
            // every other vertex is on the left side of a ccw edge
            for other in p.points() {
                assert!(m::cross(end - start, *other - start) >= 0.0);
            }
        }
    }

    #[test]
    fn translate_and_recentre() {
        let p = Polygon::rect(v(0.0, 0.0), 2.0, 2.0).unwrap();
        let moved = p.translated(v(3.0, -1.0));
        assert_eq!(moved.centre(), v(3.0, -1.0));
        assert_eq!(moved.bounding_box().min, v(2.0, -2.0));
        let back = moved.recentred(v(0.0, 0.0));
        for (a, b) in back.points().iter().zip(p.points()) {
            assert!((*a - *b).mag() < 1e-12);
        }
    }

    #[test]
    fn hull_of_swept_rect() {
        let p = Polygon::rect(v(0.0, 0.0), 2.0, 2.0).unwrap();
        let swept = p.convex_hull(&p.translated(v(4.0, 0.0))).unwrap();
        assert_eq!(swept.points().len(), 4);
        let bb = swept.bounding_box();
        assert_eq!(bb.min, v(-1.0, -1.0));
        assert_eq!(bb.max, v(5.0, 1.0));

        let diag = p.convex_hull(&p.translated(v(4.0, 4.0))).unwrap();
        assert_eq!(diag.points().len(), 6);
        assert!(diag.contains(v(2.0, 2.0)));
        assert!(!diag.contains(v(4.0, -0.5)));
    }

    #[test]
    fn containment_and_closest_points() {
        let r = Shape::Rect(RotatedRect::new(v(0.0, 0.0), 4.0, 2.0, Angle::Deg(90.0)).unwrap());
        // rotated by 90 degrees, so it's tall now
        assert!(r.contains(v(0.0, 1.9)));
        assert!(!r.contains(v(1.9, 0.0)));

        let c = Shape::circle(v(1.0, 1.0), 2.0).unwrap();
        let closest = c.closest_point(v(10.0, 1.0));
        assert!((closest - v(3.0, 1.0)).mag() < 1e-12);

        let p = Polygon::rect(v(0.0, 0.0), 2.0, 2.0).unwrap();
        assert!((p.closest_boundary_point(v(0.0, 5.0)) - v(0.0, 1.0)).mag() < 1e-12);
        assert_eq!(p.closest_vertex(v(5.0, 5.0)), v(1.0, 1.0));
    }

    #[test]
    fn set_centre_on_every_variant() {
        let shapes = [
            Shape::rect(v(0.0, 0.0), 2.0, 2.0).unwrap(),
            Shape::circle(v(0.0, 0.0), 1.0).unwrap(),
            Shape::polygon(vec![v(-1.0, -1.0), v(1.0, -1.0), v(0.0, 2.0)]).unwrap(),
        ];
        for s in shapes {
            let moved = s.with_centre(v(10.0, 20.0));
            assert!((moved.centre() - v(10.0, 20.0)).mag() < 1e-9);
            assert!((moved.to_polygon().centre() - v(10.0, 20.0)).mag() < 1e-9);
        }
    }
}
