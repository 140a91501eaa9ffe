use crate::math::Vec2;

/// A (possibly) position-dependent force that is added to the velocity
/// of every gravity-affected entity each tick.
pub trait ForceField: Send + Sync {
    fn value_at(&self, position: Vec2) -> Vec2;
}

/// A combination of two different force fields.
pub struct Sum<F1: ForceField, F2: ForceField>(pub F1, pub F2);
impl<F1: ForceField, F2: ForceField> ForceField for Sum<F1, F2> {
    fn value_at(&self, pos: Vec2) -> Vec2 {
        self.0.value_at(pos) + self.1.value_at(pos)
    }
}

/// Constant gravity field over all of space.
pub struct Gravity(pub Vec2);
impl Gravity {
    /// Downwards gravity of the given strength.
    pub fn downwards(level: f64) -> Self {
        Gravity(Vec2::new(0.0, -level))
    }
}
impl ForceField for Gravity {
    fn value_at(&self, _pos: Vec2) -> Vec2 {
        self.0
    }
}

/// Gravity that pulls towards a specific point in space.
///
/// With a negative `strength` value this can also be a repulsive force.
pub struct PointGravity {
    /// The position of the gravity source.
    pub position: Vec2,
    /// The strength of gravity at the source.
    pub strength: f64,
    /// How quickly gravity falls off with distance.
    pub falloff: f64,
}
impl ForceField for PointGravity {
    fn value_at(&self, pos: Vec2) -> Vec2 {
        let dist = self.position - pos;
        if dist == Vec2::zero() {
            return Vec2::zero();
        }
        // + 1.0 so that the divisor is 1 at the source
        let strength = self.strength / ((dist.mag_sq() + 1.0) * self.falloff);
        strength * dist.normalized()
    }
}
