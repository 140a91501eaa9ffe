//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    /// Normalize the vector, or return None if it's too short to have a direction.
    pub fn try_new(v: Vec2) -> Option<Self> {
        let mag = v.mag();
        if mag > f64::EPSILON && mag.is_finite() {
            Some(Unit(v / mag))
        } else {
            None
        }
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Cut a number down to `decimals` decimal places, rounding towards zero.
///
/// Truncating instead of rounding to nearest means repeated damping
/// always reaches exactly zero instead of hovering at the last decimal.
#[inline]
pub fn truncate_decimals(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = x * scale;
    // snap values like 28.999999999999996 that are whole numbers in decimal
    let nearest = scaled.round();
    if (scaled - nearest).abs() < 1e-9 {
        nearest / scale
    } else {
        scaled.trunc() / scale
    }
}

/// [`truncate_decimals`] applied to both components of a vector.
#[inline]
pub fn truncate_vec(v: Vec2, decimals: i32) -> Vec2 {
    Vec2::new(
        truncate_decimals(v.x, decimals),
        truncate_decimals(v.y, decimals),
    )
}

/// Shorten a vector to at most `max_len`, keeping its direction.
#[inline]
pub fn clamp_mag(v: Vec2, max_len: f64) -> Vec2 {
    let mag = v.mag();
    if mag > max_len && mag > 0.0 {
        v * (max_len / mag)
    } else {
        v
    }
}

/// 2D cross product, i.e. the z component of the 3D cross product.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}
