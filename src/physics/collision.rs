pub mod shape;
pub use shape::{Circle, Polygon, RotatedRect, Shape, ShapeError, AABB};

pub mod narrowphase;
pub use narrowphase::{intersects_sat, overlaps, Contact};

pub mod footprint;
pub use footprint::{Cell, Footprint};

mod spatialindex;
pub use spatialindex::{Activity, Removed, SpatialIndex};

pub mod query;
pub use query::RegionSnapshot;
