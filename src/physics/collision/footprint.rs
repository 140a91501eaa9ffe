//! Rasterization of polygons into the grid cells they overlap.

use std::{collections::BTreeSet, ops::RangeInclusive};

use super::{
    narrowphase::overlaps,
    shape::{Polygon, AABB},
};
use crate::math::Vec2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Integer coordinates of a grid cell.
///
/// Cell `(i, j)` is the square of side `cell_size`
/// centred on `(i * cell_size, j * cell_size)`.
pub type Cell = (i64, i64);

/// The set of cells a polygon overlaps.
///
/// Ordered so that two footprints compare equal exactly when they cover the same cells.
pub type Footprint = BTreeSet<Cell>;

/// Bounding boxes spanning more rows than this are rasterized in parallel.
#[cfg(feature = "parallel")]
const PARALLEL_ROW_THRESHOLD: i64 = 8;

/// The cell a point falls in.
#[inline]
pub fn cell_of(point: Vec2, cell_size: f64) -> Cell {
    (
        (point.x / cell_size + 0.5).floor() as i64,
        (point.y / cell_size + 0.5).floor() as i64,
    )
}

/// The area covered by a cell as an axis-aligned box.
#[inline]
pub fn cell_bounds(cell: Cell, cell_size: f64) -> AABB {
    let centre = Vec2::new(cell.0 as f64 * cell_size, cell.1 as f64 * cell_size);
    let half = Vec2::broadcast(cell_size / 2.0);
    AABB {
        min: centre - half,
        max: centre + half,
    }
}

/// Compute the exact set of cells a polygon overlaps.
///
/// Every cell in the polygon's bounding box, expanded by one cell in each direction,
/// is tested against the polygon with a separating axis test.
pub fn rasterize(poly: &Polygon, cell_size: f64) -> Footprint {
    let bounds = poly.bounding_box();
    let (min_i, min_j) = cell_of(bounds.min, cell_size);
    let (max_i, max_j) = cell_of(bounds.max, cell_size);
    collect_rows(
        poly,
        (min_i - 1)..=(max_i + 1),
        (min_j - 1)..=(max_j + 1),
        cell_size,
    )
}

fn row_cells(
    poly: &Polygon,
    cols: RangeInclusive<i64>,
    j: i64,
    cell_size: f64,
) -> impl '_ + Iterator<Item = Cell> {
    cols.filter_map(move |i| {
        let cell_poly = Polygon::from_aabb(cell_bounds((i, j), cell_size));
        overlaps(&cell_poly, poly).then_some((i, j))
    })
}

#[cfg(feature = "parallel")]
fn collect_rows(
    poly: &Polygon,
    cols: RangeInclusive<i64>,
    rows: RangeInclusive<i64>,
    cell_size: f64,
) -> Footprint {
    if rows.end() - rows.start() > PARALLEL_ROW_THRESHOLD {
        rows.into_par_iter()
            .flat_map_iter(|j| row_cells(poly, cols.clone(), j, cell_size))
            .collect()
    } else {
        rows.flat_map(|j| row_cells(poly, cols.clone(), j, cell_size))
            .collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn collect_rows(
    poly: &Polygon,
    cols: RangeInclusive<i64>,
    rows: RangeInclusive<i64>,
    cell_size: f64,
) -> Footprint {
    rows.flat_map(|j| row_cells(poly, cols.clone(), j, cell_size))
        .collect()
}

/// Cells an entity joins and leaves when its footprint changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FootprintDiff {
    pub joined: Vec<Cell>,
    pub left: Vec<Cell>,
}

pub fn diff(old: &Footprint, new: &Footprint) -> FootprintDiff {
    FootprintDiff {
        joined: new.difference(old).copied().collect(),
        left: old.difference(new).copied().collect(),
    }
}
