//! Read-only copies of parts of the spatial index for consumers outside the physics tick.

use std::collections::{BTreeMap, HashSet};

use super::{
    footprint::{self, Cell},
    shape::Polygon,
};
use crate::math::Vec2;

/// An immutable copy of the spatial index within a region, usually a camera's view.
///
/// Built once per frame with [`SpatialIndex::snapshot_region`][super::SpatialIndex::snapshot_region]
/// so that rendering can look at entity positions without holding up the physics tick.
#[derive(Clone, Debug)]
pub struct RegionSnapshot {
    region: Polygon,
    cell_size: f64,
    cells: BTreeMap<Cell, Vec<hecs::Entity>>,
    awake: HashSet<hecs::Entity>,
}

impl RegionSnapshot {
    pub(crate) fn new(
        region: Polygon,
        cell_size: f64,
        cells: Vec<(Cell, Vec<hecs::Entity>)>,
        awake: HashSet<hecs::Entity>,
    ) -> Self {
        Self {
            region,
            cell_size,
            cells: cells.into_iter().collect(),
            awake,
        }
    }

    /// An empty snapshot, for before the first one has been taken.
    pub fn empty(cell_size: f64) -> Self {
        Self::new(
            Polygon::from_aabb(footprint::cell_bounds((0, 0), cell_size)),
            cell_size,
            Vec::new(),
            HashSet::new(),
        )
    }

    /// The polygon this snapshot was taken with.
    #[inline]
    pub fn region(&self) -> &Polygon {
        &self.region
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Occupied cells in the region along with their entities.
    pub fn cells(&self) -> impl '_ + Iterator<Item = (Cell, &[hecs::Entity])> {
        self.cells.iter().map(|(c, es)| (*c, es.as_slice()))
    }

    pub fn entities_in_cell(&self, cell: Cell) -> &[hecs::Entity] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entities_near(&self, point: Vec2) -> &[hecs::Entity] {
        self.entities_in_cell(footprint::cell_of(point, self.cell_size))
    }

    /// Every distinct entity in the region.
    pub fn entities(&self) -> HashSet<hecs::Entity> {
        self.cells.values().flatten().copied().collect()
    }

    /// Whether an entity was awake when the snapshot was taken.
    #[inline]
    pub fn is_awake(&self, entity: hecs::Entity) -> bool {
        self.awake.contains(&entity)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
