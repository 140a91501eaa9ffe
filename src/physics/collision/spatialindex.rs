//! The spatial index keeps track of which grid cells each entity's shape overlaps,
//! and which entities are currently awake.

use std::{
    collections::{hash_map::RandomState, HashMap, HashSet},
    hash::{BuildHasher, Hash},
};

use parking_lot::Mutex;

use super::{
    footprint::{self, Cell, Footprint},
    query::RegionSnapshot,
    shape::{Polygon, Shape},
};
use crate::math::Vec2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Number of independently locked partitions of each internal map.
const SHARD_COUNT: usize = 32;

/// Whether an entity takes part in the physics tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activity {
    Awake,
    Asleep,
}

/// Which partition an entity was in when it got removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removed {
    None,
    Asleep,
    Awake,
}

#[derive(Clone, Debug)]
struct Location {
    footprint: Footprint,
    activity: Activity,
}

type CellShard = HashMap<Cell, HashSet<hecs::Entity>>;
type RecordShard = HashMap<hecs::Entity, Location>;

/// A uniform grid mapping cells to the entities whose shapes overlap them.
///
/// Every tracked entity has exactly one location record holding its footprint
/// and whether it's awake or asleep. An entity is in the set of a cell
/// if and only if that cell is in its footprint.
///
/// Both the grid and the location records are split into shards behind their own locks,
/// so all operations take `&self` and operations on different entities
/// can run in parallel. Operations on the same entity must not overlap.
pub struct SpatialIndex {
    cell_size: f64,
    hasher: RandomState,
    cells: Vec<Mutex<CellShard>>,
    records: Vec<Mutex<RecordShard>>,
}

impl SpatialIndex {
    /// Create an empty index. `cell_size` must be positive.
    pub fn new(cell_size: f64) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        Self {
            cell_size,
            hasher: RandomState::new(),
            cells: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            records: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[inline]
    fn shard_of(&self, key: impl Hash) -> usize {
        (self.hasher.hash_one(key) as usize) % SHARD_COUNT
    }

    #[inline]
    fn cell_shard(&self, cell: Cell) -> &Mutex<CellShard> {
        &self.cells[self.shard_of(cell)]
    }

    #[inline]
    fn record_shard(&self, entity: hecs::Entity) -> &Mutex<RecordShard> {
        &self.records[self.shard_of(entity)]
    }

    //
    // mutation
    //

    /// Start tracking an entity, putting it in every cell its shape overlaps.
    ///
    /// New entities start out asleep. Adding an entity that is already tracked
    /// replaces its footprint and keeps it awake if it was awake.
    /// Returns false if no shape was given.
    pub fn add_entity(&self, entity: hecs::Entity, shape: Option<&Shape>) -> bool {
        let shape = match shape {
            Some(s) => s,
            None => return false,
        };
        let activity = match self.remove_entity(entity) {
            Removed::Awake => Activity::Awake,
            Removed::Asleep | Removed::None => Activity::Asleep,
        };
        let fp = footprint::rasterize(&shape.to_polygon(), self.cell_size);
        for &cell in &fp {
            self.cell_shard(cell)
                .lock()
                .entry(cell)
                .or_default()
                .insert(entity);
        }
        log::debug!("tracking {:?} in {} cells", entity, fp.len());
        self.record_shard(entity).lock().insert(
            entity,
            Location {
                footprint: fp,
                activity,
            },
        );
        true
    }

    /// Stop tracking an entity. Removing an untracked entity does nothing.
    pub fn remove_entity(&self, entity: hecs::Entity) -> Removed {
        let loc = match self.record_shard(entity).lock().remove(&entity) {
            Some(loc) => loc,
            None => return Removed::None,
        };
        for &cell in &loc.footprint {
            self.leave_cell(entity, cell);
        }
        log::debug!("stopped tracking {:?}", entity);
        match loc.activity {
            Activity::Awake => Removed::Awake,
            Activity::Asleep => Removed::Asleep,
        }
    }

    fn leave_cell(&self, entity: hecs::Entity, cell: Cell) {
        let mut shard = self.cell_shard(cell).lock();
        if let Some(set) = shard.get_mut(&cell) {
            set.remove(&entity);
            if set.is_empty() {
                shard.remove(&cell);
            }
        }
    }

    /// Recompute an entity's footprint from a new shape,
    /// joining cells it now overlaps and leaving the ones it no longer does.
    ///
    /// Returns false and does nothing if the entity isn't tracked.
    pub fn update(&self, entity: hecs::Entity, shape: &Shape) -> bool {
        if !self.contains(entity) {
            return false;
        }
        let fp = footprint::rasterize(&shape.to_polygon(), self.cell_size);
        self.relocate(entity, fp)
    }

    /// Replace an entity's footprint with one that was already computed.
    pub fn relocate(&self, entity: hecs::Entity, new_fp: Footprint) -> bool {
        let changes = {
            let mut records = self.record_shard(entity).lock();
            let loc = match records.get_mut(&entity) {
                Some(loc) => loc,
                None => return false,
            };
            if loc.footprint == new_fp {
                return true;
            }
            let changes = footprint::diff(&loc.footprint, &new_fp);
            loc.footprint = new_fp;
            changes
        };
        // join first so the entity is never briefly missing from a cell it's still in
        for &cell in &changes.joined {
            self.cell_shard(cell)
                .lock()
                .entry(cell)
                .or_default()
                .insert(entity);
        }
        for &cell in &changes.left {
            self.leave_cell(entity, cell);
        }
        true
    }

    /// Update a batch of entities at once, in parallel if the `parallel` feature is on.
    ///
    /// Every entity must appear at most once in the batch.
    /// Returns the number of entities that were tracked and got updated.
    pub fn update_many(&self, batch: &[(hecs::Entity, Shape)]) -> usize {
        #[cfg(feature = "parallel")]
        let iter = batch.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = batch.iter();
        iter.filter(|(entity, shape)| self.update(*entity, shape))
            .count()
    }

    /// Like [`update_many`][Self::update_many] with footprints that were already computed.
    pub fn relocate_many(&self, batch: Vec<(hecs::Entity, Footprint)>) -> usize {
        #[cfg(feature = "parallel")]
        let iter = batch.into_par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = batch.into_iter();
        iter.map(|(entity, fp)| self.relocate(entity, fp))
            .filter(|updated| *updated)
            .count()
    }

    fn set_activity(&self, entity: hecs::Entity, target: Activity) -> bool {
        match self.record_shard(entity).lock().get_mut(&entity) {
            Some(loc) if loc.activity != target => {
                loc.activity = target;
                true
            }
            _ => false,
        }
    }

    /// Move an entity to the asleep partition.
    /// Returns false if it was already asleep or isn't tracked.
    #[inline]
    pub fn sleep_entity(&self, entity: hecs::Entity) -> bool {
        self.set_activity(entity, Activity::Asleep)
    }

    /// Move an entity to the awake partition.
    /// Returns false if it was already awake or isn't tracked.
    #[inline]
    pub fn wake_entity(&self, entity: hecs::Entity) -> bool {
        self.set_activity(entity, Activity::Awake)
    }

    /// Rebuild every record with a different cell size.
    ///
    /// `shape_of` supplies the current shape of each tracked entity;
    /// entities it returns `None` for are dropped.
    /// Awake entities stay awake.
    pub fn resize(&mut self, cell_size: f64, shape_of: impl Fn(hecs::Entity) -> Option<Shape>) {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        let tracked: Vec<(hecs::Entity, Activity)> = self
            .records
            .iter_mut()
            .flat_map(|shard| shard.get_mut().drain())
            .map(|(entity, loc)| (entity, loc.activity))
            .collect();
        for shard in &mut self.cells {
            shard.get_mut().clear();
        }
        self.cell_size = cell_size;

        let mut dropped = 0;
        for (entity, activity) in tracked {
            if !self.add_entity(entity, shape_of(entity).as_ref()) {
                dropped += 1;
                continue;
            }
            if activity == Activity::Awake {
                self.wake_entity(entity);
            }
        }
        log::debug!(
            "resized spatial index to cell size {}, dropped {} entities",
            cell_size,
            dropped
        );
    }

    /// Stop tracking everything.
    pub fn clear(&mut self) {
        for shard in &mut self.cells {
            shard.get_mut().clear();
        }
        for shard in &mut self.records {
            shard.get_mut().clear();
        }
    }

    //
    // queries
    //

    /// All entities in the cells a polygon overlaps.
    pub fn entities_in(&self, poly: &Polygon) -> HashSet<hecs::Entity> {
        let mut found = HashSet::new();
        for cell in footprint::rasterize(poly, self.cell_size) {
            if let Some(set) = self.cell_shard(cell).lock().get(&cell) {
                found.extend(set.iter().copied());
            }
        }
        found
    }

    /// Entities in the cells a polygon overlaps that pass a filter,
    /// typically whether the entity is collidable.
    pub fn entities_in_filtered(
        &self,
        poly: &Polygon,
        filter: impl Fn(hecs::Entity) -> bool,
    ) -> HashSet<hecs::Entity> {
        let mut found = self.entities_in(poly);
        found.retain(|e| filter(*e));
        found
    }

    /// Entities in the cell containing a point.
    pub fn entities_near(&self, point: Vec2) -> HashSet<hecs::Entity> {
        let cell = footprint::cell_of(point, self.cell_size);
        self.entities_in_cell(cell)
    }

    pub fn entities_in_cell(&self, cell: Cell) -> HashSet<hecs::Entity> {
        self.cell_shard(cell)
            .lock()
            .get(&cell)
            .cloned()
            .unwrap_or_default()
    }

    /// Every cell that has at least one entity in it.
    pub fn occupied_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .flat_map(|shard| shard.lock().keys().copied().collect::<Vec<_>>())
            .collect()
    }

    fn entities_with(&self, activity: Activity) -> HashSet<hecs::Entity> {
        self.records
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .iter()
                    .filter(|(_, loc)| loc.activity == activity)
                    .map(|(e, _)| *e)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// A snapshot of the entities that are currently awake.
    ///
    /// This is a copy, so it isn't affected by later sleeps and wakes.
    #[inline]
    pub fn awake(&self) -> HashSet<hecs::Entity> {
        self.entities_with(Activity::Awake)
    }

    /// A snapshot of the entities that are currently asleep.
    #[inline]
    pub fn asleep(&self) -> HashSet<hecs::Entity> {
        self.entities_with(Activity::Asleep)
    }

    pub fn activity(&self, entity: hecs::Entity) -> Option<Activity> {
        self.record_shard(entity)
            .lock()
            .get(&entity)
            .map(|loc| loc.activity)
    }

    #[inline]
    pub fn contains(&self, entity: hecs::Entity) -> bool {
        self.activity(entity).is_some()
    }

    #[inline]
    pub fn is_awake(&self, entity: hecs::Entity) -> bool {
        self.activity(entity) == Some(Activity::Awake)
    }

    #[inline]
    pub fn is_asleep(&self, entity: hecs::Entity) -> bool {
        self.activity(entity) == Some(Activity::Asleep)
    }

    pub fn footprint_of(&self, entity: hecs::Entity) -> Option<Footprint> {
        self.record_shard(entity)
            .lock()
            .get(&entity)
            .map(|loc| loc.footprint.clone())
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.records.iter().map(|shard| shard.lock().len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the part of the index a polygon (usually a camera's view) overlaps.
    pub fn snapshot_region(&self, region: &Polygon) -> RegionSnapshot {
        let mut cells = Vec::new();
        for cell in footprint::rasterize(region, self.cell_size) {
            if let Some(set) = self.cell_shard(cell).lock().get(&cell) {
                cells.push((cell, set.iter().copied().collect::<Vec<_>>()));
            }
        }
        // cell locks are released before touching records
        let awake = cells
            .iter()
            .flat_map(|(_, entities)| entities.iter().copied())
            .filter(|e| self.is_awake(*e))
            .collect();
        RegionSnapshot::new(region.clone(), self.cell_size, cells, awake)
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("cell_size", &self.cell_size)
            .field("entities", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(world: &mut hecs::World) -> hecs::Entity {
        world.spawn(())
    }

    fn square_at(x: f64, y: f64, side: f64) -> Shape {
        Shape::rect(Vec2::new(x, y), side, side).unwrap()
    }

    #[test]
    fn add_and_remove() {
        let mut world = hecs::World::new();
        let e = spawn(&mut world);
        let index = SpatialIndex::new(256.0);

        assert!(!index.add_entity(e, None));
        assert!(!index.contains(e));

        assert!(index.add_entity(e, Some(&square_at(0.0, 0.0, 20.0))));
        assert!(index.is_asleep(e));
        assert_eq!(index.footprint_of(e), Some(Footprint::from([(0, 0)])));
        assert!(index.entities_in_cell((0, 0)).contains(&e));
        assert_eq!(index.len(), 1);

        assert_eq!(index.remove_entity(e), Removed::Asleep);
        assert_eq!(index.remove_entity(e), Removed::None);
        assert!(index.occupied_cells().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn readding_keeps_awake() {
        let mut world = hecs::World::new();
        let e = spawn(&mut world);
        let index = SpatialIndex::new(256.0);
        index.add_entity(e, Some(&square_at(0.0, 0.0, 20.0)));
        assert!(index.wake_entity(e));
        assert!(!index.wake_entity(e));

        index.add_entity(e, Some(&square_at(300.0, 0.0, 20.0)));
        assert!(index.is_awake(e));
        assert_eq!(index.occupied_cells(), vec![(1, 0)]);
        assert_eq!(index.remove_entity(e), Removed::Awake);
    }

    #[test]
    fn update_moves_between_cells() {
        let mut world = hecs::World::new();
        let e = spawn(&mut world);
        let untracked = spawn(&mut world);
        let index = SpatialIndex::new(256.0);
        index.add_entity(e, Some(&square_at(0.0, 0.0, 20.0)));

        // straddling the border between two cells
        assert!(index.update(e, &square_at(128.0, 0.0, 20.0)));
        assert_eq!(index.footprint_of(e), Some(Footprint::from([(0, 0), (1, 0)])));
        assert!(index.entities_in_cell((0, 0)).contains(&e));
        assert!(index.entities_in_cell((1, 0)).contains(&e));

        assert!(index.update(e, &square_at(300.0, 0.0, 20.0)));
        assert!(index.entities_in_cell((0, 0)).is_empty());
        assert_eq!(index.occupied_cells(), vec![(1, 0)]);

        assert!(!index.update(untracked, &square_at(0.0, 0.0, 20.0)));
        assert!(!index.contains(untracked));
    }

    #[test]
    fn sleep_and_wake() {
        let mut world = hecs::World::new();
        let e = spawn(&mut world);
        let index = SpatialIndex::new(64.0);
        assert!(!index.wake_entity(e));
        index.add_entity(e, Some(&square_at(0.0, 0.0, 20.0)));
        assert!(!index.sleep_entity(e));
        assert!(index.wake_entity(e));
        assert_eq!(index.awake(), HashSet::from([e]));
        assert!(index.asleep().is_empty());
        assert!(index.sleep_entity(e));
        assert!(index.awake().is_empty());
        // grid untouched
        assert!(index.entities_in_cell((0, 0)).contains(&e));
    }

    #[test]
    fn awake_is_a_snapshot() {
        let mut world = hecs::World::new();
        let e = spawn(&mut world);
        let index = SpatialIndex::new(64.0);
        index.add_entity(e, Some(&square_at(0.0, 0.0, 20.0)));
        index.wake_entity(e);
        let snapshot = index.awake();
        index.sleep_entity(e);
        assert!(snapshot.contains(&e));
        assert!(!index.is_awake(e));
    }

    #[test]
    fn region_queries() {
        let mut world = hecs::World::new();
        let a = spawn(&mut world);
        let b = spawn(&mut world);
        let far = spawn(&mut world);
        let index = SpatialIndex::new(100.0);
        index.add_entity(a, Some(&square_at(0.0, 0.0, 10.0)));
        index.add_entity(b, Some(&square_at(90.0, 0.0, 10.0)));
        index.add_entity(far, Some(&square_at(1000.0, 1000.0, 10.0)));

        let query = Polygon::rect(Vec2::new(40.0, 0.0), 100.0, 10.0).unwrap();
        assert_eq!(index.entities_in(&query), HashSet::from([a, b]));
        assert_eq!(
            index.entities_in_filtered(&query, |e| e != b),
            HashSet::from([a])
        );
        // nothing there at all
        let empty = Polygon::rect(Vec2::new(-5000.0, 0.0), 10.0, 10.0).unwrap();
        assert!(index.entities_in(&empty).is_empty());

        assert_eq!(index.entities_near(Vec2::new(1010.0, 990.0)), HashSet::from([far]));
    }

    #[test]
    fn resize_keeps_activity() {
        let mut world = hecs::World::new();
        let a = spawn(&mut world);
        let b = spawn(&mut world);
        let gone = spawn(&mut world);
        let mut index = SpatialIndex::new(256.0);
        index.add_entity(a, Some(&square_at(0.0, 0.0, 20.0)));
        index.add_entity(b, Some(&square_at(100.0, 0.0, 20.0)));
        index.add_entity(gone, Some(&square_at(0.0, 0.0, 20.0)));
        index.wake_entity(a);

        index.resize(50.0, |e| {
            if e == a {
                Some(square_at(0.0, 0.0, 20.0))
            } else if e == b {
                Some(square_at(100.0, 0.0, 20.0))
            } else {
                None
            }
        });
        assert_eq!(index.cell_size(), 50.0);
        assert!(index.is_awake(a));
        assert!(index.is_asleep(b));
        assert!(!index.contains(gone));
        assert_eq!(index.footprint_of(b), Some(Footprint::from([(2, 0)])));
    }

    #[test]
    fn batch_updates() {
        let mut world = hecs::World::new();
        let index = SpatialIndex::new(10.0);
        let entities: Vec<_> = (0..100).map(|_| spawn(&mut world)).collect();
        for (i, e) in entities.iter().enumerate() {
            index.add_entity(*e, Some(&square_at(i as f64 * 10.0, 0.0, 4.0)));
        }
        let batch: Vec<_> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (*e, square_at(i as f64 * 10.0, 50.0, 4.0)))
            .collect();
        assert_eq!(index.update_many(&batch), 100);
        for (i, e) in entities.iter().enumerate() {
            assert_eq!(
                index.footprint_of(*e),
                Some(Footprint::from([(i as i64, 5)]))
            );
        }
        assert_eq!(index.occupied_cells().len(), 100);
    }
}
