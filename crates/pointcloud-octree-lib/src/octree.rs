//! High-level handle tying the tile store, its configuration and the insertion engine

use crate::addressing::MAX_DEPTH;
use crate::insertion::{self, InsertOutcome};
use crate::store::{Table, TileStore};
use crate::tile::{MercatorTile, PointBatch};
use crate::tile_id::TileId;
use crate::Result;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Configuration for the octree
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OctreeConfig {
    /// Leaves holding more points than this are subdivided.
    /// Default: 262144
    pub max_points_per_tile: usize,
    /// Deepest level a tile may be created at. A leaf at this level that
    /// overflows cannot be split and the insertion fails.
    /// Default: 32
    pub max_depth: usize,
    /// Flush the store to disk after every insertion that wrote something
    pub flush_on_insert: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_points_per_tile: 256 * 1024,
            max_depth: MAX_DEPTH,
            flush_on_insert: false,
        }
    }
}

/// Callbacks for an ordered traversal of the persisted tiles
///
/// Tiles are visited in key order: a node comes before its descendants and
/// siblings follow quadrant order (NW, NE, SW, SE).
pub trait TileVisitor {
    fn start(&mut self) {}

    /// Called once per tile; return `Ok(false)` to stop the traversal early
    fn visit(&mut self, tile: &MercatorTile, store: &TileStore) -> Result<bool>;

    /// Called after the last visited tile, also after an early stop
    fn stop(&mut self) {}
}

/// Summary of the persisted tree
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OctreeStatistics {
    /// Number of persisted nodes, leaves and subdivided ones
    pub tiles: usize,
    /// Nodes that hold points
    pub leaves: usize,
    /// Nodes that were split and only route to their children
    pub subdivided: usize,
    /// Total number of stored points
    pub points: u64,
    /// Largest number of points in a single leaf
    pub max_points_in_tile: u32,
    /// Level of the deepest node
    pub max_level: usize,
    /// Number of nodes per level, index = level
    pub tiles_per_level: Vec<usize>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl OctreeStatistics {
    fn record(&mut self, tile: &MercatorTile) {
        let level = tile.level();
        self.tiles += 1;
        if tile.is_subdivided() {
            self.subdivided += 1;
        } else {
            self.leaves += 1;
            self.points += tile.points_count() as u64;
            self.max_points_in_tile = self.max_points_in_tile.max(tile.points_count());
        }
        self.max_level = self.max_level.max(level);
        if self.tiles_per_level.len() <= level {
            self.tiles_per_level.resize(level + 1, 0);
        }
        self.tiles_per_level[level] += 1;
    }
}

impl TileVisitor for OctreeStatistics {
    fn start(&mut self) {
        *self = OctreeStatistics::default();
    }

    fn visit(&mut self, tile: &MercatorTile, _store: &TileStore) -> Result<bool> {
        self.record(tile);
        Ok(true)
    }
}

/// Persistent Mercator quadtree over a [`TileStore`]
///
/// Insertions are serialized by a writer lock so the lookup, decision and write
/// steps of one batch never interleave with another batch. Readers do not take
/// the lock.
#[derive(Debug)]
pub struct PersistentOctree {
    store: TileStore,
    config: OctreeConfig,
    writer: Mutex<()>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PersistentOctree {
    /// Open (or create) an octree stored at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: OctreeConfig) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("opening octree at {}", path.display());
        Ok(Self::from_store(TileStore::open(path)?, config))
    }

    /// Octree in a temporary database, removed when dropped
    pub fn temporary(config: OctreeConfig) -> Result<Self> {
        Ok(Self::from_store(TileStore::temporary()?, config))
    }

    pub fn from_store(store: TileStore, config: OctreeConfig) -> Self {
        Self {
            store,
            config,
            writer: Mutex::new(()),
        }
    }

    #[inline]
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Insert a batch of points
    pub fn insert(&self, batch: PointBatch) -> Result<InsertOutcome> {
        let points = batch.len();
        let outcome = {
            // Poisoned only if another insertion panicked before committing
            let _guard = self
                .writer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            insertion::insert(&self.store, &self.config, batch)?
        };

        match &outcome {
            InsertOutcome::Created { id, points_count } => {
                tracing::debug!("created tile {} with {} points", id, points_count)
            }
            InsertOutcome::Merged { id, points_count } => {
                tracing::debug!("merged {} points into tile {} ({} total)", points, id, points_count)
            }
            InsertOutcome::Distributed { via, written } => tracing::debug!(
                "distributed {} points below {} into {} tiles",
                points,
                via,
                written.len()
            ),
            InsertOutcome::Split { id, written } => {
                tracing::info!("split tile {} into {} nodes", id, written.len())
            }
            InsertOutcome::Deferred { .. } | InsertOutcome::Unchanged { .. } => {}
        }

        if self.config.flush_on_insert && outcome.is_written() {
            self.store.flush()?;
        }
        Ok(outcome)
    }

    /// Read a single tile, `None` if no node is stored under `id`
    pub fn read_tile(&self, id: &TileId) -> Result<Option<MercatorTile>> {
        MercatorTile::read(&self.store, id)
    }

    /// Visit every persisted tile in key order
    pub fn visit<V: TileVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        self.visit_subtree(&TileId::root(), visitor)
    }

    /// Visit `id` (if stored) and all its persisted descendants in key order
    pub fn visit_subtree<V: TileVisitor + ?Sized>(&self, id: &TileId, visitor: &mut V) -> Result<()> {
        visitor.start();
        let result = self.walk(id, visitor);
        visitor.stop();
        result
    }

    fn walk<V: TileVisitor + ?Sized>(&self, id: &TileId, visitor: &mut V) -> Result<()> {
        for entry in self.store.range_from(Table::Nodes, id) {
            let (key, data) = entry?;
            if !id.is_ancestor_or_self_of(&key) {
                break;
            }
            let tile = MercatorTile::from_node_entry(key, &data)?;
            if !visitor.visit(&tile, &self.store)? {
                break;
            }
        }
        Ok(())
    }

    /// Count tiles and points of the whole tree
    pub fn statistics(&self) -> Result<OctreeStatistics> {
        let mut statistics = OctreeStatistics::default();
        self.visit(&mut statistics)?;
        Ok(statistics)
    }

    pub fn flush(&self) -> Result<usize> {
        self.store.flush()
    }
}
