//! Insertion protocol: ancestor merge, descendant conflict, split and fresh insert
//!
//! Every insertion is planned in memory first (reads go to the store, writes are
//! collected) and then committed in a single store transaction, so a split that
//! rewrites a node and creates its children becomes visible all at once.

use crate::addressing::{self, TileHeader};
use crate::codec::{self, Format, NodeEntry};
use crate::geometry::{Angle, Geodetic3D};
use crate::octree::OctreeConfig;
use crate::store::{Table, TileStore, TileWrite};
use crate::tile::{MercatorTile, PointBatch};
use crate::tile_id::{QUADRANTS, TileId};
use crate::{OctreeError, Result};

/// Result of inserting a batch
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InsertOutcome {
    /// A new tile was written at `id`
    Created { id: TileId, points_count: u32 },
    /// The batch was merged into the existing tile `id`
    Merged { id: TileId, points_count: u32 },
    /// The batch was routed through the subdivided node `via` into its children
    Distributed { via: TileId, written: Vec<TileId> },
    /// `id` overflowed and was subdivided; `written` lists every node rewritten or created
    Split { id: TileId, written: Vec<TileId> },
    /// Finer-grained tiles already cover `target`; nothing was written
    Deferred {
        target: TileId,
        descendants: Vec<TileId>,
    },
    /// Empty batch: nothing was written
    Unchanged { id: TileId },
}

impl InsertOutcome {
    /// True if the store was modified
    pub fn is_written(&self) -> bool {
        !matches!(
            self,
            InsertOutcome::Deferred { .. } | InsertOutcome::Unchanged { .. }
        )
    }
}

/// Insert a batch into the store
///
/// The caller must guarantee that no other insertion runs concurrently on the
/// same store; [`crate::PersistentOctree`] does so with a writer lock.
pub fn insert(store: &TileStore, config: &OctreeConfig, batch: PointBatch) -> Result<InsertOutcome> {
    #[cfg(feature = "profiling")]
    profiling::scope!("insertion::insert");

    batch.validate()?;
    let PointBatch {
        sector,
        average_point,
        points,
    } = batch;

    let target = addressing::deepest_enclosing_tile_at(&sector, config.max_depth);

    if let Some(ancestor) = find_ancestor_or_self(store, &target.id)? {
        tracing::debug!("found ancestor ({}) for tile {}", ancestor.id(), target.id);
        if points.is_empty() {
            return Ok(InsertOutcome::Unchanged {
                id: ancestor.id().clone(),
            });
        }

        let ancestor_id = ancestor.id().clone();
        let was_subdivided = ancestor.is_subdivided();
        let mut plan = Plan::new(store, config);
        plan.merge_into(ancestor, average_point, points)?;
        let outcome = plan.outcome(|plan| {
            if was_subdivided {
                InsertOutcome::Distributed {
                    via: ancestor_id.clone(),
                    written: plan.written_ids(),
                }
            } else {
                InsertOutcome::Merged {
                    id: ancestor_id.clone(),
                    points_count: plan.leaf_count(&ancestor_id),
                }
            }
        });
        plan.commit()?;
        return Ok(outcome);
    }

    let descendants = store.descendants(&target.id)?;
    if !descendants.is_empty() {
        tracing::info!(
            "tile {} has {} descendants [ {} ], batch of {} points deferred",
            target.id,
            descendants.len(),
            descendants
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            points.len()
        );
        return Ok(InsertOutcome::Deferred {
            target: target.id,
            descendants,
        });
    }

    if points.is_empty() {
        return Ok(InsertOutcome::Unchanged { id: target.id });
    }

    let target_id = target.id.clone();
    let mut plan = Plan::new(store, config);
    plan.place(target, average_point, points)?;
    let outcome = plan.outcome(|plan| InsertOutcome::Created {
        id: target_id.clone(),
        points_count: plan.leaf_count(&target_id),
    });
    plan.commit()?;
    Ok(outcome)
}

/// First persisted tile found walking from `id` up to the root (inclusive)
pub fn find_ancestor_or_self(store: &TileStore, id: &TileId) -> Result<Option<MercatorTile>> {
    for candidate in id.self_and_ancestors() {
        if let Some(data) = store.get(Table::Nodes, &candidate)? {
            return MercatorTile::from_node_entry(candidate, &data).map(Some);
        }
    }
    Ok(None)
}

/// Count-weighted average of two centroids, componentwise
///
/// Latitude and longitude are averaged linearly in radians, which is only
/// meaningful when both sides lie on the same side of the antimeridian and
/// away from the poles.
pub fn weighted_average(
    first: &Geodetic3D,
    first_count: usize,
    second: &Geodetic3D,
    second_count: usize,
) -> Geodetic3D {
    if second_count == 0 {
        return *first;
    }
    if first_count == 0 {
        return *second;
    }

    let total = (first_count + second_count) as f64;
    let a = first_count as f64;
    let b = second_count as f64;
    let average = |x: f64, y: f64| (x * a + y * b) / total;

    Geodetic3D::new(
        Angle::from_radians(average(first.latitude.radians(), second.latitude.radians())),
        Angle::from_radians(average(
            first.longitude.radians(),
            second.longitude.radians(),
        )),
        average(first.height, second.height),
    )
}

/// Arithmetic centroid of a non-empty set of points
fn centroid(points: &[Geodetic3D]) -> Geodetic3D {
    let count = points.len() as f64;
    let (latitude, longitude, height) =
        points
            .iter()
            .fold((0.0, 0.0, 0.0), |(latitude, longitude, height), point| {
                (
                    latitude + point.latitude.radians(),
                    longitude + point.longitude.radians(),
                    height + point.height,
                )
            });
    Geodetic3D::from_radians(latitude / count, longitude / count, height / count)
}

/// Pending writes of one insertion
struct Plan<'a> {
    store: &'a TileStore,
    config: &'a OctreeConfig,
    writes: Vec<TileWrite>,
    /// Points count of every leaf written, in write order
    leaves: Vec<(TileId, u32)>,
    /// Nodes turned into (or rewritten as) subdivided nodes, in write order
    subdivided: Vec<TileId>,
}

impl<'a> Plan<'a> {
    fn new(store: &'a TileStore, config: &'a OctreeConfig) -> Self {
        Self {
            store,
            config,
            writes: Vec::new(),
            leaves: Vec::new(),
            subdivided: Vec::new(),
        }
    }

    /// Merge points into an existing tile, splitting it if it overflows
    fn merge_into(
        &mut self,
        tile: MercatorTile,
        new_average: Geodetic3D,
        new_points: Vec<Geodetic3D>,
    ) -> Result<()> {
        let header = TileHeader {
            id: tile.id().clone(),
            sector: *tile.sector(),
        };

        if tile.is_subdivided() {
            return self.distribute(&header, new_points);
        }
        if new_points.is_empty() {
            return Ok(());
        }

        let old_count = tile.points_count() as usize;
        let new_count = new_points.len();
        let merged_count = old_count + new_count;
        let merged_average =
            weighted_average(tile.average_point(), old_count, &new_average, new_count);

        let mut merged_points = tile.into_points(self.store)?;
        merged_points.extend(new_points);

        if merged_count > self.config.max_points_per_tile {
            tracing::info!(
                "split for {}: {} points exceed the capacity of {}",
                header.id,
                merged_count,
                self.config.max_points_per_tile
            );
            return self.subdivide(header, merged_average, merged_points);
        }

        tracing::debug!(
            "merged {} points, old={}, new={}",
            merged_count,
            old_count,
            new_count
        );
        self.write_leaf(header, merged_average, merged_points)
    }

    /// Store points in a node that does not exist yet
    fn place(
        &mut self,
        header: TileHeader,
        average: Geodetic3D,
        points: Vec<Geodetic3D>,
    ) -> Result<()> {
        if points.len() > self.config.max_points_per_tile {
            tracing::info!(
                "split for {}: new batch of {} points exceeds the capacity of {}",
                header.id,
                points.len(),
                self.config.max_points_per_tile
            );
            return self.subdivide(header, average, points);
        }
        self.write_leaf(header, average, points)
    }

    /// Turn `header` into a subdivided node and move all `points` into its children
    fn subdivide(
        &mut self,
        header: TileHeader,
        average: Geodetic3D,
        points: Vec<Geodetic3D>,
    ) -> Result<()> {
        if header.id.level() >= self.config.max_depth {
            return Err(OctreeError::CapacityExceeded {
                id: header.id,
                count: points.len(),
                max: self.config.max_points_per_tile,
            });
        }

        self.push_write(
            &header.id,
            NodeEntry {
                sector: header.sector,
                points_count: 0,
                average_point: average,
                format: Format::Subdivided,
            },
            Vec::new(),
        )?;
        self.subdivided.push(header.id.clone());

        self.distribute(&header, points)
    }

    /// Partition points among the children of `header` and insert each group
    fn distribute(&mut self, header: &TileHeader, points: Vec<Geodetic3D>) -> Result<()> {
        let mut groups: [Vec<Geodetic3D>; QUADRANTS as usize] = Default::default();
        for point in points {
            let quadrant = addressing::quadrant_of(&header.sector, &point.to_2d());
            groups[quadrant as usize].push(point);
        }

        for (quadrant, group) in (0..QUADRANTS).zip(groups) {
            if group.is_empty() {
                continue;
            }
            let child = header.child(quadrant);
            let average = centroid(&group);
            match MercatorTile::read(self.store, &child.id)? {
                Some(existing) => self.merge_into(existing, average, group)?,
                None => self.place(child, average, group)?,
            }
        }
        Ok(())
    }

    fn write_leaf(
        &mut self,
        header: TileHeader,
        average: Geodetic3D,
        points: Vec<Geodetic3D>,
    ) -> Result<()> {
        let points_count = points.len() as u32;
        let data = codec::encode_points(&average, &points);
        self.push_write(
            &header.id,
            NodeEntry {
                sector: header.sector,
                points_count,
                average_point: average,
                format: Format::LatLonHeight,
            },
            data,
        )?;
        self.leaves.push((header.id, points_count));
        Ok(())
    }

    fn push_write(&mut self, id: &TileId, entry: NodeEntry, data: Vec<u8>) -> Result<()> {
        let node_entry = codec::encode_node_entry(id, &entry)?;
        self.writes.push(TileWrite {
            id: id.clone(),
            node_entry,
            node_data_entry: data,
        });
        Ok(())
    }

    fn leaf_count(&self, id: &TileId) -> u32 {
        self.leaves
            .iter()
            .find(|(leaf, _)| leaf == id)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    fn written_ids(&self) -> Vec<TileId> {
        self.writes.iter().map(|write| write.id.clone()).collect()
    }

    /// `Split` if anything was subdivided, otherwise whatever `otherwise` builds
    fn outcome(&self, otherwise: impl FnOnce(&Self) -> InsertOutcome) -> InsertOutcome {
        match self.subdivided.first() {
            Some(id) => InsertOutcome::Split {
                id: id.clone(),
                written: self.written_ids(),
            },
            None => otherwise(self),
        }
    }

    fn commit(self) -> Result<()> {
        self.store.put_pairs(&self.writes)
    }
}
