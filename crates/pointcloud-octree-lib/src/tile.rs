//! Persisted tiles and incoming point batches

use crate::codec::{self, Format, NodeEntry};
use crate::geometry::{Angle, Geodetic2D, Geodetic3D, Sector};
use crate::store::{Table, TileStore};
use crate::tile_id::TileId;
use crate::{OctreeError, Result};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::fmt;

/// Batches larger than this compute their bounds and centroid in parallel
const PARALLEL_THRESHOLD: usize = 16 * 1024;

/// A node read back from the tile store
///
/// Metadata is decoded eagerly; points are loaded from the `node_data` table on
/// first access and cached afterwards.
#[derive(Debug)]
pub struct MercatorTile {
    id: TileId,
    sector: Sector,
    average_point: Geodetic3D,
    points_count: u32,
    format: Format,
    points: OnceCell<Vec<Geodetic3D>>,
}

impl MercatorTile {
    /// Decode a tile from its node entry
    pub fn from_node_entry(id: TileId, data: &[u8]) -> Result<Self> {
        let NodeEntry {
            sector,
            points_count,
            average_point,
            format,
        } = codec::decode_node_entry(&id, data)?;

        Ok(Self {
            id,
            sector,
            average_point,
            points_count,
            format,
            points: OnceCell::new(),
        })
    }

    /// Read a tile by id, `None` if it was never stored
    pub fn read(store: &TileStore, id: &TileId) -> Result<Option<Self>> {
        store
            .get(Table::Nodes, id)?
            .map(|data| Self::from_node_entry(id.clone(), &data))
            .transpose()
    }

    #[inline]
    pub fn id(&self) -> &TileId {
        &self.id
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.id.level()
    }

    #[inline]
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    #[inline]
    pub fn average_point(&self) -> &Geodetic3D {
        &self.average_point
    }

    #[inline]
    pub fn points_count(&self) -> u32 {
        self.points_count
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// True if this node has been split and its points live in its children
    #[inline]
    pub fn is_subdivided(&self) -> bool {
        self.format == Format::Subdivided
    }

    /// True if the points have already been loaded
    pub fn points_loaded(&self) -> bool {
        self.points.get().is_some()
    }

    /// Points of this tile, loaded from the store on first call
    pub fn points(&self, store: &TileStore) -> Result<&[Geodetic3D]> {
        self.points
            .get_or_try_init(|| self.load_points(store))
            .map(Vec::as_slice)
    }

    /// Take the points out of the tile, loading them if needed
    pub fn into_points(mut self, store: &TileStore) -> Result<Vec<Geodetic3D>> {
        match self.points.take() {
            Some(points) => Ok(points),
            None => self.load_points(store),
        }
    }

    /// Load the payload together with the current node entry
    ///
    /// A handle whose node was rewritten after it was read yields `StaleTile`:
    /// its metadata no longer describes the stored payload.
    fn load_points(&self, store: &TileStore) -> Result<Vec<Geodetic3D>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("tile::load_points");

        let (node, data) = store.get_pair(&self.id)?;
        let node = node.ok_or_else(|| OctreeError::StaleTile {
            id: self.id.clone(),
        })?;
        let current = codec::decode_node_entry(&self.id, &node)?;
        if current.points_count != self.points_count
            || current.format != self.format
            || current.average_point != self.average_point
        {
            tracing::debug!("tile {} was rewritten after being read", self.id);
            return Err(OctreeError::StaleTile {
                id: self.id.clone(),
            });
        }

        match self.format {
            Format::Subdivided => Ok(Vec::new()),
            Format::LatLonHeight => {
                let data = data.ok_or_else(|| OctreeError::CorruptStorage {
                    id: self.id.clone(),
                    reason: "node data entry is missing".to_string(),
                })?;
                codec::decode_points(&self.id, &self.average_point, self.points_count, &data)
            }
        }
    }
}

impl fmt::Display for MercatorTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MercatorTile [id={}, sector={}, level={}, points={}{}]",
            self.id,
            self.sector,
            self.level(),
            self.points_count,
            if self.is_subdivided() {
                ", subdivided"
            } else {
                ""
            }
        )
    }
}

/// A batch of points handed to the octree for insertion
#[derive(Clone, Debug)]
pub struct PointBatch {
    /// Bounds of the points
    pub sector: Sector,
    /// Centroid used as origin of the stored deltas
    pub average_point: Geodetic3D,
    pub points: Vec<Geodetic3D>,
}

/// Running sums used to derive bounds and centroid in one pass
#[derive(Clone, Copy)]
struct BatchSummary {
    min_latitude: f64,
    min_longitude: f64,
    max_latitude: f64,
    max_longitude: f64,
    sum_latitude: f64,
    sum_longitude: f64,
    sum_height: f64,
}

impl BatchSummary {
    const EMPTY: BatchSummary = BatchSummary {
        min_latitude: f64::INFINITY,
        min_longitude: f64::INFINITY,
        max_latitude: f64::NEG_INFINITY,
        max_longitude: f64::NEG_INFINITY,
        sum_latitude: 0.0,
        sum_longitude: 0.0,
        sum_height: 0.0,
    };

    fn add(mut self, point: &Geodetic3D) -> Self {
        let latitude = point.latitude.radians();
        let longitude = point.longitude.radians();
        self.min_latitude = self.min_latitude.min(latitude);
        self.min_longitude = self.min_longitude.min(longitude);
        self.max_latitude = self.max_latitude.max(latitude);
        self.max_longitude = self.max_longitude.max(longitude);
        self.sum_latitude += latitude;
        self.sum_longitude += longitude;
        self.sum_height += point.height;
        self
    }

    fn merge(self, other: BatchSummary) -> Self {
        BatchSummary {
            min_latitude: self.min_latitude.min(other.min_latitude),
            min_longitude: self.min_longitude.min(other.min_longitude),
            max_latitude: self.max_latitude.max(other.max_latitude),
            max_longitude: self.max_longitude.max(other.max_longitude),
            sum_latitude: self.sum_latitude + other.sum_latitude,
            sum_longitude: self.sum_longitude + other.sum_longitude,
            sum_height: self.sum_height + other.sum_height,
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PointBatch {
    pub fn new(sector: Sector, average_point: Geodetic3D, points: Vec<Geodetic3D>) -> Self {
        Self {
            sector,
            average_point,
            points,
        }
    }

    /// Build a batch whose sector is the bounding box of `points` and whose
    /// average is their arithmetic centroid
    ///
    /// Fails on an empty batch or on non-finite coordinates.
    pub fn from_points(points: Vec<Geodetic3D>) -> Result<Self> {
        if points.is_empty() {
            return Err(OctreeError::InvalidGeometry(
                "cannot derive a sector from an empty batch".to_string(),
            ));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(OctreeError::InvalidGeometry(format!(
                "non-finite point {bad:?}"
            )));
        }

        let summary = if points.len() >= PARALLEL_THRESHOLD {
            points
                .par_iter()
                .fold(|| BatchSummary::EMPTY, BatchSummary::add)
                .reduce(|| BatchSummary::EMPTY, BatchSummary::merge)
        } else {
            points.iter().fold(BatchSummary::EMPTY, BatchSummary::add)
        };

        let count = points.len() as f64;
        let sector = Sector::new(
            Geodetic2D::from_radians(summary.min_latitude, summary.min_longitude),
            Geodetic2D::from_radians(summary.max_latitude, summary.max_longitude),
        );
        let average_point = Geodetic3D::new(
            Angle::from_radians(summary.sum_latitude / count),
            Angle::from_radians(summary.sum_longitude / count),
            summary.sum_height / count,
        );

        Ok(Self {
            sector,
            average_point,
            points,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reject batches containing NaN or infinite coordinates
    pub fn validate(&self) -> Result<()> {
        if !self.average_point.is_finite() {
            return Err(OctreeError::InvalidGeometry(format!(
                "non-finite average point {:?}",
                self.average_point
            )));
        }
        let lower = self.sector.lower();
        let upper = self.sector.upper();
        if !(lower.latitude.is_finite()
            && lower.longitude.is_finite()
            && upper.latitude.is_finite()
            && upper.longitude.is_finite())
        {
            return Err(OctreeError::InvalidGeometry(format!(
                "non-finite sector {:?}",
                self.sector
            )));
        }
        if let Some(bad) = self.points.iter().find(|p| !p.is_finite()) {
            return Err(OctreeError::InvalidGeometry(format!(
                "non-finite point {bad:?}"
            )));
        }
        Ok(())
    }
}
