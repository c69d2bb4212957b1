//! Point Cloud Octree Library - Persistent Mercator Quadtree for Geodetic Points
//!
//! This library stores very large geodetic point clouds in a spatial tree persisted in an
//! ordered key-value store (`sled`). Each node covers a lat/lon sector; the root covers the
//! whole sphere and every node has four children (NW, NE, SW, SE) obtained by halving the
//! longitude range and the Web Mercator height of the latitude range.
//!
//! # Architecture
//!
//! - **[`TileId`]**: Quadrant path used as store key; ancestors sort before descendants
//! - **[`codec`]**: Versioned big-endian layout of node entries and point payloads
//! - **[`TileStore`]**: The two tables (`nodes`, `node_data`) and their atomic writes
//! - **[`MercatorTile`]**: A node read back from the store, with lazily loaded points
//! - **[`PersistentOctree`]**: Insertion (merge, defer, split) and read access
//!
//! # Insertion
//!
//! A batch is routed to the deepest tile enclosing its sector. If that tile or one of its
//! ancestors already exists the points are merged into it, splitting it when it grows beyond
//! [`OctreeConfig::max_points_per_tile`]. If only finer tiles exist below the target the batch
//! is deferred. Otherwise a new tile is written.

mod addressing;
pub mod codec;
mod geometry;
mod insertion;
mod octree;
mod store;
mod tile;
mod tile_id;
pub mod utils;

// Public API exports
pub use addressing::{
    MAX_DEPTH, NORTH_EAST, NORTH_WEST, SOUTH_EAST, SOUTH_WEST, TileHeader, child_sectors,
    deepest_enclosing_tile, deepest_enclosing_tile_at, quadrant_of, sector_for_id,
    split_latitude,
};
pub use codec::Format;
pub use geometry::{Angle, Geodetic2D, Geodetic3D, Sector};
pub use insertion::{InsertOutcome, weighted_average};
pub use octree::{OctreeConfig, OctreeStatistics, PersistentOctree, TileVisitor};
pub use store::{Table, TileStore, TileWrite};
pub use tile::{MercatorTile, PointBatch};
pub use tile_id::{QUADRANTS, TileId};

/// Error types for the octree
#[derive(Debug, thiserror::Error)]
pub enum OctreeError {
    #[error("Corrupt storage at tile \"{id}\": {reason}")]
    CorruptStorage { id: TileId, reason: String },

    #[error("Tile \"{id}\" cannot hold {count} points (max {max})")]
    CapacityExceeded { id: TileId, count: usize, max: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid tile id: {0}")]
    InvalidTileId(String),

    #[error("Tile \"{id}\" changed since it was read; read it again")]
    StaleTile { id: TileId },
}

pub type Result<T> = std::result::Result<T, OctreeError>;
