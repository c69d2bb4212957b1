//! Deterministic mapping between tile ids and sectors
//!
//! Tiles are subdivided into four quadrants (NW, NE, SW, SE). Longitude is split at
//! the arithmetic midpoint, latitude at the midpoint of the Web Mercator projection,
//! so tiles at the same level look equally sized on a Mercator map.

use crate::geometry::{Angle, Geodetic2D, Sector};
use crate::tile_id::TileId;
use crate::utils;

/// Maximum depth of the tree to guarantee that descending terminates
pub const MAX_DEPTH: usize = 32;

/// Quadrant indices in child order
pub const NORTH_WEST: u8 = 0;
pub const NORTH_EAST: u8 = 1;
pub const SOUTH_WEST: u8 = 2;
pub const SOUTH_EAST: u8 = 3;

/// A tile id together with its sector
#[derive(Clone, Debug, PartialEq)]
pub struct TileHeader {
    pub id: TileId,
    pub sector: Sector,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TileHeader {
    pub fn root() -> Self {
        Self {
            id: TileId::root(),
            sector: Sector::full_sphere(),
        }
    }

    /// Headers of the four children, in quadrant order
    pub fn children(&self) -> [TileHeader; 4] {
        let [nw, ne, sw, se] = child_sectors(&self.sector);
        [
            TileHeader {
                id: self.id.child(NORTH_WEST),
                sector: nw,
            },
            TileHeader {
                id: self.id.child(NORTH_EAST),
                sector: ne,
            },
            TileHeader {
                id: self.id.child(SOUTH_WEST),
                sector: sw,
            },
            TileHeader {
                id: self.id.child(SOUTH_EAST),
                sector: se,
            },
        ]
    }

    pub fn child(&self, quadrant: u8) -> TileHeader {
        TileHeader {
            id: self.id.child(quadrant),
            sector: child_sectors(&self.sector)[quadrant as usize],
        }
    }
}

/// Latitude that halves the Mercator height of `[lower, upper]`
///
/// The result is clamped into the input range so children never leak out of
/// their parent because of rounding.
pub fn split_latitude(lower: Angle, upper: Angle) -> Angle {
    let middle_v = (utils::mercator_v(lower) + utils::mercator_v(upper)) / 2.0;
    utils::latitude_from_mercator_v(middle_v).clamp(lower, upper)
}

/// Split a sector into its four children: NW, NE, SW, SE
pub fn child_sectors(sector: &Sector) -> [Sector; 4] {
    let lower = sector.lower();
    let upper = sector.upper();

    let split_longitude = Angle::mid_angle(lower.longitude, upper.longitude);
    let split_latitude = split_latitude(lower.latitude, upper.latitude);

    let nw = Sector::new(
        Geodetic2D::new(split_latitude, lower.longitude),
        Geodetic2D::new(upper.latitude, split_longitude),
    );
    let ne = Sector::new(
        Geodetic2D::new(split_latitude, split_longitude),
        Geodetic2D::new(upper.latitude, upper.longitude),
    );
    let sw = Sector::new(
        Geodetic2D::new(lower.latitude, lower.longitude),
        Geodetic2D::new(split_latitude, split_longitude),
    );
    let se = Sector::new(
        Geodetic2D::new(lower.latitude, split_longitude),
        Geodetic2D::new(split_latitude, upper.longitude),
    );

    [nw, ne, sw, se]
}

/// Quadrant of `sector` that `position` falls into
///
/// Positions on a split line go north/east. Positions outside the sector are
/// still assigned to the nearest quadrant, so partitioning never drops points.
pub fn quadrant_of(sector: &Sector, position: &Geodetic2D) -> u8 {
    let lower = sector.lower();
    let upper = sector.upper();
    let split_longitude = Angle::mid_angle(lower.longitude, upper.longitude);
    let split_latitude = split_latitude(lower.latitude, upper.latitude);

    let is_east = position.longitude >= split_longitude;
    let is_north = position.latitude >= split_latitude;

    match (is_east, is_north) {
        (false, true) => NORTH_WEST,
        (true, true) => NORTH_EAST,
        (false, false) => SOUTH_WEST,
        (true, false) => SOUTH_EAST,
    }
}

/// Sector of the tile with the given id
pub fn sector_for_id(id: &TileId) -> Sector {
    id.quadrants()
        .iter()
        .fold(Sector::full_sphere(), |sector, &quadrant| {
            child_sectors(&sector)[quadrant as usize]
        })
}

/// Deepest tile whose sector fully contains `target`
pub fn deepest_enclosing_tile(target: &Sector) -> TileHeader {
    deepest_enclosing_tile_at(target, MAX_DEPTH)
}

/// Like [`deepest_enclosing_tile`], but never descends below `max_depth`
///
/// Descends while exactly one child fully contains the target. A target lying on
/// a split line is contained by two children and stays at the parent. A
/// non-finite target is contained by no child and resolves to the root.
pub fn deepest_enclosing_tile_at(target: &Sector, max_depth: usize) -> TileHeader {
    let mut candidate = TileHeader::root();
    while candidate.id.level() < max_depth {
        let mut containing = candidate
            .children()
            .into_iter()
            .filter(|child| child.sector.full_contains(target));

        match (containing.next(), containing.next()) {
            (Some(child), None) => candidate = child,
            _ => break,
        }
    }
    candidate
}
