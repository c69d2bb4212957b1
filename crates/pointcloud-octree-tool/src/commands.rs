//! Read-only commands: statistics, tile listing and point export

use crate::{Result, ToolError};
use pointcloud_octree_lib::{
    MercatorTile, OctreeStatistics, PersistentOctree, TileId, TileStore, TileVisitor,
};
use serde::Serialize;
use std::io::Write;

/// Tile metadata as printed by `dump`, angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileSummary {
    pub id: String,
    pub level: usize,
    pub points_count: u32,
    pub subdivided: bool,
    /// `[min_lat, min_lon, max_lat, max_lon]`
    pub sector: [f64; 4],
    /// `[lat, lon, height]`
    pub average_point: [f64; 3],
}

impl From<&MercatorTile> for TileSummary {
    fn from(tile: &MercatorTile) -> Self {
        let lower = tile.sector().lower();
        let upper = tile.sector().upper();
        let average = tile.average_point();
        Self {
            id: tile.id().to_string(),
            level: tile.level(),
            points_count: tile.points_count(),
            subdivided: tile.is_subdivided(),
            sector: [
                lower.latitude.degrees(),
                lower.longitude.degrees(),
                upper.latitude.degrees(),
                upper.longitude.degrees(),
            ],
            average_point: [
                average.latitude.degrees(),
                average.longitude.degrees(),
                average.height,
            ],
        }
    }
}

/// Collects tile summaries during a traversal
#[derive(Default)]
struct SummaryCollector {
    tiles: Vec<TileSummary>,
}

impl TileVisitor for SummaryCollector {
    fn visit(&mut self, tile: &MercatorTile, _store: &TileStore) -> pointcloud_octree_lib::Result<bool> {
        self.tiles.push(TileSummary::from(tile));
        Ok(true)
    }
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn stats<W: Write>(octree: &PersistentOctree, json: bool, out: &mut W) -> Result<()> {
    let statistics: OctreeStatistics = octree.statistics()?;
    if json {
        return write_json(out, &statistics);
    }

    writeln!(out, "tiles:              {}", statistics.tiles)?;
    writeln!(out, "  leaves:           {}", statistics.leaves)?;
    writeln!(out, "  subdivided:       {}", statistics.subdivided)?;
    writeln!(out, "points:             {}", statistics.points)?;
    writeln!(out, "max points in tile: {}", statistics.max_points_in_tile)?;
    writeln!(out, "max level:          {}", statistics.max_level)?;
    for (level, count) in statistics.tiles_per_level.iter().enumerate() {
        if *count > 0 {
            writeln!(out, "  level {level:>2}: {count}")?;
        }
    }
    writeln!(out, "size on disk:       {} bytes", octree.store().size_on_disk()?)?;
    Ok(())
}

pub fn dump<W: Write>(
    octree: &PersistentOctree,
    tile: Option<&str>,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let root = match tile {
        Some(tile) => tile.parse::<TileId>()?,
        None => TileId::root(),
    };

    let mut collector = SummaryCollector::default();
    octree.visit_subtree(&root, &mut collector)?;

    if json {
        return write_json(out, &collector.tiles);
    }
    for summary in &collector.tiles {
        let id = if summary.id.is_empty() {
            "<root>"
        } else {
            summary.id.as_str()
        };
        let [min_lat, min_lon, max_lat, max_lon] = summary.sector;
        writeln!(
            out,
            "{id:<20} level={:<2} points={:<8}{} sector=[{min_lat:.6}, {min_lon:.6}, {max_lat:.6}, {max_lon:.6}]",
            summary.level,
            summary.points_count,
            if summary.subdivided { " subdivided" } else { "" },
        )?;
    }
    Ok(())
}

pub fn points<W: Write>(octree: &PersistentOctree, tile: &str, json: bool, out: &mut W) -> Result<()> {
    let id: TileId = tile.parse()?;
    let tile = octree
        .read_tile(&id)?
        .ok_or_else(|| ToolError::TileNotFound(id.to_string()))?;
    let points = tile.points(octree.store())?;

    if json {
        let triples: Vec<[f64; 3]> = points
            .iter()
            .map(|p| [p.latitude.degrees(), p.longitude.degrees(), p.height])
            .collect();
        return write_json(out, &triples);
    }
    for point in points {
        writeln!(
            out,
            "{:.9} {:.9} {:.3}",
            point.latitude.degrees(),
            point.longitude.degrees(),
            point.height
        )?;
    }
    Ok(())
}
