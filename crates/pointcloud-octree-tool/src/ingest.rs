//! Reading point files and feeding them to the octree in spatial batches

use crate::{Result, ToolError};
use pointcloud_octree_lib::{
    Geodetic3D, InsertOutcome, PersistentOctree, PointBatch, TileHeader, TileId, quadrant_of,
    sector_for_id,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Supported input files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// GPX waypoints, track points and route points
    Gpx,
    /// One `lat lon height` triple per line, in degrees and meters
    Text,
}

impl InputFormat {
    /// Guess the format from the file extension; anything but `.gpx` is text
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gpx") => InputFormat::Gpx,
            _ => InputFormat::Text,
        }
    }
}

/// Totals of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub points: usize,
    pub batches: usize,
    pub created: usize,
    pub merged: usize,
    pub distributed: usize,
    pub splits: usize,
    /// Batches not stored because finer tiles already cover them
    pub deferred: usize,
    pub deferred_points: usize,
}

impl IngestReport {
    fn record(&mut self, outcome: &InsertOutcome, points: usize) {
        self.batches += 1;
        match outcome {
            InsertOutcome::Created { .. } => self.created += 1,
            InsertOutcome::Merged { .. } => self.merged += 1,
            InsertOutcome::Distributed { .. } => self.distributed += 1,
            InsertOutcome::Split { .. } => self.splits += 1,
            InsertOutcome::Deferred { .. } => {
                self.deferred += 1;
                self.deferred_points += points;
            }
            InsertOutcome::Unchanged { .. } => {}
        }
    }
}

/// Read all points of a file
pub fn read_points(path: &Path) -> Result<Vec<Geodetic3D>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    match InputFormat::from_path(path) {
        InputFormat::Gpx => read_gpx(reader),
        InputFormat::Text => read_text(reader, path),
    }
}

/// Points of every waypoint, track and route in a GPX document
///
/// Missing elevations are stored as height 0.
pub fn read_gpx<R: std::io::Read>(reader: R) -> Result<Vec<Geodetic3D>> {
    let gpx = gpx::read(reader)?;

    let tracks = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter());
    let routes = gpx.routes.iter().flat_map(|route| route.points.iter());

    Ok(gpx
        .waypoints
        .iter()
        .chain(tracks)
        .chain(routes)
        .map(|waypoint| {
            let point = waypoint.point();
            Geodetic3D::from_degrees(point.y(), point.x(), waypoint.elevation.unwrap_or(0.0))
        })
        .collect())
}

/// Points of a whitespace or comma separated `lat lon [height]` text file
///
/// Empty lines and lines starting with `#` are ignored. Malformed lines are
/// logged and skipped.
pub fn read_text<R: BufRead>(reader: R, path: &Path) -> Result<Vec<Geodetic3D>> {
    let mut points = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(point) => points.push(point),
            None => tracing::warn!(
                "{}:{}: skipping malformed line {:?}",
                path.display(),
                index + 1,
                line
            ),
        }
    }
    Ok(points)
}

fn parse_line(line: &str) -> Option<Geodetic3D> {
    let mut fields = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|field| !field.is_empty())
        .map(str::parse::<f64>);

    let latitude = fields.next()?.ok()?;
    let longitude = fields.next()?.ok()?;
    let height = match fields.next() {
        Some(height) => height.ok()?,
        None => 0.0,
    };
    if fields.next().is_some() {
        return None;
    }
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    let point = Geodetic3D::from_degrees(latitude, longitude, height);
    point.is_finite().then_some(point)
}

/// Tile containing `point` at `level`
///
/// Points on a split line go to the north/east child, the same way a split
/// partitions them.
pub fn tile_of(point: &Geodetic3D, level: usize) -> TileId {
    let position = point.to_2d();
    let mut header = TileHeader::root();
    while header.id.level() < level {
        header = header.child(quadrant_of(&header.sector, &position));
    }
    header.id
}

/// Group points by the tile containing them at `level`, in key order
pub fn group_by_tile(points: Vec<Geodetic3D>, level: usize) -> BTreeMap<TileId, Vec<Geodetic3D>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("ingest::group_by_tile");

    let keyed: Vec<(TileId, Geodetic3D)> = points
        .into_par_iter()
        .map(|point| (tile_of(&point, level), point))
        .collect();

    let mut groups: BTreeMap<TileId, Vec<Geodetic3D>> = BTreeMap::new();
    for (id, point) in keyed {
        groups.entry(id).or_default().push(point);
    }
    groups
}

/// Load files in parallel and insert their points grouped by tile
///
/// Groups are inserted in key order, so a group that stays at a coarser level
/// is stored before the finer groups below it and those are merged into it.
pub fn ingest_files(octree: &PersistentOctree, files: &[PathBuf], level: usize) -> Result<IngestReport> {
    #[cfg(feature = "profiling")]
    profiling::scope!("ingest::ingest_files");

    let loaded: Vec<Vec<Geodetic3D>> = files
        .par_iter()
        .map(|path| {
            read_points(path).map_err(|e| ToolError::Input {
                path: path.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<_>>()?;

    for (path, points) in files.iter().zip(loaded.iter()) {
        tracing::info!("loaded {} points from {}", points.len(), path.display());
    }

    let mut report = ingest_points(octree, loaded.into_iter().flatten().collect(), level)?;
    report.files = files.len();
    Ok(report)
}

/// Insert points grouped by their tile at `level`
///
/// Each batch covers the whole sector of its group tile rather than the
/// bounding box of its points, so every run over the same area targets the same
/// tile and merges into it regardless of how widely its points are spread.
pub fn ingest_points(
    octree: &PersistentOctree,
    points: Vec<Geodetic3D>,
    level: usize,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        points: points.len(),
        ..IngestReport::default()
    };

    let level = level.min(octree.config().max_depth);
    let groups = group_by_tile(points, level);
    tracing::info!("{} points grouped into {} batches", report.points, groups.len());

    for (id, points) in groups {
        let count = points.len();
        let centroid = PointBatch::from_points(points)?;
        let batch = PointBatch::new(sector_for_id(&id), centroid.average_point, centroid.points);
        let outcome = octree.insert(batch)?;
        if let InsertOutcome::Deferred { descendants, .. } = &outcome {
            tracing::warn!(
                "batch of {} points for tile {} skipped, {} finer tiles already exist",
                count,
                id,
                descendants.len()
            );
        }
        report.record(&outcome, count);
    }

    octree.flush()?;
    Ok(report)
}
