//! Point Cloud Octree Tool - Command line front end
//!
//! Loads GPX and plain text point files into a [`PersistentOctree`] and prints
//! statistics, tile listings and tile contents.

pub mod cli;
pub mod commands;
pub mod ingest;

use cli::{Command, Settings};
use pointcloud_octree_lib::{OctreeError, PersistentOctree};
use std::io::Write;
use std::path::PathBuf;

/// Error types for the tool
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Octree(#[from] OctreeError),

    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("Cannot read {}: {reason}", path.display())]
    Input { path: PathBuf, reason: String },

    #[error("Tile \"{0}\" not found")]
    TileNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Install the `tracing` subscriber
///
/// Logs go to stderr so that JSON output on stdout stays machine readable.
/// `RUST_LOG` overrides the default `info` filter.
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the command selected on the command line
pub fn run<W: Write>(settings: &Settings, out: &mut W) -> Result<()> {
    let octree = PersistentOctree::open(&settings.db, settings.octree_config())?;

    match &settings.command {
        Command::Ingest {
            files, level, json, ..
        } => {
            let report = ingest::ingest_files(&octree, files, *level)?;
            tracing::info!(
                "ingested {} points from {} files: {} created, {} merged, {} distributed, {} splits, {} deferred",
                report.points,
                report.files,
                report.created,
                report.merged,
                report.distributed,
                report.splits,
                report.deferred
            );
            if *json {
                serde_json::to_writer_pretty(&mut *out, &report)?;
                writeln!(out)?;
            }
            Ok(())
        }
        Command::Stats { json } => commands::stats(&octree, *json, out),
        Command::Dump { tile, json } => commands::dump(&octree, tile.as_deref(), *json, out),
        Command::Points { tile, json } => commands::points(&octree, tile, *json, out),
    }
}
