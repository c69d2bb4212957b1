use clap::{Parser, Subcommand};
use pointcloud_octree_lib::OctreeConfig;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Point Cloud Octree - Ingest geodetic point files into a persistent Mercator octree
pub struct Settings {
    /// Directory of the octree database (created if missing)
    #[clap(short, long, value_name = "DIR", default_value = "octree.db")]
    pub db: PathBuf,

    /// Flush the database after every insertion instead of only at the end
    #[clap(long, default_value = "false")]
    pub flush_on_insert: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load GPX (.gpx) or text (`lat lon height` per line, degrees) point files
    Ingest {
        /// Point files to load
        #[clap(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Points are grouped into batches by the tile containing them at this level
        #[clap(short, long, default_value = "12")]
        level: usize,

        /// Maximum points per tile before it is subdivided
        #[clap(long, default_value = "262144")]
        max_points_per_tile: usize,

        /// Print the ingestion report as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Print tile and point counts
    Stats {
        /// Print as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// List the persisted tiles in key order
    Dump {
        /// Only list this tile and its descendants (quadrant digits, e.g. "0213")
        #[clap(short, long)]
        tile: Option<String>,

        /// Print as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Print the points stored in one tile (`lat lon height`, degrees)
    Points {
        /// Tile id as quadrant digits; an empty string is the root
        tile: String,

        /// Print as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },
}

impl Settings {
    /// Octree configuration derived from the command line
    pub fn octree_config(&self) -> OctreeConfig {
        let mut config = OctreeConfig {
            flush_on_insert: self.flush_on_insert,
            ..OctreeConfig::default()
        };
        if let Command::Ingest {
            max_points_per_tile,
            ..
        } = &self.command
        {
            config.max_points_per_tile = *max_points_per_tile;
        }
        config
    }
}
