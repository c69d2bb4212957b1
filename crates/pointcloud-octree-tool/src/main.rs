use clap::Parser;
use pointcloud_octree_tool::cli::Settings;

fn main() {
    let settings = Settings::parse();
    pointcloud_octree_tool::setup_logging();

    let stdout = std::io::stdout();
    if let Err(e) = pointcloud_octree_tool::run(&settings, &mut stdout.lock()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
