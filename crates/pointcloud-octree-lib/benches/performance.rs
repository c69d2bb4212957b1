//! Performance benchmarks for pointcloud-octree-lib
//!
//! Run with: cargo bench --package pointcloud-octree-lib

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use pointcloud_octree_lib::codec::{self, Format, NodeEntry};
use pointcloud_octree_lib::{
    Geodetic3D, OctreeConfig, PersistentOctree, PointBatch, Sector, TileId, deepest_enclosing_tile,
};

/// Generate a scan-like cluster of points around a base position
fn generate_points(num_points: usize, base_lat: f64, base_lon: f64) -> Vec<Geodetic3D> {
    (0..num_points)
        .map(|i| {
            let t = i as f64 / num_points as f64;
            let lat = base_lat + t * 0.01 + (t * 50.0).sin() * 0.001;
            let lon = base_lon + t * 0.01 + (t * 30.0).cos() * 0.001;
            Geodetic3D::from_degrees(lat, lon, 600.0 + (t * 20.0).sin() * 30.0)
        })
        .collect()
}

/// Generate batches spread across an area, one cluster each
fn generate_batches(num_batches: usize, points_per_batch: usize) -> Vec<PointBatch> {
    (0..num_batches)
        .map(|i| {
            let lat_offset = (i % 10) as f64 * 0.1;
            let lon_offset = (i / 10) as f64 * 0.1;
            let points = generate_points(points_per_batch, 40.4 + lat_offset, -3.7 + lon_offset);
            PointBatch::from_points(points).unwrap()
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let batch = PointBatch::from_points(generate_points(50_000, 40.4, -3.7)).unwrap();
    let id = deepest_enclosing_tile(&batch.sector).id;
    let data = codec::encode_points(&batch.average_point, &batch.points);

    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("encode_points_50k", |b| {
        b.iter(|| codec::encode_points(&batch.average_point, &batch.points));
    });
    group.bench_function("decode_points_50k", |b| {
        b.iter(|| codec::decode_points(&id, &batch.average_point, batch.len() as u32, &data));
    });

    let entry = NodeEntry {
        sector: batch.sector,
        points_count: batch.len() as u32,
        average_point: batch.average_point,
        format: Format::LatLonHeight,
    };
    let encoded = codec::encode_node_entry(&id, &entry).unwrap();
    group.throughput(Throughput::Elements(1));
    group.bench_function("decode_node_entry", |b| {
        b.iter(|| codec::decode_node_entry(&id, &encoded));
    });

    group.finish();
}

fn bench_addressing(c: &mut Criterion) {
    let mut group = c.benchmark_group("addressing");

    let narrow = Sector::from_degrees(40.40, -3.71, 40.4001, -3.7099);
    group.bench_function("deepest_enclosing_tile_narrow", |b| {
        b.iter(|| deepest_enclosing_tile(&narrow));
    });

    let point = Sector::from_degrees(51.5, -0.1, 51.5, -0.1);
    group.bench_function("deepest_enclosing_tile_point", |b| {
        b.iter(|| deepest_enclosing_tile(&point));
    });

    group.finish();
}

fn bench_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("insertion");
    group.sample_size(10);

    // 100 disjoint batches with 1000 points each
    let batches = generate_batches(100, 1_000);
    group.throughput(Throughput::Elements(100 * 1_000));
    group.bench_function("fresh_100x1k", |b| {
        b.iter_batched(
            || {
                (
                    PersistentOctree::temporary(OctreeConfig::default()).unwrap(),
                    batches.clone(),
                )
            },
            |(octree, batches)| {
                for batch in batches {
                    octree.insert(batch).unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });

    // Repeated merges into one tile with a small capacity, forcing splits
    let config = OctreeConfig {
        max_points_per_tile: 4_096,
        ..OctreeConfig::default()
    };
    let wide = PointBatch::from_points(generate_points(20_000, 40.4, -3.7)).unwrap();
    let follow_ups: Vec<PointBatch> = (0..20)
        .map(|i| {
            let points = generate_points(1_000, 40.402 + i as f64 * 0.0001, -3.698);
            PointBatch::from_points(points).unwrap()
        })
        .collect();
    group.throughput(Throughput::Elements(20_000 + 20 * 1_000));
    group.bench_function("merge_and_split_40k", |b| {
        b.iter_batched(
            || {
                (
                    PersistentOctree::temporary(config.clone()).unwrap(),
                    wide.clone(),
                    follow_ups.clone(),
                )
            },
            |(octree, wide, follow_ups)| {
                octree.insert(wide).unwrap();
                for batch in follow_ups {
                    octree.insert(batch).unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    let octree = PersistentOctree::temporary(OctreeConfig::default()).unwrap();
    for batch in generate_batches(100, 1_000) {
        octree.insert(batch).unwrap();
    }

    group.bench_function("statistics_100_tiles", |b| {
        b.iter(|| octree.statistics().unwrap());
    });

    let first = TileId::root();
    group.bench_function("read_root_tile", |b| {
        b.iter(|| octree.read_tile(&first).unwrap());
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_codec,
    bench_addressing,
    bench_insertion,
    bench_statistics,
);

criterion_main!(benches);
