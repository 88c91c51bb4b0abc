//! Benchmarks for distance, index and chunk processing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use proximity_geo::{haversine_distance_meters, ChunkProcessor, CoarseFilter, Coordinate, GeoPoint, GridIndex, ProximityParams};

fn create_points(count: usize, id_base: i64) -> Vec<GeoPoint> {
    (0..count)
        .map(|i| {
            // Spread points over roughly 20 km around central Seoul
            let lat = 37.45 + (i as f64 * 0.0007) % 0.2;
            let lng = 126.90 + (i as f64 * 0.0013) % 0.2;
            GeoPoint::new(id_base + i as i64, lat, lng)
        })
        .collect()
}

fn bench_single_distance(c: &mut Criterion) {
    let city_hall = Coordinate::new(37.5665, 126.9780);
    let gangnam = Coordinate::new(37.4979, 127.0276);

    c.bench_function("haversine_single", |b| {
        b.iter(|| haversine_distance_meters(black_box(&city_hall), black_box(&gangnam)))
    });

    let filter = CoarseFilter::new(1000.0, 1.2).unwrap();
    c.bench_function("coarse_filter_single", |b| {
        b.iter(|| filter.accepts(black_box(&city_hall), black_box(&gangnam)))
    });
}

fn bench_grid_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_build");

    for size in [1_000, 10_000, 100_000].iter() {
        let targets = create_points(*size, 1_000_000);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| GridIndex::build(black_box(&targets), 0.01).unwrap())
        });
    }

    group.finish();
}

fn bench_chunks(c: &mut Criterion) {
    let params = ProximityParams::default();
    let targets = create_points(50_000, 1_000_000);
    let grid = GridIndex::build(&targets, params.grid_size).unwrap();
    let processor = ChunkProcessor::new(&grid, &params).unwrap();

    let mut group = c.benchmark_group("chunk_processing");

    for size in [50, 500, 5_000].iter() {
        let origins = create_points(*size, 0);
        group.bench_with_input(BenchmarkId::new("sequential", size), size, |b, _| {
            b.iter(|| processor.process_chunk(black_box(&origins), |_, _| false))
        });

        let chunks: Vec<&[GeoPoint]> = origins.chunks(50).collect();
        let skip = |_: i64, _: i64| false;
        group.bench_with_input(BenchmarkId::new("chunked", size), size, |b, _| {
            b.iter(|| processor.process_chunks(black_box(&chunks), &skip))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_distance, bench_grid_build, bench_chunks);
criterion_main!(benches);
