use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gtile_core::cache::{frame, unframe};
use gtile_core::fragments::{finalize, FragmentOptions};
use gtile_core::tiling::{partition, split_to_budget};
use gtile_core::{encode_dense, TileId};

fn generate_matrix_tile(size: usize) -> Vec<f32> {
    (0..size * size)
        .map(|i| {
            let (r, c) = (i / size, i % size);
            1000.0 / (1.0 + r.abs_diff(c) as f32)
        })
        .collect()
}

fn bench_encode_dense(c: &mut Criterion) {
    let half = generate_matrix_tile(256);
    let mut wide = half.clone();
    wide[17] = 1.0e6;

    let mut group = c.benchmark_group("encode_dense");
    group.bench_function("float16_256x256", |b| b.iter(|| black_box(encode_dense(black_box(&half), None))));
    group.bench_function("float32_256x256", |b| b.iter(|| black_box(encode_dense(black_box(&wide), None))));
    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    // a 16x16 viewport plus scattered stragglers
    let mut raw: Vec<String> = Vec::new();
    for x in 0..16 {
        for y in 0..16 {
            raw.push(format!("m.8.{}.{}", x, y));
        }
    }
    for k in 0..32 {
        raw.push(format!("m.8.{}.{}", 40 + k * 3, 200 - k * 5));
    }
    let ids: Vec<TileId> = raw.iter().map(|r| TileId::parse(r).unwrap()).collect();

    c.bench_function("partition_288_tiles", |b| {
        b.iter(|| {
            let groups: Vec<_> = partition(black_box(ids.clone()))
                .into_iter()
                .flat_map(|g| split_to_budget(g, 16))
                .collect();
            black_box(groups)
        })
    });
}

fn bench_fragment_finalize(c: &mut Criterion) {
    let dims = 64;
    let matrix: Vec<f64> = (0..dims * dims).map(|i| ((i * 31) % 997) as f64).collect();
    let opts = FragmentOptions { dims, ignore_diags: 2, percentile: 99.0, precision: 3, ..Default::default() };
    let window = 0..dims as i64;

    c.bench_function("finalize_64", |b| {
        b.iter(|| black_box(finalize(black_box(matrix.clone()), &window, &window, &opts)))
    });
}

fn bench_cache_framing(c: &mut Criterion) {
    let tile = encode_dense(&generate_matrix_tile(256), None);
    let payload = serde_json::to_vec(&tile).unwrap();
    let blob = frame(&payload).unwrap();

    let mut group = c.benchmark_group("cache_blob");
    group.bench_function("frame", |b| b.iter(|| black_box(frame(black_box(&payload)).unwrap())));
    group.bench_function("unframe", |b| b.iter(|| black_box(unframe(black_box(&blob)).unwrap())));
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_dense,
    bench_partition,
    bench_fragment_finalize,
    bench_cache_framing
);
criterion_main!(benches);
