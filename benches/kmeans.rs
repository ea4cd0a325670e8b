use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use visearch::kmeans::kmeans;
use visearch::quantizer::{quantize_batch, Quantizer};

/// 生成带聚类结构的测试数据：num_clusters 个中心附近的 64 维向量
fn generate_clustered_data(n: usize, num_clusters: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(42); // 固定种子确保结果可复现
    let d = 64;

    let centers: Vec<Vec<f32>> = (0..num_clusters)
        .map(|_| (0..d).map(|_| rng.gen_range(0.0..1.0)).collect())
        .collect();

    (0..n)
        .map(|i| {
            let center = &centers[i % num_clusters];
            center.iter().map(|&c| c + rng.gen_range(-0.05..0.05)).collect()
        })
        .collect()
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(10);

    for (n, nc) in [(2000, 32), (8000, 128)] {
        let data = black_box(generate_clustered_data(n, nc / 2));
        group.bench_function(format!("kmeans_{n}_{nc}"), |b| {
            b.iter(|| kmeans(&data, nc, 20, 0.01, 7).unwrap())
        });
    }

    group.finish();
}

fn bench_quantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize");

    let vocabulary = generate_clustered_data(1000, 1000);
    let samples = black_box(generate_clustered_data(500, 100));

    group.bench_function("hard_500x1000", |b| {
        b.iter(|| quantize_batch(&samples, &vocabulary, Quantizer::Hard))
    });
    group.bench_function("fuzzy_500x1000", |b| {
        b.iter(|| quantize_batch(&samples, &vocabulary, Quantizer::fuzzy(0.1)))
    });

    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_quantize);
criterion_main!(benches);
