use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use visearch::search::distance::Distance;
use visearch::search::linear_search;
use visearch::search::tf_idf::{make_idf, make_tf};
use visearch::search::InvertedIndex;

/// 稀疏直方图集合：每个文档只有少数非零词
fn generate_histograms(n: usize, num_words: usize, nonzero: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            let mut h = vec![0.0f32; num_words];
            for _ in 0..nonzero {
                let t = rng.gen_range(0..num_words);
                h[t] += rng.gen_range(0.1..1.0);
            }
            h
        })
        .collect()
}

fn bench_index_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("inverted_index");

    let tf = make_tf("video_google").unwrap();
    let idf = make_idf("video_google").unwrap();

    for (n, num_words) in [(10_000, 1000), (50_000, 4000)] {
        let histograms = generate_histograms(n, num_words, 50);
        let mut index = InvertedIndex::new(num_words);
        for h in &histograms {
            index.add_histogram(h);
        }
        index.finalize(tf, idf);

        let query = black_box(histograms[0].clone());
        group.bench_function(format!("query_{n}x{num_words}"), |b| {
            b.iter(|| index.query(&query, tf, idf, 50))
        });
    }

    group.finish();
}

fn bench_linear_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_search");

    let mut rng = StdRng::seed_from_u64(3);
    let features: Vec<Vec<f32>> = (0..20_000)
        .map(|_| (0..768).map(|_| rng.gen_range(0.0f32..1.0)).collect())
        .collect();
    let query = black_box(features[0].clone());

    for name in ["l2norm_squared", "l1norm", "cosine"] {
        let distance = Distance::from_name(name).unwrap();
        group.bench_function(format!("{name}_20000x768"), |b| {
            b.iter(|| linear_search(&query, &features, 50, &distance))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_index_query, bench_linear_search);
criterion_main!(benches);
