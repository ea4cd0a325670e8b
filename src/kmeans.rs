use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{ensure, Result};
use log::info;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::io::{read_property, PropertyReader};
use crate::search::distance::l2_squared;

/// 从局部特征文件中无放回地随机抽取样本
///
/// 特征文件的每条记录是一张图片的全部局部特征，单看文件无法知道
/// 每条记录里有多少特征，所以需要配套的数量文件。抽样先在
/// (记录, 记录内下标) 的全集上洗牌截断，再按记录分组读取，
/// 避免对同一条记录的反复随机读。
pub fn sample_local_features(
    descriptor_file: impl AsRef<Path>,
    size_file: impl AsRef<Path>,
    num_samples: usize,
    seed: u64,
) -> Result<Vec<Vec<f32>>> {
    let sizes: Vec<i32> = read_property(size_file)?;
    let total: usize = sizes.iter().map(|&n| n as usize).sum();
    info!("描述符文件共包含 {total} 个局部特征");

    // 抽样数量不能超过特征总数
    let num_samples = num_samples.min(total);

    let mut pairs = Vec::with_capacity(total);
    for (feature_id, &n) in sizes.iter().enumerate() {
        for local_id in 0..n as usize {
            pairs.push((feature_id, local_id));
        }
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);
    pairs.truncate(num_samples);

    let mut by_feature: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (feature_id, local_id) in pairs {
        by_feature.entry(feature_id).or_default().push(local_id);
    }

    let mut reader = PropertyReader::<Vec<Vec<f32>>>::open(descriptor_file)?;
    info!(
        "为凑齐样本需要读取 {:.1}% 的记录",
        by_feature.len() as f64 / reader.len() as f64 * 100.0
    );

    let mut data = Vec::with_capacity(num_samples);
    for (feature_id, local_ids) in by_feature {
        let feature = reader.get(feature_id)?;
        for local_id in local_ids {
            data.push(feature[local_id].clone());
        }
    }
    assert_eq!(data.len(), num_samples);
    Ok(data)
}

/// 平方欧氏距离下的 k-means 聚类，返回 k 个聚类中心
///
/// 停止条件：更换簇的样本比例低于 min_changes_fraction，或达到
/// 最大迭代次数。空簇保留上一轮的中心。
pub fn kmeans(
    samples: &[Vec<f32>],
    num_clusters: usize,
    max_iter: usize,
    min_changes_fraction: f64,
    seed: u64,
) -> Result<Vec<Vec<f32>>> {
    ensure!(num_clusters >= 1, "聚类中心数量必须 >= 1");
    ensure!(samples.len() >= num_clusters, "样本数量必须不少于聚类中心数量");

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    // 随机选 k 个互不相同的样本作为初始中心
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> =
        indices[..num_clusters].iter().map(|&i| samples[i].clone()).collect();

    let mut assignment = vec![usize::MAX; samples.len()];
    for iteration in 0..max_iter {
        // 分配步骤
        let new_assignment: Vec<usize> = samples
            .par_iter()
            .map(|sample| {
                let mut best = 0;
                let mut best_dist = f32::MAX;
                for (i, centroid) in centroids.iter().enumerate() {
                    let dist = l2_squared(sample, centroid);
                    if dist < best_dist {
                        best = i;
                        best_dist = dist;
                    }
                }
                best
            })
            .collect();

        let changes =
            assignment.iter().zip(&new_assignment).filter(|(a, b)| a != b).count();
        assignment = new_assignment;

        // 更新步骤
        let dim = centroids[0].len();
        let mut sums = vec![vec![0.0f64; dim]; num_clusters];
        let mut counts = vec![0usize; num_clusters];
        for (sample, &cluster) in samples.iter().zip(&assignment) {
            counts[cluster] += 1;
            for (s, &v) in sums[cluster].iter_mut().zip(sample) {
                *s += v as f64;
            }
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            if counts[cluster] > 0 {
                for (c, s) in centroid.iter_mut().zip(&sums[cluster]) {
                    *c = (s / counts[cluster] as f64) as f32;
                }
            }
        }

        let fraction = changes as f64 / samples.len() as f64;
        info!("第 {} 轮迭代，{changes} 个样本更换了簇 ({:.2}%)", iteration + 1, fraction * 100.0);

        if fraction < min_changes_fraction {
            break;
        }
    }

    Ok(centroids)
}
