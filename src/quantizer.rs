use rayon::prelude::*;

use crate::search::distance::l2_squared;

/// 把单个样本量化为长度等于词表大小的向量
#[derive(Debug, Clone, Copy)]
pub enum Quantizer {
    /// 硬量化：最近的中心得 1，其余为 0
    Hard,
    /// 模糊量化：按高斯权重分配到所有中心，再做 L1 归一化
    Fuzzy { sigma: f32 },
}

impl Quantizer {
    pub fn fuzzy(sigma: f32) -> Self {
        assert!(sigma > 0.0, "sigma 必须为正数");
        Quantizer::Fuzzy { sigma }
    }

    pub fn quantize(&self, sample: &[f32], vocabulary: &[Vec<f32>]) -> Vec<f32> {
        let mut quantized = vec![0.0f32; vocabulary.len()];
        match *self {
            Quantizer::Hard => {
                let mut closest = 0;
                let mut min_distance = f32::MAX;
                for (i, word) in vocabulary.iter().enumerate() {
                    let distance = l2_squared(sample, word);
                    if distance <= min_distance {
                        closest = i;
                        min_distance = distance;
                    }
                }
                quantized[closest] = 1.0;
            }
            Quantizer::Fuzzy { sigma } => {
                let sigma2 = 2.0 * sigma * sigma;
                let mut sum = 0.0;
                for (q, word) in quantized.iter_mut().zip(vocabulary) {
                    let d = l2_squared(sample, word);
                    // 距离函数已经返回平方距离
                    let e = (-d * d / sigma2).exp();
                    sum += e;
                    *q = e;
                }
                // L1 归一化，让每个局部特征向直方图贡献相同的总能量，
                // 否则靠近多个词表中心的特征会贡献更多
                for q in &mut quantized {
                    *q /= sum;
                }
            }
        }
        quantized
    }
}

/// 并行量化一组样本，输出与输入一一对应
pub fn quantize_batch(
    samples: &[Vec<f32>],
    vocabulary: &[Vec<f32>],
    quantizer: Quantizer,
) -> Vec<Vec<f32>> {
    samples.par_iter().map(|s| quantizer.quantize(s, vocabulary)).collect()
}

/// 把一组量化后的样本累加成视觉词直方图
///
/// res 是空间金字塔的每边格数，res = 1 时退化为普通词袋直方图，
/// positions 被忽略。res > 1 时按规一化坐标把每个样本计入所在
/// 格子的子直方图。normalize 控制是否除以样本数量，模糊量化的
/// 直方图通常需要归一化，硬量化则不需要。
pub fn build_histvw(
    quantized: &[Vec<f32>],
    vocabulary_size: usize,
    normalize: bool,
    positions: &[Vec<f32>],
    res: usize,
) -> Vec<f32> {
    assert!(res > 0);
    assert!(vocabulary_size > 0);
    if res > 1 {
        assert_eq!(positions.len(), quantized.len());
    }

    let mut histvw = vec![0.0f32; res * res * vocabulary_size];

    for (i, q) in quantized.iter().enumerate() {
        assert_eq!(q.len(), vocabulary_size);

        let offset = if res > 1 {
            let mut x = (positions[i][0] * res as f32) as usize;
            let mut y = (positions[i][1] * res as f32) as usize;
            // 坐标恰好为 1.0 时落在最后一格
            if x == res {
                x -= 1;
            }
            if y == res {
                y -= 1;
            }
            (y * res + x) * vocabulary_size
        } else {
            0
        };

        for (h, v) in histvw[offset..offset + vocabulary_size].iter_mut().zip(q) {
            *h += v;
        }
    }

    if normalize && !quantized.is_empty() {
        let n = quantized.len() as f32;
        for h in &mut histvw {
            *h /= n;
        }
    }

    histvw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vec<Vec<f32>> {
        vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]
    }

    #[test]
    fn test_hard_quantization_one_hot() {
        let q = Quantizer::Hard.quantize(&[0.9, 0.1], &vocabulary());
        assert_eq!(q, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_hard_quantization_tie_takes_last() {
        // 两个中心距离相同时选下标更大的那个
        let vocab = vec![vec![0.0], vec![2.0]];
        let q = Quantizer::Hard.quantize(&[1.0], &vocab);
        assert_eq!(q, vec![0.0, 1.0]);
    }

    #[test]
    fn test_fuzzy_quantization_l1_normalized() {
        let q = Quantizer::fuzzy(0.5).quantize(&[0.4, 0.3], &vocabulary());
        assert!((q.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        // 离得近的中心权重更大
        assert!(q[0] > q[1] && q[0] > q[2]);
    }

    #[test]
    #[should_panic(expected = "sigma 必须为正数")]
    fn test_fuzzy_requires_positive_sigma() {
        Quantizer::fuzzy(0.0);
    }

    #[test]
    fn test_histvw_sums() {
        let vocab = vocabulary();
        let samples = vec![vec![0.1, 0.0], vec![0.9, 0.0], vec![0.0, 1.1], vec![0.2, 0.1]];

        // 硬量化不归一化：直方图元素之和等于样本数
        let quantized = quantize_batch(&samples, &vocab, Quantizer::Hard);
        let hist = build_histvw(&quantized, vocab.len(), false, &[], 1);
        assert!((hist.iter().sum::<f32>() - samples.len() as f32).abs() < 1e-6);

        // 模糊量化并归一化：直方图元素之和等于 1
        let quantized = quantize_batch(&samples, &vocab, Quantizer::fuzzy(0.7));
        let hist = build_histvw(&quantized, vocab.len(), true, &[], 1);
        assert!((hist.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_histvw_empty_input() {
        let hist = build_histvw(&[], 3, true, &[], 1);
        assert_eq!(hist, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_spatial_pyramid_partitions_flat_histogram() {
        let vocab = vocabulary();
        let samples: Vec<Vec<f32>> =
            (0..50).map(|i| vec![(i % 7) as f32 * 0.2, (i % 3) as f32 * 0.3]).collect();
        let positions: Vec<Vec<f32>> =
            (0..50).map(|i| vec![(i as f32 / 49.0), ((i * 13 % 50) as f32 / 49.0)]).collect();
        let quantized = quantize_batch(&samples, &vocab, Quantizer::fuzzy(0.5));

        let flat = build_histvw(&quantized, vocab.len(), false, &positions, 1);
        for res in [2usize, 3, 4] {
            let pyramid = build_histvw(&quantized, vocab.len(), false, &positions, res);
            assert_eq!(pyramid.len(), res * res * vocab.len());
            // 所有格子的子直方图之和等于整体直方图
            for word in 0..vocab.len() {
                let total: f32 =
                    (0..res * res).map(|cell| pyramid[cell * vocab.len() + word]).sum();
                assert!((total - flat[word]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_spatial_pyramid_cell_indexing() {
        // 位置恰好为 1.0 的样本必须落入最后一格
        let vocab = vec![vec![0.0]];
        let quantized = vec![vec![1.0]];
        let positions = vec![vec![1.0, 1.0]];
        let hist = build_histvw(&quantized, 1, false, &positions, 2);
        assert_eq!(hist, vec![0.0, 0.0, 0.0, 1.0]);
    }
}
