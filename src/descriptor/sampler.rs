use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::descriptor::Params;

/// 关键点采样器，在图像平面上产生像素坐标
pub trait ImageSampler: Send + Sync {
    fn sample(&self, width: u32, height: u32) -> Vec<[f32; 2]>;
}

/// 均匀网格采样
///
/// 实际产生 ceil(sqrt(n))^2 个点，分布在图像内部（不含边界）。
pub struct GridSampler {
    num_samples: usize,
}

impl GridSampler {
    pub fn from_params(params: &mut Params) -> Self {
        Self { num_samples: params.parse_usize("num_samples", 625) }
    }
}

impl ImageSampler for GridSampler {
    fn sample(&self, width: u32, height: u32) -> Vec<[f32; 2]> {
        let n1 = (self.num_samples as f32).sqrt().ceil() as u32;
        let step_x = width as f32 / (n1 + 1) as f32;
        let step_y = height as f32 / (n1 + 1) as f32;

        let mut samples = Vec::with_capacity((n1 * n1) as usize);
        for x in 1..=n1 {
            let pos_x = (x as f32 * step_x) as u32;
            for y in 1..=n1 {
                let pos_y = (y as f32 * step_y) as u32;
                samples.push([pos_x as f32, pos_y as f32]);
            }
        }
        samples
    }
}

/// 图像矩形内的均匀随机采样
///
/// 种子可以通过配置显式指定以保证可复现，缺省时从系统熵初始化。
pub struct RandomAreaSampler {
    num_samples: usize,
    seed: u64,
}

impl RandomAreaSampler {
    pub fn from_params(params: &mut Params) -> Self {
        let num_samples = params.parse_usize("num_samples", 500);
        let seed = params.parse_u64("seed", rand::random());
        Self { num_samples, seed }
    }
}

impl ImageSampler for RandomAreaSampler {
    fn sample(&self, width: u32, height: u32) -> Vec<[f32; 2]> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.num_samples)
            .map(|_| {
                let x = rng.gen_range(0..width);
                let y = rng.gen_range(0..height);
                [x as f32, y as f32]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grid_sampler_count_and_bounds() {
        let mut params = Params::new(json!({ "num_samples": 625 }));
        let sampler = GridSampler::from_params(&mut params);
        let samples = sampler.sample(256, 192);

        assert_eq!(samples.len(), 625);
        for [x, y] in &samples {
            assert!(*x >= 0.0 && *x < 256.0);
            assert!(*y >= 0.0 && *y < 192.0);
        }
    }

    #[test]
    fn test_grid_sampler_rounds_up() {
        // 10 个采样点向上取整到 4x4 网格
        let mut params = Params::new(json!({ "num_samples": 10 }));
        let sampler = GridSampler::from_params(&mut params);
        assert_eq!(sampler.sample(100, 100).len(), 16);
    }

    #[test]
    fn test_random_sampler_seeded() {
        let mut p1 = Params::new(json!({ "seed": 99 }));
        let mut p2 = Params::new(json!({ "seed": 99 }));
        let a = RandomAreaSampler::from_params(&mut p1).sample(64, 64);
        let b = RandomAreaSampler::from_params(&mut p2).sample(64, 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 500);
        for [x, y] in &a {
            assert!(*x < 64.0 && *y < 64.0);
        }
    }
}
