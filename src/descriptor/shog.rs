use std::f32::consts::PI;

use anyhow::Result;
use image::RgbImage;
use serde_json::Value;

use crate::descriptor::local::{HistNormalization, PatchExtractor};
use crate::descriptor::sampler::ImageSampler;
use crate::descriptor::{Bundle, Generator, Params, PropertyKind, PropertyValue};
use crate::imgproc;
use crate::imgproc::filters::{gaussian_blur_u8, sobel_x, sobel_y};
use crate::imgproc::Mat32;
use crate::registry::REGISTRY;

/// SHOG 局部描述符（梯度方向直方图）
///
/// 像素梯度方向按三角权重软分配到若干方向响应图，再在采样出的
/// 每个关键点周围按网格采样平滑后的响应，得到
/// tiles x tiles x orients 维的局部特征。输入应当是白底黑线条的
/// 素描图。
pub struct ShogGenerator {
    /// 缩放后图像较长边的上限
    max_side: usize,
    num_orients: usize,
    sampler: Box<dyn ImageSampler>,
    extractor: PatchExtractor,
    parameters: Value,
}

const PROPERTIES: &[(&str, PropertyKind)] = &[
    ("features", PropertyKind::F32Lists),
    ("positions", PropertyKind::F32Lists),
    ("numfeatures", PropertyKind::I32),
];

impl ShogGenerator {
    pub fn new(params: Value) -> Result<Self> {
        let mut params = Params::new(params);
        let max_side = params.parse_usize("image_width", 256);
        let num_orients = params.parse_usize("num_orients", 4);
        let feature_size = params.parse_f64("feature_size", 0.125);
        let tiles = params.parse_usize("tiles", 4);
        let smooth_hist = params.parse_bool("smooth_hist", true);

        let mut sampler_params = params.child("sampler");
        let sampler_name = sampler_params.parse_string("name", "grid");
        let sampler = REGISTRY.create_sampler(&sampler_name, &mut sampler_params)?;
        params.set_child("sampler", sampler_params);

        let extractor = PatchExtractor {
            tiles,
            feature_size,
            smooth_hist,
            normalize: HistNormalization::L2,
        };

        Ok(Self { max_side, num_orients, sampler, extractor, parameters: params.into_value() })
    }

    /// 把梯度方向和幅值软分配到 num_orients 个响应图
    fn orientation_responses(&self, gx: &Mat32, gy: &Mat32) -> Vec<Mat32> {
        let (rows, cols) = (gx.rows(), gx.cols());
        let o = self.num_orients;
        let mut responses = vec![Mat32::zeros(rows, cols); o];

        for r in 0..rows {
            for c in 0..cols {
                let gxx = gx.at(r, c);
                let gyy = gy.at(r, c);
                let magnitude = (gxx * gxx + gyy * gyy).sqrt();
                // 幅值为零的像素是空白区域，不参与直方图
                if magnitude == 0.0 {
                    continue;
                }

                let mut cos_o = gyy / (magnitude + f32::EPSILON);
                if gxx < 0.0 {
                    cos_o = -cos_o;
                }
                let orientation = cos_o.clamp(-1.0, 1.0).acos();

                // 方向规一化到 [0, o)，按三角权重分到相邻三个 bin
                let val = (orientation / PI * o as f32) % o as f32;
                let bin = val as usize;
                let half_bin = 0.5;

                let r_center = bin as f32 + 1.0 + half_bin;
                let r_val = (1.0 - (r_center - val)).max(0.0);
                let l_center = bin as f32 - 1.0 + half_bin;
                let l_val = (1.0 - (val - l_center)).max(0.0);

                *responses[bin].at_mut(r, c) += (1.0 - l_val - r_val) * magnitude;
                *responses[(bin + 1) % o].at_mut(r, c) += r_val * magnitude;
                *responses[(bin + o - 1) % o].at_mut(r, c) += l_val * magnitude;
            }
        }
        responses
    }
}

impl Generator for ShogGenerator {
    fn properties(&self) -> &[(&'static str, PropertyKind)] {
        PROPERTIES
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    fn compute(&self, image: &RgbImage) -> Result<Bundle> {
        let gray = imgproc::to_gray(image);
        let (scaled, _) = imgproc::scale_to_side_length(&gray, self.max_side as u32);

        let keypoints = self.sampler.sample(scaled.width(), scaled.height());

        // 轻微模糊后再求梯度，方向场更平滑；幅值保留下来作为权重，
        // 弥补模糊造成的边缘定位变差
        let blurred = gaussian_blur_u8(&scaled, 7, 2.0);
        let gx = sobel_x(&blurred);
        let gy = sobel_y(&blurred);
        let responses = self.orientation_responses(&gx, &gy);

        let extracted = self.extractor.extract(&scaled, &responses, &keypoints);

        let mut bundle = Bundle::new();
        bundle.insert("numfeatures", PropertyValue::I32(extracted.features.len() as i32));
        bundle.insert("features", PropertyValue::F32Lists(extracted.features));
        bundle.insert("positions", PropertyValue::F32Lists(extracted.positions));
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compute(gen: &ShogGenerator, img: &RgbImage) -> (Vec<Vec<f32>>, Vec<Vec<f32>>, i32) {
        let mut bundle = gen.compute(img).unwrap();
        let features = match bundle.remove("features").unwrap() {
            PropertyValue::F32Lists(v) => v,
            _ => unreachable!(),
        };
        let positions = match bundle.remove("positions").unwrap() {
            PropertyValue::F32Lists(v) => v,
            _ => unreachable!(),
        };
        let num = match bundle.remove("numfeatures").unwrap() {
            PropertyValue::I32(v) => v,
            _ => unreachable!(),
        };
        (features, positions, num)
    }

    #[test]
    fn test_blank_image_produces_no_features() {
        // 纯白图像任何区域都没有笔画，所有特征都应被过滤
        let gen = ShogGenerator::new(json!({})).unwrap();
        let white = RgbImage::from_pixel(256, 256, image::Rgb([255, 255, 255]));
        let (features, positions, num) = compute(&gen, &white);
        assert!(features.is_empty());
        assert!(positions.is_empty());
        assert_eq!(num, 0);
    }

    #[test]
    fn test_horizontal_line_locality_and_orientation() {
        // 白底上一条水平黑线
        let mut img = RgbImage::from_pixel(256, 256, image::Rgb([255, 255, 255]));
        for x in 20..236 {
            for y in 127..130 {
                img.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }

        let gen = ShogGenerator::new(json!({})).unwrap();
        let (features, positions, num) = compute(&gen, &img);

        assert!(num > 0);
        assert_eq!(features.len(), num as usize);
        assert_eq!(positions.len(), num as usize);

        // 只有特征区域与直线相交的关键点会保留下来
        let feature_side = ((256.0f64 * 256.0 * 0.125).sqrt().ceil() / 256.0) as f32;
        for p in &positions {
            assert!((p[1] - 0.5).abs() <= feature_side / 2.0 + 0.05);
        }

        // 水平线的梯度方向为 0（模 pi），能量应集中在 0 号 bin 及其
        // 回绕邻居上
        let mut orient_energy = vec![0.0f32; 4];
        for f in &features {
            for (i, v) in f.iter().enumerate() {
                orient_energy[i % 4] += v;
            }
        }
        assert!(orient_energy[0] + orient_energy[3] > orient_energy[1] + orient_energy[2]);
    }

    #[test]
    fn test_positions_normalized() {
        let mut img = RgbImage::from_pixel(200, 100, image::Rgb([255, 255, 255]));
        for x in 0..200 {
            img.put_pixel(x, 50, image::Rgb([0, 0, 0]));
        }
        let gen = ShogGenerator::new(json!({})).unwrap();
        let (_, positions, _) = compute(&gen, &img);
        for p in &positions {
            assert!(p[0] >= 0.0 && p[0] <= 1.0);
            assert!(p[1] >= 0.0 && p[1] <= 1.0);
        }
    }

    #[test]
    fn test_features_l2_normalized() {
        let mut img = RgbImage::from_pixel(128, 128, image::Rgb([255, 255, 255]));
        for x in 0..128 {
            img.put_pixel(x, 64, image::Rgb([0, 0, 0]));
            img.put_pixel(64, x, image::Rgb([0, 0, 0]));
        }
        let gen = ShogGenerator::new(json!({})).unwrap();
        let (features, _, _) = compute(&gen, &img);
        assert!(!features.is_empty());
        for f in &features {
            let norm = f.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_custom_sampler_config() {
        let gen = ShogGenerator::new(
            json!({ "sampler": { "name": "random_area", "num_samples": 50, "seed": 3 } }),
        )
        .unwrap();
        // 生效配置里记录了采样器参数
        assert_eq!(gen.parameters()["sampler"]["name"], "random_area");
        assert_eq!(gen.parameters()["sampler"]["num_samples"], 50);
    }
}
