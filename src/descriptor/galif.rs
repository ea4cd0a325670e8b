use std::f64::consts::PI;

use anyhow::{bail, Result};
use image::RgbImage;
use rustfft::num_complex::Complex;
use serde_json::Value;

use crate::descriptor::local::{HistNormalization, PatchExtractor};
use crate::descriptor::sampler::ImageSampler;
use crate::descriptor::{Bundle, Generator, Params, PropertyKind, PropertyValue};
use crate::imgproc;
use crate::imgproc::fft::{mul_spectrum, to_complex, Dft2};
use crate::imgproc::Mat32;
use crate::registry::REGISTRY;

/// GALIF 局部描述符（Gabor 线条响应直方图）
///
/// 用一组各向异性 Gabor 滤波器在频域卷积素描图，每个方向得到
/// 一张线条响应图，之后的关键点网格采样与 SHOG 相同。相比梯度
/// 方向直方图，带通响应对线条宽度更不敏感。
pub struct GalifGenerator {
    /// 缩放后图像较长边的上限，也是滤波器的边长
    max_side: usize,
    filters: Vec<Mat32>,
    sampler: Box<dyn ImageSampler>,
    extractor: PatchExtractor,
    dft: Dft2,
    parameters: Value,
}

const PROPERTIES: &[(&str, PropertyKind)] = &[
    ("features", PropertyKind::F32Lists),
    ("positions", PropertyKind::F32Lists),
    ("numfeatures", PropertyKind::I32),
];

impl GalifGenerator {
    pub fn new(params: Value) -> Result<Self> {
        let mut params = Params::new(params);
        let max_side = params.parse_usize("image_width", 256);
        let num_orients = params.parse_usize("num_orients", 4);
        let peak_frequency = params.parse_f64("peak_frequency", 0.13);
        let line_width = params.parse_f64("line_width", 0.02);
        let lambda = params.parse_f64("lambda", 0.3);
        let feature_size = params.parse_f64("feature_size", 0.1);
        let tiles = params.parse_usize("tiles", 4);
        let smooth_hist = params.parse_bool("smooth_hist", true);
        let normalize = match params.parse_string("normalize_hist", "l2").as_str() {
            "l2" => HistNormalization::L2,
            "none" => HistNormalization::None,
            other => bail!("未知的直方图归一化方式: {other}"),
        };

        let mut sampler_params = params.child("sampler");
        let sampler_name = sampler_params.parse_string("name", "grid");
        let sampler = REGISTRY.create_sampler(&sampler_name, &mut sampler_params)?;
        params.set_child("sampler", sampler_params);

        let filters =
            init_filters(max_side, num_orients, peak_frequency, line_width, lambda);

        let extractor = PatchExtractor { tiles, feature_size, smooth_hist, normalize };

        Ok(Self {
            max_side,
            filters,
            sampler,
            extractor,
            dft: Dft2::new(max_side, max_side),
            parameters: params.into_value(),
        })
    }
}

impl Generator for GalifGenerator {
    fn properties(&self) -> &[(&'static str, PropertyKind)] {
        PROPERTIES
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    fn compute(&self, image: &RgbImage) -> Result<Bundle> {
        let gray = imgproc::to_gray(image);
        let (scaled, _) = imgproc::scale_to_side_length(&gray, self.max_side as u32);
        let (width, height) = (scaled.width() as usize, scaled.height() as usize);

        let keypoints = self.sampler.sample(scaled.width(), scaled.height());

        // 镜像填充到滤波器尺寸后做一次正变换
        let side = self.max_side;
        let padded = imgproc::symmetric_pad(&scaled, side as u32, side as u32);
        let src = Mat32::from_fn(side, side, |r, c| {
            padded.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
        });
        let mut spectrum = to_complex(&src);
        self.dft.forward(&mut spectrum);

        // 每个方向一张线条响应图，只保留未填充的区域
        let mut response = vec![Complex::default(); spectrum.len()];
        let responses: Vec<Mat32> = self
            .filters
            .iter()
            .map(|filter| {
                response.copy_from_slice(&spectrum);
                mul_spectrum(&mut response, filter);
                self.dft.inverse(&mut response);
                Mat32::from_fn(height, width, |r, c| response[r * side + c].norm())
            })
            .collect();

        let extracted = self.extractor.extract(&scaled, &responses, &keypoints);

        let mut bundle = Bundle::new();
        bundle.insert("numfeatures", PropertyValue::I32(extracted.features.len() as i32));
        bundle.insert("features", PropertyValue::F32Lists(extracted.features));
        bundle.insert("positions", PropertyValue::F32Lists(extracted.positions));
        Ok(bundle)
    }
}

/// 各向异性 Gabor 传递函数组
///
/// 高斯包络沿线条方向被 1/lambda 拉长，线条宽度决定径向带宽。
/// 与 GIST 的滤波器一样采用原点在 (0,0) 的存储约定并去掉直流。
fn init_filters(
    side: usize,
    num_orients: usize,
    peak_frequency: f64,
    line_width: f64,
    lambda: f64,
) -> Vec<Mat32> {
    // 空域尺度（像素）换算成频域高斯的系数
    let sigma_x = line_width * side as f64;
    let sigma_y = sigma_x / lambda;

    let step = 1.0 / side as f64;
    let mut filters = Vec::with_capacity(num_orients);
    for k in 0..num_orients {
        let theta = k as f64 * PI / num_orients as f64;
        let (cos_t, sin_t) = (theta.cos(), theta.sin());

        let mut filter = Mat32::zeros(side, side);
        let mut v = -0.5;
        for yy in 0..side {
            let y = (yy + side / 2) % side;
            let mut u = -0.5;
            for xx in 0..side {
                let x = (xx + side / 2) % side;

                let ur = u * cos_t + v * sin_t;
                let vr = -u * sin_t + v * cos_t;
                let value = (-2.0 * PI * PI
                    * (sigma_x * sigma_x * (ur - peak_frequency) * (ur - peak_frequency)
                        + sigma_y * sigma_y * vr * vr))
                    .exp();
                *filter.at_mut(y, x) = value as f32;

                u += step;
            }
            v += step;
        }

        // 去掉直流分量
        *filter.at_mut(0, 0) = 0.0;
        filters.push(filter);
    }
    filters
}
