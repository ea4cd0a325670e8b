use std::f64::consts::PI;

use anyhow::{bail, Result};
use image::{GrayImage, RgbImage};
use rustfft::num_complex::Complex;
use serde_json::Value;

use crate::descriptor::{Bundle, Generator, Params, PropertyKind, PropertyValue};
use crate::imgproc;
use crate::imgproc::fft::{mul_spectrum, to_complex, Dft2};
use crate::imgproc::Mat32;

/// GIST 全局描述符
///
/// 在频域用一组 Gabor 滤波器卷积图像，对每个响应按网格分块，
/// 输出每块幅值的均值和方差。滤波器组在构造时生成一次，之后
/// 只读共享。
pub struct GistGenerator {
    real_width: usize,
    real_height: usize,
    num_x_tiles: usize,
    num_y_tiles: usize,
    /// 填充后的工作尺寸
    width: usize,
    height: usize,
    prefilter: Option<TorralbaPrefilter>,
    filters: Vec<Mat32>,
    dft: Dft2,
    parameters: Value,
}

const PROPERTIES: &[(&str, PropertyKind)] = &[("features", PropertyKind::F32s)];

impl GistGenerator {
    pub fn new(params: Value) -> Result<Self> {
        let mut params = Params::new(params);
        let padding = params.parse_usize("padding", 64);
        let real_width = params.parse_usize("width", 256);
        let real_height = params.parse_usize("height", 256);
        let num_x_tiles = params.parse_usize("num_x_tiles", 4);
        let num_y_tiles = params.parse_usize("num_y_tiles", 4);
        let num_freqs = params.parse_usize("num_freqs", 4);
        let num_orients = params.parse_usize("num_orients", 6);
        let max_peak_freq = params.parse_f64("max_peak_freq", 0.3);
        let delta_freq_oct = params.parse_f64("delta_freq_oct", 0.88752527);
        let bandwidth_oct = params.parse_f64("bandwidth_oct", delta_freq_oct);
        let angle_factor = params.parse_f64("angle_factor", 1.0);
        let polar = params.parse_bool("polar", true);
        let prefilter_str = params.parse_string("prefilter", "torralba");

        let width = real_width + padding;
        let height = real_height + padding;

        let prefilter = match prefilter_str.as_str() {
            "torralba" => {
                Some(TorralbaPrefilter::new(width, height, 4.0 * width as f64 / real_width as f64))
            }
            "none" => None,
            other => bail!("未知的预滤波器: {other}"),
        };

        let filters = init_filters(
            width,
            height,
            padding,
            num_freqs,
            num_orients,
            max_peak_freq,
            delta_freq_oct,
            bandwidth_oct,
            angle_factor,
            polar,
        );

        Ok(Self {
            real_width,
            real_height,
            num_x_tiles,
            num_y_tiles,
            width,
            height,
            prefilter,
            filters,
            dft: Dft2::new(width, height),
            parameters: params.into_value(),
        })
    }
}

impl Generator for GistGenerator {
    fn properties(&self) -> &[(&'static str, PropertyKind)] {
        PROPERTIES
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    fn compute(&self, image: &RgbImage) -> Result<Bundle> {
        let gray = imgproc::to_gray(image);

        // 等比缩放使任何一边都不超过滤波器尺寸
        let factor = if gray.width() > gray.height() {
            self.real_width as f64 / gray.width() as f64
        } else {
            self.real_height as f64 / gray.height() as f64
        };
        let nw = ((gray.width() as f64 * factor).round() as u32).max(1);
        let nh = ((gray.height() as f64 * factor).round() as u32).max(1);
        let scaled = imgproc::resize_area_gray(&gray, nw, nh);

        let mut padded = imgproc::symmetric_pad(&scaled, self.width as u32, self.height as u32);
        if let Some(prefilter) = &self.prefilter {
            padded = prefilter.apply(&padded, &self.dft);
        }

        let src = Mat32::from_fn(self.height, self.width, |r, c| {
            padded.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
        });
        let mut spectrum = to_complex(&src);
        self.dft.forward(&mut spectrum);

        let tile_width = nw as usize / self.num_x_tiles;
        let tile_height = nh as usize / self.num_y_tiles;

        let mut features =
            Vec::with_capacity(self.filters.len() * self.num_x_tiles * self.num_y_tiles * 2);

        let mut response = vec![Complex::default(); spectrum.len()];
        for filter in &self.filters {
            // 频域相乘即空域卷积
            response.copy_from_slice(&spectrum);
            mul_spectrum(&mut response, filter);
            self.dft.inverse(&mut response);

            let magnitude =
                Mat32::from_fn(self.height, self.width, |r, c| response[r * self.width + c].norm());

            for y in 0..self.num_y_tiles {
                for x in 0..self.num_x_tiles {
                    let (mean, variance) =
                        magnitude.mean_variance(x * tile_width, y * tile_height, tile_width, tile_height);
                    features.push(mean);
                    features.push(variance);
                }
            }
        }

        let mut bundle = Bundle::new();
        bundle.insert("features", PropertyValue::F32s(features));
        Ok(bundle)
    }
}

#[allow(clippy::too_many_arguments)]
fn init_filters(
    width: usize,
    height: usize,
    padding: usize,
    num_freqs: usize,
    num_orients: usize,
    max_peak_freq: f64,
    delta_freq_oct: f64,
    bandwidth_oct: f64,
    angle_factor: f64,
    polar: bool,
) -> Vec<Mat32> {
    let delta_freq = 2f64.powf(delta_freq_oct);
    let bandwidth = 2f64.powf(bandwidth_oct);
    let delta_omega = PI / num_orients as f64;
    let max_extend = width.max(height) as f64;
    // 峰值频率按填充比例衰减，保证滤波器覆盖的空间尺度不受填充影响
    let pad_max_peak_freq = max_extend * max_peak_freq / (max_extend + padding as f64);

    let mut filters = Vec::with_capacity(num_freqs * num_orients);
    for i in 0..num_freqs {
        for k in 0..num_orients {
            let peak = pad_max_peak_freq / delta_freq.powi(i as i32);
            let orient = k as f64 * delta_omega;

            let mut filter = if polar {
                polar_gabor_filter(width, height, peak, bandwidth, orient, delta_omega * angle_factor)
            } else {
                gabor_filter(width, height, peak, bandwidth, orient, delta_omega * angle_factor)
            };

            // 去掉直流分量
            *filter.at_mut(0, 0) = 0.0;
            filters.push(filter);
        }
    }
    filters
}

/// 笛卡尔构造的 Gabor 传递函数
///
/// 各向异性高斯包络，中心在 (f cosθ, f sinθ)，存储时原点移到 (0,0)。
fn gabor_filter(
    width: usize,
    height: usize,
    peak_freq: f64,
    delta_freq: f64,
    orient_angle: f64,
    delta_angle: f64,
) -> Mat32 {
    let c = (2f64.ln() / PI).sqrt();
    let ka = (delta_freq - 1.0) / (delta_freq + 1.0);
    let kb = (0.5 * delta_angle).tan();

    // 高斯包络在两个主轴上的尺度
    let a = peak_freq * ka / c;
    let b = kb * peak_freq / c * (1.0 - ka * ka).sqrt();

    let u0 = peak_freq * orient_angle.cos();
    let v0 = peak_freq * orient_angle.sin();
    let cos_theta = orient_angle.cos();
    let sin_theta = orient_angle.sin();

    let step_x = 1.0 / width as f64;
    let step_y = 1.0 / height as f64;

    let mut image = Mat32::zeros(height, width);
    let mut v = 0.5 - v0;
    for yy in 0..height {
        let y = (yy + height / 2) % height;
        let mut u = -0.5 - u0;
        for xx in 0..width {
            let x = (xx + width / 2) % width;

            let ur = u * cos_theta + v * sin_theta;
            let vr = -u * sin_theta + v * cos_theta;
            let value = (-PI * ((ur / a).powi(2) + (vr / b).powi(2))).exp();
            *image.at_mut(y, x) = value as f32;

            u += step_x;
        }
        v -= step_y;
    }
    image
}

/// 极坐标构造的 Gabor 传递函数
///
/// 对数径向距离和角度距离上可分离的高斯，角度回绕到 (-pi, pi]。
fn polar_gabor_filter(
    width: usize,
    height: usize,
    peak_freq: f64,
    delta_freq: f64,
    orient_angle: f64,
    delta_angle: f64,
) -> Mat32 {
    let kappa = (delta_freq - 1.0) / ((delta_freq + 1.0) * (2.0 * 2f64.ln()).sqrt());
    let sigma_theta = 2f64.ln().sqrt() * 2.0 / delta_angle;

    let step_x = 1.0 / width as f64;
    let step_y = 1.0 / height as f64;

    let mut image = Mat32::zeros(height, width);
    let mut v: f64 = -0.5;
    for yy in 0..height {
        let y = (yy + height / 2) % height;
        let mut u: f64 = -0.5;
        for xx in 0..width {
            let x = (xx + width / 2) % width;

            let omega = (u * u + v * v).sqrt();
            let theta = f64::atan2(v, u);

            let omega_n = omega / peak_freq - 1.0;
            let mut theta_n = theta + orient_angle;
            if theta_n < -PI {
                theta_n += 2.0 * PI;
            }
            if theta_n > PI {
                theta_n -= 2.0 * PI;
            }

            let value = (-1.0 / (2.0 * kappa * kappa) * omega_n * omega_n
                - sigma_theta * sigma_theta * theta_n * theta_n)
                .exp();
            *image.at_mut(y, x) = value as f32;

            u += step_x;
        }
        v += step_y;
    }
    image
}

/// Torralba 预白化滤波
///
/// 对数压缩后做频域高通，再用同一个高斯做局部对比度归一化，
/// 抑制整体亮度和低频光照的影响。
struct TorralbaPrefilter {
    width: usize,
    height: usize,
    gaussian: Mat32,
}

impl TorralbaPrefilter {
    fn new(width: usize, height: usize, cycles: f64) -> Self {
        let sigma = cycles / 2f64.ln().sqrt();
        Self { width, height, gaussian: frequency_gaussian(width, height, sigma) }
    }

    fn apply(&self, image: &GrayImage, dft: &Dft2) -> GrayImage {
        assert_eq!(image.width() as usize, self.width);
        assert_eq!(image.height() as usize, self.height);

        // 白化：对数压缩 + 高通
        let log_image = Mat32::from_fn(self.height, self.width, |r, c| {
            (1.0 + image.get_pixel(c as u32, r as u32)[0] as f32).ln()
        });
        let mut spectrum = to_complex(&log_image);
        dft.forward(&mut spectrum);
        for (s, &g) in spectrum.iter_mut().zip(self.gaussian.data()) {
            *s *= 1.0 - g;
        }
        let mut white = spectrum;
        dft.inverse(&mut white);

        // 局部对比度归一化：残差平方的低通
        let mut energy: Vec<Complex<f32>> =
            white.iter().map(|v| Complex::new(v.re * v.re, 0.0)).collect();
        dft.forward(&mut energy);
        mul_spectrum(&mut energy, &self.gaussian);
        dft.inverse(&mut energy);

        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let i = y as usize * self.width + x as usize;
            let d = energy[i].re.abs().sqrt() + 0.2;
            let v = (255.0 * white[i].re.max(0.0) / d).min(255.0);
            image::Luma([v as u8])
        })
    }
}

/// 以 (0,0) 为中心、周期延拓的频域高斯
fn frequency_gaussian(width: usize, height: usize, sigma: f64) -> Mat32 {
    let s = 1.0 / (sigma * sigma);
    let hw = (width / 2) as i32;
    let hh = (height / 2) as i32;

    let mut image = Mat32::zeros(height, width);
    for y in -hh..hh {
        let yy = ((y + height as i32) % height as i32) as usize;
        for x in -hw..hw {
            let xx = ((x + width as i32) % width as i32) as usize;
            let value = (-(x as f64 * x as f64 + y as f64 * y as f64) * s).exp();
            *image.at_mut(yy, xx) = value as f32;
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn features(gen: &GistGenerator, img: &RgbImage) -> Vec<f32> {
        match gen.compute(img).unwrap().remove("features").unwrap() {
            PropertyValue::F32s(v) => v,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_feature_length_defaults() {
        let gen = GistGenerator::new(json!({ "prefilter": "none" })).unwrap();
        let img = RgbImage::from_pixel(256, 256, image::Rgb([128, 128, 128]));
        // 4 频率 x 6 方向 x 4x4 网格 x (均值 + 方差)
        assert_eq!(features(&gen, &img).len(), 4 * 6 * 4 * 4 * 2);
    }

    #[test]
    fn test_constant_image_zero_response() {
        // 纯色图像只有直流分量，而所有滤波器都去掉了直流
        let gen = GistGenerator::new(json!({ "prefilter": "none" })).unwrap();
        let img = RgbImage::from_pixel(256, 256, image::Rgb([200, 200, 200]));
        for v in features(&gen, &img) {
            assert!(v.abs() < 1e-3, "响应应该接近 0，实际为 {v}");
        }
    }

    #[test]
    fn test_deterministic() {
        let gen = GistGenerator::new(json!({})).unwrap();
        let img = RgbImage::from_fn(256, 256, |x, y| {
            image::Rgb([((x * 7 + y * 13) % 251) as u8; 3])
        });
        assert_eq!(features(&gen, &img), features(&gen, &img));
    }

    #[test]
    fn test_orientation_selectivity() {
        // 垂直条纹和水平条纹的能量应该落在不同的方向通道
        let gen = GistGenerator::new(json!({ "prefilter": "none" })).unwrap();
        let vertical = RgbImage::from_fn(256, 256, |x, _| {
            image::Rgb([if x % 8 < 4 { 0 } else { 255 }; 3])
        });
        let horizontal = RgbImage::from_fn(256, 256, |_, y| {
            image::Rgb([if y % 8 < 4 { 0 } else { 255 }; 3])
        });

        // 每个方向通道的总能量（对所有频率和网格求和）
        let energy = |f: &[f32]| -> Vec<f32> {
            let mut orient_energy = vec![0.0f32; 6];
            for (i, chunk) in f.chunks(4 * 4 * 2).enumerate() {
                orient_energy[i % 6] += chunk.iter().step_by(2).sum::<f32>();
            }
            orient_energy
        };

        let ev = energy(&features(&gen, &vertical));
        let eh = energy(&features(&gen, &horizontal));
        let argmax = |v: &[f32]| {
            v.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)).unwrap().0
        };
        assert_ne!(argmax(&ev), argmax(&eh));
    }

    #[test]
    fn test_filters_kill_dc() {
        let gen = GistGenerator::new(json!({ "prefilter": "none" })).unwrap();
        for filter in &gen.filters {
            assert_eq!(filter.at(0, 0), 0.0);
        }
    }
}
