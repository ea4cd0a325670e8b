use anyhow::{bail, Result};
use image::RgbImage;
use serde_json::Value;

use crate::descriptor::{Bundle, Generator, Params, PropertyKind, PropertyValue};
use crate::imgproc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colorspace {
    Rgb,
    Grey,
    Lab,
}

/// 缩略图描述符
///
/// 把图像区域平均缩放到很小的尺寸，再按配置的颜色空间展开成
/// 一个浮点向量。默认使用 Lab 空间，其中的欧氏距离近似感知色差。
pub struct TinyImageGenerator {
    width: usize,
    height: usize,
    colorspace: Colorspace,
    parameters: Value,
}

const PROPERTIES: &[(&str, PropertyKind)] = &[("features", PropertyKind::F32s)];

impl TinyImageGenerator {
    pub fn new(params: Value) -> Result<Self> {
        let mut params = Params::new(params);
        let width = params.parse_usize("width", 16);
        let height = params.parse_usize("height", 16);
        let colorspace = match params.parse_string("colorspace", "lab").as_str() {
            "rgb" => Colorspace::Rgb,
            "grey" => Colorspace::Grey,
            "lab" => Colorspace::Lab,
            other => bail!("未知的颜色空间: {other}"),
        };
        Ok(Self { width, height, colorspace, parameters: params.into_value() })
    }
}

impl Generator for TinyImageGenerator {
    fn properties(&self) -> &[(&'static str, PropertyKind)] {
        PROPERTIES
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    fn compute(&self, image: &RgbImage) -> Result<Bundle> {
        let scaled = imgproc::resize_area_rgb(image, self.width as u32, self.height as u32);

        let mut features = Vec::with_capacity(
            self.width * self.height * if self.colorspace == Colorspace::Grey { 1 } else { 3 },
        );
        for pixel in scaled.pixels() {
            let r = pixel[0] as f32 / 255.0;
            let g = pixel[1] as f32 / 255.0;
            let b = pixel[2] as f32 / 255.0;
            match self.colorspace {
                Colorspace::Rgb => features.extend_from_slice(&[r, g, b]),
                Colorspace::Grey => features.push(0.299 * r + 0.587 * g + 0.114 * b),
                Colorspace::Lab => features.extend_from_slice(&imgproc::rgb_to_lab(r, g, b)),
            }
        }

        let mut bundle = Bundle::new();
        bundle.insert("features", PropertyValue::F32s(features));
        Ok(bundle)
    }
}
