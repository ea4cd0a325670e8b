pub mod fft;
pub mod filters;

use image::{GrayImage, RgbImage};

/// 单通道 f32 矩阵，图像处理的中间表示
#[derive(Debug, Clone, PartialEq)]
pub struct Mat32 {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Mat32 {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn from_gray(image: &GrayImage) -> Self {
        let (cols, rows) = (image.width() as usize, image.height() as usize);
        Self { rows, cols, data: image.as_raw().iter().map(|&v| v as f32).collect() }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn at(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn at_mut(&mut self, r: usize, c: usize) -> &mut f32 {
        &mut self.data[r * self.cols + c]
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// 矩形区域 (x, y, w, h) 内的均值和（有偏）方差
    pub fn mean_variance(&self, x: usize, y: usize, w: usize, h: usize) -> (f32, f32) {
        debug_assert!(x + w <= self.cols && y + h <= self.rows);
        let n = (w * h) as f64;
        if n == 0.0 {
            return (0.0, 0.0);
        }
        let mut sum = 0.0f64;
        let mut sq_sum = 0.0f64;
        for r in y..y + h {
            for &v in &self.row(r)[x..x + w] {
                sum += v as f64;
                sq_sum += (v as f64) * (v as f64);
            }
        }
        let mean = sum / n;
        let variance = (sq_sum / n - mean * mean).max(0.0);
        (mean as f32, variance as f32)
    }
}

/// RGB 转灰度，使用 BT.601 加权系数
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let v = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// 区域平均缩放到指定尺寸
///
/// 每个目标像素取源图中对应矩形区域的加权平均，缩小图像时
/// 不会出现插值采样带来的混叠。
pub fn resize_area_gray(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let planes = [plane(image.as_raw(), image.width(), image.height(), 0, 1)];
    let out = resize_area_planes(&planes, image.width(), image.height(), width, height);
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([out[0][(y * width + x) as usize].round().clamp(0.0, 255.0) as u8])
    })
}

pub fn resize_area_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let raw = image.as_raw();
    let planes = [
        plane(raw, image.width(), image.height(), 0, 3),
        plane(raw, image.width(), image.height(), 1, 3),
        plane(raw, image.width(), image.height(), 2, 3),
    ];
    let out = resize_area_planes(&planes, image.width(), image.height(), width, height);
    RgbImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        image::Rgb([
            out[0][i].round().clamp(0.0, 255.0) as u8,
            out[1][i].round().clamp(0.0, 255.0) as u8,
            out[2][i].round().clamp(0.0, 255.0) as u8,
        ])
    })
}

fn plane(raw: &[u8], width: u32, height: u32, channel: usize, stride: usize) -> Vec<f32> {
    let mut v = Vec::with_capacity((width * height) as usize);
    for i in 0..(width * height) as usize {
        v.push(raw[i * stride + channel] as f32);
    }
    v
}

fn resize_area_planes(
    planes: &[Vec<f32>],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
) -> Vec<Vec<f32>> {
    let sx = src_w as f64 / dst_w as f64;
    let sy = src_h as f64 / dst_h as f64;

    let mut out = vec![vec![0.0f32; (dst_w * dst_h) as usize]; planes.len()];
    for dy in 0..dst_h {
        let y0 = dy as f64 * sy;
        let y1 = (dy + 1) as f64 * sy;
        for dx in 0..dst_w {
            let x0 = dx as f64 * sx;
            let x1 = (dx + 1) as f64 * sx;

            let mut acc = vec![0.0f64; planes.len()];
            let mut area = 0.0f64;
            let mut y = y0.floor() as usize;
            // 按覆盖面积加权累加源像素
            while (y as f64) < y1 && y < src_h as usize {
                let wy = (y1.min(y as f64 + 1.0) - y0.max(y as f64)).max(0.0);
                let mut x = x0.floor() as usize;
                while (x as f64) < x1 && x < src_w as usize {
                    let wx = (x1.min(x as f64 + 1.0) - x0.max(x as f64)).max(0.0);
                    let w = wx * wy;
                    for (a, p) in acc.iter_mut().zip(planes) {
                        *a += p[y * src_w as usize + x] as f64 * w;
                    }
                    area += w;
                    x += 1;
                }
                y += 1;
            }
            for (o, a) in out.iter_mut().zip(&acc) {
                o[(dy * dst_w + dx) as usize] = (a / area) as f32;
            }
        }
    }
    out
}

/// 等比缩放使较长边等于 max_side，返回缩放后的图像和缩放系数
pub fn scale_to_side_length(image: &GrayImage, max_side: u32) -> (GrayImage, f64) {
    let (w, h) = (image.width(), image.height());
    let factor = if w > h { max_side as f64 / w as f64 } else { max_side as f64 / h as f64 };
    let nw = ((w as f64 * factor).round() as u32).max(1);
    let nh = ((h as f64 * factor).round() as u32).max(1);
    (resize_area_gray(image, nw, nh), factor)
}

/// 镜像平铺填充到 (width, height)
///
/// 超出原图的区域交替使用原图与其翻转副本平铺，使填充内容在
/// 图像边界处连续，避免频域分析时出现阶跃。原图位于左上角。
pub fn symmetric_pad(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (sw, sh) = (src.width(), src.height());

    // 水平方向
    let tmp_w = width.max(sw);
    let mut tmp = GrayImage::new(tmp_w, sh);
    if sw < width {
        let pad = width - sw;
        let border = sw + pad / 2;
        // 向右交替平铺
        let mut p = 0u32;
        let mut k = 0u32;
        while p < border {
            let w = sw.min(border - p);
            for x in 0..w {
                let sx = if k % 2 == 1 { sw - 1 - x } else { x };
                for y in 0..sh {
                    tmp.put_pixel(p + x, y, *src.get_pixel(sx, y));
                }
            }
            p += sw;
            k += 1;
        }
        // 从右边界向左交替平铺
        let mut p = width;
        let mut k = 1u32;
        while p >= border {
            let w = sw.min(p - border);
            for x in 0..w {
                let sx = if k % 2 == 1 { w - 1 - x } else { sw - w + x };
                for y in 0..sh {
                    tmp.put_pixel(p - w + x, y, *src.get_pixel(sx, y));
                }
            }
            if p < sw + border {
                break;
            }
            p -= sw;
            k += 1;
        }
    } else {
        tmp.copy_from_slice(src.as_raw());
    }

    // 垂直方向
    let mut dst = GrayImage::new(width, height);
    if sh < height {
        let pad = height - sh;
        let border = sh + pad / 2;
        let mut p = 0u32;
        let mut k = 0u32;
        while p < border {
            let h = sh.min(border - p);
            for y in 0..h {
                let sy = if k % 2 == 1 { sh - 1 - y } else { y };
                for x in 0..width {
                    dst.put_pixel(x, p + y, *tmp.get_pixel(x, sy));
                }
            }
            p += sh;
            k += 1;
        }
        let mut p = height;
        let mut k = 1u32;
        while p >= border {
            let h = sh.min(p - border);
            for y in 0..h {
                let sy = if k % 2 == 1 { h - 1 - y } else { sh - h + y };
                for x in 0..width {
                    dst.put_pixel(x, p - h + y, *tmp.get_pixel(x, sy));
                }
            }
            if p < sh + border {
                break;
            }
            p -= sh;
            k += 1;
        }
    } else {
        for y in 0..height {
            for x in 0..width {
                dst.put_pixel(x, y, *tmp.get_pixel(x, y));
            }
        }
    }

    dst
}

/// RGB（取值 [0,1]）转 CIE Lab，D65 白点
///
/// Lab 空间中的欧氏距离近似感知色差，小缩略图在该空间下
/// 做最近邻比较效果明显好于 RGB。
pub fn rgb_to_lab(r: f32, g: f32, b: f32) -> [f32; 3] {
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let l = if y > 0.008856 { 116.0 * y.cbrt() - 16.0 } else { 903.3 * y };
    let a = 500.0 * (f(x) - f(y));
    let b = 200.0 * (f(y) - f(z));
    [l, a, b]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_area_constant() {
        // 纯色图像缩放后仍是纯色
        let img = GrayImage::from_pixel(64, 48, image::Luma([100]));
        let out = resize_area_gray(&img, 16, 12);
        assert!(out.pixels().all(|p| p[0] == 100));
    }

    #[test]
    fn test_resize_area_mean() {
        // 2x2 块缩小到 1x1 等于均值
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(0, 0, image::Luma([0]));
        img.put_pixel(1, 0, image::Luma([100]));
        img.put_pixel(0, 1, image::Luma([100]));
        img.put_pixel(1, 1, image::Luma([200]));
        let out = resize_area_gray(&img, 1, 1);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn test_scale_to_side_length() {
        let img = GrayImage::new(640, 480);
        let (scaled, factor) = scale_to_side_length(&img, 256);
        assert_eq!(scaled.width(), 256);
        assert_eq!(scaled.height(), 192);
        assert!((factor - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_pad_keeps_original() {
        let img = GrayImage::from_fn(10, 8, |x, y| image::Luma([(x * 10 + y) as u8]));
        let padded = symmetric_pad(&img, 16, 14);
        assert_eq!(padded.width(), 16);
        assert_eq!(padded.height(), 14);
        // 左上角保持原图内容
        for y in 0..8 {
            for x in 0..10 {
                assert_eq!(padded.get_pixel(x, y), img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_lab_reference_values() {
        let [l, a, b] = rgb_to_lab(1.0, 1.0, 1.0);
        assert!((l - 100.0).abs() < 0.1);
        assert!(a.abs() < 0.5 && b.abs() < 0.5);

        let [l, _, _] = rgb_to_lab(0.0, 0.0, 0.0);
        assert!(l.abs() < 1e-3);
    }

    #[test]
    fn test_mean_variance() {
        let m = Mat32::from_fn(4, 4, |_, c| c as f32);
        let (mean, var) = m.mean_variance(0, 0, 4, 4);
        assert!((mean - 1.5).abs() < 1e-6);
        assert!((var - 1.25).abs() < 1e-6);
    }
}
