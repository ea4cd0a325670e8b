use image::GrayImage;

use crate::imgproc::filters::{box_filter_sum, gaussian_blur, Integral};
use crate::imgproc::Mat32;

/// 局部特征直方图的归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistNormalization {
    L2,
    None,
}

/// 提取结果，特征与位置一一对应，空白区域的条目已被丢弃
pub struct ExtractedFeatures {
    pub features: Vec<Vec<f32>>,
    /// 规一化到 [0,1]^2 的关键点坐标
    pub positions: Vec<Vec<f32>>,
}

/// 从一组方向响应图中按关键点提取网格化的局部特征
///
/// 特征区域的边长由面积比例推出并取整到 tiles 的倍数，响应图
/// 先加零边再平滑，之后在每个关键点周围按 tiles x tiles 网格点采样，
/// 得到 tiles*tiles*responses 维的向量。完全没有笔画的区域用
/// 反转图像的积分图快速判定并丢弃。
pub struct PatchExtractor {
    pub tiles: usize,
    /// 特征区域面积占图像面积的比例
    pub feature_size: f64,
    pub smooth_hist: bool,
    pub normalize: HistNormalization,
}

impl PatchExtractor {
    pub fn extract(
        &self,
        scaled: &GrayImage,
        responses: &[Mat32],
        keypoints: &[[f32; 2]],
    ) -> ExtractedFeatures {
        let (width, height) = (scaled.width() as usize, scaled.height() as usize);

        // 特征边长相对图像面积定义，向上取整到 tiles 的倍数
        let mut feature_size =
            ((width * height) as f64 * self.feature_size).sqrt().ceil() as usize;
        if feature_size % self.tiles != 0 {
            feature_size += self.tiles - feature_size % self.tiles;
        }
        let tile_size = feature_size / self.tiles;
        let half_tile = tile_size as f32 / 2.0;

        // 响应图加一圈 tile_size 宽的零边，越界的采样点读出 0
        let framed: Vec<Mat32> = responses
            .iter()
            .map(|resp| {
                let mut framed = Mat32::zeros(height + 2 * tile_size, width + 2 * tile_size);
                for r in 0..height {
                    for c in 0..width {
                        *framed.at_mut(r + tile_size, c + tile_size) = resp.at(r, c);
                    }
                }
                if self.smooth_hist {
                    gaussian_blur(&framed, 2 * tile_size + 1, tile_size as f32 / 3.0)
                } else {
                    box_filter_sum(&framed, tile_size)
                }
            })
            .collect();

        // 反转后的积分图用来快速判断区域内有没有笔画
        let integral = Integral::inverted(scaled);

        let feature_len = self.tiles * self.tiles * responses.len();
        let mut features = Vec::with_capacity(keypoints.len());
        let mut positions = Vec::with_capacity(keypoints.len());

        for &[kx, ky] in keypoints {
            let rect_x = kx as i32 - (feature_size / 2) as i32;
            let rect_y = ky as i32 - (feature_size / 2) as i32;

            // 与图像求交，空白区域直接跳过
            let x0 = rect_x.max(0) as usize;
            let y0 = rect_y.max(0) as usize;
            let x1 = (rect_x + feature_size as i32).clamp(0, width as i32) as usize;
            let y1 = (rect_y + feature_size as i32).clamp(0, height as i32) as usize;
            let patch_sum =
                if x1 > x0 && y1 > y0 { integral.rect_sum(x0, y0, x1, y1) } else { 0 };
            if patch_sum == 0 {
                continue;
            }

            // 平移到带边框的坐标系
            let rect_x = rect_x + tile_size as i32;
            let rect_y = rect_y + tile_size as i32;

            let mut histogram = vec![0.0f32; feature_len];
            for (k, framed) in framed.iter().enumerate() {
                let mut y = (rect_y as f32 + half_tile) as i32;
                while y < rect_y + feature_size as i32 {
                    let mut x = (rect_x as f32 + half_tile) as i32;
                    while x < rect_x + feature_size as i32 {
                        if y >= 0
                            && x >= 0
                            && (y as usize) < framed.rows()
                            && (x as usize) < framed.cols()
                        {
                            let ty = (y - rect_y) as usize / tile_size;
                            let tx = (x - rect_x) as usize / tile_size;
                            histogram[(ty * self.tiles + tx) * responses.len() + k] =
                                framed.at(y as usize, x as usize);
                        }
                        x += tile_size as i32;
                    }
                    y += tile_size as i32;
                }
            }

            if self.normalize == HistNormalization::L2 {
                let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt() + f32::EPSILON;
                for v in &mut histogram {
                    *v /= norm;
                }
            }

            features.push(histogram);
            positions.push(vec![kx / width as f32, ky / height as f32]);
        }

        ExtractedFeatures { features, positions }
    }
}
