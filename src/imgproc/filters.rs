use image::GrayImage;

use crate::imgproc::Mat32;

/// 归一化的一维高斯核
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    assert!(ksize % 2 == 1, "核大小必须为奇数");
    let half = (ksize / 2) as i32;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> =
        (-half..=half).map(|x| (-(x * x) as f32 / s2).exp()).collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// 反射边界（不重复边缘像素）下的下标映射
#[inline]
fn reflect101(i: i32, n: i32) -> usize {
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * n - 2 - i;
        }
    }
    i as usize
}

/// 水平方向一维卷积
fn convolve_rows(src: &Mat32, kernel: &[f32]) -> Mat32 {
    let (rows, cols) = (src.rows(), src.cols());
    let half = (kernel.len() / 2) as i32;
    let mut dst = Mat32::zeros(rows, cols);
    for r in 0..rows {
        let row = src.row(r);
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let ci = reflect101(c as i32 + k as i32 - half, cols as i32);
                acc += row[ci] * kv;
            }
            *dst.at_mut(r, c) = acc;
        }
    }
    dst
}

/// 垂直方向一维卷积
fn convolve_cols(src: &Mat32, kernel: &[f32]) -> Mat32 {
    let (rows, cols) = (src.rows(), src.cols());
    let half = (kernel.len() / 2) as i32;
    let mut dst = Mat32::zeros(rows, cols);
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let ri = reflect101(r as i32 + k as i32 - half, rows as i32);
                acc += src.at(ri, c) * kv;
            }
            *dst.at_mut(r, c) = acc;
        }
    }
    dst
}

/// 可分离高斯模糊
pub fn gaussian_blur(src: &Mat32, ksize: usize, sigma: f32) -> Mat32 {
    let kernel = gaussian_kernel(ksize, sigma);
    convolve_cols(&convolve_rows(src, &kernel), &kernel)
}

/// 8 位灰度图的高斯模糊，结果四舍五入回 8 位
pub fn gaussian_blur_u8(src: &GrayImage, ksize: usize, sigma: f32) -> GrayImage {
    let blurred = gaussian_blur(&Mat32::from_gray(src), ksize, sigma);
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        image::Luma([blurred.at(y as usize, x as usize).round().clamp(0.0, 255.0) as u8])
    })
}

/// 3x3 Sobel 水平梯度
pub fn sobel_x(src: &GrayImage) -> Mat32 {
    let m = Mat32::from_gray(src);
    let smooth = convolve_cols(&m, &[1.0, 2.0, 1.0]);
    convolve_rows(&smooth, &[-1.0, 0.0, 1.0])
}

/// 3x3 Sobel 垂直梯度
pub fn sobel_y(src: &GrayImage) -> Mat32 {
    let m = Mat32::from_gray(src);
    let smooth = convolve_rows(&m, &[1.0, 2.0, 1.0]);
    convolve_cols(&smooth, &[-1.0, 0.0, 1.0])
}

/// 非归一化的方框滤波（窗口内求和），锚点居中
pub fn box_filter_sum(src: &Mat32, ksize: usize) -> Mat32 {
    // 偶数核也以 ksize/2 为锚点
    let (rows, cols) = (src.rows(), src.cols());
    let anchor = (ksize / 2) as i32;
    let mut tmp = Mat32::zeros(rows, cols);
    for r in 0..rows {
        let row = src.row(r);
        for c in 0..cols {
            let mut acc = 0.0;
            for k in 0..ksize {
                let ci = reflect101(c as i32 + k as i32 - anchor, cols as i32);
                acc += row[ci];
            }
            *tmp.at_mut(r, c) = acc;
        }
    }
    let mut dst = Mat32::zeros(rows, cols);
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for k in 0..ksize {
                let ri = reflect101(r as i32 + k as i32 - anchor, rows as i32);
                acc += tmp.at(ri, c);
            }
            *dst.at_mut(r, c) = acc;
        }
    }
    dst
}

/// 积分图，尺寸为 (h+1) x (w+1)，首行首列为 0
pub struct Integral {
    cols: usize,
    data: Vec<i64>,
}

impl Integral {
    /// 对 255 - pixel 建立积分图，用于快速判断白底图像的区域是否为空
    pub fn inverted(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let cols = w + 1;
        let mut data = vec![0i64; (h + 1) * cols];
        for y in 0..h {
            let mut row_sum = 0i64;
            for x in 0..w {
                row_sum += 255 - image.get_pixel(x as u32, y as u32)[0] as i64;
                data[(y + 1) * cols + x + 1] = data[y * cols + x + 1] + row_sum;
            }
        }
        Self { cols, data }
    }

    /// 矩形 [x0,x1) x [y0,y1) 内的像素和
    pub fn rect_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> i64 {
        self.data[y0 * self.cols + x0] + self.data[y1 * self.cols + x1]
            - self.data[y0 * self.cols + x1]
            - self.data[y1 * self.cols + x0]
    }
}
