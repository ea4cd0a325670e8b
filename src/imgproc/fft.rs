use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::imgproc::Mat32;

/// 固定尺寸的二维 DFT
///
/// 行列两趟一维变换实现，计划在构造时生成一次，之后可以在
/// 多个缓冲区上反复使用。逆变换按 1/(w*h) 缩放。
pub struct Dft2 {
    width: usize,
    height: usize,
    fwd_row: Arc<dyn Fft<f32>>,
    fwd_col: Arc<dyn Fft<f32>>,
    inv_row: Arc<dyn Fft<f32>>,
    inv_col: Arc<dyn Fft<f32>>,
}

impl Dft2 {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            fwd_row: planner.plan_fft_forward(width),
            fwd_col: planner.plan_fft_forward(height),
            inv_row: planner.plan_fft_inverse(width),
            inv_col: planner.plan_fft_inverse(height),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// 正变换，原地修改
    pub fn forward(&self, data: &mut [Complex<f32>]) {
        self.transform(data, &self.fwd_row, &self.fwd_col);
        // 正变换不缩放
    }

    /// 逆变换，原地修改并缩放
    pub fn inverse(&self, data: &mut [Complex<f32>]) {
        self.transform(data, &self.inv_row, &self.inv_col);
        let scale = 1.0 / (self.width * self.height) as f32;
        for v in data.iter_mut() {
            *v *= scale;
        }
    }

    fn transform(&self, data: &mut [Complex<f32>], row: &Arc<dyn Fft<f32>>, col: &Arc<dyn Fft<f32>>) {
        assert_eq!(data.len(), self.width * self.height);

        for r in data.chunks_exact_mut(self.width) {
            row.process(r);
        }

        let mut column = vec![Complex::default(); self.height];
        for c in 0..self.width {
            for (y, v) in column.iter_mut().enumerate() {
                *v = data[y * self.width + c];
            }
            col.process(&mut column);
            for (y, v) in column.iter().enumerate() {
                data[y * self.width + c] = *v;
            }
        }
    }
}

/// 实矩阵转复数缓冲区
pub fn to_complex(m: &Mat32) -> Vec<Complex<f32>> {
    m.data().iter().map(|&v| Complex::new(v, 0.0)).collect()
}

/// 频谱与实值传递函数逐点相乘
pub fn mul_spectrum(spectrum: &mut [Complex<f32>], filter: &Mat32) {
    debug_assert_eq!(spectrum.len(), filter.data().len());
    for (s, &f) in spectrum.iter_mut().zip(filter.data()) {
        *s *= f;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_inverse_roundtrip() {
        let m = Mat32::from_fn(8, 16, |r, c| ((r * 31 + c * 17) % 7) as f32);
        let dft = Dft2::new(16, 8);
        let mut buf = to_complex(&m);
        dft.forward(&mut buf);
        dft.inverse(&mut buf);
        for (v, &orig) in buf.iter().zip(m.data()) {
            assert!((v.re - orig).abs() < 1e-4);
            assert!(v.im.abs() < 1e-4);
        }
    }

    #[test]
    fn test_dc_component() {
        // 常数图像的 DC 分量等于像素和，其余频率为 0
        let m = Mat32::from_fn(4, 4, |_, _| 2.0);
        let dft = Dft2::new(4, 4);
        let mut buf = to_complex(&m);
        dft.forward(&mut buf);
        assert!((buf[0].re - 32.0).abs() < 1e-4);
        for v in &buf[1..] {
            assert!(v.norm() < 1e-4);
        }
    }
}
