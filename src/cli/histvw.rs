use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;
use log::info;

use crate::cli::SubCommandExtend;
use crate::io::{read_property, PropertyReader, PropertyWriter};
use crate::quantizer::{build_histvw, quantize_batch, Quantizer};
use crate::utils::pb_style;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    Hard,
    Fuzzy,
}

#[derive(Parser, Debug, Clone)]
pub struct HistvwCommand {
    /// 词表文件
    #[arg(short, long)]
    pub vocabulary: PathBuf,
    /// 局部特征文件
    #[arg(short, long)]
    pub descriptors: PathBuf,
    /// 关键点位置文件
    #[arg(short, long)]
    pub positions: PathBuf,
    /// 量化方式
    #[arg(short, long, value_enum)]
    pub quantization: Quantization,
    /// 模糊量化的高斯 sigma
    #[arg(short, long, required_if_eq("quantization", "fuzzy"))]
    pub sigma: Option<f32>,
    /// 空间金字塔层数，第 j 层的分辨率是 2^j
    #[arg(short = 'l', long, default_value_t = 1)]
    pub pyramid_levels: usize,
    /// 输出直方图文件
    #[arg(short, long)]
    pub output: PathBuf,
}

impl SubCommandExtend for HistvwCommand {
    fn run(&self) -> Result<()> {
        let vocabulary: Vec<Vec<f32>> = read_property(&self.vocabulary)?;
        ensure!(!vocabulary.is_empty(), "词表为空");
        info!("词表大小: {}", vocabulary.len());

        // 模糊量化的直方图按样本数归一化，硬量化保留原始计数
        let (quantizer, normalize) = match self.quantization {
            Quantization::Hard => (Quantizer::Hard, false),
            Quantization::Fuzzy => {
                let sigma = self.sigma.expect("clap 保证 fuzzy 模式下 sigma 存在");
                info!("模糊量化，sigma = {sigma}");
                (Quantizer::fuzzy(sigma), true)
            }
        };

        let mut reader_desc = PropertyReader::<Vec<Vec<f32>>>::open(&self.descriptors)?;
        let mut reader_pos = PropertyReader::<Vec<Vec<f32>>>::open(&self.positions)?;
        ensure!(
            reader_desc.len() == reader_pos.len(),
            "特征文件和位置文件长度不一致: {} != {}",
            reader_desc.len(),
            reader_pos.len()
        );

        let mut writer = PropertyWriter::<Vec<f32>>::open(&self.output)?;
        let pb = ProgressBar::new(reader_desc.len() as u64).with_style(pb_style());

        for i in 0..reader_desc.len() {
            let samples = reader_desc.get(i)?;
            let positions = reader_pos.get(i)?;
            let quantized = quantize_batch(&samples, &vocabulary, quantizer);

            // 逐层拼接空间金字塔直方图
            let mut histvw = vec![];
            for level in 0..self.pyramid_levels {
                let res = 1 << level;
                histvw.extend(build_histvw(&quantized, vocabulary.len(), normalize, &positions, res));
            }

            writer.push(&histvw)?;
            pb.inc(1);
        }

        pb.finish_and_clear();
        writer.finish()?;
        info!("直方图已写入 {}", self.output.display());
        Ok(())
    }
}
