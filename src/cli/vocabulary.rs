use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::io::{read_property, write_property};
use crate::kmeans::{kmeans, sample_local_features};

#[derive(Parser, Debug, Clone)]
pub struct VocabularyCommand {
    /// 局部特征文件
    #[arg(short, long)]
    pub descriptors: PathBuf,
    /// 每条记录的特征数量文件，与 num-samples 一起指定时做随机抽样
    #[arg(short, long, requires = "num_samples")]
    pub sizes: Option<PathBuf>,
    /// 随机抽取的样本数量，缺省时使用全部特征
    #[arg(short, long, requires = "sizes")]
    pub num_samples: Option<usize>,
    /// 聚类中心（视觉词）数量
    #[arg(short, long)]
    pub clusters: usize,
    /// 最大迭代次数
    #[arg(long, default_value_t = 20)]
    pub max_iter: usize,
    /// 停止阈值：更换簇的样本比例低于该值时停止
    #[arg(long, default_value_t = 0.01)]
    pub min_changes: f64,
    /// 随机种子，缺省时从系统熵初始化
    #[arg(long)]
    pub seed: Option<u64>,
    /// 输出词表文件
    #[arg(short, long)]
    pub output: PathBuf,
}

impl SubCommandExtend for VocabularyCommand {
    fn run(&self) -> Result<()> {
        let seed = self.seed.unwrap_or_else(rand::random);

        let samples = match (&self.sizes, self.num_samples) {
            (Some(sizes), Some(num_samples)) => {
                sample_local_features(&self.descriptors, sizes, num_samples, seed)?
            }
            _ => {
                // 不抽样时读入全部局部特征
                let records: Vec<Vec<Vec<f32>>> = read_property(&self.descriptors)?;
                records.into_iter().flatten().collect()
            }
        };
        info!("聚类样本数量: {}", samples.len());

        let centers = kmeans(&samples, self.clusters, self.max_iter, self.min_changes, seed)?;
        write_property(&centers, &self.output)?;
        info!("词表已写入 {}", self.output.display());
        Ok(())
    }
}
