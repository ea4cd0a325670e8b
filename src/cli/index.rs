use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;

use crate::cli::SubCommandExtend;
use crate::io::PropertyReader;
use crate::search::tf_idf::{make_idf, make_tf};
use crate::search::InvertedIndex;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    /// 视觉词直方图文件
    #[arg(long)]
    pub histvw: PathBuf,
    /// tf 函数名字
    #[arg(long, default_value = "constant")]
    pub tf: String,
    /// idf 函数名字
    #[arg(long, default_value = "constant")]
    pub idf: String,
    /// 输出索引文件
    #[arg(short, long)]
    pub output: PathBuf,
}

impl SubCommandExtend for IndexCommand {
    fn run(&self) -> Result<()> {
        // 名字写错直接在这里失败，不要在跑完全部数据之后
        let tf = make_tf(&self.tf)?;
        let idf = make_idf(&self.idf)?;

        let mut reader = PropertyReader::<Vec<f32>>::open(&self.histvw)?;
        ensure!(reader.len() > 0, "直方图文件为空");

        let first = reader.get(0)?;
        let vocab_size = first.len();
        ensure!(vocab_size > 0, "直方图长度为 0");
        info!("共 {} 个直方图，词表大小 {vocab_size}", reader.len());

        let mut index = InvertedIndex::new(vocab_size);
        let pb = ProgressBar::new(reader.len() as u64).with_style(pb_style());
        for i in 0..reader.len() {
            let histogram = reader.get(i)?;
            index.add_histogram(&histogram);
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!("计算 tf-idf 权重 (tf={}, idf={})", self.tf, self.idf);
        index.finalize(tf, idf);

        index.save(&self.output)?;
        info!("索引已写入 {}", self.output.display());
        Ok(())
    }
}
