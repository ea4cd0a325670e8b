use clap::{Parser, Subcommand};

use crate::cli::*;

#[derive(Parser, Debug)]
#[command(name = "visearch", version, about = "基于视觉词袋模型的图像检索引擎")]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// 为图片列表计算描述符
    ComputeDescriptors(ComputeCommand),
    /// 从局部特征聚类出视觉词表
    ComputeVocabulary(VocabularyCommand),
    /// 把局部特征量化成视觉词直方图
    ComputeHistvw(HistvwCommand),
    /// 从直方图构建倒排索引
    ComputeIndex(IndexCommand),
    /// 用一张图片检索图片库
    ImageSearch(SearchCommand),
    /// 列出已注册的生成器或打印其默认参数
    ListGenerators(ListCommand),
}
