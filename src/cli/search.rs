use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde_json::Value;

use crate::cli::{Quantization, SubCommandExtend};
use crate::descriptor::{Generator, PropertyValue};
use crate::io::{read_property, FileList};
use crate::quantizer::{build_histvw, quantize_batch, Quantizer};
use crate::registry::REGISTRY;
use crate::search::{BofSearchManager, LinearSearchManager};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    /// 词袋检索：局部特征量化后查倒排索引
    Bof,
    /// 线性检索：全局描述符逐一比较
    Linear,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// 查询图片路径
    pub query: PathBuf,
    /// 检索方式
    #[arg(long, value_enum, default_value_t = SearchType::Bof)]
    pub search_type: SearchType,
    /// 生成器名字，使用默认参数
    #[arg(short, long, conflicts_with = "generator_params")]
    pub generator: Option<String>,
    /// 生成器参数 JSON 文件（compute-descriptors 写出的 parameters 文件）
    #[arg(long)]
    pub generator_params: Option<PathBuf>,
    /// 词表文件，bof 模式必需
    #[arg(short, long)]
    pub vocabulary: Option<PathBuf>,
    /// 倒排索引文件，bof 模式必需
    #[arg(short, long)]
    pub index: Option<PathBuf>,
    /// 特征文件，linear 模式必需
    #[arg(short, long)]
    pub descriptors: Option<PathBuf>,
    /// 图片列表文件，用于把结果编号映射回路径
    #[arg(short, long)]
    pub filelist: PathBuf,
    /// 查询直方图的量化方式，应当与建索引时一致
    #[arg(long, value_enum, default_value_t = Quantization::Hard)]
    pub quantization: Quantization,
    /// 模糊量化的高斯 sigma
    #[arg(long, required_if_eq("quantization", "fuzzy"))]
    pub sigma: Option<f32>,
    /// 空间金字塔层数，应当与建索引时一致
    #[arg(long, default_value_t = 1)]
    pub pyramid_levels: usize,
    /// tf 函数名字
    #[arg(long, default_value = "constant")]
    pub tf: String,
    /// idf 函数名字
    #[arg(long, default_value = "constant")]
    pub idf: String,
    /// 线性检索使用的距离函数
    #[arg(long, default_value = "l2norm")]
    pub distfn: String,
    /// 返回结果数量
    #[arg(short, long, default_value_t = 10)]
    pub num_results: usize,
}

impl SubCommandExtend for SearchCommand {
    fn run(&self) -> Result<()> {
        let generator = self.create_generator()?;

        let mut files = FileList::default();
        files.load(&self.filelist)?;

        let image = image::open(&self.query)
            .with_context(|| format!("无法解码图片: {}", self.query.display()))?
            .to_rgb8();
        let mut bundle = generator.compute(&image)?;

        let results = match self.search_type {
            SearchType::Bof => {
                let Some(vocabulary_file) = &self.vocabulary else {
                    bail!("bof 检索需要 --vocabulary");
                };
                let Some(index_file) = &self.index else {
                    bail!("bof 检索需要 --index");
                };

                let Some(PropertyValue::F32Lists(samples)) = bundle.remove("features") else {
                    bail!("bof 检索需要局部特征生成器（如 shog）");
                };
                let positions = match bundle.remove("positions") {
                    Some(PropertyValue::F32Lists(p)) => p,
                    _ => vec![],
                };

                let vocabulary: Vec<Vec<f32>> = read_property(vocabulary_file)?;
                let (quantizer, normalize) = match self.quantization {
                    Quantization::Hard => (Quantizer::Hard, false),
                    Quantization::Fuzzy => {
                        (Quantizer::fuzzy(self.sigma.expect("clap 保证 sigma 存在")), true)
                    }
                };
                let quantized = quantize_batch(&samples, &vocabulary, quantizer);

                let mut histvw = vec![];
                for level in 0..self.pyramid_levels {
                    let res = 1 << level;
                    histvw.extend(build_histvw(
                        &quantized,
                        vocabulary.len(),
                        normalize,
                        &positions,
                        res,
                    ));
                }

                let manager = BofSearchManager::new(index_file, &self.tf, &self.idf)?;
                manager
                    .query(&histvw, self.num_results)
                    .into_iter()
                    .map(|(score, doc)| (score as f64, doc as usize))
                    .collect::<Vec<_>>()
            }
            SearchType::Linear => {
                let Some(descriptor_file) = &self.descriptors else {
                    bail!("linear 检索需要 --descriptors");
                };
                let Some(PropertyValue::F32s(descriptor)) = bundle.remove("features") else {
                    bail!("linear 检索需要全局描述符生成器（如 tinyimage、gist）");
                };

                let manager = LinearSearchManager::new(descriptor_file, &self.distfn)?;
                info!("在 {} 条特征上做线性检索", manager.len());
                manager.query(&descriptor, self.num_results)
            }
        };

        for (rank, (score, doc)) in results.iter().enumerate() {
            println!("{rank} {score:.6} {}", files.relative_filename(*doc));
        }
        Ok(())
    }
}

impl SearchCommand {
    fn create_generator(&self) -> Result<Box<dyn Generator>> {
        if let Some(name) = &self.generator {
            return REGISTRY.create_generator(name, Value::Null);
        }
        if let Some(path) = &self.generator_params {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("无法读取生成器参数文件: {}", path.display()))?;
            let params: Value = serde_json::from_str(&text)?;
            let Some(name) = params.get("name").and_then(|v| v.as_str()).map(str::to_owned) else {
                bail!("生成器参数文件缺少 name 字段");
            };
            return REGISTRY.create_generator(&name, params);
        }
        bail!("必须指定 --generator 或 --generator-params");
    }
}
