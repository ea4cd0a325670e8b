use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use serde_json::Value;

use crate::cli::SubCommandExtend;
use crate::driver::ComputeDescriptors;
use crate::io::FileList;
use crate::registry::REGISTRY;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct ComputeCommand {
    /// 生成器名字，见 list-generators
    pub generator: String,
    /// 图片根目录
    #[arg(short, long)]
    pub rootdir: PathBuf,
    /// 图片列表文件
    #[arg(short, long)]
    pub filelist: PathBuf,
    /// 输出文件前缀，每个属性写到 <前缀><属性名>
    #[arg(short, long)]
    pub output: String,
    /// 生成器参数，key=value 形式，可多次指定，支持点号分隔的嵌套键
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub param: Vec<String>,
    /// 工作线程数量，默认为 CPU 核数
    #[arg(short, long)]
    pub threads: Option<usize>,
}

impl SubCommandExtend for ComputeCommand {
    fn run(&self) -> Result<()> {
        let params = parse_params(&self.param)?;
        let generator = REGISTRY.create_generator(&self.generator, params)?;

        let mut files = FileList::new(&self.rootdir)?;
        files.load(&self.filelist)?;
        info!("文件列表包含 {} 张图片", files.len());

        let threads = self.threads.unwrap_or_else(num_cpus::get).max(1);
        info!("使用 {threads} 个线程计算描述符");

        let driver = ComputeDescriptors::new(generator.as_ref(), &files, &self.output)?;
        let start = Instant::now();

        std::thread::scope(|s| {
            // 观察线程按固定间隔刷新进度
            s.spawn(|| {
                let pb = ProgressBar::new(driver.num_files() as u64).with_style(pb_style());
                while !driver.finished() {
                    pb.set_position(driver.current() as u64);
                    std::thread::sleep(Duration::from_millis(200));
                }
                pb.finish_and_clear();
            });

            driver.run(threads);
        });

        driver.finish()?;
        info!("描述符计算完成，耗时 {:.1}s", start.elapsed().as_secs_f32());

        // 把实际生效的参数写在输出旁边，检索时可以原样加载
        let mut parameters = generator.parameters().clone();
        if let Value::Object(map) = &mut parameters {
            map.insert("name".to_owned(), Value::from(self.generator.clone()));
        }
        std::fs::write(
            format!("{}parameters", self.output),
            serde_json::to_string_pretty(&parameters)?,
        )?;

        Ok(())
    }
}

/// 把 key=value 参数列表解析成 JSON 配置树，点号表示嵌套
pub fn parse_params(params: &[String]) -> Result<Value> {
    let mut root = serde_json::Map::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("无法解析生成器参数: {param}，期望 key=value 形式");
        };

        let mut map = &mut root;
        let mut segments = key.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                map.insert(segment.to_owned(), Value::from(value));
            } else {
                map = map
                    .entry(segment.to_owned())
                    .or_insert_with(|| Value::Object(Default::default()))
                    .as_object_mut()
                    .ok_or_else(|| anyhow::anyhow!("参数键冲突: {key}"))?;
            }
        }
    }
    Ok(Value::Object(root))
}
