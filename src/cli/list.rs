use anyhow::Result;
use clap::Parser;
use serde_json::Value;

use crate::cli::SubCommandExtend;
use crate::registry::REGISTRY;

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// 指定生成器名字时打印它的默认参数
    pub generator: Option<String>,
}

impl SubCommandExtend for ListCommand {
    fn run(&self) -> Result<()> {
        match &self.generator {
            Some(name) => {
                // 用空配置构造的生成器，其生效参数就是全部默认值
                let generator = REGISTRY.create_generator(name, Value::Null)?;
                println!("{}", serde_json::to_string_pretty(generator.parameters())?);
            }
            None => {
                println!("可用的生成器:");
                for name in REGISTRY.generator_names() {
                    println!("* {name}");
                }
            }
        }
        Ok(())
    }
}
