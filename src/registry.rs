use std::collections::BTreeMap;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::descriptor::galif::GalifGenerator;
use crate::descriptor::gist::GistGenerator;
use crate::descriptor::sampler::{GridSampler, ImageSampler, RandomAreaSampler};
use crate::descriptor::shog::ShogGenerator;
use crate::descriptor::tinyimage::TinyImageGenerator;
use crate::descriptor::{Generator, Params};

type GeneratorFactory = fn(Value) -> Result<Box<dyn Generator>>;
type SamplerFactory = fn(&mut Params) -> Result<Box<dyn ImageSampler>>;

/// 进程级注册表，首次访问时创建并注册所有内置实现
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::with_builtins);

/// 名字到工厂函数的注册表
///
/// 所有注册都集中在 with_builtins 里显式完成，不依赖链接顺序。
/// 启动之后只读，可以在线程间共享。
pub struct Registry {
    generators: BTreeMap<&'static str, GeneratorFactory>,
    samplers: BTreeMap<&'static str, SamplerFactory>,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut registry =
            Self { generators: BTreeMap::new(), samplers: BTreeMap::new() };

        registry.register_generator("tinyimage", |p| {
            Ok(Box::new(TinyImageGenerator::new(p)?) as Box<dyn Generator>)
        });
        registry.register_generator("gist", |p| {
            Ok(Box::new(GistGenerator::new(p)?) as Box<dyn Generator>)
        });
        registry.register_generator("shog", |p| {
            Ok(Box::new(ShogGenerator::new(p)?) as Box<dyn Generator>)
        });
        registry.register_generator("galif", |p| {
            Ok(Box::new(GalifGenerator::new(p)?) as Box<dyn Generator>)
        });

        registry.register_sampler("grid", |p| {
            Ok(Box::new(GridSampler::from_params(p)) as Box<dyn ImageSampler>)
        });
        registry.register_sampler("random_area", |p| {
            Ok(Box::new(RandomAreaSampler::from_params(p)) as Box<dyn ImageSampler>)
        });

        registry
    }

    pub fn register_generator(&mut self, name: &'static str, factory: GeneratorFactory) {
        self.generators.insert(name, factory);
    }

    pub fn register_sampler(&mut self, name: &'static str, factory: SamplerFactory) {
        self.samplers.insert(name, factory);
    }

    /// 按名字创建生成器，未注册的名字是配置错误
    pub fn create_generator(&self, name: &str, params: Value) -> Result<Box<dyn Generator>> {
        match self.generators.get(name) {
            Some(factory) => factory(params),
            None => bail!(
                "未注册的生成器: {name}，可用的生成器: {}",
                self.generator_names().join(", ")
            ),
        }
    }

    pub fn create_sampler(&self, name: &str, params: &mut Params) -> Result<Box<dyn ImageSampler>> {
        match self.samplers.get(name) {
            Some(factory) => factory(params),
            None => bail!("未注册的采样器: {name}"),
        }
    }

    pub fn generator_names(&self) -> Vec<&'static str> {
        self.generators.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_generators_registered() {
        for name in ["tinyimage", "gist", "shog", "galif"] {
            assert!(REGISTRY.generator_names().contains(&name));
        }
    }

    #[test]
    fn test_unknown_generator_fails() {
        assert!(REGISTRY.create_generator("sift", json!({})).is_err());
    }

    #[test]
    fn test_unknown_sampler_fails() {
        let mut params = Params::default();
        assert!(REGISTRY.create_sampler("saliency", &mut params).is_err());
    }

    #[test]
    fn test_create_with_params() {
        let generator = REGISTRY
            .create_generator("tinyimage", json!({ "width": "8", "height": "8" }))
            .unwrap();
        assert_eq!(generator.parameters()["width"], 8);
    }
}
