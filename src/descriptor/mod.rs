pub mod galif;
pub mod gist;
pub mod local;
pub mod sampler;
pub mod shog;
pub mod tinyimage;

use std::collections::BTreeMap;

use anyhow::Result;
use image::RgbImage;
use serde_json::Value;

/// 生成器输出的属性值
///
/// 全局描述符是单个浮点向量，局部描述符是向量序列加上
/// 对应的关键点位置与数量。
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    F32s(Vec<f32>),
    F32Lists(Vec<Vec<f32>>),
    I32(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    F32s,
    F32Lists,
    I32,
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::F32s(_) => PropertyKind::F32s,
            PropertyValue::F32Lists(_) => PropertyKind::F32Lists,
            PropertyValue::I32(_) => PropertyKind::I32,
        }
    }
}

/// 一张图片的描述符集合，属性名到属性值的映射
pub type Bundle = BTreeMap<&'static str, PropertyValue>;

/// 描述符生成器
///
/// 构造后配置不可变，compute 不持有内部可变状态，可以在多个
/// 线程间共享同一个实例。
pub trait Generator: Send + Sync {
    /// 声明会输出哪些属性及其元素类型
    fn properties(&self) -> &[(&'static str, PropertyKind)];

    /// 实际生效的配置（缺省项已填充默认值）
    fn parameters(&self) -> &Value;

    /// 从图像计算描述符
    fn compute(&self, image: &RgbImage) -> Result<Bundle>;
}

/// 生成器/采样器的键值配置树
///
/// 取值时同时接受原生 JSON 类型和字符串形式（命令行传入的参数
/// 都是字符串），读取后把生效值写回树中，这样序列化出的配置就是
/// 完整的有效配置。未识别的键保持原样。
#[derive(Debug, Default, Clone)]
pub struct Params {
    map: serde_json::Map<String, Value>,
}

impl Params {
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(map) => Self { map },
            _ => Self::default(),
        }
    }

    pub fn parse_usize(&mut self, key: &str, default: usize) -> usize {
        let v = match self.map.get(key) {
            Some(Value::Number(n)) => n.as_u64().map(|x| x as usize),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(default);
        self.map.insert(key.to_owned(), Value::from(v as u64));
        v
    }

    pub fn parse_u64(&mut self, key: &str, default: u64) -> u64 {
        let v = match self.map.get(key) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(default);
        self.map.insert(key.to_owned(), Value::from(v));
        v
    }

    pub fn parse_f64(&mut self, key: &str, default: f64) -> f64 {
        let v = match self.map.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(default);
        self.map.insert(key.to_owned(), Value::from(v));
        v
    }

    pub fn parse_bool(&mut self, key: &str, default: bool) -> bool {
        let v = match self.map.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(default);
        self.map.insert(key.to_owned(), Value::from(v));
        v
    }

    pub fn parse_string(&mut self, key: &str, default: &str) -> String {
        let v = match self.map.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_owned(),
        };
        self.map.insert(key.to_owned(), Value::from(v.clone()));
        v
    }

    /// 键对应的值是否存在
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// 取出名为 key 的子配置树
    pub fn child(&mut self, key: &str) -> Params {
        match self.map.get(key) {
            Some(v) => Params::new(v.clone()),
            None => Params::default(),
        }
    }

    /// 把子配置树写回
    pub fn set_child(&mut self, key: &str, child: Params) {
        self.map.insert(key.to_owned(), child.into_value());
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_defaults_written_back() {
        let mut p = Params::new(json!({}));
        assert_eq!(p.parse_usize("width", 256), 256);
        assert_eq!(p.into_value(), json!({ "width": 256 }));
    }

    #[test]
    fn test_params_accepts_strings() {
        // 命令行传入的参数都是字符串形式
        let mut p = Params::new(json!({ "width": "128", "polar": "false", "sigma": "0.5" }));
        assert_eq!(p.parse_usize("width", 256), 128);
        assert!(!p.parse_bool("polar", true));
        assert!((p.parse_f64("sigma", 0.1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_params_preserves_unknown_keys() {
        let mut p = Params::new(json!({ "extra": "kept" }));
        p.parse_usize("width", 16);
        let v = p.into_value();
        assert_eq!(v["extra"], "kept");
    }

    #[test]
    fn test_params_child_roundtrip() {
        let mut p = Params::new(json!({ "sampler": { "name": "grid" } }));
        let mut child = p.child("sampler");
        assert_eq!(child.parse_string("name", "random_area"), "grid");
        child.parse_usize("num_samples", 625);
        p.set_child("sampler", child);
        let v = p.into_value();
        assert_eq!(v["sampler"]["num_samples"], 625);
    }
}
