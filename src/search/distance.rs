use anyhow::{bail, Result};

/// 平方欧氏距离
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// 按名字选择的距离度量
///
/// 所有度量都满足"值越小越相似"，余弦距离取 1 - cos。
#[derive(Debug, Clone)]
pub enum Distance {
    L1Norm,
    L2Norm,
    L2NormSquared,
    Cosine,
    /// Frobenius 距离，可以附带一个掩码只比较其中一部分分量
    Frobenius { mask: Option<Vec<bool>> },
}

impl Distance {
    /// 未知的名字是配置错误
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "l1norm" => Distance::L1Norm,
            "l2norm" => Distance::L2Norm,
            "l2norm_squared" => Distance::L2NormSquared,
            "cosine" => Distance::Cosine,
            "frobenius" => Distance::Frobenius { mask: None },
            other => bail!("未知的距离函数: {other}"),
        })
    }

    pub fn with_mask(self, mask: Vec<bool>) -> Self {
        match self {
            Distance::Frobenius { .. } => Distance::Frobenius { mask: Some(mask) },
            other => other,
        }
    }

    pub fn eval(&self, a: &[f32], b: &[f32]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Distance::L1Norm => {
                a.iter().zip(b).map(|(x, y)| (x - y).abs() as f64).sum()
            }
            Distance::L2Norm => self.l2_squared_f64(a, b).sqrt(),
            Distance::L2NormSquared => self.l2_squared_f64(a, b),
            Distance::Cosine => {
                let mut dot = 0.0f64;
                let mut na = 0.0f64;
                let mut nb = 0.0f64;
                for (&x, &y) in a.iter().zip(b) {
                    dot += x as f64 * y as f64;
                    na += x as f64 * x as f64;
                    nb += y as f64 * y as f64;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (na.sqrt() * nb.sqrt())
            }
            Distance::Frobenius { mask } => {
                let mut sum = 0.0f64;
                for (i, (&x, &y)) in a.iter().zip(b).enumerate() {
                    if mask.as_ref().is_some_and(|m| !m[i]) {
                        continue;
                    }
                    sum += ((x - y) as f64).powi(2);
                }
                sum.sqrt()
            }
        }
    }

    fn l2_squared_f64(&self, a: &[f32], b: &[f32]) -> f64 {
        a.iter().zip(b).map(|(x, y)| ((x - y) as f64).powi(2)).sum()
    }
}
