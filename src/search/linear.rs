use std::collections::BinaryHeap;
use std::path::Path;

use anyhow::Result;

use crate::io::read_property;
use crate::search::distance::Distance;

/// 暴力最近邻搜索
///
/// 逐个计算查询向量到每条特征的距离，用有界最大堆保留距离最小
/// 的 num_results 条。返回 (距离, 下标)，按距离升序，最好的匹配
/// 在最前面。
pub fn linear_search(
    query: &[f32],
    features: &[Vec<f32>],
    num_results: usize,
    distance: &Distance,
) -> Vec<(f64, usize)> {
    // 堆顶是当前保留结果里最大的距离
    let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(num_results + 1);

    for (i, feature) in features.iter().enumerate() {
        let dist = distance.eval(query, feature);
        if heap.len() < num_results {
            heap.push(DistIdx { dist, index: i });
        } else if let Some(top) = heap.peek() {
            if top.dist > dist {
                heap.pop();
                heap.push(DistIdx { dist, index: i });
            }
        }
    }

    let mut results: Vec<(f64, usize)> =
        std::iter::from_fn(|| heap.pop()).map(|e| (e.dist, e.index)).collect();
    results.reverse();
    results
}

struct DistIdx {
    dist: f64,
    index: usize,
}

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist.total_cmp(&other.dist).then(self.index.cmp(&other.index))
    }
}

/// 全局描述符的线性检索前端
///
/// 持有整个特征文件的内容，查询是只读的。
pub struct LinearSearchManager {
    features: Vec<Vec<f32>>,
    distance: Distance,
}

impl LinearSearchManager {
    pub fn new(descriptor_file: impl AsRef<Path>, distance_name: &str) -> Result<Self> {
        let distance = Distance::from_name(distance_name)?;
        let features = read_property(descriptor_file)?;
        Ok(Self { features, distance })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn query(&self, descriptor: &[f32], num_results: usize) -> Vec<(f64, usize)> {
        let num_results = num_results.min(self.features.len());
        linear_search(descriptor, &self.features, num_results, &self.distance)
    }
}
