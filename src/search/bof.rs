use std::path::Path;

use anyhow::Result;
use log::info;

use crate::search::inverted_index::InvertedIndex;
use crate::search::tf_idf::{make_idf, make_tf, IdfFn, TfFn};

/// 词袋检索前端
///
/// 负责加载倒排索引并解析 tf/idf 函数，查询时直接转发给索引。
pub struct BofSearchManager {
    index: InvertedIndex,
    tf: TfFn,
    idf: IdfFn,
}

impl BofSearchManager {
    pub fn new(index_file: impl AsRef<Path>, tf: &str, idf: &str) -> Result<Self> {
        // 名字写错时在构造阶段就报错，而不是带着错误配置查询
        let tf = make_tf(tf)?;
        let idf = make_idf(idf)?;
        let index = InvertedIndex::load(index_file)?;
        info!("索引加载完成: {} 个文档，{} 个视觉词", index.num_documents(), index.num_words());
        Ok(Self { index, tf, idf })
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// 返回 (得分, 文档编号)，按相似度降序
    pub fn query(&self, histvw: &[f32], num_results: usize) -> Vec<(f32, u32)> {
        self.index.query(histvw, self.tf, self.idf, num_results)
    }
}
