use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};

use crate::io::Record;
use crate::search::tf_idf::{IdfFn, TfFn};

/// 视觉词直方图上的倒排索引
///
/// 每个词对应一条 (文档, 词频) 倒排表和一条平行的权重表，
/// 权重在 finalize 时按选定的 tf/idf 计算并做按文档的 L2 归一化。
/// 归一化后两个文档的得分就是权重向量的点积（余弦相似度）。
pub struct InvertedIndex {
    num_words: u32,
    num_documents: u32,
    avg_doc_len: f32,
    avg_unique_doc_len: f32,
    /// 每个词在全部文档中的总出现次数 F_t
    total_ft: Vec<f32>,
    /// 出现过的词的集合
    unique_words: BTreeSet<u32>,
    /// 每个词出现过的文档数量 f_t
    ft: Vec<u32>,
    /// 每个词的 (文档, 词频) 倒排表
    doc_frequency_list: Vec<Vec<(u32, f32)>>,
    /// 与倒排表平行的最终权重表，finalize 之后才有效
    doc_weight_list: Vec<Vec<f32>>,
    /// 每个文档的总词数
    document_sizes: Vec<f32>,
    /// 每个文档的不同词数
    document_unique_sizes: Vec<u32>,
    finalized: bool,
}

impl InvertedIndex {
    pub fn new(num_words: usize) -> Self {
        Self {
            num_words: num_words as u32,
            num_documents: 0,
            avg_doc_len: 0.0,
            avg_unique_doc_len: 0.0,
            total_ft: vec![0.0; num_words],
            unique_words: BTreeSet::new(),
            ft: vec![0; num_words],
            doc_frequency_list: vec![vec![]; num_words],
            doc_weight_list: vec![vec![]; num_words],
            document_sizes: vec![],
            document_unique_sizes: vec![],
            finalized: false,
        }
    }

    pub fn num_words(&self) -> u32 {
        self.num_words
    }

    pub fn num_documents(&self) -> u32 {
        self.num_documents
    }

    pub fn avg_doc_len(&self) -> f32 {
        self.avg_doc_len
    }

    pub fn avg_unique_doc_len(&self) -> f32 {
        self.avg_unique_doc_len
    }

    /// 词 term 出现过的文档数量
    pub fn ft(&self, term: u32) -> u32 {
        self.ft[term as usize]
    }

    /// 词 term 的总出现次数
    pub fn total_ft(&self, term: u32) -> f32 {
        self.total_ft[term as usize]
    }

    /// 文档 doc 的总词数
    pub fn doc_size(&self, doc: u32) -> f32 {
        self.document_sizes[doc as usize]
    }

    pub fn doc_unique_size(&self, doc: u32) -> u32 {
        self.document_unique_sizes[doc as usize]
    }

    pub fn unique_words(&self) -> &BTreeSet<u32> {
        &self.unique_words
    }

    /// 词 term 的倒排表
    pub fn postings(&self, term: u32) -> &[(u32, f32)] {
        &self.doc_frequency_list[term as usize]
    }

    /// 词 term 的权重表
    pub fn weights(&self, term: u32) -> &[f32] {
        assert!(self.finalized, "索引尚未 finalize");
        &self.doc_weight_list[term as usize]
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// 把一个直方图作为新文档加入索引
    pub fn add_histogram(&mut self, histogram: &[f32]) {
        assert_eq!(histogram.len(), self.num_words as usize);

        // 加入新文档后，统计量需要重新 finalize 才有效
        self.finalized = false;

        let mut num_words = 0.0f32;
        let mut num_unique_words = 0u32;

        for (t, &f_dt) in histogram.iter().enumerate() {
            if f_dt != 0.0 {
                num_words += f_dt;
                num_unique_words += 1;

                self.ft[t] += 1;
                self.total_ft[t] += f_dt;
                // num_documents 此刻就是当前文档的编号
                self.doc_frequency_list[t].push((self.num_documents, f_dt));
                self.unique_words.insert(t as u32);
            }
        }

        self.document_sizes.push(num_words);
        self.document_unique_sizes.push(num_unique_words);
        self.num_documents += 1;
    }

    /// 计算统计量并套用 tf/idf 权重，idf 使用 self 的统计
    pub fn finalize(&mut self, tf: TfFn, idf: IdfFn) {
        self.finalize_impl(None, tf, idf);
    }

    /// 同 finalize，但 idf 从 stats 索引取统计量
    ///
    /// 用于查询路径：查询直方图自己构成一个单文档索引，词频
    /// 相对它自身计算，而 idf 必须来自整个集合。
    pub fn finalize_with(&mut self, stats: &InvertedIndex, tf: TfFn, idf: IdfFn) {
        self.finalize_impl(Some(stats), tf, idf);
    }

    fn finalize_impl(&mut self, stats: Option<&InvertedIndex>, tf: TfFn, idf: IdfFn) {
        let n = self.num_documents as usize;

        self.avg_doc_len = self.document_sizes.iter().sum::<f32>() / n as f32;
        self.avg_unique_doc_len =
            self.document_unique_sizes.iter().sum::<u32>() as f32 / n as f32;

        // 先算出全部权重，同时累积每个文档的权重平方和
        let mut weights: Vec<Vec<f32>> = Vec::with_capacity(self.num_words as usize);
        let mut doc_lengths = vec![0.0f32; n];
        for term in 0..self.num_words {
            let postings = &self.doc_frequency_list[term as usize];
            let mut term_weights = Vec::with_capacity(postings.len());
            for (list_pos, &(doc, _)) in postings.iter().enumerate() {
                // 词频永远相对本索引，idf 来自集合统计
                let w_tf = tf(self, term, doc, list_pos);
                let w_idf = idf(stats.unwrap_or(self), term);
                let weight = w_tf * w_idf;
                doc_lengths[doc as usize] += weight * weight;
                term_weights.push(weight);
            }
            weights.push(term_weights);
        }

        for length in &mut doc_lengths {
            *length = length.sqrt();
        }

        // 再过一遍索引，把每个文档的权重向量归一化到单位长度
        for term in 0..self.num_words as usize {
            for (weight, &(doc, _)) in
                weights[term].iter_mut().zip(&self.doc_frequency_list[term])
            {
                *weight /= doc_lengths[doc as usize];
            }
        }

        self.doc_weight_list = weights;
        self.finalized = true;
    }

    /// 在索引中检索与查询直方图最相似的 num_results 个文档
    ///
    /// 返回 (得分, 文档编号)，按得分降序。得分相同时按编号排序。
    pub fn query(
        &self,
        histogram: &[f32],
        tf: TfFn,
        idf: IdfFn,
        num_results: usize,
    ) -> Vec<(f32, u32)> {
        assert!(self.finalized, "索引尚未 finalize");

        let num_results = num_results.min(self.num_documents as usize);

        // 查询直方图自己构成一个单文档索引并套用同样的权重
        let mut query_index = InvertedIndex::new(self.num_words as usize);
        query_index.add_histogram(histogram);
        query_index.finalize_with(self, tf, idf);

        let mut accumulators = vec![0.0f32; self.num_documents as usize];
        for &term in query_index.unique_words() {
            let wqt = query_index.weights(term)[0];
            let weight_list = &self.doc_weight_list[term as usize];
            for (&(doc, _), &wdt) in self.doc_frequency_list[term as usize].iter().zip(weight_list)
            {
                accumulators[doc as usize] += wdt * wqt;
            }
        }

        // 有界最小堆：堆顶是当前保留结果里最小的得分
        let mut heap: BinaryHeap<Reverse<ScoredDoc>> = BinaryHeap::with_capacity(num_results + 1);
        for (doc, &score) in accumulators.iter().enumerate() {
            heap.push(Reverse(ScoredDoc { score, doc: doc as u32 }));
            if heap.len() > num_results {
                heap.pop();
            }
        }

        let mut results: Vec<(f32, u32)> =
            std::iter::from_fn(|| heap.pop()).map(|e| (e.0.score, e.0.doc)).collect();
        // 出堆顺序是从小到大，反转成降序
        results.reverse();
        results
    }

    /// 序列化到文件，索引必须已经 finalize
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        assert!(self.finalized, "索引尚未 finalize");
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("无法创建索引文件: {}", path.display()))?;
        let mut w = BufWriter::new(file);

        self.num_words.write_to(&mut w)?;
        self.num_documents.write_to(&mut w)?;
        self.avg_doc_len.write_to(&mut w)?;
        self.avg_unique_doc_len.write_to(&mut w)?;
        self.total_ft.write_to(&mut w)?;
        self.unique_words.write_to(&mut w)?;
        self.ft.write_to(&mut w)?;
        self.doc_frequency_list.write_to(&mut w)?;
        self.doc_weight_list.write_to(&mut w)?;
        self.document_sizes.write_to(&mut w)?;
        self.document_unique_sizes.write_to(&mut w)?;

        use std::io::Write;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("无法打开索引文件: {}", path.display()))?;
        let mut r = BufReader::new(file);

        let num_words = u32::read_from(&mut r)?;
        let num_documents = u32::read_from(&mut r)?;
        let avg_doc_len = f32::read_from(&mut r)?;
        let avg_unique_doc_len = f32::read_from(&mut r)?;
        let total_ft = Vec::<f32>::read_from(&mut r)?;
        let unique_words = BTreeSet::<u32>::read_from(&mut r)?;
        let ft = Vec::<u32>::read_from(&mut r)?;
        let doc_frequency_list = Vec::<Vec<(u32, f32)>>::read_from(&mut r)?;
        let doc_weight_list = Vec::<Vec<f32>>::read_from(&mut r)?;
        let document_sizes = Vec::<f32>::read_from(&mut r)?;
        let document_unique_sizes = Vec::<u32>::read_from(&mut r)?;

        Ok(Self {
            num_words,
            num_documents,
            avg_doc_len,
            avg_unique_doc_len,
            total_ft,
            unique_words,
            ft,
            doc_frequency_list,
            doc_weight_list,
            document_sizes,
            document_unique_sizes,
            finalized: true,
        })
    }
}

/// 堆元素：先比得分，再比文档编号
struct ScoredDoc {
    score: f32,
    doc: u32,
}

impl PartialEq for ScoredDoc {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for ScoredDoc {}
impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score.total_cmp(&other.score).then(self.doc.cmp(&other.doc))
    }
}
