use anyhow::{bail, Result};

use crate::search::inverted_index::InvertedIndex;

/// 词频权重函数：(索引, 词, 文档, 倒排表位置) -> 权重
///
/// 必须是纯函数，finalize 和查询路径都会调用。
pub type TfFn = fn(&InvertedIndex, u32, u32, usize) -> f32;

/// 逆文档频率权重函数：(集合统计, 词) -> 权重
pub type IdfFn = fn(&InvertedIndex, u32) -> f32;

/// 按名字解析 tf 函数，未知的名字是配置错误
pub fn make_tf(name: &str) -> Result<TfFn> {
    Ok(match name {
        "constant" => tf_constant,
        "video_google" => tf_video_google,
        "bm25" => tf_bm25,
        other => bail!("未知的 tf 函数: {other}"),
    })
}

/// 按名字解析 idf 函数，未知的名字是配置错误
pub fn make_idf(name: &str) -> Result<IdfFn> {
    Ok(match name {
        "constant" => idf_constant,
        "video_google" => idf_video_google,
        "bm25" => idf_bm25,
        other => bail!("未知的 idf 函数: {other}"),
    })
}

fn tf_constant(_index: &InvertedIndex, _term: u32, _doc: u32, _pos: usize) -> f32 {
    1.0
}

fn idf_constant(_index: &InvertedIndex, _term: u32) -> f32 {
    1.0
}

/// 词频除以文档长度
fn tf_video_google(index: &InvertedIndex, term: u32, doc: u32, pos: usize) -> f32 {
    let (_, f_dt) = index.postings(term)[pos];
    f_dt / index.doc_size(doc)
}

/// ln(N / f_t)
fn idf_video_google(index: &InvertedIndex, term: u32) -> f32 {
    let ft = index.ft(term);
    if ft == 0 {
        return 0.0;
    }
    (index.num_documents() as f32 / ft as f32).ln()
}

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Okapi BM25 的词频项，按文档长度与平均长度之比做饱和
fn tf_bm25(index: &InvertedIndex, term: u32, doc: u32, pos: usize) -> f32 {
    let (_, f_dt) = index.postings(term)[pos];
    let norm = 1.0 - BM25_B + BM25_B * index.doc_size(doc) / index.avg_doc_len();
    f_dt * (BM25_K1 + 1.0) / (f_dt + BM25_K1 * norm)
}

/// ln((N - f_t + 0.5) / (f_t + 0.5))
fn idf_bm25(index: &InvertedIndex, term: u32) -> f32 {
    let n = index.num_documents() as f32;
    let ft = index.ft(term) as f32;
    ((n - ft + 0.5) / (ft + 0.5)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_index() -> InvertedIndex {
        let mut index = InvertedIndex::new(5);
        index.add_histogram(&[2.0, 1.0, 0.0, 0.0, 0.0]);
        index.add_histogram(&[0.0, 1.0, 1.0, 0.0, 0.0]);
        index.add_histogram(&[0.0, 1.0, 0.0, 4.0, 0.0]);
        index.finalize(make_tf("constant").unwrap(), make_idf("constant").unwrap());
        index
    }

    #[test]
    fn test_constant_always_resolves() {
        assert!(make_tf("constant").is_ok());
        assert!(make_idf("constant").is_ok());
    }

    #[test]
    fn test_unknown_name_is_error() {
        assert!(make_tf("tfidf").is_err());
        assert!(make_idf("pivoted").is_err());
    }

    #[test]
    fn test_video_google_values() {
        let index = small_index();
        // 文档 0 的总词数是 3，词 0 的词频是 2
        assert!((tf_video_google(&index, 0, 0, 0) - 2.0 / 3.0).abs() < 1e-6);
        // 词 1 出现在全部 3 个文档里
        assert!(idf_video_google(&index, 1).abs() < 1e-6);
        // 词 0 只出现在 1 个文档里
        assert!((idf_video_google(&index, 0) - 3.0f32.ln()).abs() < 1e-6);
        // 没出现过的词 idf 为 0
        assert_eq!(idf_video_google(&index, 4), 0.0);
    }

    #[test]
    fn test_bm25_monotonic_in_rarity() {
        let index = small_index();
        // 越稀有的词 idf 越大
        assert!(idf_bm25(&index, 0) > idf_bm25(&index, 1));
    }
}
