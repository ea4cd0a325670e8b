use image::RgbImage;
use rstest::*;
use serde_json::json;
use tempfile::TempDir;

use visearch::cli::{HistvwCommand, IndexCommand, Quantization, SubCommandExtend, VocabularyCommand};
use visearch::driver::ComputeDescriptors;
use visearch::io::{read_property, FileList};
use visearch::registry::REGISTRY;
use visearch::search::tf_idf::{make_idf, make_tf};
use visearch::search::{BofSearchManager, InvertedIndex, LinearSearchManager};

const NUM_IMAGES: usize = 12;

/// 每张图片一横一竖两条线，位置各不相同
fn sketch(i: usize) -> RgbImage {
    let mut img = RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
    let y = 6 + 4 * i as u32;
    let x = 58 - 4 * i as u32;
    for t in 0..64 {
        img.put_pixel(t, y, image::Rgb([0, 0, 0]));
        img.put_pixel(x, t, image::Rgb([0, 0, 0]));
    }
    img
}

#[fixture]
fn corpus() -> (TempDir, FileList) {
    let dir = TempDir::new().unwrap();
    for i in 0..NUM_IMAGES {
        sketch(i).save(dir.path().join(format!("{i:04}.png"))).unwrap();
    }
    let mut files = FileList::new(dir.path()).unwrap();
    files.scan(&["*.png".to_owned()]).unwrap();
    assert_eq!(files.len(), NUM_IMAGES);
    (dir, files)
}

fn path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

// 完整流程：描述符 -> 词表 -> 直方图 -> 倒排索引 -> 检索
#[rstest]
fn test_bag_of_words_pipeline(corpus: (TempDir, FileList)) {
    let (dir, files) = corpus;

    // 1. 计算局部描述符
    let generator = REGISTRY
        .create_generator(
            "shog",
            json!({ "image_width": 64, "sampler": { "num_samples": 36 } }),
        )
        .unwrap();
    let prefix = path(&dir, "shog_");
    let driver = ComputeDescriptors::new(generator.as_ref(), &files, &prefix).unwrap();
    driver.run(4);
    driver.finish().unwrap();

    // 特征、位置、数量三个文件必须逐条对应
    let features: Vec<Vec<Vec<f32>>> = read_property(format!("{prefix}features")).unwrap();
    let sizes: Vec<i32> = read_property(format!("{prefix}numfeatures")).unwrap();
    assert_eq!(features.len(), NUM_IMAGES);
    for (f, &n) in features.iter().zip(&sizes) {
        assert_eq!(f.len(), n as usize);
        assert!(n > 0);
    }

    // 2. 聚类出视觉词表
    let vocabulary_file = path(&dir, "vocabulary");
    VocabularyCommand {
        descriptors: format!("{prefix}features").into(),
        sizes: Some(format!("{prefix}numfeatures").into()),
        num_samples: Some(150),
        clusters: 8,
        max_iter: 20,
        min_changes: 0.01,
        seed: Some(7),
        output: vocabulary_file.clone().into(),
    }
    .run()
    .unwrap();

    let vocabulary: Vec<Vec<f32>> = read_property(&vocabulary_file).unwrap();
    assert_eq!(vocabulary.len(), 8);
    let dim = features[0][0].len();
    assert!(vocabulary.iter().all(|c| c.len() == dim));

    // 3. 量化成视觉词直方图（带两层空间金字塔）
    let histvw_file = path(&dir, "histvw");
    HistvwCommand {
        vocabulary: vocabulary_file.clone().into(),
        descriptors: format!("{prefix}features").into(),
        positions: format!("{prefix}positions").into(),
        quantization: Quantization::Fuzzy,
        sigma: Some(0.5),
        pyramid_levels: 2,
        output: histvw_file.clone().into(),
    }
    .run()
    .unwrap();

    let histograms: Vec<Vec<f32>> = read_property(&histvw_file).unwrap();
    assert_eq!(histograms.len(), NUM_IMAGES);
    // 第一层 8 个词 + 第二层 4 个格子
    assert!(histograms.iter().all(|h| h.len() == 8 + 4 * 8));
    // 模糊量化的平坦层归一化后总和为 1
    for h in &histograms {
        assert!((h[..8].iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    // 4. 构建倒排索引
    let index_file = path(&dir, "index");
    IndexCommand {
        histvw: histvw_file.clone().into(),
        tf: "video_google".to_owned(),
        idf: "constant".to_owned(),
        output: index_file.clone().into(),
    }
    .run()
    .unwrap();

    // 5. 自查询：每张图片的直方图都应把自己排在得分最高的位置
    let manager = BofSearchManager::new(&index_file, "video_google", "constant").unwrap();
    assert_eq!(manager.index().num_documents() as usize, NUM_IMAGES);

    for (i, h) in histograms.iter().enumerate() {
        let results = manager.query(h, NUM_IMAGES);
        let top_score = results[0].0;
        let own = results.iter().find(|&&(_, doc)| doc == i as u32);
        let own_score = own.expect("结果中必须包含自己").0;
        assert!(
            (top_score - own_score).abs() < 1e-4,
            "图片 {i} 的自查询得分 {own_score} 低于最高分 {top_score}"
        );
    }
}

// 索引保存重载后查询结果保持一致
#[rstest]
fn test_index_roundtrip_preserves_ranking(corpus: (TempDir, FileList)) {
    let (dir, _) = corpus;

    let histograms: Vec<Vec<f32>> = (0..100)
        .map(|i| {
            let mut h = vec![0.0f32; 32];
            h[i % 32] = 1.0 + (i / 32) as f32;
            h[(i * 11 + 5) % 32] = 0.5;
            h
        })
        .collect();

    let mut index = InvertedIndex::new(32);
    for h in &histograms {
        index.add_histogram(h);
    }
    let tf = make_tf("video_google").unwrap();
    let idf = make_idf("video_google").unwrap();
    index.finalize(tf, idf);

    let before = index.query(&histograms[0], tf, idf, 10);

    let index_file = path(&dir, "roundtrip_index");
    index.save(&index_file).unwrap();
    let reloaded = InvertedIndex::load(&index_file).unwrap();
    let after = reloaded.query(&histograms[0], tf, idf, 10);

    assert_eq!(before, after);
}

// 全局描述符走线性检索：查询图片自身距离为 0 排第一
#[rstest]
fn test_linear_search_pipeline(corpus: (TempDir, FileList)) {
    let (dir, files) = corpus;

    let generator = REGISTRY
        .create_generator("tinyimage", json!({ "width": 8, "height": 8 }))
        .unwrap();
    let prefix = path(&dir, "tiny_");
    let driver = ComputeDescriptors::new(generator.as_ref(), &files, &prefix).unwrap();
    driver.run(2);
    driver.finish().unwrap();

    let manager =
        LinearSearchManager::new(format!("{prefix}features"), "l2norm_squared").unwrap();
    assert_eq!(manager.len(), NUM_IMAGES);

    // 用第 3 张图片重新计算描述符作为查询
    let bundle = generator.compute(&sketch(3)).unwrap();
    let visearch::descriptor::PropertyValue::F32s(query) = &bundle["features"] else {
        panic!("tinyimage 应该输出向量特征");
    };

    let results = manager.query(query, 5);
    assert_eq!(results[0].1, 3);
    assert!(results[0].0 < 1e-9);
    // 距离升序
    assert!(results.windows(2).all(|w| w[0].0 <= w[1].0));
}
