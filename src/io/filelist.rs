use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSetBuilder};
use log::info;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use walkdir::WalkDir;

use crate::io::property::{read_property, write_property};

/// 相对于根目录的有序图片路径列表
///
/// 列表本身以属性文件（字符串序列）的形式持久化，下游所有
/// 以下标寻址的数据（描述符、直方图、索引）都以这份列表的顺序为准。
#[derive(Debug, Default, Clone)]
pub struct FileList {
    root_dir: PathBuf,
    files: Vec<String>,
}

impl FileList {
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self> {
        let mut list = Self::default();
        list.set_root_dir(root_dir)?;
        Ok(list)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn set_root_dir(&mut self, root_dir: impl AsRef<Path>) -> Result<()> {
        let root_dir = root_dir.as_ref();
        if !root_dir.is_dir() {
            bail!("根目录不存在: {}", root_dir.display());
        }
        self.root_dir = root_dir.to_owned();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 下标 index 处的完整路径
    pub fn filename(&self, index: usize) -> PathBuf {
        self.root_dir.join(&self.files[index])
    }

    /// 下标 index 处的相对路径
    pub fn relative_filename(&self, index: usize) -> &str {
        &self.files[index]
    }

    pub fn filenames(&self) -> &[String] {
        &self.files
    }

    /// 递归扫描根目录，收集匹配任一 glob 模式的文件的相对路径
    pub fn scan(&mut self, patterns: &[String]) -> Result<()> {
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            builder.add(Glob::new(p)?);
        }
        let globs = builder.build()?;

        let mut files = vec![];
        for entry in WalkDir::new(&self.root_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root_dir)
                .expect("walkdir 返回了根目录之外的路径");
            if globs.is_match(relative) {
                files.push(relative.to_string_lossy().into_owned());
            }
        }
        info!("扫描完成，共 {} 个文件", files.len());

        self.files = files;
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        // 读取失败时保持原有内容不变
        self.files = read_property(path)?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_property(&self.files, path)
    }

    /// 均匀随机抽取 new_size 个文件，抽取后保持原有顺序
    pub fn random_sample(&mut self, new_size: usize, seed: u64) {
        if new_size >= self.files.len() {
            return;
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.files.len()).collect();
        indices.shuffle(&mut rng);
        indices.truncate(new_size);
        indices.sort_unstable();

        self.files = indices.into_iter().map(|i| std::mem::take(&mut self.files[i])).collect();
    }
}
