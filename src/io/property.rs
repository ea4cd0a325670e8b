use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::io::record::Record;

/// 属性文件格式版本，修改内部格式时必须同步修改读取端
const FORMAT_VERSION: i32 = 2;

/// 属性文件写入端
///
/// 将同一类型的元素流按追加方式写入磁盘，关闭时在文件尾部写出
/// 偏移表和元数据映射，最后 8 字节是元数据映射的绝对偏移。
/// 文件可以在相同字节序的机器之间移植。
pub struct PropertyWriter<T: Record> {
    file: BufWriter<File>,
    path: PathBuf,
    offsets: Vec<i64>,
    map: BTreeMap<String, String>,
    _marker: PhantomData<T>,
}

impl<T: Record> PropertyWriter<T> {
    /// 打开文件准备写入，已存在的内容会被覆盖
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::create(&path)
            .with_context(|| format!("无法创建属性文件: {}", path.display()))?;
        let mut map = BTreeMap::new();
        map.insert("__version".to_owned(), FORMAT_VERSION.to_string());
        map.insert("__typeinfo".to_owned(), T::type_name());
        Ok(Self { file: BufWriter::new(file), path, offsets: vec![], map, _marker: PhantomData })
    }

    /// 在文件末尾追加一个元素
    pub fn push(&mut self, element: &T) -> Result<()> {
        let pos = self.file.stream_position()? as i64;
        self.offsets.push(pos);
        element.write_to(&mut self.file)?;
        Ok(())
    }

    /// 把元素记录在指定下标处，偏移表中间的空位用 -1 填充
    pub fn insert(&mut self, element: &T, pos: usize) -> Result<()> {
        if self.offsets.len() <= pos {
            self.offsets.resize(pos + 1, -1);
        }
        self.offsets[pos] = self.file.stream_position()? as i64;
        element.write_to(&mut self.file)?;
        Ok(())
    }

    /// 已记录的元素数量（含空位）
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// 写出偏移表和元数据并关闭文件
    pub fn finish(mut self) -> Result<()> {
        // 预留的特征偏移字段，当前格式恒为 0
        let p_features: i64 = 0;
        self.map.insert("__features".to_owned(), p_features.to_string());
        p_features.write_to(&mut self.file)?;

        let p_offsets = self.file.stream_position()? as i64;
        self.map.insert("__offsets".to_owned(), p_offsets.to_string());
        self.offsets.write_to(&mut self.file)?;

        let p_map = self.file.stream_position()? as i64;
        self.map.write_to(&mut self.file)?;
        p_map.write_to(&mut self.file)?;

        self.file
            .flush()
            .with_context(|| format!("写入属性文件失败: {}", self.path.display()))
    }
}

/// 属性文件读取端
///
/// 打开时定位并读入元数据与偏移表，随后按下标随机访问。
/// 并发读取时每个线程需要持有独立的 reader。
pub struct PropertyReader<T: Record> {
    file: BufReader<File>,
    offsets: Vec<i64>,
    map: BTreeMap<String, String>,
    _marker: PhantomData<T>,
}

impl<T: Record> PropertyReader<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("无法打开属性文件: {}", path.display()))?;
        let mut file = BufReader::new(file);

        // 最后 8 字节指向元数据映射
        file.seek(SeekFrom::End(-8))?;
        let p_map = i64::read_from(&mut file)?;
        file.seek(SeekFrom::Start(p_map as u64))?;
        let map = BTreeMap::<String, String>::read_from(&mut file)
            .with_context(|| format!("属性文件元数据损坏: {}", path.display()))?;

        let version: i32 = map.get("__version").and_then(|v| v.parse().ok()).unwrap_or(0);
        if version != FORMAT_VERSION {
            bail!("属性文件 {} 版本不匹配: 期望 {FORMAT_VERSION}，实际 {version}", path.display());
        }
        let typeinfo = map.get("__typeinfo").cloned().unwrap_or_default();
        if typeinfo != T::type_name() {
            bail!(
                "属性文件 {} 元素类型不匹配: 期望 {}，实际 {}",
                path.display(),
                T::type_name(),
                typeinfo
            );
        }

        let p_offsets: i64 = map
            .get("__offsets")
            .and_then(|v| v.parse().ok())
            .with_context(|| format!("属性文件 {} 缺少偏移表", path.display()))?;
        file.seek(SeekFrom::Start(p_offsets as u64))?;
        let offsets = Vec::<i64>::read_from(&mut file)?;

        Ok(Self { file, offsets, map, _marker: PhantomData })
    }

    /// 元素数量（含空位）
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// 读取下标 index 处的元素，空位返回该类型的默认值
    pub fn get(&mut self, index: usize) -> Result<T> {
        let offset = self.offsets[index];
        if offset < 0 {
            return Ok(T::default());
        }
        self.file.seek(SeekFrom::Start(offset as u64))?;
        Ok(T::read_from(&mut self.file)?)
    }

    /// 元素的起始偏移表
    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.map
    }
}

/// 把整个向量作为属性文件写出，每个元素占一条记录
pub fn write_property<T: Record>(v: &[T], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = PropertyWriter::<T>::open(path)?;
    for x in v {
        writer.push(x)?;
    }
    writer.finish()
}

/// 读入属性文件中的全部元素
pub fn read_property<T: Record>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let mut reader = PropertyReader::<T>::open(path)?;
    let mut v = Vec::with_capacity(reader.len());
    for i in 0..reader.len() {
        v.push(reader.get(i)?);
    }
    Ok(v)
}
