use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};

use crate::descriptor::{Generator, PropertyKind, PropertyValue};
use crate::io::{FileList, PropertyWriter};

/// 按属性类型分发的写入端
pub enum AnyWriter {
    F32s(PropertyWriter<Vec<f32>>),
    F32Lists(PropertyWriter<Vec<Vec<f32>>>),
    I32(PropertyWriter<i32>),
}

impl AnyWriter {
    pub fn open(kind: PropertyKind, path: impl AsRef<Path>) -> Result<Self> {
        Ok(match kind {
            PropertyKind::F32s => AnyWriter::F32s(PropertyWriter::open(path)?),
            PropertyKind::F32Lists => AnyWriter::F32Lists(PropertyWriter::open(path)?),
            PropertyKind::I32 => AnyWriter::I32(PropertyWriter::open(path)?),
        })
    }

    pub fn push(&mut self, value: &PropertyValue) -> Result<()> {
        match (self, value) {
            (AnyWriter::F32s(w), PropertyValue::F32s(v)) => w.push(v),
            (AnyWriter::F32Lists(w), PropertyValue::F32Lists(v)) => w.push(v),
            (AnyWriter::I32(w), PropertyValue::I32(v)) => w.push(v),
            _ => bail!("属性值类型与写入端不匹配"),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            AnyWriter::F32s(w) => w.finish(),
            AnyWriter::F32Lists(w) => w.finish(),
            AnyWriter::I32(w) => w.finish(),
        }
    }
}

struct Entry {
    index: usize,
    value: PropertyValue,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

/// 把乱序到达的元素恢复成下标顺序后写入底层属性文件
///
/// 用下标作键的最小堆做缓冲，每次压入后把堆顶与期望序号连续的
/// 元素全部写出。工作线程结束后堆必须为空，否则说明有元素缺失。
struct OrderedSink {
    writer: AnyWriter,
    queue: BinaryHeap<Reverse<Entry>>,
    next_index: usize,
}

impl OrderedSink {
    fn new(writer: AnyWriter) -> Self {
        Self { writer, queue: BinaryHeap::new(), next_index: 0 }
    }

    fn push(&mut self, index: usize, value: PropertyValue) -> Result<()> {
        // 已写出的部分是连续前缀，新元素只能在其后
        assert!(index >= self.next_index);

        self.queue.push(Reverse(Entry { index, value }));
        while self.queue.peek().map(|e| e.0.index) == Some(self.next_index) {
            let entry = self.queue.pop().unwrap().0;
            self.writer.push(&entry.value)?;
            self.next_index += 1;
        }
        Ok(())
    }

    fn buffer_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

struct NamedSink {
    name: &'static str,
    inner: Mutex<OrderedSink>,
}

/// 并行描述符计算
///
/// 工作线程从共享游标领取下一个下标，解码图片并运行生成器，
/// 把每个属性压入对应的有序缓冲。任何一张图片失败都会中止整个
/// 任务：出错线程记下错误并置标志位，其余线程完成手头的图片后
/// 退出领取循环。
pub struct ComputeDescriptors<'a> {
    generator: &'a dyn Generator,
    files: &'a FileList,
    sinks: Vec<NamedSink>,
    cursor: Mutex<usize>,
    error: AtomicBool,
    finished: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
}

impl<'a> ComputeDescriptors<'a> {
    /// 为生成器声明的每个属性在 `<prefix><name>` 处打开一个写入端
    pub fn new(
        generator: &'a dyn Generator,
        files: &'a FileList,
        output_prefix: &str,
    ) -> Result<Self> {
        let mut sinks = vec![];
        for &(name, kind) in generator.properties() {
            let writer = AnyWriter::open(kind, format!("{output_prefix}{name}"))?;
            sinks.push(NamedSink { name, inner: Mutex::new(OrderedSink::new(writer)) });
        }
        Ok(Self {
            generator,
            files,
            sinks,
            cursor: Mutex::new(0),
            error: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            first_error: Mutex::new(None),
        })
    }

    /// 尚未被领取的最小下标，可以并发调用
    pub fn current(&self) -> usize {
        *self.cursor.lock().unwrap()
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// 用 num_threads 个线程处理整个文件列表
    pub fn run(&self, num_threads: usize) {
        assert!(num_threads > 0);

        std::thread::scope(|s| {
            for _ in 0..num_threads {
                s.spawn(|| self.worker());
            }
        });

        self.finished.store(true, Ordering::Relaxed);
    }

    fn worker(&self) {
        while !self.error.load(Ordering::Relaxed) {
            let current = {
                let mut cursor = self.cursor.lock().unwrap();
                if *cursor == self.files.len() {
                    break;
                }
                let current = *cursor;
                *cursor += 1;
                current
            };

            let filename = self.files.filename(current);
            let result = image::open(&filename)
                .map_err(|e| anyhow!("无法解码图片 {}: {e}", filename.display()))
                .and_then(|img| {
                    self.generator
                        .compute(&img.to_rgb8())
                        .with_context(|| format!("描述符计算失败: {}", filename.display()))
                });

            let mut bundle = match result {
                Ok(bundle) => bundle,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            };

            for sink in &self.sinks {
                if let Some(value) = bundle.remove(sink.name) {
                    if let Err(e) = sink.inner.lock().unwrap().push(current, value) {
                        self.fail(e);
                        return;
                    }
                }
            }
        }
    }

    fn fail(&self, error: anyhow::Error) {
        let mut first = self.first_error.lock().unwrap();
        if first.is_none() {
            *first = Some(error);
        }
        self.error.store(true, Ordering::Relaxed);
    }

    /// 关闭所有写入端并返回整体结果
    ///
    /// 即使计算中途失败，已经按顺序写出的前缀也会连同偏移表一起
    /// 落盘，方便排查。
    pub fn finish(self) -> Result<()> {
        let mut leftover = false;
        for sink in self.sinks {
            let sink = sink.inner.into_inner().unwrap();
            leftover |= !sink.buffer_empty();
            sink.writer.finish()?;
        }

        if let Some(e) = self.first_error.into_inner().unwrap() {
            return Err(e);
        }
        if leftover {
            bail!("有工作线程异常退出，输出缓冲中存在未写出的元素");
        }
        Ok(())
    }
}
