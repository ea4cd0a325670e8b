use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Result, Write};

/// 可写入属性文件的元素类型
///
/// 编码规则：
/// - 定宽标量：按本机字节序原样写出
/// - 字符串：i32 长度前缀 + UTF-8 字节
/// - 序列 / 集合 / 映射：i64 长度前缀 + 依次编码的元素
/// - 二元组：两个编码的拼接
///
/// 标量序列会作为一整块连续内存写出，读写大向量时这条快速路径
/// 比逐元素编码快一个数量级。
pub trait Record: Sized + Default {
    /// 类型名，会记录在文件元数据中，读取时用于校验
    fn type_name() -> String;

    fn write_to(&self, w: &mut dyn Write) -> Result<()>;

    fn read_from(r: &mut dyn Read) -> Result<Self>;

    /// 批量写出，标量类型会覆盖此方法走连续内存路径
    fn write_slice(xs: &[Self], w: &mut dyn Write) -> Result<()> {
        for x in xs {
            x.write_to(w)?;
        }
        Ok(())
    }

    /// 批量读取 n 个元素
    fn read_many(r: &mut dyn Read, n: usize) -> Result<Vec<Self>> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(Self::read_from(r)?);
        }
        Ok(v)
    }
}

macro_rules! impl_record_scalar {
    ($($t:ty => $name:expr),* $(,)?) => {$(
        impl Record for $t {
            fn type_name() -> String {
                $name.to_owned()
            }

            fn write_to(&self, w: &mut dyn Write) -> Result<()> {
                w.write_all(&self.to_ne_bytes())
            }

            fn read_from(r: &mut dyn Read) -> Result<Self> {
                let mut buf = [0u8; size_of::<$t>()];
                r.read_exact(&mut buf)?;
                Ok(<$t>::from_ne_bytes(buf))
            }

            fn write_slice(xs: &[Self], w: &mut dyn Write) -> Result<()> {
                w.write_all(bytemuck::cast_slice(xs))
            }

            fn read_many(r: &mut dyn Read, n: usize) -> Result<Vec<Self>> {
                let mut v = vec![<$t>::default(); n];
                r.read_exact(bytemuck::cast_slice_mut(&mut v))?;
                Ok(v)
            }
        }
    )*};
}

impl_record_scalar! {
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64",
    f32 => "f32", f64 => "f64",
}

impl Record for String {
    fn type_name() -> String {
        "string".to_owned()
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        (self.len() as i32).write_to(w)?;
        w.write_all(self.as_bytes())
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        let len = i32::read_from(r)?;
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(std::io::Error::other)
    }
}

impl<T: Record> Record for Vec<T> {
    fn type_name() -> String {
        format!("vec<{}>", T::type_name())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        (self.len() as i64).write_to(w)?;
        T::write_slice(self, w)
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        let len = i64::read_from(r)?;
        T::read_many(r, len as usize)
    }
}

impl<T: Record, const N: usize> Record for [T; N]
where
    [T; N]: Default,
{
    fn type_name() -> String {
        format!("array<{},{}>", T::type_name(), N)
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        T::write_slice(self, w)
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        let v = T::read_many(r, N)?;
        Ok(v.try_into().unwrap_or_else(|_| unreachable!()))
    }
}

impl<A: Record, B: Record> Record for (A, B) {
    fn type_name() -> String {
        format!("pair<{},{}>", A::type_name(), B::type_name())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        self.0.write_to(w)?;
        self.1.write_to(w)
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        Ok((A::read_from(r)?, B::read_from(r)?))
    }
}

impl<T: Record + Ord> Record for BTreeSet<T> {
    fn type_name() -> String {
        format!("set<{}>", T::type_name())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        (self.len() as i64).write_to(w)?;
        for x in self {
            x.write_to(w)?;
        }
        Ok(())
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        let len = i64::read_from(r)?;
        let mut v = BTreeSet::new();
        for _ in 0..len {
            v.insert(T::read_from(r)?);
        }
        Ok(v)
    }
}

impl<K: Record + Ord, V: Record> Record for BTreeMap<K, V> {
    fn type_name() -> String {
        format!("map<{},{}>", K::type_name(), V::type_name())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        (self.len() as i64).write_to(w)?;
        for (k, v) in self {
            k.write_to(w)?;
            v.write_to(w)?;
        }
        Ok(())
    }

    fn read_from(r: &mut dyn Read) -> Result<Self> {
        let len = i64::read_from(r)?;
        let mut v = BTreeMap::new();
        for _ in 0..len {
            let k = K::read_from(r)?;
            v.insert(k, V::read_from(r)?);
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Record + PartialEq + std::fmt::Debug>(x: T) {
        let mut buf = vec![];
        x.write_to(&mut buf).unwrap();
        let y = T::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn test_scalar_roundtrip() {
        roundtrip(42i32);
        roundtrip(-1i64);
        roundtrip(3.25f32);
        roundtrip(255u8);
    }

    #[test]
    fn test_string_roundtrip() {
        roundtrip(String::from("sketch/airplane/1.png"));
        roundtrip(String::new());
    }

    #[test]
    fn test_nested_roundtrip() {
        roundtrip(vec![vec![1.0f32, 2.0], vec![], vec![3.0]]);
        roundtrip((7u32, 0.5f32));
        roundtrip(vec![(1u32, 2.0f32), (3, 4.0)]);
        roundtrip(BTreeSet::from([3u32, 1, 2]));
        roundtrip(BTreeMap::from([
            ("a".to_owned(), "1".to_owned()),
            ("b".to_owned(), "2".to_owned()),
        ]));
    }

    #[test]
    fn test_scalar_vec_layout() {
        // 标量序列必须是 i64 长度 + 连续数据块
        let mut buf = vec![];
        vec![1.0f32, 2.0].write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 8 + 2 * 4);
        assert_eq!(&buf[..8], &2i64.to_ne_bytes());
    }

    #[test]
    fn test_string_length_prefix() {
        let mut buf = vec![];
        String::from("ab").write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 2);
        assert_eq!(&buf[..4], &2i32.to_ne_bytes());
    }
}
