//! 常量表
//!
//! 名字表、类型/字段/方法引用表，以及六张字面量表。
//! 表在 pod 加载后不可变；索引只在所属 pod 内有意义。

use super::errors::{FcodeError, FcodeResult};
use super::reader::FReader;
use super::store::FStore;
use super::type_ref::FTypeRef;
use super::entry;

/// 字段引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FFieldRef {
    /// 声明类型 typeRef
    pub parent: u16,
    pub name: String,
    /// 字段类型 typeRef
    pub type_ref: u16,
}

/// 方法引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FMethodRef {
    pub parent: u16,
    pub name: String,
    pub ret: u16,
    pub params: Vec<u16>,
}

/// 符号表
#[derive(Debug, Clone, Default)]
pub struct FTables {
    pub names: Vec<String>,
    pub type_refs: Vec<FTypeRef>,
    pub field_refs: Vec<FFieldRef>,
    pub method_refs: Vec<FMethodRef>,
}

fn bad_index(
    table: &'static str,
    index: usize,
    len: usize,
) -> FcodeError {
    FcodeError::BadIndex { table, index, len }
}

impl FTables {
    /// 读取四张符号表
    pub fn read(store: &dyn FStore) -> FcodeResult<Self> {
        let mut tables = FTables::default();

        if let Some(data) = store.read(entry::NAMES)? {
            let mut r = FReader::new(&data, "names");
            let n = r.u2()?;
            for _ in 0..n {
                tables.names.push(r.utf()?);
            }
        }

        if let Some(data) = store.read(entry::TYPE_REFS)? {
            let mut r = FReader::new(&data, "typeRefs");
            let n = r.u2()?;
            for _ in 0..n {
                let pod = tables.name(r.u2()?)?.to_string();
                let name = tables.name(r.u2()?)?.to_string();
                let sig = r.utf()?;
                tables.type_refs.push(FTypeRef::new(pod, name, sig));
            }
        }

        if let Some(data) = store.read(entry::FIELD_REFS)? {
            let mut r = FReader::new(&data, "fieldRefs");
            let n = r.u2()?;
            for _ in 0..n {
                let parent = r.u2()?;
                let name = tables.name(r.u2()?)?.to_string();
                let type_ref = r.u2()?;
                tables.field_refs.push(FFieldRef {
                    parent,
                    name,
                    type_ref,
                });
            }
        }

        if let Some(data) = store.read(entry::METHOD_REFS)? {
            let mut r = FReader::new(&data, "methodRefs");
            let n = r.u2()?;
            for _ in 0..n {
                let parent = r.u2()?;
                let name = tables.name(r.u2()?)?.to_string();
                let ret = r.u2()?;
                let count = r.u1()?;
                let mut params = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    params.push(r.u2()?);
                }
                tables.method_refs.push(FMethodRef {
                    parent,
                    name,
                    ret,
                    params,
                });
            }
        }

        Ok(tables)
    }

    pub fn name(
        &self,
        index: u16,
    ) -> FcodeResult<&str> {
        self.names
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| bad_index("names", index as usize, self.names.len()))
    }

    pub fn type_ref(
        &self,
        index: u16,
    ) -> FcodeResult<&FTypeRef> {
        self.type_refs
            .get(index as usize)
            .ok_or_else(|| bad_index("typeRefs", index as usize, self.type_refs.len()))
    }

    pub fn field_ref(
        &self,
        index: u16,
    ) -> FcodeResult<&FFieldRef> {
        self.field_refs
            .get(index as usize)
            .ok_or_else(|| bad_index("fieldRefs", index as usize, self.field_refs.len()))
    }

    pub fn method_ref(
        &self,
        index: u16,
    ) -> FcodeResult<&FMethodRef> {
        self.method_refs
            .get(index as usize)
            .ok_or_else(|| bad_index("methodRefs", index as usize, self.method_refs.len()))
    }
}

/// 字面量表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FLiterals {
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    /// 十进制数以文本保存
    pub decimals: Vec<String>,
    pub strs: Vec<String>,
    /// 纳秒
    pub durations: Vec<i64>,
    pub uris: Vec<String>,
}

impl FLiterals {
    /// 读取六张字面量表，缺失的表视为空
    pub fn read(store: &dyn FStore) -> FcodeResult<Self> {
        let mut lits = FLiterals::default();
        if let Some(data) = store.read(entry::INTS)? {
            let mut r = FReader::new(&data, "ints");
            for _ in 0..r.u2()? {
                lits.ints.push(r.i8()?);
            }
        }
        if let Some(data) = store.read(entry::FLOATS)? {
            let mut r = FReader::new(&data, "floats");
            for _ in 0..r.u2()? {
                lits.floats.push(r.f8()?);
            }
        }
        lits.decimals = read_utf_table(store, entry::DECIMALS, "decimals")?;
        lits.strs = read_utf_table(store, entry::STRS, "strs")?;
        if let Some(data) = store.read(entry::DURATIONS)? {
            let mut r = FReader::new(&data, "durations");
            for _ in 0..r.u2()? {
                lits.durations.push(r.i8()?);
            }
        }
        lits.uris = read_utf_table(store, entry::URIS, "uris")?;
        Ok(lits)
    }

    /// 条目总数
    pub fn len(&self) -> usize {
        self.ints.len()
            + self.floats.len()
            + self.decimals.len()
            + self.strs.len()
            + self.durations.len()
            + self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_utf_table(
    store: &dyn FStore,
    name: &str,
    what: &'static str,
) -> FcodeResult<Vec<String>> {
    let mut out = Vec::new();
    if let Some(data) = store.read(name)? {
        let mut r = FReader::new(&data, what);
        for _ in 0..r.u2()? {
            out.push(r.utf()?);
        }
    }
    Ok(out)
}
