//! Pod：一个编译单元
//!
//! 加载分两步：`FPod::load` 读取符号表、字面量表与元数据，
//! 类型体在 `read_type_body` 时才从归档读取。

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::errors::{FcodeError, FcodeResult};
use super::reader::FReader;
use super::store::{FStore, ZipStore};
use super::tables::{FLiterals, FTables};
use super::type_ref::FTypeRef;
use super::types::{FAttrs, FType};
use super::{entry, FCODE_MAGIC, FCODE_VERSION};

/// 已加载的 pod
#[derive(Clone)]
pub struct FPod {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub attrs: FAttrs,
    pub tables: FTables,
    pub literals: FLiterals,
    pub types: Vec<FType>,
    store: Arc<dyn FStore>,
}

impl std::fmt::Debug for FPod {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FPod")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("depends", &self.depends)
            .field("types", &self.types.len())
            .finish()
    }
}

impl FPod {
    /// 打开磁盘上的 pod 归档
    pub fn open(path: &Path) -> FcodeResult<Self> {
        let store = ZipStore::open(path)?;
        Self::load(Arc::new(store))
    }

    /// 读取符号表与元数据（类型体保持 hollow）
    pub fn load(store: Arc<dyn FStore>) -> FcodeResult<Self> {
        let tables = FTables::read(store.as_ref())?;

        let meta = store.read_required(entry::POD_META)?;
        let mut r = FReader::new(&meta, "pod.def");
        let magic = r.u4()?;
        if magic != FCODE_MAGIC {
            return Err(FcodeError::BadMagic(magic));
        }
        let version = r.u4()?;
        if version != FCODE_VERSION {
            return Err(FcodeError::BadVersion(version));
        }
        let name = r.utf()?;
        let pod_version = r.utf()?;
        let n = r.u1()?;
        let mut depends = Vec::with_capacity(n as usize);
        for _ in 0..n {
            depends.push(r.utf()?);
        }
        let attrs = FAttrs::read(&mut r, &tables)?;

        let mut types = Vec::new();
        if let Some(data) = store.read(entry::TYPE_META)? {
            let mut r = FReader::new(&data, "types.def");
            let n = r.u2()?;
            for _ in 0..n {
                let t = FType::read_meta(&mut r)?;
                tables.type_ref(t.self_ref)?;
                types.push(t);
            }
        }

        let literals = FLiterals::read(store.as_ref())?;
        debug!(
            "loaded pod {} {} ({} types, {} literals)",
            name,
            pod_version,
            types.len(),
            literals.len()
        );

        Ok(Self {
            name,
            version: pod_version,
            depends,
            attrs,
            tables,
            literals,
            types,
            store,
        })
    }

    /// 类型的 typeRef
    pub fn type_ref_of(
        &self,
        index: usize,
    ) -> FcodeResult<&FTypeRef> {
        let t = self.types.get(index).ok_or(FcodeError::BadIndex {
            table: "types",
            index,
            len: self.types.len(),
        })?;
        self.tables.type_ref(t.self_ref)
    }

    /// 按简单名查找类型
    pub fn find_type(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.types.iter().position(|t| {
            self.tables
                .type_ref(t.self_ref)
                .map(|r| r.name == name)
                .unwrap_or(false)
        })
    }

    /// 读取一个类型的类型体；已读取时直接返回
    pub fn read_type_body(
        &mut self,
        index: usize,
    ) -> FcodeResult<&FType> {
        let name = self.type_ref_of(index)?.name.clone();
        if self.types[index].hollow {
            let entry_name = entry::type_body(&name);
            let data = self.store.read_required(&entry_name)?;
            let mut r = FReader::new(&data, "type body");
            self.types[index].read_body(&mut r, &self.tables)?;
            debug!("read type body {}::{}", self.name, name);
        }
        Ok(&self.types[index])
    }

    /// 读取全部类型体
    pub fn read_all_bodies(&mut self) -> FcodeResult<()> {
        for i in 0..self.types.len() {
            self.read_type_body(i)?;
        }
        Ok(())
    }
}
