//! 类型、字段、方法与属性

use super::errors::FcodeResult;
use super::flags;
use super::reader::FReader;
use super::tables::FTables;
use super::{attr, NULL_INDEX};

/// 异常表条目（fcode 偏移）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FErrEntry {
    pub start: u16,
    pub end: u16,
    pub handler: u16,
    /// 捕获类型 typeRef
    pub type_ref: u16,
}

/// 行号条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FLine {
    pub pc: u16,
    pub line: u16,
}

/// 属性列表，未知属性原样保留
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FAttrs {
    pub items: Vec<(String, Vec<u8>)>,
}

impl FAttrs {
    pub fn read(
        r: &mut FReader<'_>,
        tables: &FTables,
    ) -> FcodeResult<Self> {
        let n = r.u2()?;
        let mut items = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = tables.name(r.u2()?)?.to_string();
            items.push((name, r.buf()?));
        }
        Ok(Self { items })
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_slice())
    }

    pub fn err_table(&self) -> FcodeResult<Vec<FErrEntry>> {
        let Some(data) = self.get(attr::ERR_TABLE) else {
            return Ok(Vec::new());
        };
        let mut r = FReader::new(data, "ErrTable");
        let n = r.u2()?;
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            out.push(FErrEntry {
                start: r.u2()?,
                end: r.u2()?,
                handler: r.u2()?,
                type_ref: r.u2()?,
            });
        }
        Ok(out)
    }

    pub fn line_numbers(&self) -> FcodeResult<Vec<FLine>> {
        let Some(data) = self.get(attr::LINE_NUMBERS) else {
            return Ok(Vec::new());
        };
        let mut r = FReader::new(data, "LineNumbers");
        let n = r.u2()?;
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            out.push(FLine {
                pc: r.u2()?,
                line: r.u2()?,
            });
        }
        Ok(out)
    }

    pub fn line_number(&self) -> FcodeResult<Option<u16>> {
        match self.get(attr::LINE_NUMBER) {
            Some(data) => FReader::new(data, "LineNumber").u2().map(Some),
            None => Ok(None),
        }
    }

    pub fn source_file(&self) -> FcodeResult<Option<String>> {
        match self.get(attr::SOURCE_FILE) {
            Some(data) => FReader::new(data, "SourceFile").utf().map(Some),
            None => Ok(None),
        }
    }
}

/// 方法变量（先参数后局部变量）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FVar {
    pub name: String,
    pub type_ref: u16,
    pub flags: u8,
    pub attrs: FAttrs,
}

impl FVar {
    pub fn is_param(&self) -> bool {
        self.flags & flags::PARAM != 0
    }

    /// 默认值表达式的 fcode
    pub fn default_expr(&self) -> Option<&[u8]> {
        self.attrs.get(attr::PARAM_DEFAULT)
    }

    pub fn has_default(&self) -> bool {
        self.default_expr().is_some()
    }
}

/// 字段定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FField {
    pub name: String,
    pub flags: u32,
    pub type_ref: u16,
    pub attrs: FAttrs,
}

impl FField {
    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }

    pub fn is_storage(&self) -> bool {
        self.flags & flags::STORAGE != 0
    }
}

/// 方法定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FMethod {
    pub name: String,
    pub flags: u32,
    pub ret: u16,
    pub inherited_ret: u16,
    pub max_stack: u8,
    pub param_count: u8,
    pub local_count: u8,
    pub vars: Vec<FVar>,
    pub code: Vec<u8>,
    pub attrs: FAttrs,
}

impl FMethod {
    pub fn read(
        r: &mut FReader<'_>,
        tables: &FTables,
    ) -> FcodeResult<Self> {
        let name = tables.name(r.u2()?)?.to_string();
        let flags = r.u4()?;
        let ret = r.u2()?;
        let inherited_ret = r.u2()?;
        let max_stack = r.u1()?;
        let param_count = r.u1()?;
        let local_count = r.u1()?;
        let total = param_count as usize + local_count as usize;
        let mut vars = Vec::with_capacity(total);
        for _ in 0..total {
            let name = tables.name(r.u2()?)?.to_string();
            let type_ref = r.u2()?;
            let var_flags = r.u1()?;
            let attrs = FAttrs::read(r, tables)?;
            vars.push(FVar {
                name,
                type_ref,
                flags: var_flags,
                attrs,
            });
        }
        let code = r.buf()?;
        let attrs = FAttrs::read(r, tables)?;
        Ok(Self {
            name,
            flags,
            ret,
            inherited_ret,
            max_stack,
            param_count,
            local_count,
            vars,
            code,
            attrs,
        })
    }

    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }

    pub fn is_ctor(&self) -> bool {
        self.flags & flags::CTOR != 0
    }

    pub fn is_native(&self) -> bool {
        self.flags & flags::NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & flags::ABSTRACT != 0
    }

    pub fn is_private(&self) -> bool {
        self.flags & flags::PRIVATE != 0
    }

    /// 参数变量
    pub fn params(&self) -> &[FVar] {
        let n = (self.param_count as usize).min(self.vars.len());
        &self.vars[..n]
    }

    /// 第一个带默认值的参数位置
    pub fn first_default(&self) -> Option<usize> {
        self.params().iter().position(FVar::has_default)
    }

    /// 有方法体
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}

/// 类型定义；`hollow` 时只有元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FType {
    pub self_ref: u16,
    pub base: Option<u16>,
    pub mixins: Vec<u16>,
    pub flags: u32,
    pub fields: Vec<FField>,
    pub methods: Vec<FMethod>,
    pub attrs: FAttrs,
    pub hollow: bool,
}

impl FType {
    /// 读取 types.def 中的一条元数据
    pub fn read_meta(r: &mut FReader<'_>) -> FcodeResult<Self> {
        let self_ref = r.u2()?;
        let base = match r.u2()? {
            NULL_INDEX => None,
            b => Some(b),
        };
        let n = r.u2()?;
        let mut mixins = Vec::with_capacity(n as usize);
        for _ in 0..n {
            mixins.push(r.u2()?);
        }
        let flags = r.u4()?;
        Ok(Self {
            self_ref,
            base,
            mixins,
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            attrs: FAttrs::default(),
            hollow: true,
        })
    }

    /// 读取 `<Type>.fcode` 类型体
    pub fn read_body(
        &mut self,
        r: &mut FReader<'_>,
        tables: &FTables,
    ) -> FcodeResult<()> {
        let n = r.u2()?;
        let mut fields = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = tables.name(r.u2()?)?.to_string();
            let field_flags = r.u4()?;
            let type_ref = r.u2()?;
            let attrs = FAttrs::read(r, tables)?;
            fields.push(FField {
                name,
                flags: field_flags,
                type_ref,
                attrs,
            });
        }
        let n = r.u2()?;
        let mut methods = Vec::with_capacity(n as usize);
        for _ in 0..n {
            methods.push(FMethod::read(r, tables)?);
        }
        self.attrs = FAttrs::read(r, tables)?;
        self.fields = fields;
        self.methods = methods;
        self.hollow = false;
        Ok(())
    }

    pub fn is_mixin(&self) -> bool {
        self.flags & flags::MIXIN != 0
    }

    pub fn is_native(&self) -> bool {
        self.flags & flags::NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & flags::ABSTRACT != 0
    }

    pub fn is_final(&self) -> bool {
        self.flags & flags::FINAL != 0
    }

    pub fn method(
        &self,
        name: &str,
    ) -> Option<&FMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// 类型或任一方法为 native 时需要 peer
    pub fn has_native_peer(&self) -> bool {
        self.is_native() || self.methods.iter().any(FMethod::is_native)
    }
}
