//! 内存中组装 pod 归档
//!
//! 测试与基准用它构造合成 pod；输出与磁盘格式完全一致，
//! 再经 `FPod::load` 读回。

use indexmap::IndexMap;
use std::sync::Arc;

use super::errors::FcodeResult;
use super::opcode::FOpcode;
use super::pod::FPod;
use super::reader::encode_modified_utf8;
use super::store::MemStore;
use super::types::{FErrEntry, FLine};
use super::{attr, entry, flags, FCODE_MAGIC, FCODE_VERSION, NULL_INDEX};

/// 大端写入器
#[derive(Debug, Clone, Default)]
pub struct FWriter {
    pub bytes: Vec<u8>,
}

impl FWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u1(
        &mut self,
        v: u8,
    ) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u2(
        &mut self,
        v: u16,
    ) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u4(
        &mut self,
        v: u32,
    ) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u8(
        &mut self,
        v: u64,
    ) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn utf(
        &mut self,
        s: &str,
    ) -> &mut Self {
        let enc = encode_modified_utf8(s);
        self.u2(enc.len() as u16);
        self.bytes.extend_from_slice(&enc);
        self
    }

    pub fn buf(
        &mut self,
        b: &[u8],
    ) -> &mut Self {
        self.u2(b.len() as u16);
        self.bytes.extend_from_slice(b);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// fcode 汇编器
#[derive(Debug, Clone, Default)]
pub struct Asm {
    code: Vec<u8>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前偏移
    pub fn here(&self) -> u16 {
        self.code.len() as u16
    }

    /// 无操作数指令
    pub fn op(
        &mut self,
        op: FOpcode,
    ) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    /// 单个 u2 操作数
    pub fn op1(
        &mut self,
        op: FOpcode,
        arg: u16,
    ) -> &mut Self {
        self.code.push(op as u8);
        self.code.extend_from_slice(&arg.to_be_bytes());
        self
    }

    /// 两个 u2 操作数
    pub fn op2(
        &mut self,
        op: FOpcode,
        a: u16,
        b: u16,
    ) -> &mut Self {
        self.op1(op, a);
        self.code.extend_from_slice(&b.to_be_bytes());
        self
    }

    /// 目标未知的跳转，返回操作数位置
    pub fn jump(
        &mut self,
        op: FOpcode,
    ) -> usize {
        self.code.push(op as u8);
        let at = self.code.len();
        self.code.extend_from_slice(&[0xFF, 0xFF]);
        at
    }

    /// switch，返回各目标操作数位置
    pub fn switch(
        &mut self,
        count: u16,
    ) -> Vec<usize> {
        self.code.push(FOpcode::Switch as u8);
        self.code.extend_from_slice(&count.to_be_bytes());
        let mut sites = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sites.push(self.code.len());
            self.code.extend_from_slice(&[0xFF, 0xFF]);
        }
        sites
    }

    /// 回填跳转目标
    pub fn patch(
        &mut self,
        at: usize,
        target: u16,
    ) -> &mut Self {
        self.code[at..at + 2].copy_from_slice(&target.to_be_bytes());
        self
    }

    /// 写入原始字节（用于构造非法输入）
    pub fn raw(
        &mut self,
        bytes: &[u8],
    ) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.code.clone()
    }
}

/// 变量定义
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub type_ref: u16,
    pub default: Option<Vec<u8>>,
}

impl VarDef {
    pub fn new(
        name: &str,
        type_ref: u16,
    ) -> Self {
        Self {
            name: name.to_string(),
            type_ref,
            default: None,
        }
    }

    /// 带默认值表达式
    pub fn with_default(
        mut self,
        expr: Vec<u8>,
    ) -> Self {
        self.default = Some(expr);
        self
    }
}

/// 方法定义
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub flags: u32,
    pub ret: u16,
    pub inherited_ret: u16,
    pub max_stack: u8,
    pub params: Vec<VarDef>,
    pub locals: Vec<VarDef>,
    pub code: Vec<u8>,
    pub err_table: Vec<FErrEntry>,
    pub lines: Vec<FLine>,
}

impl MethodDef {
    pub fn new(
        name: &str,
        flags: u32,
        ret: u16,
    ) -> Self {
        Self {
            name: name.to_string(),
            flags,
            ret,
            inherited_ret: ret,
            max_stack: 16,
            params: Vec::new(),
            locals: Vec::new(),
            code: Vec::new(),
            err_table: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn param(
        mut self,
        var: VarDef,
    ) -> Self {
        self.params.push(var);
        self
    }

    pub fn local(
        mut self,
        var: VarDef,
    ) -> Self {
        self.locals.push(var);
        self
    }

    pub fn code(
        mut self,
        code: Vec<u8>,
    ) -> Self {
        self.code = code;
        self
    }

    pub fn catch(
        mut self,
        entry: FErrEntry,
    ) -> Self {
        self.err_table.push(entry);
        self
    }

    pub fn line(
        mut self,
        pc: u16,
        line: u16,
    ) -> Self {
        self.lines.push(FLine { pc, line });
        self
    }
}

/// 字段定义
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub flags: u32,
    pub type_ref: u16,
}

/// 类型定义
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub self_ref: u16,
    pub base: Option<u16>,
    pub mixins: Vec<u16>,
    pub flags: u32,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub source_file: Option<String>,
}

impl TypeDef {
    pub fn new(
        self_ref: u16,
        base: Option<u16>,
        flags: u32,
    ) -> Self {
        Self {
            self_ref,
            base,
            mixins: Vec::new(),
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn mixin(
        mut self,
        mixin: u16,
    ) -> Self {
        self.mixins.push(mixin);
        self
    }

    pub fn field(
        mut self,
        name: &str,
        flags: u32,
        type_ref: u16,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            flags,
            type_ref,
        });
        self
    }

    pub fn method(
        mut self,
        method: MethodDef,
    ) -> Self {
        self.methods.push(method);
        self
    }

    pub fn source(
        mut self,
        file: &str,
    ) -> Self {
        self.source_file = Some(file.to_string());
        self
    }
}

/// Pod 组装器
#[derive(Debug, Clone)]
pub struct PodBuilder {
    name: String,
    version: String,
    depends: Vec<String>,
    names: IndexMap<String, u16>,
    type_refs: IndexMap<(u16, u16, String), u16>,
    field_refs: Vec<(u16, u16, u16)>,
    method_refs: Vec<(u16, u16, u16, Vec<u16>)>,
    types: Vec<TypeDef>,
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub decimals: Vec<String>,
    pub strs: Vec<String>,
    pub durations: Vec<i64>,
    pub uris: Vec<String>,
    magic: u32,
    fcode_version: u32,
}

impl PodBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0".to_string(),
            depends: vec!["sys 1.0".to_string()],
            names: IndexMap::new(),
            type_refs: IndexMap::new(),
            field_refs: Vec::new(),
            method_refs: Vec::new(),
            types: Vec::new(),
            ints: Vec::new(),
            floats: Vec::new(),
            decimals: Vec::new(),
            strs: Vec::new(),
            durations: Vec::new(),
            uris: Vec::new(),
            magic: FCODE_MAGIC,
            fcode_version: FCODE_VERSION,
        }
    }

    pub fn pod_name(&self) -> &str {
        &self.name
    }

    /// 覆盖 magic 与版本（构造非法 pod）
    pub fn header(
        mut self,
        magic: u32,
        version: u32,
    ) -> Self {
        self.magic = magic;
        self.fcode_version = version;
        self
    }

    /// 名字表索引
    pub fn name(
        &mut self,
        s: &str,
    ) -> u16 {
        if let Some(&i) = self.names.get(s) {
            return i;
        }
        let i = self.names.len() as u16;
        self.names.insert(s.to_string(), i);
        i
    }

    /// typeRef 索引
    pub fn type_ref(
        &mut self,
        pod: &str,
        name: &str,
        sig: &str,
    ) -> u16 {
        let key = (self.name(pod), self.name(name), sig.to_string());
        if let Some(&i) = self.type_refs.get(&key) {
            return i;
        }
        let i = self.type_refs.len() as u16;
        self.type_refs.insert(key, i);
        i
    }

    /// `sys::<name>` 的 typeRef
    pub fn sys(
        &mut self,
        name: &str,
    ) -> u16 {
        self.type_ref("sys", name, "")
    }

    pub fn field_ref(
        &mut self,
        parent: u16,
        name: &str,
        type_ref: u16,
    ) -> u16 {
        let n = self.name(name);
        self.field_refs.push((parent, n, type_ref));
        (self.field_refs.len() - 1) as u16
    }

    pub fn method_ref(
        &mut self,
        parent: u16,
        name: &str,
        ret: u16,
        params: &[u16],
    ) -> u16 {
        let n = self.name(name);
        self.method_refs.push((parent, n, ret, params.to_vec()));
        (self.method_refs.len() - 1) as u16
    }

    pub fn int(
        &mut self,
        v: i64,
    ) -> u16 {
        self.ints.push(v);
        (self.ints.len() - 1) as u16
    }

    pub fn float(
        &mut self,
        v: f64,
    ) -> u16 {
        self.floats.push(v);
        (self.floats.len() - 1) as u16
    }

    pub fn str(
        &mut self,
        v: &str,
    ) -> u16 {
        self.strs.push(v.to_string());
        (self.strs.len() - 1) as u16
    }

    pub fn add_type(
        &mut self,
        t: TypeDef,
    ) {
        self.types.push(t);
    }

    fn write_attrs(
        &mut self,
        w: &mut FWriter,
        attrs: &[(&str, Vec<u8>)],
    ) {
        w.u2(attrs.len() as u16);
        for (name, data) in attrs {
            let n = self.name(name);
            w.u2(n);
            w.buf(data);
        }
    }

    fn type_body(
        &mut self,
        t: &TypeDef,
    ) -> Vec<u8> {
        let mut w = FWriter::new();
        w.u2(t.fields.len() as u16);
        for f in &t.fields {
            let n = self.name(&f.name);
            w.u2(n).u4(f.flags).u2(f.type_ref);
            self.write_attrs(&mut w, &[]);
        }
        w.u2(t.methods.len() as u16);
        for m in &t.methods {
            let n = self.name(&m.name);
            w.u2(n).u4(m.flags).u2(m.ret).u2(m.inherited_ret);
            w.u1(m.max_stack)
                .u1(m.params.len() as u8)
                .u1(m.locals.len() as u8);
            for (i, v) in m.params.iter().chain(m.locals.iter()).enumerate() {
                let n = self.name(&v.name);
                let var_flags = if i < m.params.len() { flags::PARAM } else { 0 };
                w.u2(n).u2(v.type_ref).u1(var_flags);
                match &v.default {
                    Some(expr) => self.write_attrs(&mut w, &[(attr::PARAM_DEFAULT, expr.clone())]),
                    None => self.write_attrs(&mut w, &[]),
                }
            }
            w.buf(&m.code);

            let mut attrs: Vec<(&str, Vec<u8>)> = Vec::new();
            if !m.err_table.is_empty() {
                let mut e = FWriter::new();
                e.u2(m.err_table.len() as u16);
                for x in &m.err_table {
                    e.u2(x.start).u2(x.end).u2(x.handler).u2(x.type_ref);
                }
                attrs.push((attr::ERR_TABLE, e.finish()));
            }
            if !m.lines.is_empty() {
                let mut e = FWriter::new();
                e.u2(m.lines.len() as u16);
                for l in &m.lines {
                    e.u2(l.pc).u2(l.line);
                }
                attrs.push((attr::LINE_NUMBERS, e.finish()));
            }
            self.write_attrs(&mut w, &attrs);
        }
        let mut attrs: Vec<(&str, Vec<u8>)> = Vec::new();
        if let Some(file) = &t.source_file {
            let mut e = FWriter::new();
            e.utf(file);
            attrs.push((attr::SOURCE_FILE, e.finish()));
        }
        self.write_attrs(&mut w, &attrs);
        w.finish()
    }

    /// 输出归档条目
    pub fn build_store(mut self) -> MemStore {
        let mut store = MemStore::new();

        // 类型体先写，以便其中的名字进入名字表
        let types = std::mem::take(&mut self.types);
        for t in &types {
            let body = self.type_body(t);
            let (_, type_name, _) = self
                .type_refs
                .get_index(t.self_ref as usize)
                .map(|(k, _)| k.clone())
                .unwrap_or((0, 0, String::new()));
            let type_name = self
                .names
                .get_index(type_name as usize)
                .map(|(k, _)| k.clone())
                .unwrap_or_default();
            store.insert(entry::type_body(&type_name), body);
        }

        let mut w = FWriter::new();
        w.u4(self.magic).u4(self.fcode_version);
        w.utf(&self.name).utf(&self.version);
        w.u1(self.depends.len() as u8);
        for d in &self.depends {
            w.utf(d);
        }
        w.u2(0);
        store.insert(entry::POD_META, w.finish());

        let mut w = FWriter::new();
        w.u2(types.len() as u16);
        for t in &types {
            w.u2(t.self_ref).u2(t.base.unwrap_or(NULL_INDEX));
            w.u2(t.mixins.len() as u16);
            for m in &t.mixins {
                w.u2(*m);
            }
            w.u4(t.flags);
        }
        store.insert(entry::TYPE_META, w.finish());

        let mut w = FWriter::new();
        w.u2(self.type_refs.len() as u16);
        for (pod, name, sig) in self.type_refs.keys() {
            w.u2(*pod).u2(*name).utf(sig);
        }
        store.insert(entry::TYPE_REFS, w.finish());

        let mut w = FWriter::new();
        w.u2(self.field_refs.len() as u16);
        for (parent, name, t) in &self.field_refs {
            w.u2(*parent).u2(*name).u2(*t);
        }
        store.insert(entry::FIELD_REFS, w.finish());

        let mut w = FWriter::new();
        w.u2(self.method_refs.len() as u16);
        for (parent, name, ret, params) in &self.method_refs {
            w.u2(*parent).u2(*name).u2(*ret).u1(params.len() as u8);
            for p in params {
                w.u2(*p);
            }
        }
        store.insert(entry::METHOD_REFS, w.finish());

        let mut w = FWriter::new();
        w.u2(self.names.len() as u16);
        for n in self.names.keys() {
            w.utf(n);
        }
        store.insert(entry::NAMES, w.finish());

        let mut w = FWriter::new();
        w.u2(self.ints.len() as u16);
        for v in &self.ints {
            w.u8(*v as u64);
        }
        store.insert(entry::INTS, w.finish());

        let mut w = FWriter::new();
        w.u2(self.floats.len() as u16);
        for v in &self.floats {
            w.u8(v.to_bits());
        }
        store.insert(entry::FLOATS, w.finish());

        let mut w = FWriter::new();
        w.u2(self.durations.len() as u16);
        for v in &self.durations {
            w.u8(*v as u64);
        }
        store.insert(entry::DURATIONS, w.finish());

        for (name, table) in [
            (entry::DECIMALS, &self.decimals),
            (entry::STRS, &self.strs),
            (entry::URIS, &self.uris),
        ] {
            let mut w = FWriter::new();
            w.u2(table.len() as u16);
            for s in table {
                w.utf(s);
            }
            store.insert(name, w.finish());
        }

        store
    }

    /// 组装并加载为 `FPod`（类型体全部读入）
    pub fn build(self) -> FcodeResult<FPod> {
        let store = self.build_store();
        let mut pod = FPod::load(Arc::new(store))?;
        pod.read_all_bodies()?;
        Ok(pod)
    }
}
