//! Class 文件序列化

use std::io::{self, Write};

use super::code::CodeBuffer;
use super::constant_pool::ConstantPool;
use super::{ClassResult, CLASS_MAGIC};

/// 字段
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access: u16,
    pub name: String,
    pub desc: String,
    name_index: u16,
    desc_index: u16,
}

/// 方法；抽象方法没有 `code`
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub code: Option<CodeBuffer>,
    name_index: u16,
    desc_index: u16,
}

/// 一个待写出的 class
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub name: String,
    pub super_name: String,
    pub access: u16,
    pub major: u16,
    pub minor: u16,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub source_file: Option<String>,
    pub pool: ConstantPool,
    this_index: u16,
    super_index: u16,
    interface_indices: Vec<u16>,
}

impl ClassFile {
    pub fn new(
        name: &str,
        super_name: &str,
        access: u16,
        major: u16,
    ) -> ClassResult<Self> {
        let mut pool = ConstantPool::new();
        let this_index = pool.class(name)?;
        let super_index = pool.class(super_name)?;
        Ok(Self {
            name: name.to_string(),
            super_name: super_name.to_string(),
            access,
            major,
            minor: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            pool,
            this_index,
            super_index,
            interface_indices: Vec::new(),
        })
    }

    pub fn add_interface(
        &mut self,
        name: &str,
    ) -> ClassResult<()> {
        if self.interfaces.iter().any(|i| i == name) {
            return Ok(());
        }
        let idx = self.pool.class(name)?;
        self.interfaces.push(name.to_string());
        self.interface_indices.push(idx);
        Ok(())
    }

    pub fn add_field(
        &mut self,
        access: u16,
        name: &str,
        desc: &str,
    ) -> ClassResult<()> {
        let name_index = self.pool.utf8(name)?;
        let desc_index = self.pool.utf8(desc)?;
        self.fields.push(FieldInfo {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            name_index,
            desc_index,
        });
        Ok(())
    }

    pub fn add_method(
        &mut self,
        access: u16,
        name: &str,
        desc: &str,
        code: Option<CodeBuffer>,
    ) -> ClassResult<()> {
        if let Some(c) = &code {
            c.check_len()?;
        }
        let name_index = self.pool.utf8(name)?;
        let desc_index = self.pool.utf8(desc)?;
        self.methods.push(MethodInfo {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            code,
            name_index,
            desc_index,
        });
        Ok(())
    }

    pub fn has_field(
        &self,
        name: &str,
    ) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn has_method(
        &self,
        name: &str,
        desc: &str,
    ) -> bool {
        self.methods.iter().any(|m| m.name == name && m.desc == desc)
    }

    /// 方法列表中按名字查找
    pub fn method(
        &self,
        name: &str,
    ) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// 预先放入属性名并序列化
    pub fn finish(mut self) -> ClassResult<Vec<u8>> {
        let code_name = self.pool.utf8("Code")?;
        let lines_name = if self
            .methods
            .iter()
            .any(|m| m.code.as_ref().map(|c| !c.lines.is_empty()).unwrap_or(false))
        {
            self.pool.utf8("LineNumberTable")?
        } else {
            0
        };
        let source = match &self.source_file {
            Some(file) => {
                let file = file.clone();
                Some((self.pool.utf8("SourceFile")?, self.pool.utf8(&file)?))
            }
            None => None,
        };

        let mut out = Vec::with_capacity(512);
        self.write_to(&mut out, code_name, lines_name, source)
            .map_err(|e| super::ClassError::Malformed(e.to_string()))?;
        Ok(out)
    }

    fn write_to<W: Write>(
        &self,
        w: &mut W,
        code_name: u16,
        lines_name: u16,
        source: Option<(u16, u16)>,
    ) -> io::Result<()> {
        w.write_all(&CLASS_MAGIC.to_be_bytes())?;
        w.write_all(&self.minor.to_be_bytes())?;
        w.write_all(&self.major.to_be_bytes())?;
        self.pool.write_to(w)?;
        w.write_all(&self.access.to_be_bytes())?;
        w.write_all(&self.this_index.to_be_bytes())?;
        w.write_all(&self.super_index.to_be_bytes())?;

        w.write_all(&(self.interface_indices.len() as u16).to_be_bytes())?;
        for i in &self.interface_indices {
            w.write_all(&i.to_be_bytes())?;
        }

        w.write_all(&(self.fields.len() as u16).to_be_bytes())?;
        for f in &self.fields {
            w.write_all(&f.access.to_be_bytes())?;
            w.write_all(&f.name_index.to_be_bytes())?;
            w.write_all(&f.desc_index.to_be_bytes())?;
            w.write_all(&0u16.to_be_bytes())?;
        }

        w.write_all(&(self.methods.len() as u16).to_be_bytes())?;
        for m in &self.methods {
            w.write_all(&m.access.to_be_bytes())?;
            w.write_all(&m.name_index.to_be_bytes())?;
            w.write_all(&m.desc_index.to_be_bytes())?;
            match &m.code {
                Some(code) => {
                    w.write_all(&1u16.to_be_bytes())?;
                    write_code(w, code, code_name, lines_name)?;
                }
                None => w.write_all(&0u16.to_be_bytes())?,
            }
        }

        match source {
            Some((attr, file)) => {
                w.write_all(&1u16.to_be_bytes())?;
                w.write_all(&attr.to_be_bytes())?;
                w.write_all(&2u32.to_be_bytes())?;
                w.write_all(&file.to_be_bytes())?;
            }
            None => w.write_all(&0u16.to_be_bytes())?,
        }
        Ok(())
    }
}

fn write_code<W: Write>(
    w: &mut W,
    code: &CodeBuffer,
    code_name: u16,
    lines_name: u16,
) -> io::Result<()> {
    let has_lines = !code.lines.is_empty();
    let lines_len = if has_lines { 6 + 2 + 4 * code.lines.len() } else { 0 };
    let len = 2 + 2 + 4 + code.code.len() + 2 + 8 * code.exceptions.len() + 2 + lines_len;

    w.write_all(&code_name.to_be_bytes())?;
    w.write_all(&(len as u32).to_be_bytes())?;
    w.write_all(&code.max_stack.to_be_bytes())?;
    w.write_all(&code.max_locals.to_be_bytes())?;
    w.write_all(&(code.code.len() as u32).to_be_bytes())?;
    w.write_all(&code.code)?;

    w.write_all(&(code.exceptions.len() as u16).to_be_bytes())?;
    for e in &code.exceptions {
        w.write_all(&e.start_pc.to_be_bytes())?;
        w.write_all(&e.end_pc.to_be_bytes())?;
        w.write_all(&e.handler_pc.to_be_bytes())?;
        w.write_all(&e.catch_type.to_be_bytes())?;
    }

    if has_lines {
        w.write_all(&1u16.to_be_bytes())?;
        w.write_all(&lines_name.to_be_bytes())?;
        w.write_all(&((2 + 4 * code.lines.len()) as u32).to_be_bytes())?;
        w.write_all(&(code.lines.len() as u16).to_be_bytes())?;
        for l in &code.lines {
            w.write_all(&l.start_pc.to_be_bytes())?;
            w.write_all(&l.line.to_be_bytes())?;
        }
    } else {
        w.write_all(&0u16.to_be_bytes())?;
    }
    Ok(())
}
