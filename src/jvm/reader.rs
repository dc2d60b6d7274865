//! Class 文件解析
//!
//! 读回后端写出的 class，用于 `fanjvm inspect` 与测试断言。

use super::opcodes::{self, instr_len};
use super::{ClassError, ClassResult, CLASS_MAGIC};
use crate::fcode::reader::{decode_modified_utf8, FReader};
use crate::fcode::FcodeError;

impl From<FcodeError> for ClassError {
    fn from(e: FcodeError) -> Self {
        ClassError::Malformed(e.to_string())
    }
}

/// 解析出的常量
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
}

/// 异常表条目，`catch_type` 已解析为类名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedException {
    pub start: u16,
    pub end: u16,
    pub handler: u16,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exceptions: Vec<ParsedException>,
    pub lines: Vec<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMethod {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub code: Option<ParsedCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClass {
    pub major: u16,
    pub access: u16,
    pub name: String,
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub fields: Vec<(u16, String, String)>,
    pub methods: Vec<ParsedMethod>,
    pub source_file: Option<String>,
    pub pool: Vec<Option<PoolEntry>>,
}

impl ParsedClass {
    pub fn parse(bytes: &[u8]) -> ClassResult<Self> {
        let mut r = FReader::new(bytes, "class");
        let magic = r.u4()?;
        if magic != CLASS_MAGIC {
            return Err(ClassError::Malformed(format!("bad magic 0x{:08X}", magic)));
        }
        let _minor = r.u2()?;
        let major = r.u2()?;

        let count = r.u2()? as usize;
        let mut pool: Vec<Option<PoolEntry>> = vec![None; count.max(1)];
        let mut i = 1;
        while i < count {
            let tag = r.u1()?;
            let entry = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    let mut raw = Vec::with_capacity(len);
                    for _ in 0..len {
                        raw.push(r.u1()?);
                    }
                    PoolEntry::Utf8(decode_modified_utf8(&raw)?)
                }
                3 => PoolEntry::Integer(r.u4()? as i32),
                4 => PoolEntry::Float(f32::from_bits(r.u4()?)),
                5 => PoolEntry::Long(r.i8()?),
                6 => PoolEntry::Double(r.f8()?),
                7 => PoolEntry::Class(r.u2()?),
                8 => PoolEntry::String(r.u2()?),
                9 => PoolEntry::Fieldref(r.u2()?, r.u2()?),
                10 => PoolEntry::Methodref(r.u2()?, r.u2()?),
                11 => PoolEntry::InterfaceMethodref(r.u2()?, r.u2()?),
                12 => PoolEntry::NameAndType(r.u2()?, r.u2()?),
                other => return Err(ClassError::Malformed(format!("pool tag {}", other))),
            };
            let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            pool[i] = Some(entry);
            i += if wide { 2 } else { 1 };
        }

        let mut class = ParsedClass {
            major,
            access: 0,
            name: String::new(),
            super_name: String::new(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            pool,
        };

        class.access = r.u2()?;
        class.name = class.class_name(r.u2()?)?;
        class.super_name = class.class_name(r.u2()?)?;
        for _ in 0..r.u2()? {
            let name = class.class_name(r.u2()?)?;
            class.interfaces.push(name);
        }

        for _ in 0..r.u2()? {
            let access = r.u2()?;
            let name = class.utf8(r.u2()?)?;
            let desc = class.utf8(r.u2()?)?;
            for _ in 0..r.u2()? {
                r.u2()?;
                let len = r.u4()? as usize;
                r.skip(len)?;
            }
            class.fields.push((access, name, desc));
        }

        for _ in 0..r.u2()? {
            let access = r.u2()?;
            let name = class.utf8(r.u2()?)?;
            let desc = class.utf8(r.u2()?)?;
            let mut code = None;
            for _ in 0..r.u2()? {
                let attr = class.utf8(r.u2()?)?;
                let len = r.u4()? as usize;
                if attr == "Code" {
                    code = Some(class.parse_code(&mut r)?);
                } else {
                    r.skip(len)?;
                }
            }
            class.methods.push(ParsedMethod {
                access,
                name,
                desc,
                code,
            });
        }

        for _ in 0..r.u2()? {
            let attr = class.utf8(r.u2()?)?;
            let len = r.u4()? as usize;
            if attr == "SourceFile" {
                class.source_file = Some(class.utf8(r.u2()?)?);
            } else {
                r.skip(len)?;
            }
        }

        Ok(class)
    }

    fn parse_code(
        &self,
        r: &mut FReader<'_>,
    ) -> ClassResult<ParsedCode> {
        let max_stack = r.u2()?;
        let max_locals = r.u2()?;
        let len = r.u4()? as usize;
        let mut code = Vec::with_capacity(len);
        for _ in 0..len {
            code.push(r.u1()?);
        }
        let mut exceptions = Vec::new();
        for _ in 0..r.u2()? {
            let start = r.u2()?;
            let end = r.u2()?;
            let handler = r.u2()?;
            let catch_type = match r.u2()? {
                0 => None,
                idx => Some(self.class_name(idx)?),
            };
            exceptions.push(ParsedException {
                start,
                end,
                handler,
                catch_type,
            });
        }
        let mut lines = Vec::new();
        for _ in 0..r.u2()? {
            let attr = self.utf8(r.u2()?)?;
            let alen = r.u4()? as usize;
            if attr == "LineNumberTable" {
                for _ in 0..r.u2()? {
                    lines.push((r.u2()?, r.u2()?));
                }
            } else {
                r.skip(alen)?;
            }
        }
        Ok(ParsedCode {
            max_stack,
            max_locals,
            code,
            exceptions,
            lines,
        })
    }

    fn entry(
        &self,
        index: u16,
    ) -> ClassResult<&PoolEntry> {
        self.pool
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| ClassError::Malformed(format!("pool index {}", index)))
    }

    pub fn utf8(
        &self,
        index: u16,
    ) -> ClassResult<String> {
        match self.entry(index)? {
            PoolEntry::Utf8(s) => Ok(s.clone()),
            other => Err(ClassError::Malformed(format!("expected utf8, got {:?}", other))),
        }
    }

    pub fn class_name(
        &self,
        index: u16,
    ) -> ClassResult<String> {
        match self.entry(index)? {
            PoolEntry::Class(n) => self.utf8(*n),
            other => Err(ClassError::Malformed(format!("expected class, got {:?}", other))),
        }
    }

    /// 以 `owner.name:desc` / `owner.name(args)ret` 形式描述成员引用，
    /// 字符串与类常量返回其文本
    pub fn describe(
        &self,
        index: u16,
    ) -> ClassResult<String> {
        match self.entry(index)? {
            PoolEntry::Fieldref(c, nt) => {
                let (name, desc) = self.name_and_type(*nt)?;
                Ok(format!("{}.{}:{}", self.class_name(*c)?, name, desc))
            }
            PoolEntry::Methodref(c, nt) | PoolEntry::InterfaceMethodref(c, nt) => {
                let (name, desc) = self.name_and_type(*nt)?;
                Ok(format!("{}.{}{}", self.class_name(*c)?, name, desc))
            }
            PoolEntry::Class(n) => self.utf8(*n),
            PoolEntry::String(n) => self.utf8(*n),
            PoolEntry::Integer(v) => Ok(v.to_string()),
            PoolEntry::Long(v) => Ok(v.to_string()),
            PoolEntry::Float(v) => Ok(v.to_string()),
            PoolEntry::Double(v) => Ok(v.to_string()),
            other => Err(ClassError::Malformed(format!("cannot describe {:?}", other))),
        }
    }

    fn name_and_type(
        &self,
        index: u16,
    ) -> ClassResult<(String, String)> {
        match self.entry(index)? {
            PoolEntry::NameAndType(n, d) => Ok((self.utf8(*n)?, self.utf8(*d)?)),
            other => Err(ClassError::Malformed(format!("expected name-and-type, got {:?}", other))),
        }
    }

    pub fn method(
        &self,
        name: &str,
        desc: &str,
    ) -> Option<&ParsedMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.desc == desc)
    }

    pub fn methods_named(
        &self,
        name: &str,
    ) -> Vec<&ParsedMethod> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }

    /// 反汇编一段代码，每条指令一行
    pub fn disassemble(
        &self,
        code: &[u8],
    ) -> Vec<String> {
        let mut out = Vec::new();
        let mut at = 0;
        while at < code.len() {
            let op = code[at];
            let len = instr_len(code, at).max(1);
            let mut line = format!("{:4}: {}", at, opcodes::mnemonic(op));
            match op {
                opcodes::LDC => {
                    let idx = code.get(at + 1).copied().unwrap_or(0) as u16;
                    line.push(' ');
                    line.push_str(&self.describe(idx).unwrap_or_default());
                }
                opcodes::LDC_W
                | opcodes::LDC2_W
                | opcodes::GETSTATIC..=opcodes::INVOKEINTERFACE
                | opcodes::NEW
                | opcodes::ANEWARRAY
                | opcodes::CHECKCAST
                | opcodes::INSTANCEOF => {
                    let idx = read_u2(code, at + 1);
                    line.push(' ');
                    line.push_str(&self.describe(idx).unwrap_or_default());
                }
                opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
                    let off = read_u2(code, at + 1) as i16 as i64;
                    line.push_str(&format!(" {}", at as i64 + off));
                }
                _ => {
                    for b in code.iter().take((at + len).min(code.len())).skip(at + 1) {
                        line.push_str(&format!(" {}", b));
                    }
                }
            }
            out.push(line);
            at += len;
        }
        out
    }
}

/// 读取 u2（越界时为 0）
pub fn read_u2(
    code: &[u8],
    at: usize,
) -> u16 {
    code.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .unwrap_or(0)
}
