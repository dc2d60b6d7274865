//! 常量池
//!
//! 相同常量只存一份；long/double 占两个索引。

use indexmap::IndexMap;
use std::io::{self, Write};

use super::{ClassError, ClassResult};
use crate::fcode::reader::encode_modified_utf8;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;

/// 常量池条目
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    /// f32 位模式
    Float(u32),
    Long(i64),
    /// f64 位模式
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
}

impl Constant {
    fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// 常量池
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: IndexMap<Constant, u16>,
    next: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            next: 1,
        }
    }

    /// 写出时的 constant_pool_count
    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 加入常量，已存在时返回原索引
    pub fn add(
        &mut self,
        c: Constant,
    ) -> ClassResult<u16> {
        if let Some(&i) = self.entries.get(&c) {
            return Ok(i);
        }
        let i = self.next;
        self.next = self
            .next
            .checked_add(c.width())
            .ok_or(ClassError::PoolOverflow)?;
        self.entries.insert(c, i);
        Ok(i)
    }

    pub fn utf8(
        &mut self,
        s: &str,
    ) -> ClassResult<u16> {
        self.add(Constant::Utf8(s.to_string()))
    }

    pub fn integer(
        &mut self,
        v: i32,
    ) -> ClassResult<u16> {
        self.add(Constant::Integer(v))
    }

    pub fn long(
        &mut self,
        v: i64,
    ) -> ClassResult<u16> {
        self.add(Constant::Long(v))
    }

    pub fn double(
        &mut self,
        v: f64,
    ) -> ClassResult<u16> {
        self.add(Constant::Double(v.to_bits()))
    }

    pub fn class(
        &mut self,
        name: &str,
    ) -> ClassResult<u16> {
        let n = self.utf8(name)?;
        self.add(Constant::Class(n))
    }

    pub fn string(
        &mut self,
        s: &str,
    ) -> ClassResult<u16> {
        let n = self.utf8(s)?;
        self.add(Constant::String(n))
    }

    pub fn name_and_type(
        &mut self,
        name: &str,
        desc: &str,
    ) -> ClassResult<u16> {
        let n = self.utf8(name)?;
        let d = self.utf8(desc)?;
        self.add(Constant::NameAndType(n, d))
    }

    /// `fan/acme/Foo.count:J`
    pub fn field(
        &mut self,
        sig: &str,
    ) -> ClassResult<u16> {
        let (owner, name, desc) = split_field_sig(sig)?;
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, desc)?;
        self.add(Constant::Fieldref(c, nt))
    }

    /// `fan/acme/Foo.bar(JJ)J`
    pub fn method(
        &mut self,
        sig: &str,
    ) -> ClassResult<u16> {
        let (owner, name, desc) = split_method_sig(sig)?;
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, desc)?;
        self.add(Constant::Methodref(c, nt))
    }

    pub fn interface_method(
        &mut self,
        sig: &str,
    ) -> ClassResult<u16> {
        let (owner, name, desc) = split_method_sig(sig)?;
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, desc)?;
        self.add(Constant::InterfaceMethodref(c, nt))
    }

    /// 按索引取常量
    pub fn get(
        &self,
        index: u16,
    ) -> Option<&Constant> {
        self.entries
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(c, _)| c)
    }

    /// 是否已有某个类引用
    pub fn has_class(
        &self,
        name: &str,
    ) -> bool {
        match self.entries.get(&Constant::Utf8(name.to_string())) {
            Some(&n) => self.entries.contains_key(&Constant::Class(n)),
            None => false,
        }
    }

    pub fn write_to<W: Write>(
        &self,
        w: &mut W,
    ) -> io::Result<()> {
        w.write_all(&self.next.to_be_bytes())?;
        for c in self.entries.keys() {
            match c {
                Constant::Utf8(s) => {
                    let enc = encode_modified_utf8(s);
                    w.write_all(&[TAG_UTF8])?;
                    w.write_all(&(enc.len() as u16).to_be_bytes())?;
                    w.write_all(&enc)?;
                }
                Constant::Integer(v) => {
                    w.write_all(&[TAG_INTEGER])?;
                    w.write_all(&v.to_be_bytes())?;
                }
                Constant::Float(bits) => {
                    w.write_all(&[TAG_FLOAT])?;
                    w.write_all(&bits.to_be_bytes())?;
                }
                Constant::Long(v) => {
                    w.write_all(&[TAG_LONG])?;
                    w.write_all(&v.to_be_bytes())?;
                }
                Constant::Double(bits) => {
                    w.write_all(&[TAG_DOUBLE])?;
                    w.write_all(&bits.to_be_bytes())?;
                }
                Constant::Class(n) => {
                    w.write_all(&[TAG_CLASS])?;
                    w.write_all(&n.to_be_bytes())?;
                }
                Constant::String(n) => {
                    w.write_all(&[TAG_STRING])?;
                    w.write_all(&n.to_be_bytes())?;
                }
                Constant::Fieldref(a, b)
                | Constant::Methodref(a, b)
                | Constant::InterfaceMethodref(a, b)
                | Constant::NameAndType(a, b) => {
                    let tag = match c {
                        Constant::Fieldref(..) => TAG_FIELDREF,
                        Constant::Methodref(..) => TAG_METHODREF,
                        Constant::InterfaceMethodref(..) => TAG_INTERFACE_METHODREF,
                        _ => TAG_NAME_AND_TYPE,
                    };
                    w.write_all(&[tag])?;
                    w.write_all(&a.to_be_bytes())?;
                    w.write_all(&b.to_be_bytes())?;
                }
            }
        }
        Ok(())
    }
}

/// `owner.name:desc`
pub fn split_field_sig(sig: &str) -> ClassResult<(&str, &str, &str)> {
    let bad = || ClassError::BadSignature(sig.to_string());
    let (left, desc) = sig.split_once(':').ok_or_else(bad)?;
    let (owner, name) = left.rsplit_once('.').ok_or_else(bad)?;
    if owner.is_empty() || name.is_empty() || desc.is_empty() {
        return Err(bad());
    }
    Ok((owner, name, desc))
}

/// `owner.name(args)ret`
pub fn split_method_sig(sig: &str) -> ClassResult<(&str, &str, &str)> {
    let bad = || ClassError::BadSignature(sig.to_string());
    let paren = sig.find('(').ok_or_else(bad)?;
    let (left, desc) = sig.split_at(paren);
    let (owner, name) = left.rsplit_once('.').ok_or_else(bad)?;
    if owner.is_empty() || name.is_empty() {
        return Err(bad());
    }
    Ok((owner, name, desc))
}
