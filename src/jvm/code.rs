//! 方法体字节码缓冲区
//!
//! 管理字节码、异常表与行号表；偏移均相对方法代码起点。

use super::opcodes::*;
use super::{ClassError, ClassResult};
use crate::fcode::StackType;

/// 最大方法代码长度
pub const MAX_CODE_LEN: usize = 65535;

/// 异常表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// 0 表示捕获全部
    pub catch_type: u16,
}

/// 行号条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub start_pc: u16,
    pub line: u16,
}

/// 待绑定的前向跳转
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Label {
    /// 跳转指令自身位置
    pub from: usize,
    /// u2 操作数位置
    pub at: usize,
}

/// 字节码缓冲区
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    /// 字节码
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exceptions: Vec<ExceptionEntry>,
    pub lines: Vec<LineEntry>,
}

impl CodeBuffer {
    /// 创建新缓冲区
    pub fn new(
        max_stack: u16,
        max_locals: u16,
    ) -> Self {
        Self {
            code: Vec::new(),
            max_stack,
            max_locals,
            exceptions: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// 当前偏移
    #[inline]
    pub fn pos(&self) -> usize {
        self.code.len()
    }

    /// 无操作数指令
    #[inline]
    pub fn op(
        &mut self,
        op: u8,
    ) {
        self.code.push(op);
    }

    /// 带 u1 操作数
    pub fn op1(
        &mut self,
        op: u8,
        arg: u8,
    ) {
        self.code.push(op);
        self.code.push(arg);
    }

    /// 带 u2 操作数（常量池索引等）
    pub fn op2(
        &mut self,
        op: u8,
        arg: u16,
    ) {
        self.code.push(op);
        self.u2(arg);
    }

    pub fn u1(
        &mut self,
        v: u8,
    ) {
        self.code.push(v);
    }

    pub fn u2(
        &mut self,
        v: u16,
    ) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u4(
        &mut self,
        v: u32,
    ) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    pub fn patch_u2(
        &mut self,
        at: usize,
        v: u16,
    ) {
        self.code[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn patch_u4(
        &mut self,
        at: usize,
        v: u32,
    ) {
        self.code[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// 按 4 字节对齐补零
    pub fn pad4(&mut self) -> usize {
        let mut n = 0;
        while self.code.len() % 4 != 0 {
            self.code.push(0);
            n += 1;
        }
        n
    }

    /// 发出占位的前向跳转
    pub fn branch(
        &mut self,
        op: u8,
    ) -> Label {
        let from = self.pos();
        self.code.push(op);
        let at = self.pos();
        self.u2(0xFFFF);
        Label { from, at }
    }

    /// 把标签绑定到当前位置
    pub fn bind(
        &mut self,
        label: Label,
    ) -> ClassResult<()> {
        let target = self.pos();
        self.patch_branch(label, target)
    }

    /// 把标签绑定到指定位置
    pub fn patch_branch(
        &mut self,
        label: Label,
        target: usize,
    ) -> ClassResult<()> {
        let offset = target as i64 - label.from as i64;
        let v = i16::try_from(offset).map_err(|_| ClassError::BranchOutOfRange(offset))?;
        self.patch_u2(label.at, v as u16);
        Ok(())
    }

    /// 按栈类型装载局部变量
    pub fn load_var(
        &mut self,
        stack: StackType,
        slot: u16,
    ) {
        let (compact, general) = match stack {
            StackType::Long => (LLOAD_0, LLOAD),
            StackType::Float => (FLOAD_0, FLOAD),
            StackType::Double => (DLOAD_0, DLOAD),
            StackType::Obj => (ALOAD_0, ALOAD),
            _ => (ILOAD_0, ILOAD),
        };
        self.local_op(compact, general, slot);
    }

    /// 按栈类型存储局部变量
    pub fn store_var(
        &mut self,
        stack: StackType,
        slot: u16,
    ) {
        let (compact, general) = match stack {
            StackType::Long => (LSTORE_0, LSTORE),
            StackType::Float => (FSTORE_0, FSTORE),
            StackType::Double => (DSTORE_0, DSTORE),
            StackType::Obj => (ASTORE_0, ASTORE),
            _ => (ISTORE_0, ISTORE),
        };
        self.local_op(compact, general, slot);
    }

    fn local_op(
        &mut self,
        compact: u8,
        general: u8,
        slot: u16,
    ) {
        if slot <= 3 {
            self.op(compact + slot as u8);
        } else if slot <= 0xFF {
            self.op1(general, slot as u8);
        } else {
            self.op(WIDE);
            self.op2(general, slot);
        }
    }

    /// 按栈类型返回
    pub fn return_op(
        &mut self,
        stack: StackType,
    ) {
        let op = match stack {
            StackType::Void => RETURN,
            StackType::Long => LRETURN,
            StackType::Float => FRETURN,
            StackType::Double => DRETURN,
            StackType::Obj => ARETURN,
            _ => IRETURN,
        };
        self.op(op);
    }

    /// 检查长度上限
    pub fn check_len(&self) -> ClassResult<()> {
        if self.code.len() > MAX_CODE_LEN {
            return Err(ClassError::CodeTooLarge(self.code.len()));
        }
        Ok(())
    }

    /// 整数常量的最短编码
    pub fn push_int(
        &mut self,
        v: i16,
    ) {
        match v {
            -1..=5 => self.op((ICONST_0 as i16 + v) as u8),
            -128..=127 => self.op1(BIPUSH, v as i8 as u8),
            _ => self.op2(SIPUSH, v as u16),
        }
    }
}
