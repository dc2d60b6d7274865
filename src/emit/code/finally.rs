//! finally 与异常表
//!
//! 两种策略：
//!
//! ```text
//! Subroutine                         Inline
//! ----------                         ------
//! F:  astore ex                      F:  astore ex(F)
//!     jsr +6                             <finally 体>
//!     aload ex                           aload ex(F)
//!     athrow                             athrow
//!     astore sp   <- JSR 目标
//!     <finally 体>                   JumpFinally F:
//!     ret sp                             <finally 体的一份拷贝>
//! ```
//!
//! Inline 下每份拷贝有独立的重定位作用域；异常表按作用域重映射，
//! 覆盖拷贝的 try 区间会被切开。

use std::collections::HashMap;

use super::CodeEmit;
use crate::emit::jump::{InlineCopy, JumpKind, MAIN_SCOPE, WIDE_FINALLY_PROLOGUE};
use crate::emit::{EmitError, EmitResult};
use crate::fcode::opcode::{read_instr, FInstr};
use crate::fcode::{FErrEntry, FOpcode, FReader, FTypeRef, StackType};
use crate::jvm::opcodes::*;
use crate::jvm::ExceptionEntry;
use crate::util::config::FinallyStrategy;

/// finally 拷贝的最大嵌套层数
const MAX_INLINE_DEPTH: usize = 16;

/// 同时匹配宿主异常的内置错误
const JAVA_EXCEPTIONS: &[(&str, &str)] = &[
    ("NullErr", "java/lang/NullPointerException"),
    ("CastErr", "java/lang/ClassCastException"),
    ("IndexErr", "java/lang/IndexOutOfBoundsException"),
    ("ArgErr", "java/lang/IllegalArgumentException"),
    ("IOErr", "java/io/IOException"),
    ("InterruptedErr", "java/lang/InterruptedException"),
    ("UnsupportedErr", "java/lang/UnsupportedOperationException"),
];

/// 内置错误对应的宿主异常类
pub fn java_exception(t: &FTypeRef) -> Option<&'static str> {
    if !t.is_sys() {
        return None;
    }
    JAVA_EXCEPTIONS
        .iter()
        .find(|(name, _)| *name == t.name)
        .map(|(_, java)| *java)
}

fn slot_op_len(slot: u16) -> u16 {
    if slot <= 0xFF {
        2
    } else {
        4
    }
}

/// 方法内的 finally 状态
#[derive(Debug, Default)]
pub(super) struct FinallyState {
    /// Subroutine：`(ex, sp)`，整个方法共用
    subroutine: Option<(u16, u16)>,
    /// Inline：FinallyStart 位置 -> 异常槽位
    inline: HashMap<usize, u16>,
    /// 正在发出的 FinallyStart（主流程中的 finally 体）
    open: Vec<usize>,
    extra: u16,
    depth: usize,
}

impl FinallyState {
    /// 额外分配的局部变量数
    pub(super) fn extra_locals(&self) -> u16 {
        self.extra
    }
}

impl<'c, 'a> CodeEmit<'c, 'a> {
    fn alloc_local(&mut self) -> u16 {
        let slot = self.frame.max_locals + self.finally.extra;
        self.finally.extra += 1;
        slot
    }

    /// 不使用紧凑形式的局部变量指令，槽位超过 255 时加 WIDE 前缀
    fn slot_op(
        &mut self,
        op: u8,
        slot: u16,
    ) {
        match u8::try_from(slot) {
            Ok(s) => self.code.op1(op, s),
            Err(_) => {
                self.code.op(WIDE);
                self.code.op2(op, slot);
            }
        }
    }

    fn strategy(&self) -> FinallyStrategy {
        self.ctx.config.finally_strategy
    }

    fn subroutine_slots(&mut self) -> (u16, u16) {
        if let Some(slots) = self.finally.subroutine {
            return slots;
        }
        let slots = (self.alloc_local(), self.alloc_local());
        if slot_op_len(slots.0) > 2 {
            self.jumps.set_finally_prologue(WIDE_FINALLY_PROLOGUE);
        }
        self.finally.subroutine = Some(slots);
        slots
    }

    pub(super) fn finally_start(
        &mut self,
        instr: &FInstr,
    ) -> EmitResult<()> {
        match self.strategy() {
            FinallyStrategy::Subroutine => {
                let (ex, sp) = self.subroutine_slots();
                self.slot_op(ASTORE, ex);
                // jsr 跳过自身、aload ex 与 athrow
                self.code.op(JSR);
                self.code.u2(3 + slot_op_len(ex) + 1);
                self.slot_op(ALOAD, ex);
                self.code.op(ATHROW);
                self.code.store_var(StackType::Obj, sp);
            }
            FinallyStrategy::Inline => {
                let slot = match self.finally.inline.get(&instr.pos) {
                    Some(&s) => s,
                    None => {
                        let s = self.alloc_local();
                        self.finally.inline.insert(instr.pos, s);
                        s
                    }
                };
                self.finally.open.push(instr.pos);
                self.code.store_var(StackType::Obj, slot);
            }
        }
        Ok(())
    }

    pub(super) fn finally_end(
        &mut self,
        instr: &FInstr,
    ) -> EmitResult<()> {
        match self.strategy() {
            FinallyStrategy::Subroutine => {
                let (_, sp) = self.subroutine_slots();
                self.slot_op(RET, sp);
            }
            FinallyStrategy::Inline => {
                let start = self
                    .finally
                    .open
                    .pop()
                    .ok_or_else(|| self.bad_operand(instr, "FinallyEnd without FinallyStart"))?;
                let slot = self
                    .finally
                    .inline
                    .get(&start)
                    .copied()
                    .ok_or_else(|| EmitError::Internal(format!("no slot for finally at {}", start)))?;
                self.code.load_var(StackType::Obj, slot);
                self.code.op(ATHROW);
            }
        }
        Ok(())
    }

    pub(super) fn jump_finally(
        &mut self,
        instr: &FInstr,
        target: u16,
    ) -> EmitResult<()> {
        match self.strategy() {
            FinallyStrategy::Subroutine => {
                let from = self.code.pos();
                self.code.op(JSR);
                self.push_jump(target, from, JumpKind::Finally);
                Ok(())
            }
            FinallyStrategy::Inline => self.inline_finally(instr, target),
        }
    }

    fn inline_finally(
        &mut self,
        instr: &FInstr,
        target: u16,
    ) -> EmitResult<()> {
        if self.finally.depth >= MAX_INLINE_DEPTH {
            return Err(EmitError::Internal(format!(
                "finally nesting deeper than {} in {}",
                MAX_INLINE_DEPTH, self.frame.name
            )));
        }
        let start = target as usize + 1;
        let end = self.finally_end_of(instr, target as usize)?;

        let scope = self.reloc.push_scope(self.scope);
        let java_start = self.code.pos();
        let parent = std::mem::replace(&mut self.scope, scope);
        self.finally.depth += 1;
        let result = self.emit_range(start, end);
        self.finally.depth -= 1;
        self.reloc.record(scope, end, self.code.pos());
        self.scope = parent;
        result?;

        self.reloc.close_scope(
            scope,
            InlineCopy {
                site: instr.pos as u16,
                finally_start: target,
                start: start as u16,
                end: end as u16,
                java_start,
                java_end: self.code.pos(),
            },
        );
        Ok(())
    }

    /// 与 `start` 处 FinallyStart 配对的 FinallyEnd 位置
    fn finally_end_of(
        &self,
        instr: &FInstr,
        start: usize,
    ) -> EmitResult<usize> {
        let mut r = FReader::new(self.buf, "code");
        r.seek(start);
        let first = read_instr(&mut r)?;
        if first.op != FOpcode::FinallyStart {
            return Err(self.bad_operand(
                instr,
                format!("target {} is {}, not FinallyStart", start, first.op),
            ));
        }
        let mut depth = 1usize;
        while !r.is_empty() {
            let next = read_instr(&mut r)?;
            match next.op {
                FOpcode::FinallyStart => depth += 1,
                FOpcode::FinallyEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(next.pos);
                    }
                }
                _ => {}
            }
        }
        Err(self.bad_operand(instr, format!("finally at {} never ends", start)))
    }

    /// 重映射 fcode 异常表
    pub(super) fn err_table(
        &mut self,
        entries: &[FErrEntry],
    ) -> EmitResult<()> {
        for scope in 0..self.reloc.scope_count() {
            let copy = self.reloc.copy(scope).copied();
            if scope != MAIN_SCOPE && copy.is_none() {
                continue;
            }
            for e in entries {
                if let Some(c) = copy {
                    let inside = c.start <= e.start
                        && e.end <= c.end
                        && c.start <= e.handler
                        && e.handler < c.end;
                    if !inside {
                        continue;
                    }
                }
                self.err_entry(scope, e)?;
            }
        }
        Ok(())
    }

    fn err_entry(
        &mut self,
        scope: usize,
        e: &FErrEntry,
    ) -> EmitResult<()> {
        let map = |pos: u16| {
            self.reloc
                .get(scope, pos as usize)
                .ok_or_else(|| EmitError::MissingReloc {
                    target: pos,
                    method: self.frame.name.clone(),
                })
        };
        let start = map(e.start)?;
        let end = map(e.end)?;
        let handler = map(e.handler)?;

        // 挖掉落在区间内、但 finally 体在区间外的拷贝
        let mut holes: Vec<(usize, usize)> = self
            .reloc
            .children(scope)
            .filter(|c| {
                let site_in = e.start <= c.site && c.site < e.end;
                let finally_in = e.start <= c.finally_start && c.finally_start < e.end;
                site_in && !finally_in
            })
            .map(|c| (c.java_start, c.java_end))
            .collect();
        holes.sort_unstable();

        let mut pieces = Vec::with_capacity(holes.len() + 1);
        let mut cursor = start;
        for (hs, he) in holes {
            if he <= cursor || hs >= end {
                continue;
            }
            if hs > cursor {
                pieces.push((cursor, hs));
            }
            cursor = cursor.max(he);
        }
        if cursor < end {
            pieces.push((cursor, end));
        }

        let t = self.ctx.resolver.type_ref(e.type_ref)?;
        let catch_type = if t.is_sys() && t.name == "Err" {
            0
        } else if t.is_ffi() {
            self.ctx.pool().class(t.jname())?
        } else {
            let val = format!("{}$Val", t.jname());
            self.ctx.pool().class(&val)?
        };
        let java = match java_exception(t) {
            Some(cls) => Some(self.ctx.pool().class(cls)?),
            None => None,
        };

        for (s, en) in pieces {
            for ty in std::iter::once(catch_type).chain(java) {
                self.code.exceptions.push(ExceptionEntry {
                    start_pc: s as u16,
                    end_pc: en as u16,
                    handler_pc: handler as u16,
                    catch_type: ty,
                });
            }
        }
        Ok(())
    }
}
