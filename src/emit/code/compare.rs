//! 比较与比较跳转融合
//!
//! 比较后紧跟 JumpTrue/JumpFalse 时直接发出条件分支，并吞掉这条跳转。

use super::CodeEmit;
use crate::emit::EmitResult;
use crate::fcode::opcode::FInstr;
use crate::fcode::{FOpcode, FReader, FTypeRef, StackType};
use crate::jvm::opcodes::*;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn from_opcode(op: FOpcode) -> Option<Self> {
        match op {
            FOpcode::CompareEQ => Some(Cmp::Eq),
            FOpcode::CompareNE => Some(Cmp::Ne),
            FOpcode::CompareLT => Some(Cmp::Lt),
            FOpcode::CompareLE => Some(Cmp::Le),
            FOpcode::CompareGT => Some(Cmp::Gt),
            FOpcode::CompareGE => Some(Cmp::Ge),
            _ => None,
        }
    }

    fn helper(self) -> &'static str {
        match self {
            Cmp::Eq => "compareEQ",
            Cmp::Ne => "compareNE",
            Cmp::Lt => "compareLT",
            Cmp::Le => "compareLE",
            Cmp::Gt => "compareGT",
            Cmp::Ge => "compareGE",
        }
    }

    /// LCMP/DCMPx 之后的单操作数分支
    fn if_zero(self) -> u8 {
        match self {
            Cmp::Eq => IFEQ,
            Cmp::Ne => IFNE,
            Cmp::Lt => IFLT,
            Cmp::Le => IFLE,
            Cmp::Gt => IFGT,
            Cmp::Ge => IFGE,
        }
    }
}

/// helper 参数描述符：原生类型用自身，其余按 Object 传
fn helper_arg(t: &FTypeRef) -> &str {
    match t.stack {
        StackType::Bool => "Z",
        StackType::Long => "J",
        StackType::Double => "D",
        _ => "Ljava/lang/Object;",
    }
}

impl<'c, 'a> CodeEmit<'c, 'a> {
    pub(super) fn compare(
        &mut self,
        instr: &FInstr,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<()> {
        match instr.op {
            FOpcode::CompareSame | FOpcode::CompareNotSame => {
                let same = instr.op == FOpcode::CompareSame;
                self.compare_same(same, r, end)
            }
            FOpcode::CompareNull | FOpcode::CompareNotNull => {
                let null = instr.op == FOpcode::CompareNull;
                self.compare_null(null, instr.arg(), r, end)
            }
            FOpcode::Compare => {
                let (lhs, rhs) = self.type_pair(instr)?;
                let sig = format!(
                    "fanx/util/OpUtil.compare({}{})J",
                    helper_arg(lhs),
                    helper_arg(rhs)
                );
                self.invoke(INVOKESTATIC, &sig)
            }
            op => {
                let cmp = Cmp::from_opcode(op)
                    .ok_or_else(|| self.bad_operand(instr, "not a comparison"))?;
                let (lhs, rhs) = self.type_pair(instr)?;
                self.compare_op(cmp, lhs, rhs, r, end)
            }
        }
    }

    fn type_pair(
        &self,
        instr: &FInstr,
    ) -> EmitResult<(&'a FTypeRef, &'a FTypeRef)> {
        let lhs = self.ctx.resolver.type_ref(instr.arg())?;
        let rhs = match instr.args.get(1) {
            Some(&i) => self.ctx.resolver.type_ref(i)?,
            None => return Err(self.bad_operand(instr, "missing rhs type")),
        };
        Ok((lhs, rhs))
    }

    fn compare_op(
        &mut self,
        cmp: Cmp,
        lhs: &FTypeRef,
        rhs: &FTypeRef,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<()> {
        let direct = lhs.stack == rhs.stack
            && match lhs.stack {
                StackType::Long | StackType::Double => true,
                StackType::Bool => matches!(cmp, Cmp::Eq | Cmp::Ne),
                _ => false,
            };

        if direct {
            if let Some((jump_true, target)) = self.peek_jump(r, end)? {
                let op = match lhs.stack {
                    StackType::Long => {
                        self.code.op(LCMP);
                        cmp.if_zero()
                    }
                    StackType::Double => {
                        self.code.op(if matches!(cmp, Cmp::Lt | Cmp::Le) {
                            DCMPG
                        } else {
                            DCMPL
                        });
                        cmp.if_zero()
                    }
                    _ => {
                        if cmp == Cmp::Eq {
                            IF_ICMPEQ
                        } else {
                            IF_ICMPNE
                        }
                    }
                };
                self.fused_branch(op, jump_true, target);
                return Ok(());
            }
        }

        let sig = format!(
            "fanx/util/OpUtil.{}({}{})Z",
            cmp.helper(),
            helper_arg(lhs),
            helper_arg(rhs)
        );
        self.invoke(INVOKESTATIC, &sig)?;
        if let Some((jump_true, target)) = self.peek_jump(r, end)? {
            self.fused_branch(IFNE, jump_true, target);
        }
        Ok(())
    }

    fn compare_same(
        &mut self,
        same: bool,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<()> {
        if let Some((jump_true, target)) = self.peek_jump(r, end)? {
            self.fused_branch(if same { IF_ACMPEQ } else { IF_ACMPNE }, jump_true, target);
            return Ok(());
        }
        let name = if same { "compareSame" } else { "compareNotSame" };
        let sig = format!(
            "fanx/util/OpUtil.{}(Ljava/lang/Object;Ljava/lang/Object;)Z",
            name
        );
        self.invoke(INVOKESTATIC, &sig)
    }

    fn compare_null(
        &mut self,
        null: bool,
        type_index: u16,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<()> {
        let t = self.ctx.resolver.type_ref(type_index)?;
        if t.is_primitive() {
            // 原生值永不为 null
            self.code.op(if t.is_wide() { POP2 } else { POP });
            self.code.op(if null { ICONST_0 } else { ICONST_1 });
            return Ok(());
        }
        if let Some((jump_true, target)) = self.peek_jump(r, end)? {
            self.fused_branch(if null { IFNULL } else { IFNONNULL }, jump_true, target);
            return Ok(());
        }
        let name = if null { "compareNull" } else { "compareNotNull" };
        let sig = format!("fanx/util/OpUtil.{}(Ljava/lang/Object;)Z", name);
        self.invoke(INVOKESTATIC, &sig)
    }

    /// 下一条是 JumpTrue/JumpFalse 时消费它，返回 `(是否 JumpTrue, 目标)`
    fn peek_jump(
        &mut self,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<Option<(bool, u16)>> {
        let pos = r.pos();
        if pos >= end {
            return Ok(None);
        }
        let op = self.buf[pos];
        let jump_true = if op == FOpcode::JumpTrue as u8 {
            true
        } else if op == FOpcode::JumpFalse as u8 {
            false
        } else {
            return Ok(None);
        };
        self.reloc.record(self.scope, pos, self.code.pos());
        let next = self.read(r)?;
        Ok(Some((jump_true, next.arg())))
    }

    /// `op` 是"条件成立"时的分支；JumpFalse 取反
    fn fused_branch(
        &mut self,
        op: u8,
        jump_true: bool,
        target: u16,
    ) {
        let op = if jump_true { op } else { negate_branch(op) };
        self.branch(op, target);
    }
}
