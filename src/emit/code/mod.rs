//! 方法体发出器
//!
//! 单向扫描 fcode：每条指令先记录重定位，再解码操作数并发出 JVM 指令。
//! 全部指令发出后回填跳转、重映射异常表和行号表。
//!
//! 按职责拆分：
//! - `cast`：类型字面量、Is/As/Cast/Coerce
//! - `compare`：比较与比较跳转融合
//! - `finally`：finally 的两种发出策略与异常表
//! - `switch`：tableswitch

mod cast;
mod compare;
mod finally;
mod switch;

use tracing::debug;

use super::context::ClassCtx;
use super::intrinsic::Intrinsic;
use super::jump::{JumpKind, JumpNode, JumpTable, Relocation, MAIN_SCOPE};
use super::resolver::{CallKind, JCall, Resolver};
use super::{EmitError, EmitResult};
use crate::fcode::opcode::{read_instr, FInstr};
use crate::fcode::{FAttrs, FMethod, FOpcode, FReader, FcodeError, StackType};
use crate::jvm::opcodes::*;
use crate::jvm::CodeBuffer;

use self::finally::FinallyState;

/// 局部变量槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    pub slot: u16,
    pub stack: StackType,
}

/// 实例方法寄存器 0 的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfMode {
    /// self 在槽位 0（实例方法、构造体、mixin 体）
    Bound,
    /// 没有 self（构造工厂），参数从槽位 0 开始
    Unbound,
}

/// 寄存器到 JVM 局部变量的映射
#[derive(Debug, Clone)]
pub struct Frame {
    /// `Type.method`
    pub name: String,
    regs: Vec<Option<Local>>,
    has_self_reg: bool,
    param_count: usize,
    pub max_locals: u16,
    pub max_stack: u16,
    /// ReturnObj 使用的返回栈类型
    pub ret: StackType,
}

impl Frame {
    pub fn for_method(
        resolver: &Resolver<'_>,
        owner: &str,
        method: &FMethod,
        mode: SelfMode,
    ) -> EmitResult<Self> {
        let has_self_reg = !method.is_static();
        let mut regs = Vec::with_capacity(method.vars.len() + 1);
        let mut slot = 0u16;
        if has_self_reg {
            match mode {
                SelfMode::Bound => {
                    regs.push(Some(Local {
                        slot: 0,
                        stack: StackType::Obj,
                    }));
                    slot = 1;
                }
                SelfMode::Unbound => regs.push(None),
            }
        }
        for v in &method.vars {
            let stack = resolver.type_ref(v.type_ref)?.stack;
            regs.push(Some(Local { slot, stack }));
            slot += stack.slots().max(1);
        }
        let ret = resolver.type_ref(method.inherited_ret)?.stack;
        Ok(Self {
            name: format!("{}.{}", owner, method.name),
            regs,
            has_self_reg,
            param_count: method.params().len(),
            max_locals: slot,
            max_stack: method.max_stack as u16 * 2 + 4,
            ret,
        })
    }

    pub fn with_ret(
        mut self,
        ret: StackType,
    ) -> Self {
        self.ret = ret;
        self
    }

    /// 寄存器对应的局部变量
    pub fn local(
        &self,
        reg: u16,
    ) -> Option<Local> {
        self.regs.get(reg as usize).copied().flatten()
    }

    /// 槽位 0 的 self
    pub fn self_local(&self) -> Option<Local> {
        if self.has_self_reg {
            self.local(0)
        } else {
            None
        }
    }

    /// 前 `n` 个参数
    pub fn params(
        &self,
        n: usize,
    ) -> impl Iterator<Item = Local> + '_ {
        let base = self.has_self_reg as usize;
        let n = n.min(self.param_count);
        self.regs[base..base + n].iter().filter_map(|l| *l)
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// 前 `n` 个参数占用的槽位数
    pub fn param_slots(
        &self,
        n: usize,
    ) -> u16 {
        self.params(n).map(|l| l.stack.slots()).sum()
    }
}

/// 发出结果
#[derive(Debug, Clone)]
pub struct MethodCode {
    pub code: CodeBuffer,
    /// 主作用域的 fcode -> 字节码偏移
    pub reloc: Vec<Option<usize>>,
    pub jumps: Vec<JumpNode>,
}

/// 单个方法体（或默认参数片段）的发出器
pub struct CodeEmit<'c, 'a> {
    ctx: &'c mut ClassCtx<'a>,
    frame: &'c Frame,
    buf: &'c [u8],
    code: CodeBuffer,
    reloc: Relocation,
    jumps: JumpTable,
    scope: usize,
    finally: FinallyState,
}

impl<'c, 'a> CodeEmit<'c, 'a> {
    /// `code` 可以已有内容：新指令接在末尾，偏移仍相对方法起点
    pub fn new(
        ctx: &'c mut ClassCtx<'a>,
        frame: &'c Frame,
        buf: &'c [u8],
        code: CodeBuffer,
    ) -> Self {
        Self {
            ctx,
            frame,
            buf,
            code,
            reloc: Relocation::new(buf.len()),
            jumps: JumpTable::new(),
            scope: MAIN_SCOPE,
            finally: FinallyState::default(),
        }
    }

    /// 发出完整方法体，附带异常表与行号表
    pub fn emit_method(
        mut self,
        attrs: &FAttrs,
    ) -> EmitResult<MethodCode> {
        self.run()?;
        let errs = attrs.err_table()?;
        self.err_table(&errs)?;
        if self.ctx.config.line_numbers {
            self.line_table(attrs)?;
        }
        Ok(self.finish())
    }

    /// 发出不带属性的片段（默认参数表达式）
    pub fn emit_fragment(mut self) -> EmitResult<MethodCode> {
        self.run()?;
        Ok(self.finish())
    }

    fn run(&mut self) -> EmitResult<()> {
        let len = self.buf.len();
        self.emit_range(0, len)?;
        self.reloc.record(MAIN_SCOPE, len, self.code.pos());
        self.jumps
            .backpatch(&mut self.code, &self.reloc, &self.frame.name)?;
        debug!(
            "emitted {}: {} fcode bytes -> {} bytes, {} jumps",
            self.frame.name,
            len,
            self.code.pos(),
            self.jumps.len()
        );
        Ok(())
    }

    fn finish(mut self) -> MethodCode {
        self.code.max_locals = self
            .code
            .max_locals
            .max(self.frame.max_locals + self.finally.extra_locals());
        self.code.max_stack = self.code.max_stack.max(self.frame.max_stack);
        MethodCode {
            code: self.code,
            reloc: self.reloc.main_map().to_vec(),
            jumps: self.jumps.nodes().to_vec(),
        }
    }

    /// 发出 `[start, end)` 内的指令
    fn emit_range(
        &mut self,
        start: usize,
        end: usize,
    ) -> EmitResult<()> {
        let buf = self.buf;
        let mut r = FReader::new(buf, "code");
        r.seek(start);
        while r.pos() < end {
            self.reloc.record(self.scope, r.pos(), self.code.pos());
            let instr = self.read(&mut r)?;
            self.dispatch(&instr, &mut r, end)?;
        }
        Ok(())
    }

    fn read(
        &self,
        r: &mut FReader<'_>,
    ) -> EmitResult<FInstr> {
        read_instr(r).map_err(|e| match e {
            FcodeError::UnknownOpcode(op) => EmitError::UnknownOpcode {
                op,
                method: self.frame.name.clone(),
            },
            other => EmitError::BadOperand {
                op: "?".to_string(),
                method: self.frame.name.clone(),
                detail: other.to_string(),
            },
        })
    }

    fn bad_operand(
        &self,
        instr: &FInstr,
        detail: impl Into<String>,
    ) -> EmitError {
        EmitError::BadOperand {
            op: instr.op.name().to_string(),
            method: self.frame.name.clone(),
            detail: detail.into(),
        }
    }

    fn dispatch(
        &mut self,
        instr: &FInstr,
        r: &mut FReader<'c>,
        end: usize,
    ) -> EmitResult<()> {
        use FOpcode::*;

        let arg = instr.arg();
        match instr.op {
            Nop => {}
            LoadNull => self.code.op(ACONST_NULL),
            LoadFalse => self.code.op(ICONST_0),
            LoadTrue => self.code.op(ICONST_1),
            LoadInt => {
                self.load_literal(instr, "I", "Ljava/lang/Long;")?;
                self.invoke(INVOKEVIRTUAL, "java/lang/Long.longValue()J")?;
            }
            LoadFloat => {
                self.load_literal(instr, "F", "Ljava/lang/Double;")?;
                self.invoke(INVOKEVIRTUAL, "java/lang/Double.doubleValue()D")?;
            }
            LoadDecimal => self.load_literal(instr, "D", "Ljava/math/BigDecimal;")?,
            LoadStr => self.load_literal(instr, "S", "Ljava/lang/String;")?,
            LoadDuration => self.load_literal(instr, "Dur", "Lfan/sys/Duration;")?,
            LoadUri => self.load_literal(instr, "U", "Lfan/sys/Uri;")?,
            LoadType => self.load_type(arg)?,

            LoadVar => {
                let l = self.var(instr)?;
                self.code.load_var(l.stack, l.slot);
            }
            StoreVar => {
                let l = self.var(instr)?;
                self.code.store_var(l.stack, l.slot);
            }
            LoadInstance => self.field_op(GETFIELD, arg, false)?,
            StoreInstance => self.field_op(PUTFIELD, arg, false)?,
            LoadStatic => self.field_op(GETSTATIC, arg, false)?,
            StoreStatic => self.field_op(PUTSTATIC, arg, false)?,
            LoadMixinStatic => self.field_op(GETSTATIC, arg, true)?,
            StoreMixinStatic => self.field_op(PUTSTATIC, arg, true)?,
            Coerce => {
                let to = instr.args.get(1).copied().unwrap_or(0);
                self.coerce(arg, to)?;
            }

            CallNew | CallCtor | CallStatic | CallVirtual | CallNonVirtual | CallMixinStatic
            | CallMixinVirtual | CallMixinNonVirtual => {
                let kind = CallKind::from_opcode(instr.op)
                    .ok_or_else(|| self.bad_operand(instr, "not a call"))?;
                self.call(arg, kind)?;
            }

            Jump | Leave => self.branch(GOTO, arg),
            JumpTrue => self.branch(IFNE, arg),
            JumpFalse => self.branch(IFEQ, arg),

            CompareEQ | CompareNE | Compare | CompareLE | CompareLT | CompareGT | CompareGE
            | CompareSame | CompareNotSame | CompareNull | CompareNotNull => {
                self.compare(instr, r, end)?
            }

            ReturnVoid => self.code.op(RETURN),
            ReturnObj => self.code.return_op(self.frame.ret),
            Pop => {
                let t = self.ctx.resolver.type_ref(arg)?;
                match t.stack {
                    StackType::Void => {}
                    s if s.is_wide() => self.code.op(POP2),
                    _ => self.code.op(POP),
                }
            }
            Dup => {
                let t = self.ctx.resolver.type_ref(arg)?;
                self.code.op(if t.is_wide() { DUP2 } else { DUP });
            }
            DupDown => self.code.op(DUP_X1),
            Is => self.is(arg)?,
            As => self.as_(arg)?,
            Cast => self.cast(arg)?,
            Switch => self.switch(&instr.args),

            Throw => {
                let f = self.ctx.pool().field("fan/sys/Err.val:Lfan/sys/Err$Val;")?;
                self.code.op2(GETFIELD, f);
                self.code.op(ATHROW);
            }
            JumpFinally => self.jump_finally(instr, arg)?,
            CatchAllStart => self.code.op(POP),
            CatchErrStart => {
                self.invoke(
                    INVOKESTATIC,
                    "fan/sys/Err.make(Ljava/lang/Throwable;)Lfan/sys/Err;",
                )?;
                self.cast(arg)?;
            }
            CatchEnd => {}
            FinallyStart => self.finally_start(instr)?,
            FinallyEnd => self.finally_end(instr)?,
        }
        Ok(())
    }

    fn var(
        &self,
        instr: &FInstr,
    ) -> EmitResult<Local> {
        let reg = instr.arg();
        self.frame
            .local(reg)
            .ok_or_else(|| self.bad_operand(instr, format!("no register {}", reg)))
    }

    fn invoke(
        &mut self,
        op: u8,
        sig: &str,
    ) -> EmitResult<()> {
        let m = self.ctx.pool().method(sig)?;
        self.code.op2(op, m);
        Ok(())
    }

    /// `$Pod` 上的字面量字段
    fn load_literal(
        &mut self,
        instr: &FInstr,
        prefix: &str,
        desc: &str,
    ) -> EmitResult<()> {
        let index = instr.arg() as usize;
        let lits = &self.ctx.pod.literals;
        let len = match prefix {
            "I" => lits.ints.len(),
            "F" => lits.floats.len(),
            "D" => lits.decimals.len(),
            "S" => lits.strs.len(),
            "Dur" => lits.durations.len(),
            _ => lits.uris.len(),
        };
        if index >= len {
            return Err(EmitError::Unresolved(format!(
                "literal {}{} (table has {})",
                prefix, index, len
            )));
        }
        let sig = format!("{}.{}{}:{}", self.ctx.pod_class, prefix, index, desc);
        let f = self.ctx.pool().field(&sig)?;
        self.code.op2(GETSTATIC, f);
        Ok(())
    }

    fn field_op(
        &mut self,
        op: u8,
        index: u16,
        mixin: bool,
    ) -> EmitResult<()> {
        let sig = self.ctx.resolver.field(index, mixin)?;
        let f = self.ctx.pool().field(&sig)?;
        self.code.op2(op, f);
        Ok(())
    }

    fn call(
        &mut self,
        index: u16,
        kind: CallKind,
    ) -> EmitResult<()> {
        let jcall = self.ctx.resolver.call(index, kind)?;
        match &*jcall {
            JCall::Intrinsic(Intrinsic::Ops(ops)) => {
                for &op in ops {
                    self.code.op(op);
                }
            }
            JCall::Intrinsic(Intrinsic::New(cls)) => {
                let c = self.ctx.pool().class(cls)?;
                self.code.op2(NEW, c);
                self.code.op(DUP);
            }
            JCall::Intrinsic(Intrinsic::ClassLiteral(cls)) => {
                let c = self.ctx.pool().class(cls)?;
                self.code.op2(LDC_W, c);
            }
            JCall::Intrinsic(Intrinsic::NewArray(atype)) => self.code.op1(NEWARRAY, *atype),
            JCall::Invoke(inv) => {
                let m = if inv.op == INVOKEINTERFACE {
                    self.ctx.pool().interface_method(&inv.sig)?
                } else {
                    self.ctx.pool().method(&inv.sig)?
                };
                self.code.op2(inv.op, m);
                if let Some(slots) = inv.interface_slots {
                    self.code.u1(slots);
                    self.code.u1(0);
                }
            }
        }
        Ok(())
    }

    /// 发出分支指令并登记回填
    fn branch(
        &mut self,
        op: u8,
        target: u16,
    ) {
        let from = self.code.pos();
        self.code.op(op);
        self.push_jump(target, from, JumpKind::Branch);
    }

    /// 在当前位置放置 u2 占位并登记
    fn push_jump(
        &mut self,
        target: u16,
        from: usize,
        kind: JumpKind,
    ) {
        let at = self.code.pos();
        self.code.u2(0xFFFF);
        self.jumps.push(JumpNode {
            target,
            from,
            at,
            kind,
            scope: self.scope,
        });
    }

    fn line_table(
        &mut self,
        attrs: &FAttrs,
    ) -> EmitResult<()> {
        for line in attrs.line_numbers()? {
            if let Some(pc) = self.reloc.get_local(MAIN_SCOPE, line.pc as usize) {
                self.code.lines.push(crate::jvm::LineEntry {
                    start_pc: pc as u16,
                    line: line.line,
                });
            }
        }
        Ok(())
    }
}

/// 方法体发出的便捷入口
pub fn emit_body(
    ctx: &mut ClassCtx<'_>,
    frame: &Frame,
    method: &FMethod,
    code: CodeBuffer,
) -> EmitResult<MethodCode> {
    CodeEmit::new(ctx, frame, &method.code, code).emit_method(&method.attrs)
}
