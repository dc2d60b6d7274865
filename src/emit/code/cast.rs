//! 类型字面量与类型转换
//!
//! - LoadType：sys 非泛型类型走 `fan/sys/Sys.<Name>Type`，其余走 `type$n` 缓存字段
//! - Is/As/Cast：泛型实例需要运行时 Type 对象，交给 `fanx/util/OpUtil`
//! - Coerce：装箱、拆箱、非空检查与引用类型转换

use smallvec::SmallVec;

use super::CodeEmit;
use crate::emit::{EmitError, EmitResult};
use crate::fcode::{FTypeRef, StackType};
use crate::jvm::opcodes::*;

/// 装箱类与拆箱方法名
fn boxing(stack: StackType) -> Option<(&'static str, &'static str)> {
    Some(match stack {
        StackType::Bool => ("java/lang/Boolean", "booleanValue"),
        StackType::Byte => ("java/lang/Byte", "byteValue"),
        StackType::Short => ("java/lang/Short", "shortValue"),
        StackType::Char => ("java/lang/Character", "charValue"),
        StackType::Int => ("java/lang/Integer", "intValue"),
        StackType::Long => ("java/lang/Long", "longValue"),
        StackType::Float => ("java/lang/Float", "floatValue"),
        StackType::Double => ("java/lang/Double", "doubleValue"),
        StackType::Obj | StackType::Void => return None,
    })
}

/// 栈上数值的 JVM 计算类别：I、J、F、D
fn numeric_kind(stack: StackType) -> Option<char> {
    match stack {
        StackType::Byte | StackType::Short | StackType::Char | StackType::Int => Some('I'),
        StackType::Long => Some('J'),
        StackType::Float => Some('F'),
        StackType::Double => Some('D'),
        StackType::Bool | StackType::Obj | StackType::Void => None,
    }
}

/// 原生数值之间的转换指令；Bool 与数值之间不可转换
fn numeric_conversion(
    from: StackType,
    to: StackType,
) -> Option<SmallVec<[u8; 2]>> {
    let (a, b) = (numeric_kind(from)?, numeric_kind(to)?);
    let mut ops = SmallVec::new();
    let widen = match (a, b) {
        ('I', 'J') => Some(I2L),
        ('I', 'F') => Some(I2F),
        ('I', 'D') => Some(I2D),
        ('J', 'I') => Some(L2I),
        ('J', 'F') => Some(L2F),
        ('J', 'D') => Some(L2D),
        ('F', 'I') => Some(F2I),
        ('F', 'J') => Some(F2L),
        ('F', 'D') => Some(F2D),
        ('D', 'I') => Some(D2I),
        ('D', 'J') => Some(D2L),
        ('D', 'F') => Some(D2F),
        _ => None,
    };
    ops.extend(widen);
    match to {
        StackType::Byte => ops.push(I2B),
        StackType::Short => ops.push(I2S),
        StackType::Char => ops.push(I2C),
        _ => {}
    }
    Some(ops)
}

impl<'c, 'a> CodeEmit<'c, 'a> {
    pub(super) fn load_type(
        &mut self,
        index: u16,
    ) -> EmitResult<()> {
        let t = self.ctx.resolver.type_ref(index)?;
        self.push_type(t)
    }

    fn push_type(
        &mut self,
        t: &FTypeRef,
    ) -> EmitResult<()> {
        if t.is_sys() && !t.is_generic_instance() {
            let sig = format!("fan/sys/Sys.{}Type:Lfan/sys/Type;", t.name);
            let f = self.ctx.pool().field(&sig)?;
            self.code.op2(GETSTATIC, f);
            if t.is_nullable() {
                self.invoke(INVOKEVIRTUAL, "fan/sys/Type.toNullable()Lfan/sys/Type;")?;
            }
            return Ok(());
        }

        let field = self.ctx.type_literal_field(&t.signature);
        let f = self.ctx.pool().field(&field)?;
        let s = self.ctx.pool().string(&t.signature)?;
        self.code.op2(GETSTATIC, f);
        self.code.op(DUP);
        let cached = self.code.branch(IFNONNULL);
        self.code.op(POP);
        self.code.op2(LDC_W, s);
        self.code.op(ICONST_1);
        self.invoke(
            INVOKESTATIC,
            "fan/sys/Type.find(Ljava/lang/String;Z)Lfan/sys/Type;",
        )?;
        self.code.op(DUP);
        self.code.op2(PUTSTATIC, f);
        self.code.bind(cached)?;
        Ok(())
    }

    pub(super) fn is(
        &mut self,
        index: u16,
    ) -> EmitResult<()> {
        let t = self.ctx.resolver.type_ref(index)?;
        if t.is_generic_instance() {
            self.push_type(t)?;
            return self.invoke(
                INVOKESTATIC,
                "fanx/util/OpUtil.is(Ljava/lang/Object;Lfan/sys/Type;)Z",
            );
        }
        let c = self.ctx.pool().class(t.jname_boxed())?;
        self.code.op2(INSTANCEOF, c);
        Ok(())
    }

    pub(super) fn as_(
        &mut self,
        index: u16,
    ) -> EmitResult<()> {
        let t = self.ctx.resolver.type_ref(index)?;
        let c = self.ctx.pool().class(t.jname_boxed())?;
        if t.is_generic_instance() {
            self.push_type(t)?;
            self.invoke(
                INVOKESTATIC,
                "fanx/util/OpUtil.as(Ljava/lang/Object;Lfan/sys/Type;)Ljava/lang/Object;",
            )?;
            self.code.op2(CHECKCAST, c);
            return Ok(());
        }
        self.code.op(DUP);
        self.code.op2(INSTANCEOF, c);
        let is = self.code.branch(IFNE);
        self.code.op(POP);
        self.code.op(ACONST_NULL);
        let end = self.code.branch(GOTO);
        self.code.bind(is)?;
        self.code.op2(CHECKCAST, c);
        self.code.bind(end)?;
        Ok(())
    }

    pub(super) fn cast(
        &mut self,
        index: u16,
    ) -> EmitResult<()> {
        let t = self.ctx.resolver.type_ref(index)?;
        if t.is_primitive() {
            return self.unbox(t.stack);
        }
        let c = self.ctx.pool().class(t.jname())?;
        self.code.op2(CHECKCAST, c);
        Ok(())
    }

    pub(super) fn coerce(
        &mut self,
        from: u16,
        to: u16,
    ) -> EmitResult<()> {
        let from = self.ctx.resolver.type_ref(from)?;
        let to = self.ctx.resolver.type_ref(to)?;
        let bad = || EmitError::BadCoerce {
            from: from.signature.clone(),
            to: to.signature.clone(),
        };

        match (from.stack, to.stack) {
            (StackType::Void, _) | (_, StackType::Void) => Err(bad()),
            (StackType::Obj, StackType::Obj) => {
                if from.is_nullable() && !to.is_nullable() {
                    self.null_check()?;
                }
                if !to.is_obj() && from.jname() != to.jname() {
                    let c = self.ctx.pool().class(to.jname())?;
                    self.code.op2(CHECKCAST, c);
                }
                Ok(())
            }
            (a, StackType::Obj) => self.box_value(a),
            (StackType::Obj, b) => {
                if from.is_nullable() {
                    self.null_check()?;
                }
                self.unbox(b)
            }
            (a, b) if a == b => Ok(()),
            (a, b) => {
                let ops = numeric_conversion(a, b).ok_or_else(bad)?;
                for op in ops {
                    self.code.op(op);
                }
                Ok(())
            }
        }
    }

    fn box_value(
        &mut self,
        stack: StackType,
    ) -> EmitResult<()> {
        let (cls, _) = boxing(stack).ok_or_else(|| EmitError::Internal(format!("box {:?}", stack)))?;
        let sig = format!("{}.valueOf({})L{};", cls, stack.code(), cls);
        self.invoke(INVOKESTATIC, &sig)
    }

    fn unbox(
        &mut self,
        stack: StackType,
    ) -> EmitResult<()> {
        let (cls, getter) =
            boxing(stack).ok_or_else(|| EmitError::Internal(format!("unbox {:?}", stack)))?;
        let c = self.ctx.pool().class(cls)?;
        self.code.op2(CHECKCAST, c);
        let sig = format!("{}.{}(){}", cls, getter, stack.code());
        self.invoke(INVOKEVIRTUAL, &sig)
    }

    /// `DUP; IFNONNULL ok; throw NullErr.makeCoerce(); ok:`
    fn null_check(&mut self) -> EmitResult<()> {
        self.code.op(DUP);
        let ok = self.code.branch(IFNONNULL);
        self.invoke(INVOKESTATIC, "fan/sys/NullErr.makeCoerce()Lfan/sys/NullErr;")?;
        let f = self.ctx.pool().field("fan/sys/Err.val:Lfan/sys/Err$Val;")?;
        self.code.op2(GETFIELD, f);
        self.code.op(ATHROW);
        self.code.bind(ok)?;
        Ok(())
    }
}
