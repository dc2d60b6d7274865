//! 方法降级
//!
//! 一个 fcode 方法对应一个或多个 JVM 方法：
//!
//! ```text
//! 普通      name(params)ret                       + 默认参数包装
//! 构造器    static name$(Self, params)V           + 包装
//!           static name(params)Self  (工厂)        + 包装
//! native    name(params)ret -> SelfPeer.name(...)  + 包装
//! mixin     接口：每个元数抽象声明
//!           体类：static name(Mixin, params)ret    + 包装
//!           路由：name(params[..i])ret -> Mixin$.name
//! ```

use super::code::{emit_body, CodeEmit, Frame, SelfMode};
use super::context::ClassCtx;
use super::{EmitError, EmitResult};
use crate::fcode::{flags, FMethod, FPod, FTables, FType, FTypeRef, FVar, StackType};
use crate::jvm::opcodes::*;
use crate::jvm::CodeBuffer;

/// 返回类型描述
#[derive(Debug, Clone, Copy)]
pub enum RetDesc<'r> {
    /// 方法的 inherited return
    Inherited,
    Void,
    /// `L<class>;`
    Class(&'r str),
}

/// fcode 访问标志到 JVM 标志
pub fn jflags(fan: u32) -> u16 {
    let mut j = 0;
    if fan & (flags::PUBLIC | flags::PROTECTED | flags::INTERNAL) != 0 {
        j |= ACC_PUBLIC;
    }
    if fan & flags::ABSTRACT != 0 {
        j |= ACC_ABSTRACT;
    }
    if fan & flags::STATIC != 0 {
        j |= ACC_STATIC;
    }
    j
}

fn type_ref<'t>(
    tables: &'t FTables,
    index: u16,
) -> EmitResult<&'t FTypeRef> {
    tables
        .type_ref(index)
        .map_err(|e| EmitError::Unresolved(format!("typeRef: {}", e)))
}

/// 方法描述符 `(self? params)ret`
pub fn method_desc(
    tables: &FTables,
    m: &FMethod,
    self_name: Option<&str>,
    params: &[FVar],
    ret: RetDesc<'_>,
) -> EmitResult<String> {
    let mut desc = String::with_capacity(32);
    desc.push('(');
    if let Some(s) = self_name {
        desc.push('L');
        desc.push_str(s);
        desc.push(';');
    }
    for p in params {
        type_ref(tables, p.type_ref)?.jsig_into(&mut desc);
    }
    desc.push(')');
    match ret {
        RetDesc::Inherited => type_ref(tables, m.inherited_ret)?.jsig_into(&mut desc),
        RetDesc::Void => desc.push('V'),
        RetDesc::Class(c) => {
            desc.push('L');
            desc.push_str(c);
            desc.push(';');
        }
    }
    Ok(desc)
}

/// 包装方法要调用的主方法
struct Main<'m> {
    name: &'m str,
    desc: &'m str,
    is_static: bool,
    /// 槽位 0 的 self（实例方法或显式 self）
    self_param: Option<&'m str>,
    ret: RetDesc<'m>,
    ret_stack: StackType,
}

impl<'a> ClassCtx<'a> {
    fn desc(
        &self,
        m: &FMethod,
        self_name: Option<&str>,
        n: usize,
        ret: RetDesc<'_>,
    ) -> EmitResult<String> {
        let params = m.params();
        method_desc(
            self.resolver.tables(),
            m,
            self_name,
            &params[..n.min(params.len())],
            ret,
        )
    }

    fn frame(
        &self,
        m: &FMethod,
        mode: SelfMode,
    ) -> EmitResult<Frame> {
        let owner = self.cf.name.clone();
        Frame::for_method(self.resolver, &owner, m, mode)
    }

    fn ret_stack(
        &self,
        m: &FMethod,
    ) -> EmitResult<StackType> {
        Ok(self.resolver.type_ref(m.inherited_ret)?.stack)
    }

    /// 按方法种类选择降级方式
    pub fn emit_method(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        if m.is_ctor() {
            self.emit_ctor(m)
        } else if m.is_native() {
            self.emit_native(m)
        } else {
            self.emit_standard(m)
        }
    }

    pub fn emit_standard(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        let access = jflags(m.flags);
        let n = m.params().len();
        let desc = self.desc(m, None, n, RetDesc::Inherited)?;

        if m.is_abstract() || !m.has_code() {
            self.cf.add_method(access | ACC_ABSTRACT, &m.name, &desc, None)?;
        } else {
            let frame = self.frame(m, SelfMode::Bound)?;
            let code = CodeBuffer::new(frame.max_stack, frame.max_locals);
            let body = emit_body(self, &frame, m, code)?;
            self.cf.add_method(access, &m.name, &desc, Some(body.code))?;
        }

        let ret_stack = self.ret_stack(m)?;
        let main = Main {
            name: &m.name,
            desc: &desc,
            is_static: m.is_static(),
            self_param: None,
            ret: RetDesc::Inherited,
            ret_stack,
        };
        self.emit_wrappers(m, &main, access & !ACC_ABSTRACT, SelfMode::Bound)
    }

    /// 构造器拆成 `name$` 体与 `name` 工厂
    pub fn emit_ctor(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        let access = jflags(m.flags) | ACC_STATIC;
        let n = m.params().len();
        let self_name = self.self_name.clone();

        // 体
        let body_name = format!("{}$", m.name);
        let body_desc = self.desc(m, Some(self_name.as_str()), n, RetDesc::Void)?;
        let frame = self.frame(m, SelfMode::Bound)?.with_ret(StackType::Void);
        let code = CodeBuffer::new(frame.max_stack, frame.max_locals);
        let body = emit_body(self, &frame, m, code)?;
        self.cf
            .add_method(access, &body_name, &body_desc, Some(body.code))?;
        let main = Main {
            name: &body_name,
            desc: &body_desc,
            is_static: true,
            self_param: Some(self_name.as_str()),
            ret: RetDesc::Void,
            ret_stack: StackType::Void,
        };
        self.emit_wrappers(m, &main, access, SelfMode::Bound)?;

        // 工厂
        let factory_desc = self.desc(m, None, n, RetDesc::Class(self_name.as_str()))?;
        let frame = self.frame(m, SelfMode::Unbound)?;
        let slots = frame.param_slots(n);
        let mut code = CodeBuffer::new(slots + 3, slots);
        let cls = self.pool().class(&self_name)?;
        let init = self.pool().method(&format!("{}.<init>()V", self_name))?;
        let body_ref = self
            .pool()
            .method(&format!("{}.{}{}", self_name, body_name, body_desc))?;
        code.op2(NEW, cls);
        code.op(DUP);
        code.op2(INVOKESPECIAL, init);
        code.op(DUP);
        for p in frame.params(n) {
            code.load_var(p.stack, p.slot);
        }
        code.op2(INVOKESTATIC, body_ref);
        code.op(ARETURN);
        self.cf
            .add_method(access, &m.name, &factory_desc, Some(code))?;
        let main = Main {
            name: &m.name,
            desc: &factory_desc,
            is_static: true,
            self_param: None,
            ret: RetDesc::Class(self_name.as_str()),
            ret_stack: StackType::Obj,
        };
        self.emit_wrappers(m, &main, access, SelfMode::Unbound)
    }

    /// native 方法委托给 `<Self>Peer`
    pub fn emit_native(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        let access = jflags(m.flags) & !ACC_ABSTRACT;
        let n = m.params().len();
        let self_name = self.self_name.clone();
        let peer = format!("{}Peer", self_name);
        let desc = self.desc(m, None, n, RetDesc::Inherited)?;
        let ret_stack = self.ret_stack(m)?;
        let frame = self.frame(m, SelfMode::Bound)?;
        let mut code = CodeBuffer::new(frame.param_slots(n) + 2, frame.max_locals);

        if m.is_static() {
            let target = self
                .pool()
                .method(&format!("{}.{}{}", peer, m.name, desc))?;
            for p in frame.params(n) {
                code.load_var(p.stack, p.slot);
            }
            code.op2(INVOKESTATIC, target);
        } else {
            let peer_desc = self.desc(m, Some(self_name.as_str()), n, RetDesc::Inherited)?;
            let field = self
                .pool()
                .field(&format!("{}.peer:L{};", self_name, peer))?;
            let target = self
                .pool()
                .method(&format!("{}.{}{}", peer, m.name, peer_desc))?;
            code.op(ALOAD_0);
            code.op2(GETFIELD, field);
            code.op(ALOAD_0);
            for p in frame.params(n) {
                code.load_var(p.stack, p.slot);
            }
            code.op2(INVOKEVIRTUAL, target);
        }
        code.return_op(ret_stack);
        self.cf.add_method(access, &m.name, &desc, Some(code))?;

        let main = Main {
            name: &m.name,
            desc: &desc,
            is_static: m.is_static(),
            self_param: None,
            ret: RetDesc::Inherited,
            ret_stack,
        };
        self.emit_wrappers(m, &main, access, SelfMode::Bound)
    }

    /// mixin 接口上的抽象声明，每个元数一个
    pub fn emit_mixin_interface(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        if m.is_static() || m.is_ctor() {
            return Ok(());
        }
        let access = ACC_PUBLIC | ACC_ABSTRACT;
        let n = m.params().len();
        let desc = self.desc(m, None, n, RetDesc::Inherited)?;
        self.cf.add_method(access, &m.name, &desc, None)?;
        for (i, p) in m.params().iter().enumerate() {
            if p.has_default() {
                let desc = self.desc(m, None, i, RetDesc::Inherited)?;
                self.cf.add_method(access, &m.name, &desc, None)?;
            }
        }
        Ok(())
    }

    /// mixin 体类 `Mixin$` 上的静态实现
    pub fn emit_mixin_body(
        &mut self,
        m: &'a FMethod,
    ) -> EmitResult<()> {
        if !m.has_code() {
            return Ok(());
        }
        let access = (jflags(m.flags) & !ACC_ABSTRACT) | ACC_PUBLIC | ACC_STATIC;
        let n = m.params().len();
        let self_name = self.self_name.clone();
        let self_param = if m.is_static() {
            None
        } else {
            Some(self_name.as_str())
        };
        let desc = self.desc(m, self_param, n, RetDesc::Inherited)?;
        let frame = self.frame(m, SelfMode::Bound)?;
        let code = CodeBuffer::new(frame.max_stack, frame.max_locals);
        let body = emit_body(self, &frame, m, code)?;
        self.cf.add_method(access, &m.name, &desc, Some(body.code))?;

        let ret_stack = self.ret_stack(m)?;
        let main = Main {
            name: &m.name,
            desc: &desc,
            is_static: true,
            self_param,
            ret: RetDesc::Inherited,
            ret_stack,
        };
        self.emit_wrappers(m, &main, access, SelfMode::Bound)
    }

    /// 把 mixin 方法转发到 `Mixin$`；类型取自 mixin 所在 pod
    pub fn emit_router(
        &mut self,
        mixin_pod: &FPod,
        mixin: &FType,
        m: &FMethod,
    ) -> EmitResult<()> {
        let tables = &mixin_pod.tables;
        let mixin_name = type_ref(tables, mixin.self_ref)?.jname().to_string();
        let access = (jflags(m.flags) & !(ACC_ABSTRACT | ACC_STATIC)) | ACC_PUBLIC;
        let params = m.params();
        let first = m.first_default().unwrap_or(params.len());
        let ret_stack = type_ref(tables, m.inherited_ret)?.stack;

        for i in first..=params.len() {
            let desc = method_desc(tables, m, None, &params[..i], RetDesc::Inherited)?;
            if self.cf.has_method(&m.name, &desc) {
                continue;
            }
            let impl_desc = method_desc(
                tables,
                m,
                Some(&mixin_name),
                &params[..i],
                RetDesc::Inherited,
            )?;
            let target = self
                .pool()
                .method(&format!("{}$.{}{}", mixin_name, m.name, impl_desc))?;

            let mut code = CodeBuffer::new(0, 0);
            code.op(ALOAD_0);
            let mut slot = 1u16;
            for p in &params[..i] {
                let stack = type_ref(tables, p.type_ref)?.stack;
                code.load_var(stack, slot);
                slot += stack.slots();
            }
            code.max_locals = slot;
            code.max_stack = slot;
            code.op2(INVOKESTATIC, target);
            code.return_op(ret_stack);
            self.cf.add_method(access, &m.name, &desc, Some(code))?;
        }
        Ok(())
    }

    /// 默认参数包装：每个带默认值的位置 `i` 一个，只接受前 `i` 个参数
    fn emit_wrappers(
        &mut self,
        m: &'a FMethod,
        main: &Main<'_>,
        access: u16,
        mode: SelfMode,
    ) -> EmitResult<()> {
        let Some(first) = m.first_default() else {
            return Ok(());
        };
        let frame = self.frame(m, mode)?;
        let params = m.params();
        let main_ref = {
            let sig = format!("{}.{}{}", self.cf.name, main.name, main.desc);
            self.pool().method(&sig)?
        };

        for i in first..params.len() {
            let desc = self.desc(m, main.self_param, i, main.ret)?;
            let max_stack = frame.max_stack.max(16) + 2 * params.len() as u16;
            let mut code = CodeBuffer::new(max_stack, frame.max_locals);

            let receiver = main.self_param.is_some() || !main.is_static;
            if receiver {
                code.op(ALOAD_0);
            }
            for p in frame.params(i) {
                code.load_var(p.stack, p.slot);
            }
            for (j, p) in params.iter().enumerate().skip(i) {
                let expr = p.default_expr().ok_or_else(|| {
                    EmitError::Internal(format!(
                        "{}.{}: param {} after a default has none",
                        self.cf.name, m.name, j
                    ))
                })?;
                code = CodeEmit::new(self, &frame, expr, code)
                    .emit_fragment()?
                    .code;
            }

            code.op2(
                if main.is_static {
                    INVOKESTATIC
                } else {
                    INVOKEVIRTUAL
                },
                main_ref,
            );
            code.return_op(main.ret_stack);
            self.cf.add_method(access, main.name, &desc, Some(code))?;
        }
        Ok(())
    }
}
