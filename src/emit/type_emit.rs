//! 类型降级
//!
//! ```text
//! class Foo            -> fan/p/Foo            (+ Foo$Val 若是 Err, + Foo$Dynamic 若开启)
//! mixin Bar            -> fan/p/Bar (interface) + fan/p/Bar$ (静态实现)
//! ```

use std::collections::HashSet;

use tracing::{debug, trace};

use super::context::{ClassCtx, TYPE_DESC};
use super::method_emit::jflags;
use super::namespace::Namespace;
use super::resolver::Resolver;
use super::synthetic::{self, ERR_VAL};
use super::{code, EmitError, EmitResult, EmittedClass};
use crate::fcode::{flags, FMethod, FPod, FType, FTypeRef};
use crate::jvm::opcodes::*;
use crate::jvm::{ClassFile, CodeBuffer};
use crate::util::config::EmitConfig;

const STATIC_INIT: &str = "static$init";
const INSTANCE_INIT: &str = "instance$init";

/// 基类链的最大深度
const MAX_BASE_DEPTH: usize = 64;

/// 一个已加载的祖先类型
#[derive(Clone, Copy)]
struct Loaded<'a> {
    pod: &'a FPod,
    ty: &'a FType,
}

/// 路由闭包中的一个 mixin 及其全部父 mixin
struct MixinNode<'a> {
    qname: String,
    loaded: Loaded<'a>,
    supers: HashSet<String>,
}

/// 类型的访问标志
fn class_flags(fan: u32) -> u16 {
    let mut j = ACC_SUPER;
    if fan & (flags::PUBLIC | flags::INTERNAL) != 0 {
        j |= ACC_PUBLIC;
    }
    if fan & flags::ABSTRACT != 0 {
        j |= ACC_ABSTRACT;
    }
    if fan & flags::FINAL != 0 {
        j |= ACC_FINAL;
    }
    j
}

/// 发出第 `index` 个类型对应的全部 class
pub fn emit_type<'a>(
    pod: &'a FPod,
    namespace: &Namespace<'a>,
    resolver: &'a Resolver<'a>,
    config: &'a EmitConfig,
    index: usize,
) -> EmitResult<Vec<EmittedClass>> {
    let ty = pod
        .types
        .get(index)
        .ok_or_else(|| EmitError::Internal(format!("type index {} out of range", index)))?;
    let self_ref = resolver.type_ref(ty.self_ref)?;
    if ty.hollow {
        return Err(EmitError::Internal(format!(
            "type {} body not read",
            self_ref.qname()
        )));
    }
    trace!("emitting type {}", self_ref.qname());

    let emitter = TypeEmit {
        pod,
        namespace,
        resolver,
        config,
        ty,
        self_ref,
    };
    if ty.is_mixin() {
        emitter.emit_mixin()
    } else {
        emitter.emit_class()
    }
}

struct TypeEmit<'n, 'a> {
    pod: &'a FPod,
    namespace: &'n Namespace<'a>,
    resolver: &'a Resolver<'a>,
    config: &'a EmitConfig,
    ty: &'a FType,
    self_ref: &'a FTypeRef,
}

impl<'n, 'a> TypeEmit<'n, 'a> {
    fn jname(&self) -> &'a str {
        self.self_ref.jname()
    }

    /// 当前 pod 优先，然后查命名空间
    fn find(
        &self,
        t: &FTypeRef,
    ) -> EmitResult<Option<Loaded<'a>>> {
        if t.pod == self.pod.name {
            let index = self
                .pod
                .find_type(&t.name)
                .ok_or_else(|| EmitError::Unresolved(format!("type {}", t.qname())))?;
            let ty = &self.pod.types[index];
            if ty.hollow {
                return Err(EmitError::Internal(format!(
                    "type {} body not read",
                    t.qname()
                )));
            }
            return Ok(Some(Loaded { pod: self.pod, ty }));
        }
        Ok(self
            .namespace
            .lookup(t)?
            .map(|(pod, ty)| Loaded { pod, ty }))
    }

    /// 基类链上的 `(typeRef, 已加载的类型)`，自近到远
    fn ancestors(&self) -> EmitResult<Vec<(&'a FTypeRef, Option<Loaded<'a>>)>> {
        let mut out = Vec::new();
        let mut pod = self.pod;
        let mut cur = self.ty;
        while let Some(base) = cur.base {
            if out.len() >= MAX_BASE_DEPTH {
                return Err(EmitError::Internal(format!(
                    "base chain of {} deeper than {}",
                    self.self_ref.qname(),
                    MAX_BASE_DEPTH
                )));
            }
            let base_ref = Namespace::resolve(pod, base)?;
            let loaded = self.find(base_ref)?;
            out.push((base_ref, loaded));
            match loaded {
                Some(l) => {
                    pod = l.pod;
                    cur = l.ty;
                }
                None => break,
            }
        }
        Ok(out)
    }

    fn new_ctx(
        &self,
        cf: ClassFile,
        self_name: &str,
    ) -> EmitResult<ClassCtx<'a>> {
        let mut ctx = ClassCtx::new(self.pod, self.resolver, self.config, cf, self_name);
        if self.config.source_files {
            ctx.cf.source_file = self.ty.attrs.source_file()?;
        }
        Ok(ctx)
    }

    fn add_mixin_interfaces(
        &self,
        cf: &mut ClassFile,
    ) -> EmitResult<()> {
        for &m in &self.ty.mixins {
            let r = self.resolver.type_ref(m)?;
            cf.add_interface(r.jname())?;
        }
        Ok(())
    }

    fn emit_class(&self) -> EmitResult<Vec<EmittedClass>> {
        let jname = self.jname();
        let ancestors = self.ancestors()?;
        let base_ref = ancestors.first().map(|(r, _)| *r);
        let super_name = base_ref.map(FTypeRef::jimpl).unwrap_or("fan/sys/FanObj");
        let is_err = ancestors.iter().any(|(r, _)| r.is_err());

        let mut cf = ClassFile::new(
            jname,
            super_name,
            class_flags(self.ty.flags),
            self.config.class_major,
        )?;
        self.add_mixin_interfaces(&mut cf)?;
        let mut ctx = self.new_ctx(cf, jname)?;

        // $Type 与 typeof()
        ctx.cf
            .add_field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "$Type", TYPE_DESC)?;
        let type_field = ctx.pool().field(&format!("{}.$Type:{}", jname, TYPE_DESC))?;
        let mut type_of = CodeBuffer::new(1, 1);
        type_of.op2(GETSTATIC, type_field);
        type_of.op(ARETURN);
        ctx.cf
            .add_method(ACC_PUBLIC, "typeof", &format!("(){}", TYPE_DESC), Some(type_of))?;

        let native = self.ty.has_native_peer();
        if native {
            ctx.cf
                .add_field(ACC_PUBLIC, "peer", &format!("L{}Peer;", jname))?;
        }

        for f in &self.ty.fields {
            if !f.is_storage() {
                continue;
            }
            let t = self.resolver.type_ref(f.type_ref)?;
            ctx.cf
                .add_field(jflags(f.flags) & !ACC_ABSTRACT, &f.name, &t.jsig())?;
        }

        let mut static_init = None;
        let mut instance_init = None;
        for m in &self.ty.methods {
            match m.name.as_str() {
                STATIC_INIT => static_init = Some(m),
                INSTANCE_INIT => instance_init = Some(m),
                _ => ctx.emit_method(m)?,
            }
        }
        self.emit_clinit(&mut ctx, static_init, true)?;
        if is_err {
            self.emit_err_inits(&mut ctx, super_name, instance_init, native)?;
        } else {
            self.emit_init(&mut ctx, super_name, instance_init, native)?;
        }

        self.emit_routers(&mut ctx, &ancestors)?;

        let mut out = vec![ctx.finish()?];
        if is_err {
            let super_val = base_ref
                .map(|r| format!("{}$Val", r.jname()))
                .unwrap_or_else(|| ERR_VAL.to_string());
            out.push(synthetic::emit_val_class(
                &format!("{}$Val", jname),
                &super_val,
                self.config,
            )?);
        }
        if self.config.emit_dynamic_subclasses && !self.ty.is_final() {
            out.push(synthetic::emit_dynamic_class(jname, self.config)?);
        }
        debug!("{} -> {} classes", self.self_ref.qname(), out.len());
        Ok(out)
    }

    fn emit_mixin(&self) -> EmitResult<Vec<EmittedClass>> {
        let jname = self.jname();

        let mut cf = ClassFile::new(
            jname,
            "java/lang/Object",
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
            self.config.class_major,
        )?;
        self.add_mixin_interfaces(&mut cf)?;
        let mut iface = self.new_ctx(cf, jname)?;
        for m in &self.ty.methods {
            iface.emit_mixin_interface(m)?;
        }

        let body_name = format!("{}$", jname);
        let cf = ClassFile::new(
            &body_name,
            "java/lang/Object",
            ACC_PUBLIC | ACC_SUPER,
            self.config.class_major,
        )?;
        let mut body = self.new_ctx(cf, jname)?;
        for f in &self.ty.fields {
            if !(f.is_static() && f.is_storage()) {
                continue;
            }
            let t = self.resolver.type_ref(f.type_ref)?;
            body.cf
                .add_field(ACC_PUBLIC | ACC_STATIC, &f.name, &t.jsig())?;
        }
        let mut static_init = None;
        for m in &self.ty.methods {
            match m.name.as_str() {
                STATIC_INIT => static_init = Some(m),
                INSTANCE_INIT => {}
                _ if m.is_ctor() => {}
                _ => body.emit_mixin_body(m)?,
            }
        }
        if static_init.is_some() {
            self.emit_clinit(&mut body, static_init, false)?;
        }

        Ok(vec![iface.finish()?, body.finish()?])
    }

    /// `<clinit>`：类先初始化 `$Type`，再执行 `static$init`
    fn emit_clinit(
        &self,
        ctx: &mut ClassCtx<'a>,
        body: Option<&'a FMethod>,
        init_type: bool,
    ) -> EmitResult<()> {
        let jname = ctx.class_name().to_string();
        let mut code = CodeBuffer::new(2, 0);
        if init_type {
            let sig = ctx.pool().string(&self.self_ref.signature)?;
            let find = ctx
                .pool()
                .method("fan/sys/Type.find(Ljava/lang/String;)Lfan/sys/Type;")?;
            let field = ctx.pool().field(&format!("{}.$Type:{}", jname, TYPE_DESC))?;
            code.op2(LDC_W, sig);
            code.op2(INVOKESTATIC, find);
            code.op2(PUTSTATIC, field);
        }
        let code = self.finish_init(ctx, code, body)?;
        ctx.cf.add_method(ACC_STATIC, "<clinit>", "()V", Some(code))?;
        Ok(())
    }

    /// `<init>()V`：父类构造、peer、`instance$init`
    fn emit_init(
        &self,
        ctx: &mut ClassCtx<'a>,
        super_name: &str,
        body: Option<&'a FMethod>,
        native: bool,
    ) -> EmitResult<()> {
        let mut code = CodeBuffer::new(3, 1);
        let super_init = ctx.pool().method(&format!("{}.<init>()V", super_name))?;
        code.op(ALOAD_0);
        code.op2(INVOKESPECIAL, super_init);
        if native {
            self.init_peer(ctx, &mut code)?;
        }
        let code = self.finish_init(ctx, code, body)?;
        ctx.cf.add_method(ACC_PUBLIC, "<init>", "()V", Some(code))?;
        Ok(())
    }

    /// Err 子类的两个构造器
    fn emit_err_inits(
        &self,
        ctx: &mut ClassCtx<'a>,
        super_name: &str,
        body: Option<&'a FMethod>,
        native: bool,
    ) -> EmitResult<()> {
        let jname = ctx.class_name().to_string();
        let val = format!("{}$Val", jname);
        let val_desc = format!("(L{};)V", ERR_VAL);

        let mut code = CodeBuffer::new(3, 1);
        let val_cls = ctx.pool().class(&val)?;
        let val_init = ctx.pool().method(&format!("{}.<init>()V", val))?;
        let this_init = ctx
            .pool()
            .method(&format!("{}.<init>{}", jname, val_desc))?;
        code.op(ALOAD_0);
        code.op2(NEW, val_cls);
        code.op(DUP);
        code.op2(INVOKESPECIAL, val_init);
        code.op2(INVOKESPECIAL, this_init);
        code.op(RETURN);
        ctx.cf.add_method(ACC_PUBLIC, "<init>", "()V", Some(code))?;

        let mut code = CodeBuffer::new(3, 2);
        let super_init = ctx
            .pool()
            .method(&format!("{}.<init>{}", super_name, val_desc))?;
        code.op(ALOAD_0);
        code.op(ALOAD_1);
        code.op2(INVOKESPECIAL, super_init);
        if native {
            self.init_peer(ctx, &mut code)?;
        }
        let code = self.finish_init(ctx, code, body)?;
        ctx.cf.add_method(ACC_PUBLIC, "<init>", &val_desc, Some(code))?;
        Ok(())
    }

    /// `this.peer = SelfPeer.make(this)`
    fn init_peer(
        &self,
        ctx: &mut ClassCtx<'a>,
        code: &mut CodeBuffer,
    ) -> EmitResult<()> {
        let jname = ctx.self_name.clone();
        let make = ctx
            .pool()
            .method(&format!("{0}Peer.make(L{0};)L{0}Peer;", jname))?;
        let field = ctx.pool().field(&format!("{0}.peer:L{0}Peer;", jname))?;
        code.op(ALOAD_0);
        code.op(DUP);
        code.op2(INVOKESTATIC, make);
        code.op2(PUTFIELD, field);
        Ok(())
    }

    /// 接上 fcode 初始化体；没有时直接返回
    fn finish_init(
        &self,
        ctx: &mut ClassCtx<'a>,
        mut code: CodeBuffer,
        body: Option<&'a FMethod>,
    ) -> EmitResult<CodeBuffer> {
        match body {
            Some(m) if m.has_code() => {
                let frame = code::Frame::for_method(
                    self.resolver,
                    ctx.class_name(),
                    m,
                    code::SelfMode::Bound,
                )?;
                code.max_stack = code.max_stack.max(frame.max_stack);
                code.max_locals = code.max_locals.max(frame.max_locals);
                Ok(code::emit_body(ctx, &frame, m, code)?.code)
            }
            _ => {
                code.op(RETURN);
                Ok(code)
            }
        }
    }

    /// 为类自身及基类都没有声明的 mixin 方法生成路由
    fn emit_routers(
        &self,
        ctx: &mut ClassCtx<'a>,
        ancestors: &[(&'a FTypeRef, Option<Loaded<'a>>)],
    ) -> EmitResult<()> {
        let mut declared: HashSet<&str> =
            self.ty.methods.iter().map(|m| m.name.as_str()).collect();
        let mut inherited = HashSet::new();
        for (_, loaded) in ancestors {
            if let Some(l) = loaded {
                declared.extend(l.ty.methods.iter().map(|m| m.name.as_str()));
                self.collect_mixins(*l, &mut inherited)?;
            }
        }

        let mut visited = HashSet::new();
        let mut closure = Vec::new();
        for &m in &self.ty.mixins {
            self.mixin_closure(self.pod, m, &inherited, &mut visited, &mut closure)?;
        }

        let mut routed = HashSet::new();
        for node in &closure {
            for m in &node.loaded.ty.methods {
                if m.is_static() || m.is_ctor() || m.is_private() || !m.has_code() {
                    continue;
                }
                if declared.contains(m.name.as_str()) || routed.contains(&m.name) {
                    continue;
                }
                // 被闭包中更具体的 mixin 覆盖时路由到覆盖者
                let overridden = closure.iter().any(|other| {
                    other.supers.contains(&node.qname)
                        && other
                            .loaded
                            .ty
                            .methods
                            .iter()
                            .any(|o| o.name == m.name && !o.is_static())
                });
                if overridden {
                    continue;
                }
                routed.insert(m.name.clone());
                ctx.emit_router(node.loaded.pod, node.loaded.ty, m)?;
            }
        }
        Ok(())
    }

    /// `l` 直接或间接实现的全部 mixin
    fn collect_mixins(
        &self,
        l: Loaded<'a>,
        out: &mut HashSet<String>,
    ) -> EmitResult<()> {
        for &m in &l.ty.mixins {
            let r = Namespace::resolve(l.pod, m)?;
            if !out.insert(r.qname()) {
                continue;
            }
            if let Some(inner) = self.find(r)? {
                self.collect_mixins(inner, out)?;
            }
        }
        Ok(())
    }

    /// 前序 DFS 收集需要路由的 mixin，跳过祖先已实现的
    fn mixin_closure(
        &self,
        pod: &'a FPod,
        index: u16,
        inherited: &HashSet<String>,
        visited: &mut HashSet<String>,
        out: &mut Vec<MixinNode<'a>>,
    ) -> EmitResult<()> {
        let r = Namespace::resolve(pod, index)?;
        let qname = r.qname();
        if inherited.contains(&qname) || !visited.insert(qname.clone()) {
            return Ok(());
        }
        let Some(mixin) = self.find(r)? else {
            return Ok(());
        };
        let mut supers = HashSet::new();
        self.collect_mixins(mixin, &mut supers)?;
        out.push(MixinNode {
            qname,
            loaded: mixin,
            supers,
        });

        for &inner in &mixin.ty.mixins {
            self.mixin_closure(mixin.pod, inner, inherited, visited, out)?;
        }
        Ok(())
    }
}
