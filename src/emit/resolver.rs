//! 引用解析
//!
//! 把 fcode 的方法/字段引用翻译为 JVM 调用签名与调用指令，并按
//! `(引用, 调用种类)` 缓存。同一个方法引用在虚调用与非虚调用下会解析到
//! 不同的目标方法：
//!
//! ```text
//! CallVirtual     Obj.toStr  ->  INVOKESTATIC  fan/sys/FanObj.toStr(Ljava/lang/Object;)Ljava/lang/String;
//! CallNonVirtual  Obj.toStr  ->  INVOKESPECIAL fan/sys/FanObj.toStr()Ljava/lang/String;
//! ```
//!
//! 因此缓存键必须包含调用种类。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::intrinsic::{self, Intrinsic};
use super::{EmitError, EmitResult};
use crate::fcode::{FOpcode, FTables, FTypeRef};
use crate::jvm::opcodes::*;

/// 八种调用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    New,
    Ctor,
    Static,
    Virtual,
    NonVirtual,
    MixinStatic,
    MixinVirtual,
    MixinNonVirtual,
}

impl CallKind {
    pub fn from_opcode(op: FOpcode) -> Option<Self> {
        Some(match op {
            FOpcode::CallNew => CallKind::New,
            FOpcode::CallCtor => CallKind::Ctor,
            FOpcode::CallStatic => CallKind::Static,
            FOpcode::CallVirtual => CallKind::Virtual,
            FOpcode::CallNonVirtual => CallKind::NonVirtual,
            FOpcode::CallMixinStatic => CallKind::MixinStatic,
            FOpcode::CallMixinVirtual => CallKind::MixinVirtual,
            FOpcode::CallMixinNonVirtual => CallKind::MixinNonVirtual,
            _ => return None,
        })
    }

    /// 只有这几种调用会被替换为内建运算
    pub fn allows_intrinsic(self) -> bool {
        matches!(
            self,
            CallKind::New | CallKind::Static | CallKind::Virtual | CallKind::MixinStatic
        )
    }
}

/// 解析后的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JCall {
    /// 内建运算，不产生方法调用
    Intrinsic(Intrinsic),
    /// 方法调用
    Invoke(Invoke),
}

/// JVM 调用指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    /// INVOKESTATIC / INVOKEVIRTUAL / INVOKESPECIAL / INVOKEINTERFACE
    pub op: u8,
    /// `owner.name(args)ret`
    pub sig: String,
    /// INVOKEINTERFACE 的参数槽位数（含接收者）
    pub interface_slots: Option<u8>,
    /// 以静态方法加显式 self 参数调用
    pub explicit_self: bool,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Default)]
struct CallCache {
    calls: HashMap<(u16, CallKind), Arc<JCall>>,
    stats: CacheStats,
}

/// 每个 pod 一个解析器
pub struct Resolver<'a> {
    tables: &'a FTables,
    calls: Mutex<CallCache>,
    fields: Mutex<HashMap<(u16, bool), Arc<str>>>,
}

impl<'a> Resolver<'a> {
    pub fn new(tables: &'a FTables) -> Self {
        Self {
            tables,
            calls: Mutex::new(CallCache::default()),
            fields: Mutex::new(HashMap::new()),
        }
    }

    pub fn tables(&self) -> &'a FTables {
        self.tables
    }

    /// typeRef 查找，失败视为无法解析的输入
    pub fn type_ref(
        &self,
        index: u16,
    ) -> EmitResult<&'a FTypeRef> {
        self.tables
            .type_ref(index)
            .map_err(|e| EmitError::Unresolved(format!("typeRef: {}", e)))
    }

    /// 解析方法调用
    pub fn call(
        &self,
        index: u16,
        kind: CallKind,
    ) -> EmitResult<Arc<JCall>> {
        {
            let mut cache = self.calls.lock();
            if let Some(hit) = cache.calls.get(&(index, kind)).cloned() {
                cache.stats.hits += 1;
                return Ok(hit);
            }
        }

        let call = Arc::new(self.compute_call(index, kind)?);
        let mut cache = self.calls.lock();
        cache.stats.misses += 1;
        // 两个线程同时未命中时保留先写入的那个
        let entry = cache.calls.entry((index, kind)).or_insert(call);
        Ok(Arc::clone(entry))
    }

    /// 解析字段签名 `owner.name:desc`；mixin 静态字段放在 `jimpl$` 上
    pub fn field(
        &self,
        index: u16,
        mixin: bool,
    ) -> EmitResult<Arc<str>> {
        if let Some(hit) = self.fields.lock().get(&(index, mixin)) {
            return Ok(Arc::clone(hit));
        }

        let f = self
            .tables
            .field_ref(index)
            .map_err(|e| EmitError::Unresolved(format!("fieldRef: {}", e)))?;
        let parent = self.type_ref(f.parent)?;
        let ty = self.type_ref(f.type_ref)?;

        let mut sig = String::with_capacity(64);
        sig.push_str(parent.jimpl());
        if mixin {
            sig.push('$');
        }
        sig.push('.');
        sig.push_str(&f.name);
        sig.push(':');
        ty.jsig_into(&mut sig);

        let sig: Arc<str> = Arc::from(sig);
        let mut fields = self.fields.lock();
        let entry = fields.entry((index, mixin)).or_insert(sig);
        Ok(Arc::clone(entry))
    }

    pub fn stats(&self) -> CacheStats {
        self.calls.lock().stats
    }

    fn compute_call(
        &self,
        index: u16,
        kind: CallKind,
    ) -> EmitResult<JCall> {
        let m = self
            .tables
            .method_ref(index)
            .map_err(|e| EmitError::Unresolved(format!("methodRef: {}", e)))?;
        let parent = self.type_ref(m.parent)?;

        if kind.allows_intrinsic() {
            if let Some(special) = intrinsic::lookup(parent, &m.name) {
                return Ok(JCall::Intrinsic(special));
            }
        }

        let params = m
            .params
            .iter()
            .map(|&p| self.type_ref(p))
            .collect::<EmitResult<Vec<_>>>()?;
        let ret = self.type_ref(m.ret)?;

        let jname = parent.jname();
        let jimpl = parent.jimpl();
        let mut op = INVOKESTATIC;
        let mut explicit_self = false;
        let mut interface_slots = None;
        let mut sig = String::with_capacity(96);

        match kind {
            CallKind::New => {
                push_owner(&mut sig, jname, &m.name, "");
                push_params(&mut sig, &params);
                parent.jsig_into(&mut sig);
            }
            CallKind::Ctor if m.name == "<init>" => {
                op = INVOKESPECIAL;
                push_owner(&mut sig, jname, "<init>", "");
                push_params(&mut sig, &params);
                sig.push('V');
            }
            CallKind::Ctor => {
                push_owner(&mut sig, jname, &m.name, "$");
                parent.jsig_into(&mut sig);
                push_params(&mut sig, &params);
                sig.push('V');
            }
            CallKind::Static => {
                push_owner(&mut sig, jimpl, &m.name, "");
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
            }
            CallKind::Virtual => {
                push_owner(&mut sig, jimpl, &m.name, "");
                if jname != jimpl {
                    // 装箱值类型的逻辑在 FanXxx 静态方法里
                    explicit_self = true;
                    parent.jsig_into(&mut sig);
                } else {
                    op = INVOKEVIRTUAL;
                }
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
            }
            CallKind::NonVirtual => {
                op = INVOKESPECIAL;
                push_owner(&mut sig, jimpl, &m.name, "");
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
            }
            CallKind::MixinStatic => {
                sig.push_str(jimpl);
                sig.push('$');
                sig.push('.');
                sig.push_str(&m.name);
                sig.push('(');
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
            }
            CallKind::MixinVirtual => {
                op = INVOKEINTERFACE;
                push_owner(&mut sig, jname, &m.name, "");
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
                let slots: u16 = 1 + params.iter().map(|p| p.stack.slots().max(1)).sum::<u16>();
                let slots = u8::try_from(slots)
                    .map_err(|_| EmitError::Internal(format!("too many args: {}", m.name)))?;
                interface_slots = Some(slots);
            }
            CallKind::MixinNonVirtual => {
                explicit_self = true;
                sig.push_str(jname);
                sig.push('$');
                sig.push('.');
                sig.push_str(&m.name);
                sig.push('(');
                parent.jsig_into(&mut sig);
                push_params(&mut sig, &params);
                ret.jsig_into(&mut sig);
            }
        }

        debug!("resolve {:?} {}.{} -> {}", kind, parent, m.name, sig);
        Ok(JCall::Invoke(Invoke {
            op,
            sig,
            interface_slots,
            explicit_self,
        }))
    }
}

/// `owner.name<suffix>(`，右括号由 `push_params` 补上
fn push_owner(
    sig: &mut String,
    owner: &str,
    name: &str,
    suffix: &str,
) {
    sig.push_str(owner);
    sig.push('.');
    sig.push_str(name);
    sig.push_str(suffix);
    sig.push('(');
}

fn push_params(
    sig: &mut String,
    params: &[&FTypeRef],
) {
    for p in params {
        p.jsig_into(sig);
    }
    sig.push(')');
}
