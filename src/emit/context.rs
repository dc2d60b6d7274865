//! 单个 class 的发出上下文

use indexmap::IndexMap;

use super::resolver::Resolver;
use super::{EmitResult, EmittedClass};
use crate::fcode::FPod;
use crate::jvm::opcodes::{ACC_PRIVATE, ACC_STATIC};
use crate::jvm::{ClassFile, ConstantPool};
use crate::util::config::EmitConfig;

/// `fan/sys/Type` 描述符
pub const TYPE_DESC: &str = "Lfan/sys/Type;";

/// 正在生成的 class 及其共享状态
pub struct ClassCtx<'a> {
    pub pod: &'a FPod,
    pub resolver: &'a Resolver<'a>,
    pub config: &'a EmitConfig,
    pub cf: ClassFile,
    /// 方法签名中 self 的类型；mixin 体类里是接口名
    pub self_name: String,
    /// `fan/<pod>/$Pod`
    pub pod_class: String,
    /// 类型签名 -> `type$<n>` 字段名
    type_literals: IndexMap<String, String>,
}

impl<'a> ClassCtx<'a> {
    pub fn new(
        pod: &'a FPod,
        resolver: &'a Resolver<'a>,
        config: &'a EmitConfig,
        cf: ClassFile,
        self_name: impl Into<String>,
    ) -> Self {
        Self {
            pod,
            resolver,
            config,
            cf,
            self_name: self_name.into(),
            pod_class: pod_class_name(&pod.name),
            type_literals: IndexMap::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.cf.name
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.cf.pool
    }

    /// 类型字面量的缓存字段，返回 `owner.type$n:Lfan/sys/Type;`
    pub fn type_literal_field(
        &mut self,
        sig: &str,
    ) -> String {
        let n = self.type_literals.len();
        let field = self
            .type_literals
            .entry(sig.to_string())
            .or_insert_with(|| format!("type${}", n));
        format!("{}.{}:{}", self.cf.name, field, TYPE_DESC)
    }

    pub fn type_literal_count(&self) -> usize {
        self.type_literals.len()
    }

    /// 补上类型字面量字段后序列化
    pub fn finish(mut self) -> EmitResult<EmittedClass> {
        let fields: Vec<String> = self.type_literals.values().cloned().collect();
        for f in fields {
            self.cf.add_field(ACC_PRIVATE | ACC_STATIC, &f, TYPE_DESC)?;
        }
        let name = self.cf.name.clone();
        let bytes = self.cf.finish()?;
        Ok(EmittedClass { name, bytes })
    }
}

/// pod 常量类名
pub fn pod_class_name(pod: &str) -> String {
    format!("fan/{}/$Pod", pod)
}
