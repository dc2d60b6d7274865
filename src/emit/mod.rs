//! JVM 后端
//!
//! 把 pod 中的每个类型翻译为一个或多个 class 文件：
//!
//! ```text
//! FPod ──▶ Resolver ──▶ CodeEmit (每个方法体)
//!   │                      ▲
//!   │                      │
//!   ├──▶ type_emit ──▶ method_emit ──▶ ClassFile ──▶ EmittedClass
//!   ├──▶ pod_const (fan/<pod>/$Pod)
//!   └──▶ synthetic ($Val, $Dynamic)
//! ```

pub mod code;
pub mod context;
pub mod intrinsic;
pub mod jump;
pub mod method_emit;
pub mod namespace;
pub mod pod_const;
pub mod resolver;
pub mod synthetic;
pub mod type_emit;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info};

use crate::fcode::{FPod, FcodeError};
use crate::jvm::ClassError;
use crate::util::config::EmitConfig;

pub use code::{CodeEmit, Frame, Local, MethodCode, SelfMode};
pub use context::ClassCtx;
pub use namespace::Namespace;
pub use pod_const::{ConstValue, PodConstants};
pub use resolver::{CacheStats, CallKind, Invoke, JCall, Resolver};

/// 后端错误
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("unknown opcode {op} in {method}")]
    UnknownOpcode { op: u8, method: String },

    #[error("bad operand for {op} in {method}: {detail}")]
    BadOperand {
        op: String,
        method: String,
        detail: String,
    },

    #[error("no relocation for fcode offset {target} in {method}")]
    MissingReloc { target: u16, method: String },

    #[error("jump offset {offset} out of range in {method}")]
    JumpOutOfRange { offset: i64, method: String },

    #[error("cannot coerce {from} to {to}")]
    BadCoerce { from: String, to: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unresolved reference: {0}")]
    Unresolved(String),

    #[error(transparent)]
    Fcode(#[from] FcodeError),

    #[error(transparent)]
    Class(#[from] ClassError),
}

impl EmitError {
    /// 后端自身不变量被破坏（而不是输入有误）
    pub fn is_internal(&self) -> bool {
        match self {
            EmitError::UnknownOpcode { .. }
            | EmitError::BadOperand { .. }
            | EmitError::MissingReloc { .. }
            | EmitError::JumpOutOfRange { .. }
            | EmitError::BadCoerce { .. }
            | EmitError::Internal(_) => true,
            EmitError::Fcode(FcodeError::UnknownOpcode(_)) => true,
            EmitError::Unresolved(_) | EmitError::Fcode(_) | EmitError::Class(_) => false,
        }
    }
}

pub type EmitResult<T> = Result<T, EmitError>;

/// 一个输出的 class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedClass {
    /// JVM 内部名，如 `fan/acme/Widget`
    pub name: String,
    pub bytes: Vec<u8>,
}

impl EmittedClass {
    /// 相对输出目录的路径
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.class", self.name))
    }
}

/// 整个 pod 的发出器
pub struct PodEmitter<'a> {
    pod: &'a FPod,
    namespace: &'a Namespace<'a>,
    config: &'a EmitConfig,
}

impl<'a> PodEmitter<'a> {
    pub fn new(
        pod: &'a FPod,
        namespace: &'a Namespace<'a>,
        config: &'a EmitConfig,
    ) -> Self {
        Self {
            pod,
            namespace,
            config,
        }
    }

    /// 发出 `$Pod` 以及全部类型；类型体必须已经读取
    pub fn emit(&self) -> EmitResult<Vec<EmittedClass>> {
        let resolver = Resolver::new(&self.pod.tables);
        let result = self.emit_with(&resolver);
        match &result {
            Ok(classes) => info!(
                "emitted pod {}: {} classes ({} types)",
                self.pod.name,
                classes.len(),
                self.pod.types.len()
            ),
            Err(e) if e.is_internal() => error!("aborting pod {}: {}", self.pod.name, e),
            Err(_) => {}
        }
        result
    }

    fn emit_with(
        &self,
        resolver: &Resolver<'_>,
    ) -> EmitResult<Vec<EmittedClass>> {
        let mut out = vec![pod_const::emit_pod_class(self.pod, self.config)?];

        let emit_one = |index: usize| {
            type_emit::emit_type(self.pod, self.namespace, resolver, self.config, index)
        };
        let per_type: Vec<Vec<EmittedClass>> = if self.config.parallel {
            (0..self.pod.types.len())
                .into_par_iter()
                .map(emit_one)
                .collect::<EmitResult<_>>()?
        } else {
            (0..self.pod.types.len())
                .map(emit_one)
                .collect::<EmitResult<_>>()?
        };
        out.extend(per_type.into_iter().flatten());
        Ok(out)
    }
}
