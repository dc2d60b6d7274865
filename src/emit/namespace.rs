//! 跨 pod 的类型查找
//!
//! 发出基类链与 mixin 路由时需要读取其他 pod 的类型体。

use indexmap::IndexMap;

use super::{EmitError, EmitResult};
use crate::fcode::{FPod, FType, FTypeRef};

/// 已加载的 pod 集合
#[derive(Debug, Default)]
pub struct Namespace<'a> {
    pods: IndexMap<String, &'a FPod>,
}

impl<'a> Namespace<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只含一个 pod
    pub fn single(pod: &'a FPod) -> Self {
        let mut ns = Self::new();
        ns.add(pod);
        ns
    }

    pub fn add(
        &mut self,
        pod: &'a FPod,
    ) {
        self.pods.insert(pod.name.clone(), pod);
    }

    pub fn pod(
        &self,
        name: &str,
    ) -> Option<&'a FPod> {
        self.pods.get(name).copied()
    }

    /// 按加入顺序
    pub fn pods(&self) -> impl Iterator<Item = &'a FPod> + '_ {
        self.pods.values().copied()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// 按类型引用查找；不在命名空间中的 pod 返回 `None`
    pub fn lookup(
        &self,
        t: &FTypeRef,
    ) -> EmitResult<Option<(&'a FPod, &'a FType)>> {
        let Some(pod) = self.pod(&t.pod) else {
            return Ok(None);
        };
        let Some(index) = pod.find_type(&t.name) else {
            return Err(EmitError::Unresolved(format!("type {}", t.qname())));
        };
        let ty = &pod.types[index];
        if ty.hollow {
            return Err(EmitError::Internal(format!(
                "type {} body not read",
                t.qname()
            )));
        }
        Ok(Some((pod, ty)))
    }

    /// 在 `pod` 自己的 typeRef 表中解析
    pub fn resolve(
        pod: &'a FPod,
        index: u16,
    ) -> EmitResult<&'a FTypeRef> {
        pod.tables
            .type_ref(index)
            .map_err(|e| EmitError::Unresolved(format!("typeRef: {}", e)))
    }
}
