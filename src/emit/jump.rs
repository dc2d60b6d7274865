//! 跳转回填
//!
//! 发出阶段只记录待回填的跳转；全部指令发出后，`JumpTable::backpatch`
//! 通过重定位表一次性写入偏移。
//!
//! 内联 finally 会把同一段 fcode 发出多次，每份拷贝有自己的重定位作用域；
//! 作用域中找不到的位置回退到父作用域。

use super::{EmitError, EmitResult};
use crate::jvm::CodeBuffer;

/// 主作用域
pub const MAIN_SCOPE: usize = 0;

/// JSR 目标与 finally 入口之间的序言长度：
/// `ASTORE ex; JSR +6; ALOAD ex; ATHROW`
pub const FINALLY_PROLOGUE: usize = 8;

/// 异常槽位超过 255 时两条局部变量指令各多出 WIDE 与一个字节
pub const WIDE_FINALLY_PROLOGUE: usize = FINALLY_PROLOGUE + 4;

/// 跳转操作数宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// u2 偏移
    Branch,
    /// tableswitch 内的 u4 偏移
    Switch,
    /// JSR 到 finally 子程序，需要跳过序言
    Finally,
}

/// 待回填的跳转
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpNode {
    /// fcode 目标偏移
    pub target: u16,
    /// 偏移的计算起点（跳转指令自身位置）
    pub from: usize,
    /// 操作数在字节码中的位置
    pub at: usize,
    pub kind: JumpKind,
    /// 解析目标时使用的重定位作用域
    pub scope: usize,
}

/// 内联拷贝的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineCopy {
    /// 触发拷贝的 JumpFinally 的 fcode 位置
    pub site: u16,
    /// FinallyStart 的 fcode 位置
    pub finally_start: u16,
    /// 拷贝的 fcode 范围 `[start, end)`
    pub start: u16,
    pub end: u16,
    /// 拷贝在字节码中的范围
    pub java_start: usize,
    pub java_end: usize,
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<usize>,
    map: Vec<Option<usize>>,
    copy: Option<InlineCopy>,
}

/// fcode 偏移到字节码偏移的映射
#[derive(Debug, Clone)]
pub struct Relocation {
    len: usize,
    scopes: Vec<Scope>,
}

impl Relocation {
    /// `len` 为 fcode 长度；位置 `len` 本身也可以被记录（方法末尾）
    pub fn new(len: usize) -> Self {
        Self {
            len,
            scopes: vec![Scope {
                parent: None,
                map: vec![None; len + 1],
                copy: None,
            }],
        }
    }

    /// 记录 `pos` 处指令的字节码位置
    pub fn record(
        &mut self,
        scope: usize,
        pos: usize,
        java: usize,
    ) {
        if let Some(slot) = self.scopes[scope].map.get_mut(pos) {
            *slot = Some(java);
        }
    }

    /// 按作用域链查找
    pub fn get(
        &self,
        scope: usize,
        pos: usize,
    ) -> Option<usize> {
        let mut s = Some(scope);
        while let Some(i) = s {
            let sc = &self.scopes[i];
            if let Some(Some(v)) = sc.map.get(pos) {
                return Some(*v);
            }
            s = sc.parent;
        }
        None
    }

    /// 只查指定作用域
    pub fn get_local(
        &self,
        scope: usize,
        pos: usize,
    ) -> Option<usize> {
        self.scopes[scope].map.get(pos).copied().flatten()
    }

    /// 为内联拷贝开新作用域
    pub fn push_scope(
        &mut self,
        parent: usize,
    ) -> usize {
        self.scopes.push(Scope {
            parent: Some(parent),
            map: vec![None; self.len + 1],
            copy: None,
        });
        self.scopes.len() - 1
    }

    /// 拷贝发出完毕后记录其范围
    pub fn close_scope(
        &mut self,
        scope: usize,
        copy: InlineCopy,
    ) {
        self.scopes[scope].copy = Some(copy);
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn parent(
        &self,
        scope: usize,
    ) -> Option<usize> {
        self.scopes[scope].parent
    }

    pub fn copy(
        &self,
        scope: usize,
    ) -> Option<&InlineCopy> {
        self.scopes[scope].copy.as_ref()
    }

    /// `scope` 的直接子拷贝
    pub fn children(
        &self,
        scope: usize,
    ) -> impl Iterator<Item = &InlineCopy> + '_ {
        self.scopes
            .iter()
            .filter(move |s| s.parent == Some(scope))
            .filter_map(|s| s.copy.as_ref())
    }

    /// 主作用域的稠密映射；未记录的位置为 `None`
    pub fn main_map(&self) -> &[Option<usize>] {
        &self.scopes[MAIN_SCOPE].map
    }
}

/// 跳转表（arena）
#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    nodes: Vec<JumpNode>,
    prologue: Option<usize>,
}

impl JumpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        node: JumpNode,
    ) {
        self.nodes.push(node);
    }

    /// 覆盖 finally 序言长度
    pub fn set_finally_prologue(
        &mut self,
        len: usize,
    ) {
        self.prologue = Some(len);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[JumpNode] {
        &self.nodes
    }

    /// 回填全部跳转
    pub fn backpatch(
        &self,
        code: &mut CodeBuffer,
        reloc: &Relocation,
        method: &str,
    ) -> EmitResult<()> {
        for node in &self.nodes {
            let target = reloc
                .get(node.scope, node.target as usize)
                .ok_or_else(|| EmitError::MissingReloc {
                    target: node.target,
                    method: method.to_string(),
                })?;
            let target = match node.kind {
                JumpKind::Finally => target + self.prologue.unwrap_or(FINALLY_PROLOGUE),
                _ => target,
            };
            let offset = target as i64 - node.from as i64;
            match node.kind {
                JumpKind::Branch | JumpKind::Finally => {
                    let v = i16::try_from(offset).map_err(|_| EmitError::JumpOutOfRange {
                        offset,
                        method: method.to_string(),
                    })?;
                    code.patch_u2(node.at, v as u16);
                }
                JumpKind::Switch => {
                    let v = i32::try_from(offset).map_err(|_| EmitError::JumpOutOfRange {
                        offset,
                        method: method.to_string(),
                    })?;
                    code.patch_u4(node.at, v as u32);
                }
            }
        }
        Ok(())
    }
}
