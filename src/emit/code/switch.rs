//! Switch -> tableswitch
//!
//! ```text
//! L2I
//! tableswitch  <0-3 字节填充，使 default 对齐到 4>
//!   default  (落空：紧接 tableswitch 之后)
//!   low = 0
//!   high = count - 1
//!   offset[0..count]
//! ```

use super::CodeEmit;
use crate::emit::jump::{JumpKind, JumpNode};
use crate::jvm::opcodes::*;

impl<'c, 'a> CodeEmit<'c, 'a> {
    pub(super) fn switch(
        &mut self,
        targets: &[u16],
    ) {
        if targets.is_empty() {
            // 没有分支时只需丢弃 Int 值
            self.code.op(POP2);
            return;
        }

        self.code.op(L2I);
        let start = self.code.pos();
        self.code.op(TABLESWITCH);
        let pad = self.code.pad4();
        let count = targets.len();
        let default = 1 + pad + 12 + count * 4;
        self.code.u4(default as u32);
        self.code.u4(0);
        self.code.u4((count - 1) as u32);
        for &target in targets {
            let at = self.code.pos();
            self.code.u4(0xFFFF_FFFF);
            self.jumps.push(JumpNode {
                target,
                from: start,
                at,
                kind: JumpKind::Switch,
                scope: self.scope,
            });
        }
    }
}
