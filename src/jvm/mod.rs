//! JVM class 文件编码层
//!
//! 后端只通过 `ConstantPool`、`CodeBuffer` 与 `ClassFile` 写出字节；
//! 换用另一种栈机目标格式时只需替换本模块。

pub mod class_file;
pub mod code;
pub mod constant_pool;
pub mod opcodes;
pub mod reader;

#[cfg(test)]
mod tests;

pub use class_file::{ClassFile, FieldInfo, MethodInfo};
pub use code::{CodeBuffer, ExceptionEntry, Label, LineEntry};
pub use constant_pool::{Constant, ConstantPool};
pub use reader::{ParsedClass, ParsedCode, ParsedMethod};

use thiserror::Error;

/// class 文件魔数
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Class result
pub type ClassResult<T> = Result<T, ClassError>;

/// class 文件编码错误
#[derive(Debug, Error)]
pub enum ClassError {
    #[error("Constant pool overflow")]
    PoolOverflow,

    #[error("Method code too large: {0} bytes")]
    CodeTooLarge(usize),

    #[error("Local variable index out of range: {0}")]
    LocalOutOfRange(u16),

    #[error("Branch offset out of range: {0}")]
    BranchOutOfRange(i64),

    #[error("Malformed member signature: {0}")]
    BadSignature(String),

    #[error("Malformed class file: {0}")]
    Malformed(String),
}
