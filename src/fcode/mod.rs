//! fcode 中间表示
//!
//! Pod 归档在内存中的模型：名字表、三张引用表、六张字面量表、
//! 类型元数据以及按需读取的类型体。

pub mod builder;
pub mod errors;
pub mod opcode;
pub mod pod;
pub mod reader;
pub mod store;
pub mod tables;
pub mod type_ref;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::{FcodeError, FcodeResult};
pub use opcode::{FOpcode, OperandShape};
pub use pod::FPod;
pub use reader::FReader;
pub use store::{FStore, MemStore, ZipStore};
pub use tables::{FLiterals, FTables};
pub use type_ref::{FTypeRef, StackType};
pub use types::{FAttrs, FErrEntry, FField, FLine, FMethod, FType, FVar};

/// pod.def magic
pub const FCODE_MAGIC: u32 = 0x0FC0_DE05;

/// Supported fcode version (1.0.22)
pub const FCODE_VERSION: u32 = 0x0100_0016;

/// 空引用（例如无基类）
pub const NULL_INDEX: u16 = 0xFFFF;

/// Slot flags
pub mod flags {
    pub const ABSTRACT: u32 = 0x0000_0001;
    pub const CONST: u32 = 0x0000_0002;
    pub const CTOR: u32 = 0x0000_0004;
    pub const ENUM: u32 = 0x0000_0008;
    pub const FINAL: u32 = 0x0000_0010;
    pub const GETTER: u32 = 0x0000_0020;
    pub const INTERNAL: u32 = 0x0000_0040;
    pub const MIXIN: u32 = 0x0000_0080;
    pub const NATIVE: u32 = 0x0000_0100;
    pub const OVERRIDE: u32 = 0x0000_0200;
    pub const PRIVATE: u32 = 0x0000_0400;
    pub const PROTECTED: u32 = 0x0000_0800;
    pub const PUBLIC: u32 = 0x0000_1000;
    pub const SETTER: u32 = 0x0000_2000;
    pub const STATIC: u32 = 0x0000_4000;
    pub const STORAGE: u32 = 0x0000_8000;
    pub const SYNTHETIC: u32 = 0x0001_0000;
    pub const VIRTUAL: u32 = 0x0002_0000;

    /// 方法变量标记：参数
    pub const PARAM: u8 = 0x01;
}

/// Attribute names
pub mod attr {
    pub const ERR_TABLE: &str = "ErrTable";
    pub const FACETS: &str = "Facets";
    pub const LINE_NUMBER: &str = "LineNumber";
    pub const LINE_NUMBERS: &str = "LineNumbers";
    pub const PARAM_DEFAULT: &str = "ParamDefault";
    pub const SOURCE_FILE: &str = "SourceFile";
}

/// Archive entry names
pub mod entry {
    pub const NAMES: &str = "fcode/names.def";
    pub const TYPE_REFS: &str = "fcode/typeRefs.def";
    pub const FIELD_REFS: &str = "fcode/fieldRefs.def";
    pub const METHOD_REFS: &str = "fcode/methodRefs.def";
    pub const POD_META: &str = "fcode/pod.def";
    pub const TYPE_META: &str = "fcode/types.def";
    pub const INTS: &str = "fcode/ints.def";
    pub const FLOATS: &str = "fcode/floats.def";
    pub const DECIMALS: &str = "fcode/decimals.def";
    pub const STRS: &str = "fcode/strs.def";
    pub const DURATIONS: &str = "fcode/durations.def";
    pub const URIS: &str = "fcode/uris.def";

    /// 类型体条目名
    pub fn type_body(name: &str) -> String {
        format!("fcode/{}.fcode", name)
    }
}
