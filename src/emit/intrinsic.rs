//! 内建运算
//!
//! Bool / Int / Float 的算术与位运算，以及原生数组的 `make/size/get/set`，
//! 直接翻译为 JVM 指令序列，不经过方法调用。

use std::collections::HashMap;

use once_cell::sync::Lazy;
use smallvec::{smallvec, SmallVec};

use crate::fcode::{FTypeRef, StackType};
use crate::jvm::opcodes::*;

/// 指令序列
pub type OpSeq = SmallVec<[u8; 4]>;

/// 内建运算的发出方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intrinsic {
    /// 直接发出的零操作数指令
    Ops(OpSeq),
    /// `NEW cls; DUP`
    New(String),
    /// `LDC_W cls`
    ClassLiteral(String),
    /// `NEWARRAY atype`
    NewArray(u8),
}

type Table = HashMap<&'static str, OpSeq>;

static BOOL_OPS: Lazy<Table> = Lazy::new(|| {
    let mut t: Table = HashMap::new();
    t.insert("and", smallvec![IAND]);
    t.insert("or", smallvec![IOR]);
    t.insert("xor", smallvec![IXOR]);
    t
});

static INT_OPS: Lazy<Table> = Lazy::new(|| {
    let mut t: Table = HashMap::new();
    t.insert("negate", smallvec![LNEG]);
    t.insert("plus", smallvec![LADD]);
    t.insert("minus", smallvec![LSUB]);
    t.insert("mult", smallvec![LMUL]);
    t.insert("div", smallvec![LDIV]);
    t.insert("mod", smallvec![LREM]);
    t.insert("and", smallvec![LAND]);
    t.insert("or", smallvec![LOR]);
    t.insert("xor", smallvec![LXOR]);
    // 移位量是 int
    t.insert("shiftl", smallvec![L2I, LSHL]);
    t.insert("shiftr", smallvec![L2I, LUSHR]);
    t.insert("shifta", smallvec![L2I, LSHR]);
    // 栈上 [long, double]：把 long 换到顶部再转换，只用于可交换运算
    t.insert("plusFloat", smallvec![DUP2_X2, POP2, L2D, DADD]);
    t.insert("multFloat", smallvec![DUP2_X2, POP2, L2D, DMUL]);
    t
});

static FLOAT_OPS: Lazy<Table> = Lazy::new(|| {
    let mut t: Table = HashMap::new();
    t.insert("negate", smallvec![DNEG]);
    t.insert("plus", smallvec![DADD]);
    t.insert("minus", smallvec![DSUB]);
    t.insert("mult", smallvec![DMUL]);
    t.insert("div", smallvec![DDIV]);
    t.insert("mod", smallvec![DREM]);
    t.insert("plusInt", smallvec![L2D, DADD]);
    t.insert("minusInt", smallvec![L2D, DSUB]);
    t.insert("multInt", smallvec![L2D, DMUL]);
    t.insert("divInt", smallvec![L2D, DDIV]);
    t.insert("modInt", smallvec![L2D, DREM]);
    t
});

/// 查找内建运算
pub fn lookup(
    parent: &FTypeRef,
    name: &str,
) -> Option<Intrinsic> {
    match name {
        "<new>" => return Some(Intrinsic::New(parent.jname().to_string())),
        "<class>" => return Some(Intrinsic::ClassLiteral(parent.jname().to_string())),
        _ => {}
    }

    if let Some(elem) = parent.array_of_stack_type() {
        return array_op(elem, name);
    }

    let table: &Table = if parent.is_bool() {
        &BOOL_OPS
    } else if parent.is_int() {
        &INT_OPS
    } else if parent.is_float() {
        &FLOAT_OPS
    } else {
        return None;
    };
    table.get(name).cloned().map(Intrinsic::Ops)
}

fn array_op(
    elem: StackType,
    name: &str,
) -> Option<Intrinsic> {
    let (atype, load, store) = match elem {
        StackType::Bool => (T_BOOLEAN, BALOAD, BASTORE),
        StackType::Byte => (T_BYTE, BALOAD, BASTORE),
        StackType::Short => (T_SHORT, SALOAD, SASTORE),
        StackType::Char => (T_CHAR, CALOAD, CASTORE),
        StackType::Int => (T_INT, IALOAD, IASTORE),
        StackType::Long => (T_LONG, LALOAD, LASTORE),
        StackType::Float => (T_FLOAT, FALOAD, FASTORE),
        StackType::Double => (T_DOUBLE, DALOAD, DASTORE),
        StackType::Obj | StackType::Void => return None,
    };
    match name {
        "make" => Some(Intrinsic::NewArray(atype)),
        "size" => Some(Intrinsic::Ops(smallvec![ARRAYLENGTH])),
        "get" => Some(Intrinsic::Ops(smallvec![load])),
        "set" => Some(Intrinsic::Ops(smallvec![store])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys(name: &str) -> FTypeRef {
        FTypeRef::new("sys", name, "")
    }

    #[test]
    fn test_int_plus_is_ladd() {
        assert_eq!(
            lookup(&sys("Int"), "plus"),
            Some(Intrinsic::Ops(smallvec![LADD]))
        );
    }

    #[test]
    fn test_shift_converts_count() {
        assert_eq!(
            lookup(&sys("Int"), "shiftl"),
            Some(Intrinsic::Ops(smallvec![L2I, LSHL]))
        );
    }

    #[test]
    fn test_int_plus_float_converts_receiver() {
        assert_eq!(
            lookup(&sys("Int"), "plusFloat"),
            Some(Intrinsic::Ops(smallvec![DUP2_X2, POP2, L2D, DADD]))
        );
        assert_eq!(lookup(&sys("Int"), "minusFloat"), None);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(lookup(&sys("Int"), "toHex"), None);
        assert_eq!(lookup(&sys("Str"), "plus"), None);
    }

    #[test]
    fn test_new_and_class_on_any_type() {
        let w = FTypeRef::new("acme", "Widget", "");
        assert_eq!(lookup(&w, "<new>"), Some(Intrinsic::New("fan/acme/Widget".into())));
        assert_eq!(
            lookup(&w, "<class>"),
            Some(Intrinsic::ClassLiteral("fan/acme/Widget".into()))
        );
    }

    #[test]
    fn test_array_ops() {
        let bytes = FTypeRef::new("[java]fanx.interop", "ByteArray", "");
        assert_eq!(lookup(&bytes, "make"), Some(Intrinsic::NewArray(T_BYTE)));
        assert_eq!(lookup(&bytes, "get"), Some(Intrinsic::Ops(smallvec![BALOAD])));
        let longs = FTypeRef::new("[java]fanx.interop", "LongArray", "");
        assert_eq!(lookup(&longs, "set"), Some(Intrinsic::Ops(smallvec![LASTORE])));
        assert_eq!(lookup(&longs, "size"), Some(Intrinsic::Ops(smallvec![ARRAYLENGTH])));
    }
}
