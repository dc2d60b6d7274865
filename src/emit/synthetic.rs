//! 合成类
//!
//! - `Foo$Val`：Err 子类的异常载体，继承关系与 Err 链一一对应
//! - `Foo$Dynamic`：运行时决定类型标签的子类

use super::context::TYPE_DESC;
use super::{EmitResult, EmittedClass};
use crate::jvm::opcodes::*;
use crate::jvm::{ClassFile, CodeBuffer};
use crate::util::config::EmitConfig;

/// 根载体类
pub const ERR_VAL: &str = "fan/sys/Err$Val";

/// `Foo$Dynamic` 中保存类型标签的字段
pub const DYNAMIC_TYPE_FIELD: &str = "$type";

/// `<name>$Val extends <super_val>`，只有无参构造器
pub fn emit_val_class(
    name: &str,
    super_val: &str,
    config: &EmitConfig,
) -> EmitResult<EmittedClass> {
    let mut cf = ClassFile::new(name, super_val, ACC_PUBLIC | ACC_SUPER, config.class_major)?;
    let init = cf.pool.method(&format!("{}.<init>()V", super_val))?;
    let mut code = CodeBuffer::new(1, 1);
    code.op(ALOAD_0);
    code.op2(INVOKESPECIAL, init);
    code.op(RETURN);
    cf.add_method(ACC_PUBLIC, "<init>", "()V", Some(code))?;

    let bytes = cf.finish()?;
    Ok(EmittedClass {
        name: name.to_string(),
        bytes,
    })
}

/// `<base>$Dynamic extends <base>`
pub fn emit_dynamic_class(
    base: &str,
    config: &EmitConfig,
) -> EmitResult<EmittedClass> {
    let name = format!("{}$Dynamic", base);
    let mut cf = ClassFile::new(&name, base, ACC_PUBLIC | ACC_SUPER, config.class_major)?;
    cf.add_field(ACC_PRIVATE | ACC_FINAL, DYNAMIC_TYPE_FIELD, TYPE_DESC)?;
    let field = cf
        .pool
        .field(&format!("{}.{}:{}", name, DYNAMIC_TYPE_FIELD, TYPE_DESC))?;
    let super_init = cf.pool.method(&format!("{}.<init>()V", base))?;

    let mut init = CodeBuffer::new(2, 2);
    init.op(ALOAD_0);
    init.op2(INVOKESPECIAL, super_init);
    init.op(ALOAD_0);
    init.op(ALOAD_1);
    init.op2(PUTFIELD, field);
    init.op(RETURN);
    cf.add_method(
        ACC_PUBLIC,
        "<init>",
        &format!("({})V", TYPE_DESC),
        Some(init),
    )?;

    let mut type_of = CodeBuffer::new(1, 1);
    type_of.op(ALOAD_0);
    type_of.op2(GETFIELD, field);
    type_of.op(ARETURN);
    cf.add_method(
        ACC_PUBLIC,
        "typeof",
        &format!("(){}", TYPE_DESC),
        Some(type_of),
    )?;

    let bytes = cf.finish()?;
    Ok(EmittedClass { name, bytes })
}
