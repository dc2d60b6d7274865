//! JVM 后端测试
//!
//! 用 `PodBuilder` 构造合成 pod，发出后再用 `ParsedClass` 读回断言。

pub mod types;

use crate::emit::{EmitResult, EmittedClass, Namespace, PodEmitter};
use crate::fcode::FPod;
use crate::jvm::opcodes::instr_len;
use crate::jvm::reader::read_u2;
use crate::jvm::{ParsedClass, ParsedCode};
use crate::util::config::EmitConfig;

/// 发出单个 pod
pub fn emit_with(
    pod: &FPod,
    config: &EmitConfig,
) -> EmitResult<Vec<ParsedClass>> {
    let ns = Namespace::single(pod);
    let classes = PodEmitter::new(pod, &ns, config).emit()?;
    Ok(parse_all(&classes))
}

pub fn emit(pod: &FPod) -> Vec<ParsedClass> {
    emit_with(pod, &EmitConfig::default()).unwrap()
}

pub fn parse_all(classes: &[EmittedClass]) -> Vec<ParsedClass> {
    classes
        .iter()
        .map(|c| ParsedClass::parse(&c.bytes).unwrap())
        .collect()
}

pub fn find<'c>(
    classes: &'c [ParsedClass],
    name: &str,
) -> &'c ParsedClass {
    classes
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no class {}", name))
}

pub fn code<'c>(
    class: &'c ParsedClass,
    name: &str,
    desc: &str,
) -> &'c ParsedCode {
    class
        .method(name, desc)
        .unwrap_or_else(|| panic!("no method {}{} in {}", name, desc, class.name))
        .code
        .as_ref()
        .unwrap_or_else(|| panic!("{}{} has no code", name, desc))
}

/// 逐条指令的操作码
pub fn ops(code: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < code.len() {
        out.push(code[at]);
        at += instr_len(code, at).max(1);
    }
    out
}

/// 第一条 `op` 指令引用的常量
pub fn operand_of(
    class: &ParsedClass,
    code: &[u8],
    op: u8,
) -> String {
    let mut at = 0;
    while at < code.len() {
        if code[at] == op {
            return class.describe(read_u2(code, at + 1)).unwrap();
        }
        at += instr_len(code, at).max(1);
    }
    panic!("no opcode 0x{:02x}", op)
}

/// 全部 `op` 指令引用的常量
pub fn operands_of(
    class: &ParsedClass,
    code: &[u8],
    op: u8,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < code.len() {
        if code[at] == op {
            out.push(class.describe(read_u2(code, at + 1)).unwrap());
        }
        at += instr_len(code, at).max(1);
    }
    out
}
