//! 随机输入测试：proptest 验证执行语义，quickcheck 验证解码器不崩溃

use std::sync::Arc;

use fanjvm::emit::PodConstants;
use fanjvm::emit_pod;
use fanjvm::fcode::builder::{Asm, MethodDef, PodBuilder, TypeDef, VarDef};
use fanjvm::fcode::opcode::disassemble;
use fanjvm::fcode::{flags, FOpcode, FPod, ZipStore};
use fanjvm::jvm::opcodes::{instr_len, GOTO, TABLESWITCH};
use fanjvm::jvm::ParsedClass;
use fanjvm::util::config::EmitConfig;
use proptest::prelude::*;

use crate::sim::{Machine, Value};

/// 每种比较一个静态方法：`cmpN(a, b) = a OP b`
fn compare_machine() -> Machine {
    let ops = [
        FOpcode::CompareEQ,
        FOpcode::CompareNE,
        FOpcode::CompareLT,
        FOpcode::CompareLE,
        FOpcode::CompareGT,
        FOpcode::CompareGE,
    ];
    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let int = b.sys("Int");
    let bool_t = b.sys("Bool");
    let calc = b.type_ref("acme", "Calc", "");
    let mut t = TypeDef::new(calc, Some(obj), flags::PUBLIC);
    for (i, op) in ops.iter().enumerate() {
        let mut a = Asm::new();
        a.op1(FOpcode::LoadVar, 0)
            .op1(FOpcode::LoadVar, 1)
            .op2(*op, int, int);
        let site = a.jump(FOpcode::JumpFalse);
        a.op(FOpcode::LoadTrue).op(FOpcode::ReturnObj);
        let other = a.here();
        a.patch(site, other);
        a.op(FOpcode::LoadFalse).op(FOpcode::ReturnObj);
        t = t.method(
            MethodDef::new(&format!("cmp{}", i), flags::PUBLIC | flags::STATIC, bool_t)
                .param(VarDef::new("a", int))
                .param(VarDef::new("b", int))
                .code(a.build()),
        );
    }
    b.add_type(t);
    let pod = b.build().unwrap();
    let classes = emit_pod(&pod, &EmitConfig::default()).unwrap();
    Machine::new(&classes, "acme", PodConstants::populate(&pod.literals))
}

/// `static Void f(Int p0 .. p7)`：先对每个 reg 做 `LoadVar; Pop`，再按 `tail` 收尾
fn prefixed_method(
    regs: &[u16],
    tail: impl FnOnce(&mut Asm, u16),
) -> ParsedClass {
    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let int = b.sys("Int");
    let void = b.sys("Void");
    let calc = b.type_ref("acme", "Calc", "");
    let mut a = Asm::new();
    for &r in regs {
        a.op1(FOpcode::LoadVar, r).op1(FOpcode::Pop, int);
    }
    tail(&mut a, int);
    let mut m = MethodDef::new("f", flags::PUBLIC | flags::STATIC, void);
    for i in 0..8 {
        m = m.param(VarDef::new(&format!("p{}", i), int));
    }
    b.add_type(TypeDef::new(calc, Some(obj), flags::PUBLIC).method(m.code(a.build())));
    let pod = b.build().unwrap();
    let classes = emit_pod(&pod, &EmitConfig::default()).unwrap();
    let cls = classes.iter().find(|c| c.name == "fan/acme/Calc").unwrap();
    ParsedClass::parse(&cls.bytes).unwrap()
}

fn f_code(cls: &ParsedClass) -> Vec<u8> {
    cls.method("f", "(JJJJJJJJ)V")
        .unwrap()
        .code
        .as_ref()
        .unwrap()
        .code
        .clone()
}

fn read_i32(
    code: &[u8],
    at: usize,
) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

proptest! {
    /// tableswitch 的 default 字段总是落在 4 字节边界
    #[test]
    fn prop_switch_table_aligned(regs in proptest::collection::vec(0u16..8, 0..12)) {
        let cls = prefixed_method(&regs, |a, _| {
            a.op1(FOpcode::LoadVar, 0);
            let sites = a.switch(2);
            let t0 = a.here();
            a.op(FOpcode::ReturnVoid);
            let t1 = a.here();
            a.op(FOpcode::ReturnVoid);
            a.patch(sites[0], t0).patch(sites[1], t1);
        });
        let code = f_code(&cls);
        let mut at = 0;
        while code[at] != TABLESWITCH {
            at += instr_len(&code, at);
        }
        let base = (at + 4) & !3;
        prop_assert!(code[at + 1..base].iter().all(|&b| b == 0));
        prop_assert_eq!(read_i32(&code, base + 4), 0);
        prop_assert_eq!(read_i32(&code, base + 8), 1);
        // 两个目标是 switch 之后的两条 RETURN
        let end = base + 12 + 8;
        prop_assert_eq!(read_i32(&code, base + 12) as usize, end - at);
        prop_assert_eq!(read_i32(&code, base + 16) as usize, end + 1 - at);
    }

    /// 越过任意前缀的前向跳转落在 RETURN 上
    #[test]
    fn prop_forward_jump_relocated(regs in proptest::collection::vec(0u16..8, 0..16)) {
        let cls = prefixed_method(&[], |a, int| {
            let site = a.jump(FOpcode::Jump);
            for &r in &regs {
                a.op1(FOpcode::LoadVar, r).op1(FOpcode::Pop, int);
            }
            let end = a.here();
            a.patch(site, end);
            a.op(FOpcode::ReturnVoid);
        });
        let code = f_code(&cls);
        prop_assert_eq!(code[0], GOTO);
        let off = i16::from_be_bytes([code[1], code[2]]) as usize;
        prop_assert_eq!(off, code.len() - 1);
    }

    /// n 个参数中后 k 个有默认值时发出 k + 1 个重载
    #[test]
    fn prop_default_cascade_arities(n in 1usize..6, k_seed in 0usize..6) {
        let k = k_seed % (n + 1);
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let int = b.sys("Int");
        let zero = b.int(0);
        let calc = b.type_ref("acme", "Calc", "");
        let mut body = Asm::new();
        body.op1(FOpcode::LoadVar, 0).op(FOpcode::ReturnObj);
        let mut m = MethodDef::new("f", flags::PUBLIC | flags::STATIC, int);
        for i in 0..n {
            let mut v = VarDef::new(&format!("p{}", i), int);
            if i >= n - k {
                let mut d = Asm::new();
                d.op1(FOpcode::LoadInt, zero);
                v = v.with_default(d.build());
            }
            m = m.param(v);
        }
        b.add_type(TypeDef::new(calc, Some(obj), flags::PUBLIC).method(m.code(body.build())));
        let pod = b.build().unwrap();
        let classes = emit_pod(&pod, &EmitConfig::default()).unwrap();
        let cls = classes.iter().find(|c| c.name == "fan/acme/Calc").unwrap();
        let cls = ParsedClass::parse(&cls.bytes).unwrap();
        let mut arities: Vec<usize> = cls
            .methods_named("f")
            .iter()
            .map(|m| m.desc.matches('J').count() - 1)
            .collect();
        arities.sort_unstable();
        let want: Vec<usize> = (n - k..=n).collect();
        prop_assert_eq!(arities, want);
    }

    #[test]
    fn prop_fused_compare_matches_rust(a in any::<i64>(), b in any::<i64>()) {
        let vm = compare_machine();
        let expected = [a == b, a != b, a < b, a <= b, a > b, a >= b];
        for (i, want) in expected.iter().enumerate() {
            let r = vm
                .invoke(
                    "fan/acme/Calc",
                    &format!("cmp{}", i),
                    "(JJ)Z",
                    vec![Value::Long(a), Value::Long(b)],
                )
                .unwrap()
                .unwrap();
            prop_assert_eq!(r.int() == 1, *want, "cmp{}({}, {})", i, a, b);
        }
    }

    #[test]
    fn prop_small_value_compare_edges(a in -3i64..3, b in -3i64..3) {
        let vm = compare_machine();
        let r = vm
            .invoke("fan/acme/Calc", "cmp2", "(JJ)Z", vec![Value::Long(a), Value::Long(b)])
            .unwrap()
            .unwrap();
        prop_assert_eq!(r.int() == 1, a < b);
    }
}

/// QuickCheck tests using quickcheck
mod quickcheck_tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};

    /// 任意字节作为 fcode 时只返回错误，不崩溃
    #[test]
    fn quickcheck_disassemble_total() {
        fn prop(code: Vec<u8>) -> TestResult {
            let _ = disassemble(&code);
            TestResult::passed()
        }
        quickcheck(prop as fn(Vec<u8>) -> TestResult);
    }

    /// 任意字节作为 pod 归档时只返回错误，不崩溃
    #[test]
    fn quickcheck_zip_store_total() {
        fn prop(data: Vec<u8>) -> TestResult {
            if let Ok(store) = ZipStore::from_bytes(data) {
                let _ = FPod::load(Arc::new(store));
            }
            TestResult::passed()
        }
        quickcheck(prop as fn(Vec<u8>) -> TestResult);
    }
}
