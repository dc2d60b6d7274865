//! 端到端执行场景
//!
//! 由 PodBuilder 构造 pod，发出 class，再在 [`Machine`] 上运行。

use fanjvm::emit::{EmittedClass, PodConstants};
use fanjvm::emit_pod;
use fanjvm::fcode::builder::{Asm, MethodDef, PodBuilder, TypeDef, VarDef};
use fanjvm::fcode::{flags, FOpcode, FPod};
use fanjvm::util::config::EmitConfig;

use crate::sim::{Machine, Value};

const STATIC: u32 = flags::PUBLIC | flags::STATIC;

fn machine(pod: &FPod) -> Machine {
    let classes: Vec<EmittedClass> = emit_pod(pod, &EmitConfig::default()).unwrap();
    Machine::new(&classes, &pod.name, PodConstants::populate(&pod.literals))
}

/// 一个 `acme::Calc` 类型，包含给定的方法
fn calc_pod(
    build: impl FnOnce(&mut PodBuilder) -> Vec<MethodDef>,
) -> FPod {
    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let calc = b.type_ref("acme", "Calc", "");
    let methods = build(&mut b);
    let mut t = TypeDef::new(calc, Some(obj), flags::PUBLIC);
    for m in methods {
        t = t.method(m);
    }
    b.add_type(t);
    b.build().unwrap()
}

#[test]
fn test_static_returns_literal() {
    let pod = calc_pod(|b| {
        let int = b.sys("Int");
        let five = b.int(5);
        let mut a = Asm::new();
        a.op1(FOpcode::LoadInt, five).op(FOpcode::ReturnObj);
        vec![MethodDef::new("five", STATIC, int).code(a.build())]
    });
    let vm = machine(&pod);
    let r = vm.invoke("fan/acme/Calc", "five", "()J", vec![]).unwrap();
    assert_eq!(r.unwrap().long(), 5);
}

/// `LoadInt[0]; LoadInt[1]; CallStatic(Int.plus); Return`，常量为 2 与 3
#[test]
fn test_static_plus_of_literals() {
    let pod = calc_pod(|b| {
        let int = b.sys("Int");
        let plus = b.method_ref(int, "plus", int, &[int]);
        let two = b.int(2);
        let three = b.int(3);
        let mut a = Asm::new();
        a.op1(FOpcode::LoadInt, two)
            .op1(FOpcode::LoadInt, three)
            .op1(FOpcode::CallStatic, plus)
            .op(FOpcode::ReturnObj);
        vec![MethodDef::new("sum", STATIC, int).code(a.build())]
    });
    let vm = machine(&pod);
    let r = vm.invoke("fan/acme/Calc", "sum", "()J", vec![]).unwrap();
    assert_eq!(r.unwrap().long(), 5);
}

/// `a < b` 融合后的两个分支都能走到
#[test]
fn test_fused_compare_both_branches() {
    let pod = calc_pod(|b| {
        let int = b.sys("Int");
        let bool_t = b.sys("Bool");
        let mut a = Asm::new();
        a.op1(FOpcode::LoadVar, 0)
            .op1(FOpcode::LoadVar, 1)
            .op2(FOpcode::CompareLT, int, int);
        let site = a.jump(FOpcode::JumpFalse);
        a.op(FOpcode::LoadTrue).op(FOpcode::ReturnObj);
        let other = a.here();
        a.patch(site, other);
        a.op(FOpcode::LoadFalse).op(FOpcode::ReturnObj);
        vec![MethodDef::new("lt", STATIC, bool_t)
            .param(VarDef::new("a", int))
            .param(VarDef::new("b", int))
            .code(a.build())]
    });
    let vm = machine(&pod);
    let lt = |a: i64, b: i64| {
        vm.invoke("fan/acme/Calc", "lt", "(JJ)Z", vec![Value::Long(a), Value::Long(b)])
            .unwrap()
            .unwrap()
            .int()
    };
    assert_eq!(lt(1, 2), 1);
    assert_eq!(lt(3, 2), 0);
    assert_eq!(lt(2, 2), 0);
    assert_eq!(lt(i64::MIN, i64::MAX), 1);
}

/// `switch (x) { case 0: 10  case 1: 20  case 2: 30  default: 100 }`
#[test]
fn test_switch_dispatch() {
    let pod = calc_pod(|b| {
        let int = b.sys("Int");
        let fallback = b.int(100);
        let cases: Vec<u16> = [10, 20, 30].iter().map(|&v| b.int(v)).collect();
        let mut a = Asm::new();
        a.op1(FOpcode::LoadVar, 0);
        let sites = a.switch(cases.len() as u16);
        a.op1(FOpcode::LoadInt, fallback).op(FOpcode::ReturnObj);
        for (site, lit) in sites.into_iter().zip(cases) {
            let here = a.here();
            a.patch(site, here);
            a.op1(FOpcode::LoadInt, lit).op(FOpcode::ReturnObj);
        }
        vec![MethodDef::new("pick", STATIC, int)
            .param(VarDef::new("x", int))
            .code(a.build())]
    });
    let vm = machine(&pod);
    for (x, want) in [(0, 10), (1, 20), (2, 30), (3, 100), (-1, 100)] {
        let r = vm
            .invoke("fan/acme/Calc", "pick", "(J)J", vec![Value::Long(x)])
            .unwrap()
            .unwrap();
        assert_eq!(r.long(), want, "pick({})", x);
    }
}

/// `static Int add(Int a, Int b := 1, Int c := 2) { a + b + c }`
#[test]
fn test_default_wrappers_execute() {
    let pod = calc_pod(|b| {
        let int = b.sys("Int");
        let plus = b.method_ref(int, "plus", int, &[int]);
        let one = b.int(1);
        let two = b.int(2);
        let expr = |i: u16| {
            let mut a = Asm::new();
            a.op1(FOpcode::LoadInt, i);
            a.build()
        };
        let mut body = Asm::new();
        body.op1(FOpcode::LoadVar, 0)
            .op1(FOpcode::LoadVar, 1)
            .op1(FOpcode::CallVirtual, plus)
            .op1(FOpcode::LoadVar, 2)
            .op1(FOpcode::CallVirtual, plus)
            .op(FOpcode::ReturnObj);
        vec![MethodDef::new("add", STATIC, int)
            .param(VarDef::new("a", int))
            .param(VarDef::new("b", int).with_default(expr(one)))
            .param(VarDef::new("c", int).with_default(expr(two)))
            .code(body.build())]
    });
    let vm = machine(&pod);
    let call = |desc: &str, args: &[i64]| {
        vm.invoke(
            "fan/acme/Calc",
            "add",
            desc,
            args.iter().map(|&v| Value::Long(v)).collect(),
        )
        .unwrap()
        .unwrap()
        .long()
    };
    assert_eq!(call("(J)J", &[10]), 13);
    assert_eq!(call("(JJ)J", &[10, 5]), 17);
    assert_eq!(call("(JJJ)J", &[10, 5, 7]), 22);
}

/// ```text
/// class Widget {
///   Int count
///   new make(Int n) { count = n }
///   Int doubled() { count + count }
///   static Int build(Int n) { make(n).doubled }
/// }
/// ```
fn widget_pod() -> FPod {
    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let int = b.sys("Int");
    let void = b.sys("Void");
    let widget = b.type_ref("acme", "Widget", "");
    let count = b.field_ref(widget, "count", int);
    let make = b.method_ref(widget, "make", void, &[int]);
    let doubled = b.method_ref(widget, "doubled", int, &[]);
    let plus = b.method_ref(int, "plus", int, &[int]);

    let mut ctor = Asm::new();
    ctor.op1(FOpcode::LoadVar, 0)
        .op1(FOpcode::LoadVar, 1)
        .op1(FOpcode::StoreInstance, count)
        .op(FOpcode::ReturnVoid);

    let mut twice = Asm::new();
    twice
        .op1(FOpcode::LoadVar, 0)
        .op1(FOpcode::LoadInstance, count)
        .op1(FOpcode::LoadVar, 0)
        .op1(FOpcode::LoadInstance, count)
        .op1(FOpcode::CallVirtual, plus)
        .op(FOpcode::ReturnObj);

    let mut build = Asm::new();
    build
        .op1(FOpcode::LoadVar, 0)
        .op1(FOpcode::CallNew, make)
        .op1(FOpcode::CallVirtual, doubled)
        .op(FOpcode::ReturnObj);

    b.add_type(
        TypeDef::new(widget, Some(obj), flags::PUBLIC)
            .field("count", flags::PUBLIC | flags::STORAGE, int)
            .method(
                MethodDef::new("make", flags::PUBLIC | flags::CTOR, void)
                    .param(VarDef::new("n", int))
                    .code(ctor.build()),
            )
            .method(MethodDef::new("doubled", flags::PUBLIC, int).code(twice.build()))
            .method(
                MethodDef::new("build", STATIC, int)
                    .param(VarDef::new("n", int))
                    .code(build.build()),
            ),
    );
    b.build().unwrap()
}

/// 构造器拆分为工厂与方法体两个 `make`
#[test]
fn test_ctor_factory_and_body() {
    let vm = machine(&widget_pod());
    let cls = vm.class("fan/acme/Widget");
    let mut makes: Vec<&str> = cls
        .methods
        .iter()
        .filter(|m| m.name.starts_with("make"))
        .map(|m| m.desc.as_str())
        .collect();
    makes.sort_unstable();
    assert_eq!(makes, vec!["(J)Lfan/acme/Widget;", "(Lfan/acme/Widget;J)V"]);

    let r = vm
        .invoke("fan/acme/Widget", "make", "(J)Lfan/acme/Widget;", vec![Value::Long(4)])
        .unwrap()
        .unwrap();
    let Value::Ref(obj) = &r else {
        panic!("factory returned {:?}", r);
    };
    match &**obj {
        crate::sim::Obj::Instance { class, fields } => {
            assert_eq!(class, "fan/acme/Widget");
            assert_eq!(fields.borrow()["count"].long(), 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_construct_then_call_virtual() {
    let vm = machine(&widget_pod());
    let r = vm
        .invoke("fan/acme/Widget", "build", "(J)J", vec![Value::Long(21)])
        .unwrap()
        .unwrap();
    assert_eq!(r.long(), 42);
}
