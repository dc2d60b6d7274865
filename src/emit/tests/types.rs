//! 类型与方法降级测试
//!
//! 构造器拆分、默认参数、mixin 路由、Err 载体与合成类

use super::*;
use crate::fcode::builder::{Asm, MethodDef, PodBuilder, TypeDef, VarDef};
use crate::fcode::{flags, FOpcode};
use crate::jvm::opcodes::*;

fn ret_void() -> Vec<u8> {
    let mut a = Asm::new();
    a.op(FOpcode::ReturnVoid);
    a.build()
}

#[cfg(test)]
mod class_tests {
    use super::*;

    fn widget_pod() -> FPod {
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let int = b.sys("Int");
        let void = b.sys("Void");
        let widget = b.type_ref("acme", "Widget", "");
        b.add_type(
            TypeDef::new(widget, Some(obj), flags::PUBLIC)
                .field("count", flags::PUBLIC | flags::STORAGE, int)
                .field("computed", flags::PUBLIC, int)
                .method(
                    MethodDef::new("make", flags::PUBLIC | flags::CTOR, void)
                        .param(VarDef::new("n", int))
                        .code(ret_void()),
                )
                .source("Widget.fan"),
        );
        b.build().unwrap()
    }

    #[test]
    fn test_class_shape() {
        let classes = emit(&widget_pod());
        assert_eq!(classes[0].name, "fan/acme/$Pod");
        let cls = find(&classes, "fan/acme/Widget");
        assert_eq!(cls.super_name, "fan/sys/FanObj");
        assert_eq!(cls.access & ACC_PUBLIC, ACC_PUBLIC);
        assert_eq!(cls.major, 49);
        assert_eq!(cls.source_file.as_deref(), Some("Widget.fan"));

        let fields: Vec<&str> = cls.fields.iter().map(|f| f.1.as_str()).collect();
        assert!(fields.contains(&"$Type"));
        assert!(fields.contains(&"count"));
        // 非存储字段不占槽位
        assert!(!fields.contains(&"computed"));
        assert!(cls.method("typeof", "()Lfan/sys/Type;").is_some());
        assert!(cls.method("<init>", "()V").is_some());
    }

    /// `<clinit>` 先用签名查出 Type
    #[test]
    fn test_static_init_sets_type() {
        let classes = emit(&widget_pod());
        let cls = find(&classes, "fan/acme/Widget");
        let c = code(cls, "<clinit>", "()V");
        assert_eq!(ops(&c.code), vec![LDC_W, INVOKESTATIC, PUTSTATIC, RETURN]);
        assert_eq!(operand_of(cls, &c.code, LDC_W), "acme::Widget");
        assert_eq!(
            operand_of(cls, &c.code, PUTSTATIC),
            "fan/acme/Widget.$Type:Lfan/sys/Type;"
        );
    }

    /// 构造器拆为静态体 `make$` 与工厂 `make`
    #[test]
    fn test_ctor_split() {
        let classes = emit(&widget_pod());
        let cls = find(&classes, "fan/acme/Widget");
        let makes = cls.methods_named("make");
        assert_eq!(makes.len(), 1);
        assert_eq!(makes[0].desc, "(J)Lfan/acme/Widget;");
        assert_eq!(makes[0].access & ACC_STATIC, ACC_STATIC);

        let body = cls.method("make$", "(Lfan/acme/Widget;J)V").unwrap();
        assert_eq!(body.access & ACC_STATIC, ACC_STATIC);

        let factory = code(cls, "make", "(J)Lfan/acme/Widget;");
        assert_eq!(
            ops(&factory.code),
            vec![NEW, DUP, INVOKESPECIAL, DUP, LLOAD_0, INVOKESTATIC, ARETURN]
        );
        assert_eq!(
            operand_of(cls, &factory.code, INVOKESTATIC),
            "fan/acme/Widget.make$(Lfan/acme/Widget;J)V"
        );
    }

    #[test]
    fn test_source_file_disabled() {
        let cfg = EmitConfig {
            source_files: false,
            ..EmitConfig::default()
        };
        let classes = emit_with(&widget_pod(), &cfg).unwrap();
        assert_eq!(find(&classes, "fan/acme/Widget").source_file, None);
    }

    #[test]
    fn test_dynamic_subclass() {
        let cfg = EmitConfig {
            emit_dynamic_subclasses: true,
            ..EmitConfig::default()
        };
        let classes = emit_with(&widget_pod(), &cfg).unwrap();
        let dynamic = find(&classes, "fan/acme/Widget$Dynamic");
        assert_eq!(dynamic.super_name, "fan/acme/Widget");
        assert!(dynamic.method("<init>", "(Lfan/sys/Type;)V").is_some());
        assert!(dynamic.method("typeof", "()Lfan/sys/Type;").is_some());

        // 默认不生成
        let classes = emit(&widget_pod());
        assert!(classes.iter().all(|c| c.name != "fan/acme/Widget$Dynamic"));
    }
}

#[cfg(test)]
mod default_tests {
    use super::*;

    /// `static Int add(Int a, Int b := 1, Int c := 2)`
    fn add_pod() -> FPod {
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let int = b.sys("Int");
        let one = b.int(1);
        let two = b.int(2);
        let calc = b.type_ref("acme", "Calc", "");
        let expr = |i: u16| {
            let mut a = Asm::new();
            a.op1(FOpcode::LoadInt, i);
            a.build()
        };
        let mut body = Asm::new();
        body.op1(FOpcode::LoadVar, 0).op(FOpcode::ReturnObj);
        b.add_type(
            TypeDef::new(calc, Some(obj), flags::PUBLIC).method(
                MethodDef::new("add", flags::PUBLIC | flags::STATIC, int)
                    .param(VarDef::new("a", int))
                    .param(VarDef::new("b", int).with_default(expr(one)))
                    .param(VarDef::new("c", int).with_default(expr(two)))
                    .code(body.build()),
            ),
        );
        b.build().unwrap()
    }

    #[test]
    fn test_one_wrapper_per_default() {
        let classes = emit(&add_pod());
        let cls = find(&classes, "fan/acme/Calc");
        let mut descs: Vec<&str> = cls
            .methods_named("add")
            .iter()
            .map(|m| m.desc.as_str())
            .collect();
        descs.sort_unstable();
        assert_eq!(descs, vec!["(J)J", "(JJ)J", "(JJJ)J"]);
    }

    /// 包装方法补齐缺失参数后调用完整版本
    #[test]
    fn test_wrapper_fills_defaults() {
        let classes = emit(&add_pod());
        let cls = find(&classes, "fan/acme/Calc");
        let c = code(cls, "add", "(J)J");
        assert_eq!(
            ops(&c.code),
            vec![
                LLOAD_0,
                GETSTATIC,
                INVOKEVIRTUAL,
                GETSTATIC,
                INVOKEVIRTUAL,
                INVOKESTATIC,
                LRETURN
            ]
        );
        assert_eq!(
            operands_of(cls, &c.code, GETSTATIC),
            vec![
                "fan/acme/$Pod.I0:Ljava/lang/Long;",
                "fan/acme/$Pod.I1:Ljava/lang/Long;"
            ]
        );
        assert_eq!(
            operand_of(cls, &c.code, INVOKESTATIC),
            "fan/acme/Calc.add(JJJ)J"
        );

        let c = code(cls, "add", "(JJ)J");
        assert_eq!(operands_of(cls, &c.code, GETSTATIC).len(), 1);
    }
}

#[cfg(test)]
mod mixin_tests {
    use super::*;

    /// `mixin Greeter { Str greet() { .. } Str name() }`，`Impl : Greeter`
    fn mixin_pod(impl_declares_greet: bool) -> FPod {
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let str_t = b.sys("Str");
        let greeter = b.type_ref("acme", "Greeter", "");
        let imp = b.type_ref("acme", "Impl", "");
        let hi = b.str("hi");

        let mut body = Asm::new();
        body.op1(FOpcode::LoadStr, hi).op(FOpcode::ReturnObj);
        let greet = MethodDef::new("greet", flags::PUBLIC | flags::VIRTUAL, str_t)
            .code(body.build());

        b.add_type(
            TypeDef::new(greeter, Some(obj), flags::PUBLIC | flags::MIXIN | flags::ABSTRACT)
                .method(greet.clone())
                .method(MethodDef::new(
                    "name",
                    flags::PUBLIC | flags::ABSTRACT,
                    str_t,
                )),
        );
        let mut t = TypeDef::new(imp, Some(obj), flags::PUBLIC).mixin(greeter);
        if impl_declares_greet {
            t = t.method(greet);
        }
        b.add_type(t);
        b.build().unwrap()
    }

    #[test]
    fn test_mixin_interface_and_body() {
        let classes = emit(&mixin_pod(false));
        let iface = find(&classes, "fan/acme/Greeter");
        assert_eq!(iface.access & ACC_INTERFACE, ACC_INTERFACE);
        assert_eq!(iface.super_name, "java/lang/Object");
        let greet = iface.method("greet", "()Ljava/lang/String;").unwrap();
        assert!(greet.code.is_none());
        assert!(iface.method("name", "()Ljava/lang/String;").is_some());

        let body = find(&classes, "fan/acme/Greeter$");
        let m = body
            .method("greet", "(Lfan/acme/Greeter;)Ljava/lang/String;")
            .unwrap();
        assert_eq!(m.access & ACC_STATIC, ACC_STATIC);
        // 抽象方法没有实现
        assert!(body.methods_named("name").is_empty());
    }

    /// 类没有声明的 mixin 方法转发到 `Mixin$`
    #[test]
    fn test_router_forwards_to_body() {
        let classes = emit(&mixin_pod(false));
        let cls = find(&classes, "fan/acme/Impl");
        assert_eq!(cls.interfaces, vec!["fan/acme/Greeter"]);
        let c = code(cls, "greet", "()Ljava/lang/String;");
        assert_eq!(ops(&c.code), vec![ALOAD_0, INVOKESTATIC, ARETURN]);
        assert_eq!(
            operand_of(cls, &c.code, INVOKESTATIC),
            "fan/acme/Greeter$.greet(Lfan/acme/Greeter;)Ljava/lang/String;"
        );
        // 抽象 mixin 方法不路由
        assert!(cls.methods_named("name").is_empty());
    }

    /// `mixin A { foo }`，`mixin B : A { override foo }`，`C` 同时实现两者
    fn diamond_pod(b_first: bool) -> FPod {
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let str_t = b.sys("Str");
        let a = b.type_ref("acme", "A", "");
        let bm = b.type_ref("acme", "B", "");
        let c = b.type_ref("acme", "C", "");
        let hi = b.str("hi");
        let foo = |extra: u32| {
            let mut body = Asm::new();
            body.op1(FOpcode::LoadStr, hi).op(FOpcode::ReturnObj);
            MethodDef::new("foo", flags::PUBLIC | flags::VIRTUAL | extra, str_t).code(body.build())
        };
        let mixin = flags::PUBLIC | flags::MIXIN | flags::ABSTRACT;
        b.add_type(TypeDef::new(a, Some(obj), mixin).method(foo(0)));
        b.add_type(
            TypeDef::new(bm, Some(obj), mixin)
                .mixin(a)
                .method(foo(flags::OVERRIDE)),
        );
        let t = TypeDef::new(c, Some(obj), flags::PUBLIC);
        let t = if b_first { t.mixin(bm).mixin(a) } else { t.mixin(a).mixin(bm) };
        b.add_type(t);
        b.build().unwrap()
    }

    /// 路由目标是最具体的覆盖，与 mixin 的声明顺序无关
    #[test]
    fn test_router_picks_overriding_mixin() {
        for b_first in [false, true] {
            let classes = emit(&diamond_pod(b_first));
            let cls = find(&classes, "fan/acme/C");
            let foos = cls.methods_named("foo");
            assert_eq!(foos.len(), 1, "b_first = {}", b_first);
            let c = code(cls, "foo", "()Ljava/lang/String;");
            assert_eq!(
                operand_of(cls, &c.code, INVOKESTATIC),
                "fan/acme/B$.foo(Lfan/acme/B;)Ljava/lang/String;",
                "b_first = {}",
                b_first
            );
        }
    }

    #[test]
    fn test_no_router_when_declared() {
        let classes = emit(&mixin_pod(true));
        let cls = find(&classes, "fan/acme/Impl");
        let greets = cls.methods_named("greet");
        assert_eq!(greets.len(), 1);
        let c = greets[0].code.as_ref().unwrap();
        assert_eq!(ops(&c.code), vec![GETSTATIC, ARETURN]);
    }
}

#[cfg(test)]
mod err_tests {
    use super::*;

    fn err_pod() -> FPod {
        let mut b = PodBuilder::new("acme");
        let err = b.sys("Err");
        let my = b.type_ref("acme", "MyErr", "");
        let sub = b.type_ref("acme", "SubErr", "");
        b.add_type(TypeDef::new(my, Some(err), flags::PUBLIC));
        b.add_type(TypeDef::new(sub, Some(my), flags::PUBLIC));
        b.build().unwrap()
    }

    #[test]
    fn test_err_val_chain() {
        let classes = emit(&err_pod());
        assert_eq!(find(&classes, "fan/acme/MyErr").super_name, "fan/sys/Err");
        assert_eq!(
            find(&classes, "fan/acme/MyErr$Val").super_name,
            "fan/sys/Err$Val"
        );
        assert_eq!(
            find(&classes, "fan/acme/SubErr$Val").super_name,
            "fan/acme/MyErr$Val"
        );
    }

    #[test]
    fn test_err_constructors() {
        let classes = emit(&err_pod());
        let cls = find(&classes, "fan/acme/SubErr");
        let c = code(cls, "<init>", "()V");
        assert_eq!(
            operands_of(cls, &c.code, INVOKESPECIAL),
            vec![
                "fan/acme/SubErr$Val.<init>()V",
                "fan/acme/SubErr.<init>(Lfan/sys/Err$Val;)V"
            ]
        );
        let c = code(cls, "<init>", "(Lfan/sys/Err$Val;)V");
        assert_eq!(
            operand_of(cls, &c.code, INVOKESPECIAL),
            "fan/acme/MyErr.<init>(Lfan/sys/Err$Val;)V"
        );
    }
}

#[cfg(test)]
mod native_tests {
    use super::*;

    #[test]
    fn test_native_delegates_to_peer() {
        let mut b = PodBuilder::new("acme");
        let obj = b.sys("Obj");
        let int = b.sys("Int");
        let file = b.type_ref("acme", "File", "");
        b.add_type(
            TypeDef::new(file, Some(obj), flags::PUBLIC | flags::NATIVE).method(MethodDef::new(
                "size",
                flags::PUBLIC | flags::NATIVE,
                int,
            )),
        );
        let classes = emit(&b.build().unwrap());
        let cls = find(&classes, "fan/acme/File");
        assert!(cls
            .fields
            .iter()
            .any(|f| f.1 == "peer" && f.2 == "Lfan/acme/FilePeer;"));

        let c = code(cls, "size", "()J");
        assert_eq!(
            ops(&c.code),
            vec![ALOAD_0, GETFIELD, ALOAD_0, INVOKEVIRTUAL, LRETURN]
        );
        assert_eq!(
            operand_of(cls, &c.code, INVOKEVIRTUAL),
            "fan/acme/FilePeer.size(Lfan/acme/File;)J"
        );

        let init = code(cls, "<init>", "()V");
        assert_eq!(
            operand_of(cls, &init.code, INVOKESTATIC),
            "fan/acme/FilePeer.make(Lfan/acme/File;)Lfan/acme/FilePeer;"
        );
    }
}
