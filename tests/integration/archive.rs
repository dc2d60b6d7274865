//! pod 归档 → class 目录

use std::fs;

use fanjvm::{emit_pod_file, emit_pod_file_in, open_pod, Namespace};
use fanjvm::fcode::builder::{Asm, MethodDef, PodBuilder, TypeDef};
use fanjvm::fcode::{flags, FOpcode, FPod, ZipStore};
use fanjvm::jvm::ParsedClass;
use fanjvm::util::config::{EmitConfig, FinallyStrategy};

fn acme_zip() -> Vec<u8> {
    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let void = b.sys("Void");
    for name in ["Alpha", "Beta"] {
        let t = b.type_ref("acme", name, "");
        let mut a = Asm::new();
        a.op(FOpcode::ReturnVoid);
        b.add_type(
            TypeDef::new(t, Some(obj), flags::PUBLIC)
                .method(MethodDef::new("run", flags::PUBLIC, void).code(a.build())),
        );
    }
    b.build_store().to_zip().unwrap()
}

#[test]
fn test_zip_round_trip_loads() {
    let store = ZipStore::from_bytes(acme_zip()).unwrap();
    let mut pod = FPod::load(std::sync::Arc::new(store)).unwrap();
    pod.read_all_bodies().unwrap();
    assert_eq!(pod.name, "acme");
    assert_eq!(pod.types.len(), 2);
    assert!(pod.find_type("Beta").is_some());
}

#[test]
fn test_emit_pod_file_writes_classes() {
    let dir = tempfile::tempdir().unwrap();
    let pod_path = dir.path().join("acme.pod");
    fs::write(&pod_path, acme_zip()).unwrap();
    let out = dir.path().join("classes");

    let mut written = emit_pod_file(&pod_path, &out, &EmitConfig::default()).unwrap();
    written.sort();
    let rel: Vec<_> = written
        .iter()
        .map(|p| p.strip_prefix(&out).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        rel,
        vec!["fan/acme/$Pod.class", "fan/acme/Alpha.class", "fan/acme/Beta.class"]
    );

    let bytes = fs::read(out.join("fan/acme/Alpha.class")).unwrap();
    assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    let cls = ParsedClass::parse(&bytes).unwrap();
    assert_eq!(cls.name, "fan/acme/Alpha");
    assert_eq!(cls.major, 49);
    assert!(cls.method("run", "()V").is_some());
}

#[test]
fn test_emit_pod_file_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let pod_path = dir.path().join("acme.pod");
    fs::write(&pod_path, acme_zip()).unwrap();
    let config = EmitConfig {
        class_major: 51,
        finally_strategy: FinallyStrategy::Subroutine,
        ..EmitConfig::default()
    };
    let err = emit_pod_file(&pod_path, &dir.path().join("out"), &config).unwrap_err();
    assert!(err.to_string().contains("subroutine"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_emit_pod_file_missing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let err = emit_pod_file(
        &dir.path().join("nope.pod"),
        &dir.path().join("out"),
        &EmitConfig::default(),
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("nope.pod"));
}

/// `base::Greeter` 带方法体的 mixin，与混入它的 `acme::Impl`
fn greeter_zips() -> (Vec<u8>, Vec<u8>) {
    let mut b = PodBuilder::new("base");
    let obj = b.sys("Obj");
    let str_t = b.sys("Str");
    let greeter = b.type_ref("base", "Greeter", "");
    let hi = b.str("hi");
    let mut a = Asm::new();
    a.op1(FOpcode::LoadStr, hi).op(FOpcode::ReturnObj);
    b.add_type(
        TypeDef::new(greeter, Some(obj), flags::PUBLIC | flags::MIXIN | flags::ABSTRACT).method(
            MethodDef::new("greet", flags::PUBLIC | flags::VIRTUAL, str_t).code(a.build()),
        ),
    );
    let base = b.build_store().to_zip().unwrap();

    let mut b = PodBuilder::new("acme");
    let obj = b.sys("Obj");
    let greeter = b.type_ref("base", "Greeter", "");
    let imp = b.type_ref("acme", "Impl", "");
    b.add_type(TypeDef::new(imp, Some(obj), flags::PUBLIC).mixin(greeter));
    (base, b.build_store().to_zip().unwrap())
}

/// 依赖 pod 中的 mixin 方法体只有在命名空间里才能生成路由
#[test]
fn test_emit_pod_file_in_routes_dependency_mixin() {
    let dir = tempfile::tempdir().unwrap();
    let (base, acme) = greeter_zips();
    let base_path = dir.path().join("base.pod");
    let acme_path = dir.path().join("acme.pod");
    fs::write(&base_path, base).unwrap();
    fs::write(&acme_path, acme).unwrap();

    let alone = dir.path().join("alone");
    emit_pod_file(&acme_path, &alone, &EmitConfig::default()).unwrap();
    let cls = ParsedClass::parse(&fs::read(alone.join("fan/acme/Impl.class")).unwrap()).unwrap();
    assert_eq!(cls.interfaces, vec!["fan/base/Greeter"]);
    assert!(cls.methods_named("greet").is_empty());

    let dep = open_pod(&base_path).unwrap();
    let mut ns = Namespace::new();
    ns.add(&dep);
    let out = dir.path().join("with_deps");
    let written = emit_pod_file_in(&acme_path, &out, &ns, &EmitConfig::default()).unwrap();
    assert!(written.iter().all(|p| !p.starts_with(out.join("fan/base"))));
    let cls = ParsedClass::parse(&fs::read(out.join("fan/acme/Impl.class")).unwrap()).unwrap();
    let greet = cls.method("greet", "()Ljava/lang/String;").unwrap();
    let code = greet.code.as_ref().unwrap();
    let at = code.code.iter().position(|&op| op == fanjvm::jvm::opcodes::INVOKESTATIC).unwrap();
    assert_eq!(
        cls.describe(fanjvm::jvm::reader::read_u2(&code.code, at + 1)).unwrap(),
        "fan/base/Greeter$.greet(Lfan/base/Greeter;)Ljava/lang/String;"
    );
}
