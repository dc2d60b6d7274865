//! ConstantPool 单元测试

use crate::jvm::constant_pool::{split_field_sig, split_method_sig, Constant, ConstantPool};
use crate::jvm::ClassError;

#[cfg(test)]
mod dedup_tests {
    use super::*;

    /// 相同常量只分配一次
    #[test]
    fn test_dedup() {
        let mut pool = ConstantPool::new();
        let a = pool.method("java/lang/Long.longValue()J").unwrap();
        let b = pool.method("java/lang/Long.longValue()J").unwrap();
        assert_eq!(a, b);
        let c = pool.class("java/lang/Long").unwrap();
        assert!(c < a);
        assert!(pool.has_class("java/lang/Long"));
        assert!(!pool.has_class("java/lang/Double"));
    }

    /// long 占两个索引
    #[test]
    fn test_wide_entries() {
        let mut pool = ConstantPool::new();
        let l = pool.long(5).unwrap();
        let next = pool.utf8("x").unwrap();
        assert_eq!(l, 1);
        assert_eq!(next, 3);
        assert_eq!(pool.count(), 4);
        assert_eq!(pool.get(1), Some(&Constant::Long(5)));
    }

    #[test]
    fn test_interface_vs_method_ref() {
        let mut pool = ConstantPool::new();
        let m = pool.method("fan/acme/Foo.bar()V").unwrap();
        let i = pool.interface_method("fan/acme/Foo.bar()V").unwrap();
        assert_ne!(m, i);
    }
}

#[cfg(test)]
mod sig_tests {
    use super::*;

    #[test]
    fn test_split_field() {
        assert_eq!(
            split_field_sig("fan/acme/$Pod.I0:Ljava/lang/Long;").unwrap(),
            ("fan/acme/$Pod", "I0", "Ljava/lang/Long;")
        );
        assert!(matches!(
            split_field_sig("nofield"),
            Err(ClassError::BadSignature(_))
        ));
    }

    #[test]
    fn test_split_method() {
        assert_eq!(
            split_method_sig("fan/acme/Foo.<init>()V").unwrap(),
            ("fan/acme/Foo", "<init>", "()V")
        );
        assert_eq!(
            split_method_sig("fan/sys/Type.find(Ljava/lang/String;Z)Lfan/sys/Type;").unwrap(),
            ("fan/sys/Type", "find", "(Ljava/lang/String;Z)Lfan/sys/Type;")
        );
        assert!(split_method_sig("Foo()V").is_err());
    }
}
