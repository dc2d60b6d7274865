//! `fan/<pod>/$Pod` 常量类
//!
//! 每个字面量表条目一个 `public static` 字段，class 中不带初值；
//! 加载后由宿主按 [`PodConstants::populate`] 给出的映射逐个赋值。

use indexmap::IndexMap;
use tracing::debug;

use super::context::pod_class_name;
use super::{EmitResult, EmittedClass};
use crate::fcode::{FLiterals, FPod};
use crate::jvm::opcodes::*;
use crate::jvm::ClassFile;
use crate::util::config::EmitConfig;

/// 字段前缀与类型；`PodConstants` 与 class 发出共用
const KINDS: [(&str, &str); 6] = [
    ("I", "Ljava/lang/Long;"),
    ("F", "Ljava/lang/Double;"),
    ("D", "Ljava/math/BigDecimal;"),
    ("S", "Ljava/lang/String;"),
    ("Dur", "Lfan/sys/Duration;"),
    ("U", "Lfan/sys/Uri;"),
];

fn table_len(
    lits: &FLiterals,
    kind: usize,
) -> usize {
    match kind {
        0 => lits.ints.len(),
        1 => lits.floats.len(),
        2 => lits.decimals.len(),
        3 => lits.strs.len(),
        4 => lits.durations.len(),
        _ => lits.uris.len(),
    }
}

/// 常量字段的值
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    /// 十进制字符串
    Decimal(String),
    Str(String),
    /// 纳秒
    Duration(i64),
    Uri(String),
}

impl ConstValue {
    /// 字段描述符
    pub fn desc(&self) -> &'static str {
        let kind = match self {
            ConstValue::Int(_) => 0,
            ConstValue::Float(_) => 1,
            ConstValue::Decimal(_) => 2,
            ConstValue::Str(_) => 3,
            ConstValue::Duration(_) => 4,
            ConstValue::Uri(_) => 5,
        };
        KINDS[kind].1
    }
}

/// 字段名 -> 值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodConstants {
    values: IndexMap<String, ConstValue>,
}

impl PodConstants {
    /// 按表位置生成全部字段值
    pub fn populate(lits: &FLiterals) -> Self {
        let mut values = IndexMap::with_capacity(lits.len());
        for (i, v) in lits.ints.iter().enumerate() {
            values.insert(format!("I{}", i), ConstValue::Int(*v));
        }
        for (i, v) in lits.floats.iter().enumerate() {
            values.insert(format!("F{}", i), ConstValue::Float(*v));
        }
        for (i, v) in lits.decimals.iter().enumerate() {
            values.insert(format!("D{}", i), ConstValue::Decimal(v.clone()));
        }
        for (i, v) in lits.strs.iter().enumerate() {
            values.insert(format!("S{}", i), ConstValue::Str(v.clone()));
        }
        for (i, v) in lits.durations.iter().enumerate() {
            values.insert(format!("Dur{}", i), ConstValue::Duration(*v));
        }
        for (i, v) in lits.uris.iter().enumerate() {
            values.insert(format!("U{}", i), ConstValue::Uri(v.clone()));
        }
        Self { values }
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&ConstValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 按 class 中的字段顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// 发出 `$Pod`
pub fn emit_pod_class(
    pod: &FPod,
    config: &EmitConfig,
) -> EmitResult<EmittedClass> {
    let name = pod_class_name(&pod.name);
    let mut cf = ClassFile::new(
        &name,
        "java/lang/Object",
        ACC_PUBLIC | ACC_SUPER | ACC_FINAL,
        config.class_major,
    )?;

    let mut count = 0;
    for (kind, (prefix, desc)) in KINDS.iter().enumerate() {
        for i in 0..table_len(&pod.literals, kind) {
            let field = format!("{}{}", prefix, i);
            cf.add_field(ACC_PUBLIC | ACC_STATIC, &field, desc)?;
            count += 1;
        }
    }
    debug!("{}: {} literal fields", name, count);

    let bytes = cf.finish()?;
    Ok(EmittedClass { name, bytes })
}
