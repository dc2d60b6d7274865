//! 类型引用与 JVM 类型映射
//!
//! `FTypeRef` 在构造时一次性计算掩码、栈类型和 JVM 名称，之后只读。
//!
//! ```text
//! fantom                             jname                  jimpl
//! sys::Int                           J                      fan/sys/FanInt
//! sys::Int?                          java/lang/Long         fan/sys/FanInt
//! sys::Str                           java/lang/String       fan/sys/FanStr
//! acme::Widget                       fan/acme/Widget        fan/acme/Widget
//! [java]java.util::Date              java/util/Date         java/util/Date
//! [java]fanx.interop::IntArray       [I                     [I
//! ```

use std::fmt;

pub const NULLABLE: u32 = 0x0000_0001;
pub const GENERIC_INSTANCE: u32 = 0x0000_0002;
pub const SYS_OBJ: u32 = 0x0000_0004;
pub const SYS_BOOL: u32 = 0x0000_0008;
pub const SYS_INT: u32 = 0x0000_0010;
pub const SYS_FLOAT: u32 = 0x0000_0020;
pub const SYS_ERR: u32 = 0x0000_0040;
pub const SYS_LIST: u32 = 0x0000_0080;
pub const PRIMITIVE: u32 = 0x0000_FF00;
pub const PRIMITIVE_BOOL: u32 = 0x0000_0100;
pub const PRIMITIVE_BYTE: u32 = 0x0000_0200;
pub const PRIMITIVE_SHORT: u32 = 0x0000_0400;
pub const PRIMITIVE_CHAR: u32 = 0x0000_0800;
pub const PRIMITIVE_INT: u32 = 0x0000_1000;
pub const PRIMITIVE_LONG: u32 = 0x0000_2000;
pub const PRIMITIVE_FLOAT: u32 = 0x0000_4000;
pub const PRIMITIVE_DOUBLE: u32 = 0x0000_8000;
pub const PRIMITIVE_ARRAY: u32 = 0x00FF_0000;
pub const ARRAY_BOOL: u32 = 0x0001_0000;
pub const ARRAY_BYTE: u32 = 0x0002_0000;
pub const ARRAY_SHORT: u32 = 0x0004_0000;
pub const ARRAY_CHAR: u32 = 0x0008_0000;
pub const ARRAY_INT: u32 = 0x0010_0000;
pub const ARRAY_LONG: u32 = 0x0020_0000;
pub const ARRAY_FLOAT: u32 = 0x0040_0000;
pub const ARRAY_DOUBLE: u32 = 0x0080_0000;

/// JVM 操作数栈类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackType {
    Obj,
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl StackType {
    /// 占两个槽位（long / double）
    #[inline]
    pub fn is_wide(self) -> bool {
        matches!(self, StackType::Long | StackType::Double)
    }

    /// 局部变量/操作数栈槽位数
    #[inline]
    pub fn slots(self) -> u16 {
        match self {
            StackType::Void => 0,
            t if t.is_wide() => 2,
            _ => 1,
        }
    }

    /// 在 JVM 栈上按 int 处理
    #[inline]
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            StackType::Bool | StackType::Byte | StackType::Short | StackType::Char | StackType::Int
        )
    }

    /// 描述符字符
    pub fn code(self) -> char {
        match self {
            StackType::Obj => 'A',
            StackType::Bool => 'Z',
            StackType::Byte => 'B',
            StackType::Short => 'S',
            StackType::Char => 'C',
            StackType::Int => 'I',
            StackType::Long => 'J',
            StackType::Float => 'F',
            StackType::Double => 'D',
            StackType::Void => 'V',
        }
    }
}

/// 类型引用
#[derive(Debug, Clone, PartialEq)]
pub struct FTypeRef {
    pub pod: String,
    pub name: String,
    /// 原始签名：""、"?" 或完整泛型签名
    pub sig: String,
    /// 全限定签名，如 `sys::Str?` 或 `sys::Int[]`
    pub signature: String,
    pub mask: u32,
    pub stack: StackType,
    jname: String,
}

impl FTypeRef {
    pub fn new(
        pod: impl Into<String>,
        name: impl Into<String>,
        sig: impl Into<String>,
    ) -> Self {
        let pod = pod.into();
        let name = name.into();
        let sig = sig.into();

        let mut mask = 0;
        let mut stack = StackType::Obj;
        let nullable = sig.ends_with('?');
        if nullable {
            mask |= NULLABLE;
        }
        if sig.len() > 1 {
            mask |= GENERIC_INSTANCE;
        }

        if pod == "[java]" {
            let (bit, st) = match name.as_str() {
                "int" => (PRIMITIVE_INT, StackType::Int),
                "char" => (PRIMITIVE_CHAR, StackType::Char),
                "byte" => (PRIMITIVE_BYTE, StackType::Byte),
                "short" => (PRIMITIVE_SHORT, StackType::Short),
                "float" => (PRIMITIVE_FLOAT, StackType::Float),
                "long" => (PRIMITIVE_LONG, StackType::Long),
                "double" => (PRIMITIVE_DOUBLE, StackType::Double),
                "boolean" => (PRIMITIVE_BOOL, StackType::Bool),
                _ => (0, StackType::Obj),
            };
            mask |= bit;
            stack = st;
        } else if pod == "[java]fanx.interop" {
            mask |= match name.as_str() {
                "BooleanArray" => ARRAY_BOOL,
                "ByteArray" => ARRAY_BYTE,
                "ShortArray" => ARRAY_SHORT,
                "CharArray" => ARRAY_CHAR,
                "IntArray" => ARRAY_INT,
                "LongArray" => ARRAY_LONG,
                "FloatArray" => ARRAY_FLOAT,
                "DoubleArray" => ARRAY_DOUBLE,
                _ => 0,
            };
        } else if pod == "sys" {
            match name.as_str() {
                "Bool" => {
                    mask |= SYS_BOOL;
                    if !nullable {
                        mask |= PRIMITIVE_BOOL;
                        stack = StackType::Bool;
                    }
                }
                "Int" => {
                    mask |= SYS_INT;
                    if !nullable {
                        mask |= PRIMITIVE_LONG;
                        stack = StackType::Long;
                    }
                }
                "Float" => {
                    mask |= SYS_FLOAT;
                    if !nullable {
                        mask |= PRIMITIVE_DOUBLE;
                        stack = StackType::Double;
                    }
                }
                "Err" => mask |= SYS_ERR,
                "List" => mask |= SYS_LIST,
                "Obj" => mask |= SYS_OBJ,
                "Void" => stack = StackType::Void,
                _ => {}
            }
        }

        let signature = if mask & GENERIC_INSTANCE != 0 {
            sig.clone()
        } else {
            format!("{}::{}{}", pod, name, sig)
        };
        let jname = java_type_sig(&pod, &name, nullable);

        Self {
            pod,
            name,
            sig,
            signature,
            mask,
            stack,
            jname,
        }
    }

    /// `pod::Name` 不含可空/泛型后缀
    pub fn qname(&self) -> String {
        format!("{}::{}", self.pod, self.name)
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.mask & NULLABLE != 0
    }

    #[inline]
    pub fn is_generic_instance(&self) -> bool {
        self.mask & GENERIC_INSTANCE != 0
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        self.stack == StackType::Obj
    }

    #[inline]
    pub fn is_obj(&self) -> bool {
        self.mask & SYS_OBJ != 0
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        self.mask & SYS_BOOL != 0
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        self.mask & SYS_INT != 0
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        self.mask & SYS_FLOAT != 0
    }

    #[inline]
    pub fn is_err(&self) -> bool {
        self.mask & SYS_ERR != 0
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        self.mask & SYS_LIST != 0
    }

    #[inline]
    pub fn is_sys(&self) -> bool {
        self.pod == "sys"
    }

    #[inline]
    pub fn is_ffi(&self) -> bool {
        self.pod.starts_with("[java]")
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.stack == StackType::Void
    }

    #[inline]
    pub fn is_wide(&self) -> bool {
        self.stack.is_wide()
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        self.mask & PRIMITIVE != 0
    }

    #[inline]
    pub fn is_primitive_bool(&self) -> bool {
        self.mask & PRIMITIVE_BOOL != 0
    }

    #[inline]
    pub fn is_primitive_long(&self) -> bool {
        self.mask & PRIMITIVE_LONG != 0
    }

    #[inline]
    pub fn is_primitive_double(&self) -> bool {
        self.mask & PRIMITIVE_DOUBLE != 0
    }

    #[inline]
    pub fn is_primitive_array(&self) -> bool {
        self.mask & PRIMITIVE_ARRAY != 0
    }

    /// 原生数组的元素栈类型
    pub fn array_of_stack_type(&self) -> Option<StackType> {
        match self.mask & PRIMITIVE_ARRAY {
            ARRAY_BOOL => Some(StackType::Bool),
            ARRAY_BYTE => Some(StackType::Byte),
            ARRAY_SHORT => Some(StackType::Short),
            ARRAY_CHAR => Some(StackType::Char),
            ARRAY_INT => Some(StackType::Int),
            ARRAY_LONG => Some(StackType::Long),
            ARRAY_FLOAT => Some(StackType::Float),
            ARRAY_DOUBLE => Some(StackType::Double),
            _ => None,
        }
    }

    /// JVM 类型名：`fan/sys/Duration`、`java/lang/Boolean`、`Z`
    pub fn jname(&self) -> &str {
        &self.jname
    }

    /// 原生类型返回其装箱类名
    pub fn jname_boxed(&self) -> &str {
        match self.stack {
            StackType::Bool => "java/lang/Boolean",
            StackType::Byte => "java/lang/Byte",
            StackType::Short => "java/lang/Short",
            StackType::Char => "java/lang/Character",
            StackType::Int => "java/lang/Integer",
            StackType::Long => "java/lang/Long",
            StackType::Float => "java/lang/Float",
            StackType::Double => "java/lang/Double",
            StackType::Obj | StackType::Void => &self.jname,
        }
    }

    /// 实现类名：`fan/sys/FanBool`、`fan/sys/FanStr`
    pub fn jimpl(&self) -> &str {
        java_impl_sig(&self.jname)
    }

    /// 成员描述符：`Lfan/sys/Duration;`、`Z`、`[I`
    pub fn jsig(&self) -> String {
        let mut out = String::with_capacity(self.jname.len() + 2);
        self.jsig_into(&mut out);
        out
    }

    /// 追加成员描述符
    pub fn jsig_into(
        &self,
        out: &mut String,
    ) {
        // 原生与 Void 由栈类型决定，默认包中的单字母 FFI 类仍是引用
        if self.stack != StackType::Obj || self.jname.starts_with('[') {
            out.push_str(&self.jname);
        } else {
            out.push('L');
            out.push_str(&self.jname);
            out.push(';');
        }
    }
}

impl fmt::Display for FTypeRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.signature)
    }
}

/// 类名到成员描述符
pub fn member_sig(jname: &str) -> String {
    if is_primitive_desc(jname) || jname.starts_with('[') {
        jname.to_string()
    } else {
        format!("L{};", jname)
    }
}

/// 原生类型与 void 的描述符
pub fn is_primitive_desc(jname: &str) -> bool {
    matches!(jname, "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D" | "V")
}

/// Fantom 类型到 JVM 类型名
pub fn java_type_sig(
    pod: &str,
    name: &str,
    nullable: bool,
) -> String {
    if pod == "sys" {
        let mapped = match name {
            "Bool" => Some(if nullable { "java/lang/Boolean" } else { "Z" }),
            "Int" => Some(if nullable { "java/lang/Long" } else { "J" }),
            "Float" => Some(if nullable { "java/lang/Double" } else { "D" }),
            "Decimal" => Some("java/math/BigDecimal"),
            "Num" => Some("java/lang/Number"),
            "Obj" => Some("java/lang/Object"),
            "Str" => Some("java/lang/String"),
            "Void" => Some("V"),
            // 泛型参数 V、K 等
            _ if name.chars().count() == 1 => Some("java/lang/Object"),
            _ => None,
        };
        if let Some(m) = mapped {
            return m.to_string();
        }
    }

    if pod.starts_with('[') {
        return ffi_to_java_class(pod, name);
    }

    format!("fan/{}/{}", pod, name)
}

/// `[java]foo.bar::Baz` 形式的 FFI 类型
fn ffi_to_java_class(
    pod: &str,
    name: &str,
) -> String {
    let package = pod.strip_prefix("[java]").unwrap_or(pod);

    if package.is_empty() {
        match name {
            "int" => return "I".to_string(),
            "char" => return "C".to_string(),
            "byte" => return "B".to_string(),
            "short" => return "S".to_string(),
            "float" => return "F".to_string(),
            "long" => return "J".to_string(),
            "double" => return "D".to_string(),
            "boolean" => return "Z".to_string(),
            _ => {}
        }
    }

    if package == "fanx.interop" {
        let arr = match name {
            "BooleanArray" => Some("[Z"),
            "ByteArray" => Some("[B"),
            "ShortArray" => Some("[S"),
            "CharArray" => Some("[C"),
            "IntArray" => Some("[I"),
            "LongArray" => Some("[J"),
            "FloatArray" => Some("[F"),
            "DoubleArray" => Some("[D"),
            _ => None,
        };
        if let Some(a) = arr {
            return a.to_string();
        }
    }

    let dims = name.chars().take_while(|&c| c == '[').count();
    let base = &name[dims..];
    let mut s = String::with_capacity(pod.len() + name.len() + 2);
    for _ in 0..dims {
        s.push('[');
    }
    if dims > 0 {
        s.push('L');
    }
    if !package.is_empty() {
        s.push_str(&package.replace('.', "/"));
        s.push('/');
    }
    s.push_str(base);
    if dims > 0 {
        s.push(';');
    }
    s
}

/// JVM 类型名到实现类名
pub fn java_impl_sig(jname: &str) -> &str {
    match jname {
        "Z" | "java/lang/Boolean" => "fan/sys/FanBool",
        "J" | "java/lang/Long" => "fan/sys/FanInt",
        "D" | "java/lang/Double" => "fan/sys/FanFloat",
        "java/lang/Object" => "fan/sys/FanObj",
        "java/lang/String" => "fan/sys/FanStr",
        "java/lang/Number" => "fan/sys/FanNum",
        "java/math/BigDecimal" => "fan/sys/FanDecimal",
        other => other,
    }
}
