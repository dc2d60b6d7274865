//! 执行发出字节码的最小 JVM 子集
//!
//! 只覆盖端到端场景用到的指令；宽值（long/double）在操作数栈上占一项，
//! 在局部变量表中占两个槽位。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use fanjvm::emit::{ConstValue, EmittedClass, PodConstants};
use fanjvm::jvm::opcodes::*;
use fanjvm::jvm::reader::read_u2;
use fanjvm::jvm::ParsedClass;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Double(f64),
    Null,
    Ref(Rc<Obj>),
}

impl Value {
    fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn long(&self) -> i64 {
        match self {
            Value::Long(v) => *v,
            other => panic!("expected long, got {:?}", other),
        }
    }

    pub fn int(&self) -> i32 {
        match self {
            Value::Int(v) => *v,
            other => panic!("expected int, got {:?}", other),
        }
    }
}

#[derive(Debug)]
pub enum Obj {
    Long(i64),
    Double(f64),
    Str(String),
    Instance {
        class: String,
        fields: RefCell<HashMap<String, Value>>,
    },
}

/// 参数是否为宽值，以及是否有返回值
fn parse_desc(desc: &str) -> (Vec<bool>, bool) {
    let mut params = Vec::new();
    let mut chars = desc.chars().skip(1).peekable();
    while let Some(c) = chars.next() {
        match c {
            ')' => break,
            'J' | 'D' => params.push(true),
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                params.push(false);
            }
            '[' => {
                while chars.peek() == Some(&'[') {
                    chars.next();
                }
                if chars.next() == Some('L') {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                params.push(false);
            }
            _ => params.push(false),
        }
    }
    let returns = !desc.ends_with(")V");
    (params, returns)
}

fn split_member(sig: &str) -> (&str, &str) {
    let dot = sig.find('.').unwrap_or(0);
    (&sig[..dot], &sig[dot + 1..])
}

pub struct Machine {
    classes: HashMap<String, ParsedClass>,
    pod_class: String,
    consts: PodConstants,
    /// 防止失控循环
    fuel: RefCell<usize>,
}

impl Machine {
    pub fn new(
        classes: &[EmittedClass],
        pod: &str,
        consts: PodConstants,
    ) -> Self {
        let classes = classes
            .iter()
            .map(|c| (c.name.clone(), ParsedClass::parse(&c.bytes).unwrap()))
            .collect();
        Self {
            classes,
            pod_class: format!("fan/{}/$Pod", pod),
            consts,
            fuel: RefCell::new(100_000),
        }
    }

    pub fn class(
        &self,
        name: &str,
    ) -> &ParsedClass {
        &self.classes[name]
    }

    fn constant(
        &self,
        field: &str,
    ) -> Result<Value, String> {
        let v = self
            .consts
            .get(field)
            .ok_or_else(|| format!("no constant {}", field))?;
        Ok(Value::Ref(Rc::new(match v {
            ConstValue::Int(i) => Obj::Long(*i),
            ConstValue::Float(f) => Obj::Double(*f),
            ConstValue::Str(s) | ConstValue::Decimal(s) | ConstValue::Uri(s) => Obj::Str(s.clone()),
            ConstValue::Duration(d) => Obj::Long(*d),
        })))
    }

    /// 调用 `class.name desc`；类不在发出集合中时只接受 `<init>`
    pub fn invoke(
        &self,
        class: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let Some(cls) = self.classes.get(class) else {
            if name == "<init>" {
                return Ok(None);
            }
            return Err(format!("class {} not loaded", class));
        };
        let method = cls
            .method(name, desc)
            .ok_or_else(|| format!("no method {}.{}{}", class, name, desc))?;
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| format!("{}.{}{} is abstract", class, name, desc))?;

        let mut locals = vec![Value::Null; code.max_locals as usize + 1];
        let mut slot = 0;
        for a in args {
            let wide = a.is_wide();
            locals[slot] = a;
            slot += if wide { 2 } else { 1 };
        }
        self.run(cls, &code.code, locals)
    }

    fn run(
        &self,
        cls: &ParsedClass,
        code: &[u8],
        mut locals: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        macro_rules! pop {
            () => {
                stack.pop().ok_or_else(|| format!("stack underflow at {}", pc))?
            };
        }

        loop {
            {
                let mut fuel = self.fuel.borrow_mut();
                if *fuel == 0 {
                    return Err("out of fuel".to_string());
                }
                *fuel -= 1;
            }
            let op = *code.get(pc).ok_or_else(|| format!("pc {} past end", pc))?;
            let u1 = || code[pc + 1] as usize;
            let branch = || pc as i64 + read_u2(code, pc + 1) as i16 as i64;
            let mut next = pc + instr_len(code, pc);

            match op {
                NOP => {}
                ACONST_NULL => stack.push(Value::Null),
                ICONST_M1..=ICONST_5 => stack.push(Value::Int(op as i32 - ICONST_0 as i32)),
                LCONST_0 | LCONST_1 => stack.push(Value::Long((op - LCONST_0) as i64)),
                BIPUSH => stack.push(Value::Int(code[pc + 1] as i8 as i32)),
                ILOAD | LLOAD | DLOAD | ALOAD => stack.push(locals[u1()].clone()),
                0x1a..=0x2d => stack.push(locals[((op - 0x1a) % 4) as usize].clone()),
                ISTORE | LSTORE | DSTORE | ASTORE => locals[u1()] = pop!(),
                0x3b..=0x4e => locals[((op - 0x3b) % 4) as usize] = pop!(),
                POP => {
                    pop!();
                }
                POP2 => {
                    if !pop!().is_wide() {
                        pop!();
                    }
                }
                DUP => {
                    let v = pop!();
                    stack.push(v.clone());
                    stack.push(v);
                }
                DUP2 => {
                    let v = pop!();
                    assert!(v.is_wide(), "dup2 of narrow values not modelled");
                    stack.push(v.clone());
                    stack.push(v);
                }
                LADD | LSUB | LMUL => {
                    let b = pop!().long();
                    let a = pop!().long();
                    stack.push(Value::Long(match op {
                        LADD => a.wrapping_add(b),
                        LSUB => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    }));
                }
                LNEG => {
                    let a = pop!().long();
                    stack.push(Value::Long(-a));
                }
                L2I => {
                    let a = pop!().long();
                    stack.push(Value::Int(a as i32));
                }
                I2L => {
                    let a = pop!().int();
                    stack.push(Value::Long(a as i64));
                }
                LCMP => {
                    let b = pop!().long();
                    let a = pop!().long();
                    stack.push(Value::Int(a.cmp(&b) as i32));
                }
                IFEQ..=IFLE => {
                    let v = pop!().int();
                    let taken = match op {
                        IFEQ => v == 0,
                        IFNE => v != 0,
                        IFLT => v < 0,
                        IFGE => v >= 0,
                        IFGT => v > 0,
                        _ => v <= 0,
                    };
                    if taken {
                        next = branch() as usize;
                    }
                }
                IF_ICMPEQ | IF_ICMPNE => {
                    let b = pop!().int();
                    let a = pop!().int();
                    if (a == b) == (op == IF_ICMPEQ) {
                        next = branch() as usize;
                    }
                }
                IFNULL | IFNONNULL => {
                    let is_null = matches!(pop!(), Value::Null);
                    if is_null == (op == IFNULL) {
                        next = branch() as usize;
                    }
                }
                GOTO => next = branch() as usize,
                TABLESWITCH => {
                    let pad = (4 - (pc + 1) % 4) % 4;
                    let base = pc + 1 + pad;
                    let read = |at: usize| {
                        i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
                    };
                    let (default, low, high) = (read(base), read(base + 4), read(base + 8));
                    let idx = pop!().int();
                    let off = if idx >= low && idx <= high {
                        read(base + 12 + (idx - low) as usize * 4)
                    } else {
                        default
                    };
                    next = (pc as i64 + off as i64) as usize;
                }
                IRETURN..=ARETURN => return Ok(Some(pop!())),
                RETURN => return Ok(None),
                GETSTATIC => {
                    let sig = cls.describe(read_u2(code, pc + 1)).map_err(|e| e.to_string())?;
                    let (owner, member) = split_member(&sig);
                    if owner != self.pod_class {
                        return Err(format!("getstatic {} not modelled", sig));
                    }
                    let field = member.split(':').next().unwrap_or_default();
                    stack.push(self.constant(field)?);
                }
                GETFIELD | PUTFIELD => {
                    let sig = cls.describe(read_u2(code, pc + 1)).map_err(|e| e.to_string())?;
                    let (_, member) = split_member(&sig);
                    let field = member.split(':').next().unwrap_or_default().to_string();
                    let value = if op == PUTFIELD { Some(pop!()) } else { None };
                    let Value::Ref(obj) = pop!() else {
                        return Err(format!("field {} on non-object", field));
                    };
                    let Obj::Instance { fields, .. } = &*obj else {
                        return Err(format!("field {} on boxed value", field));
                    };
                    match value {
                        Some(v) => {
                            fields.borrow_mut().insert(field, v);
                        }
                        None => {
                            let v = fields.borrow().get(&field).cloned().unwrap_or(Value::Null);
                            stack.push(v);
                        }
                    }
                }
                NEW => {
                    let class = cls.describe(read_u2(code, pc + 1)).map_err(|e| e.to_string())?;
                    stack.push(Value::Ref(Rc::new(Obj::Instance {
                        class,
                        fields: RefCell::new(HashMap::new()),
                    })));
                }
                INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => {
                    let sig = cls.describe(read_u2(code, pc + 1)).map_err(|e| e.to_string())?;
                    let (owner, member) = split_member(&sig);
                    let paren = member.find('(').unwrap_or(member.len());
                    let (name, desc) = member.split_at(paren);
                    let (params, returns) = parse_desc(desc);
                    let mut args = Vec::with_capacity(params.len() + 1);
                    for _ in 0..params.len() {
                        args.push(pop!());
                    }
                    if op != INVOKESTATIC {
                        args.push(pop!());
                    }
                    args.reverse();

                    let result = match (owner, name) {
                        ("java/lang/Long", "longValue") | ("java/lang/Double", "doubleValue") => {
                            match &args[0] {
                                Value::Ref(o) => match &**o {
                                    Obj::Long(v) => Some(Value::Long(*v)),
                                    Obj::Double(v) => Some(Value::Double(*v)),
                                    other => return Err(format!("unbox {:?}", other)),
                                },
                                other => return Err(format!("unbox {:?}", other)),
                            }
                        }
                        _ if op == INVOKEVIRTUAL => {
                            let Value::Ref(o) = &args[0] else {
                                return Err(format!("invokevirtual {} on null", sig));
                            };
                            let class = match &**o {
                                Obj::Instance { class, .. } => class.clone(),
                                _ => owner.to_string(),
                            };
                            self.invoke(&class, name, desc, args)?
                        }
                        _ => self.invoke(owner, name, desc, args)?,
                    };
                    if returns {
                        stack.push(result.ok_or_else(|| format!("{} returned nothing", sig))?);
                    }
                }
                other => return Err(format!("opcode 0x{:02x} ({}) not modelled", other, mnemonic(other))),
            }
            pc = next;
        }
    }
}
