//! fcode 操作码定义
//!
//! 指令编码空间（与 pod 版本 1.0.22 绑定）：
//! - 0-9：字面量加载
//! - 10-19：局部变量与字段访问，16 为 Coerce
//! - 20-27：八种调用
//! - 28-30：跳转
//! - 31-41：比较
//! - 42-50：返回、栈操作、类型测试、switch
//! - 51-58：异常与 finally
//! - 59：LoadDecimal

use smallvec::SmallVec;
use std::fmt;

use super::errors::{FcodeError, FcodeResult};
use super::reader::FReader;

/// 操作数形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// 无操作数
    None,
    /// u2 表索引
    Index,
    /// u2 fcode 跳转目标
    Jump,
    /// u2 + u2 两个 typeRef
    TypePair,
    /// u2 count + count 个 u2 跳转目标
    Switch,
}

/// fcode 操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FOpcode {
    // =====================
    // 字面量 (0-9)
    // =====================
    Nop = 0,
    LoadNull = 1,
    LoadFalse = 2,
    LoadTrue = 3,
    /// 操作数：ints 表索引
    LoadInt = 4,
    /// 操作数：floats 表索引
    LoadFloat = 5,
    /// 操作数：strs 表索引
    LoadStr = 6,
    /// 操作数：durations 表索引
    LoadDuration = 7,
    /// 操作数：typeRef
    LoadType = 8,
    /// 操作数：uris 表索引
    LoadUri = 9,

    // =====================
    // 变量与字段 (10-19)
    // =====================
    /// 操作数：寄存器号（实例方法中 0 是 this）
    LoadVar = 10,
    StoreVar = 11,
    /// 操作数：fieldRef
    LoadInstance = 12,
    StoreInstance = 13,
    LoadStatic = 14,
    StoreStatic = 15,
    /// 操作数：from typeRef, to typeRef
    Coerce = 16,
    LoadMixinStatic = 18,
    StoreMixinStatic = 19,

    // =====================
    // 调用 (20-27)，操作数均为 methodRef
    // =====================
    CallNew = 20,
    CallCtor = 21,
    CallStatic = 22,
    CallVirtual = 23,
    CallNonVirtual = 24,
    CallMixinStatic = 25,
    CallMixinVirtual = 26,
    CallMixinNonVirtual = 27,

    // =====================
    // 跳转 (28-30)
    // =====================
    Jump = 28,
    JumpTrue = 29,
    JumpFalse = 30,

    // =====================
    // 比较 (31-41)
    // =====================
    CompareEQ = 31,
    CompareNE = 32,
    Compare = 33,
    CompareLE = 34,
    CompareLT = 35,
    CompareGT = 36,
    CompareGE = 37,
    CompareSame = 38,
    CompareNotSame = 39,
    /// 操作数：被测值的 typeRef
    CompareNull = 40,
    CompareNotNull = 41,

    // =====================
    // 返回与栈 (42-50)
    // =====================
    ReturnVoid = 42,
    ReturnObj = 43,
    /// 操作数：栈顶值的 typeRef
    Pop = 44,
    Dup = 45,
    DupDown = 46,
    Is = 47,
    As = 48,
    Cast = 49,
    /// 操作数：u2 count, count 个跳转目标
    Switch = 50,

    // =====================
    // 异常 (51-58)
    // =====================
    Throw = 51,
    Leave = 52,
    JumpFinally = 53,
    CatchAllStart = 54,
    /// 操作数：捕获类型 typeRef
    CatchErrStart = 55,
    CatchEnd = 56,
    FinallyStart = 57,
    FinallyEnd = 58,

    LoadDecimal = 59,
}

impl FOpcode {
    /// 操作码名称
    pub fn name(&self) -> &'static str {
        match self {
            FOpcode::Nop => "Nop",
            FOpcode::LoadNull => "LoadNull",
            FOpcode::LoadFalse => "LoadFalse",
            FOpcode::LoadTrue => "LoadTrue",
            FOpcode::LoadInt => "LoadInt",
            FOpcode::LoadFloat => "LoadFloat",
            FOpcode::LoadStr => "LoadStr",
            FOpcode::LoadDuration => "LoadDuration",
            FOpcode::LoadType => "LoadType",
            FOpcode::LoadUri => "LoadUri",
            FOpcode::LoadVar => "LoadVar",
            FOpcode::StoreVar => "StoreVar",
            FOpcode::LoadInstance => "LoadInstance",
            FOpcode::StoreInstance => "StoreInstance",
            FOpcode::LoadStatic => "LoadStatic",
            FOpcode::StoreStatic => "StoreStatic",
            FOpcode::Coerce => "Coerce",
            FOpcode::LoadMixinStatic => "LoadMixinStatic",
            FOpcode::StoreMixinStatic => "StoreMixinStatic",
            FOpcode::CallNew => "CallNew",
            FOpcode::CallCtor => "CallCtor",
            FOpcode::CallStatic => "CallStatic",
            FOpcode::CallVirtual => "CallVirtual",
            FOpcode::CallNonVirtual => "CallNonVirtual",
            FOpcode::CallMixinStatic => "CallMixinStatic",
            FOpcode::CallMixinVirtual => "CallMixinVirtual",
            FOpcode::CallMixinNonVirtual => "CallMixinNonVirtual",
            FOpcode::Jump => "Jump",
            FOpcode::JumpTrue => "JumpTrue",
            FOpcode::JumpFalse => "JumpFalse",
            FOpcode::CompareEQ => "CompareEQ",
            FOpcode::CompareNE => "CompareNE",
            FOpcode::Compare => "Compare",
            FOpcode::CompareLE => "CompareLE",
            FOpcode::CompareLT => "CompareLT",
            FOpcode::CompareGT => "CompareGT",
            FOpcode::CompareGE => "CompareGE",
            FOpcode::CompareSame => "CompareSame",
            FOpcode::CompareNotSame => "CompareNotSame",
            FOpcode::CompareNull => "CompareNull",
            FOpcode::CompareNotNull => "CompareNotNull",
            FOpcode::ReturnVoid => "ReturnVoid",
            FOpcode::ReturnObj => "ReturnObj",
            FOpcode::Pop => "Pop",
            FOpcode::Dup => "Dup",
            FOpcode::DupDown => "DupDown",
            FOpcode::Is => "Is",
            FOpcode::As => "As",
            FOpcode::Cast => "Cast",
            FOpcode::Switch => "Switch",
            FOpcode::Throw => "Throw",
            FOpcode::Leave => "Leave",
            FOpcode::JumpFinally => "JumpFinally",
            FOpcode::CatchAllStart => "CatchAllStart",
            FOpcode::CatchErrStart => "CatchErrStart",
            FOpcode::CatchEnd => "CatchEnd",
            FOpcode::FinallyStart => "FinallyStart",
            FOpcode::FinallyEnd => "FinallyEnd",
            FOpcode::LoadDecimal => "LoadDecimal",
        }
    }

    /// 操作数形状
    pub fn shape(&self) -> OperandShape {
        use FOpcode::*;
        match self {
            Nop | LoadNull | LoadFalse | LoadTrue => OperandShape::None,
            CompareSame | CompareNotSame => OperandShape::None,
            ReturnVoid | ReturnObj | DupDown | Throw => OperandShape::None,
            CatchAllStart | CatchEnd | FinallyStart | FinallyEnd => OperandShape::None,
            Jump | JumpTrue | JumpFalse | Leave | JumpFinally => OperandShape::Jump,
            Coerce | CompareEQ | CompareNE | Compare | CompareLE | CompareLT | CompareGT
            | CompareGE => OperandShape::TypePair,
            Switch => OperandShape::Switch,
            _ => OperandShape::Index,
        }
    }

    /// 是否调用指令
    pub fn is_call(&self) -> bool {
        (*self as u8) >= FOpcode::CallNew as u8 && (*self as u8) <= FOpcode::CallMixinNonVirtual as u8
    }

    /// 是否比较指令
    pub fn is_compare(&self) -> bool {
        (*self as u8) >= FOpcode::CompareEQ as u8 && (*self as u8) <= FOpcode::CompareNotNull as u8
    }

    /// 是否带跳转目标
    pub fn is_branch(&self) -> bool {
        matches!(self.shape(), OperandShape::Jump | OperandShape::Switch)
    }
}

impl fmt::Display for FOpcode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<u8> for FOpcode {
    type Error = FcodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use FOpcode::*;
        const TABLE: [Option<FOpcode>; 60] = [
            Some(Nop),
            Some(LoadNull),
            Some(LoadFalse),
            Some(LoadTrue),
            Some(LoadInt),
            Some(LoadFloat),
            Some(LoadStr),
            Some(LoadDuration),
            Some(LoadType),
            Some(LoadUri),
            Some(LoadVar),
            Some(StoreVar),
            Some(LoadInstance),
            Some(StoreInstance),
            Some(LoadStatic),
            Some(StoreStatic),
            Some(Coerce),
            None,
            Some(LoadMixinStatic),
            Some(StoreMixinStatic),
            Some(CallNew),
            Some(CallCtor),
            Some(CallStatic),
            Some(CallVirtual),
            Some(CallNonVirtual),
            Some(CallMixinStatic),
            Some(CallMixinVirtual),
            Some(CallMixinNonVirtual),
            Some(Jump),
            Some(JumpTrue),
            Some(JumpFalse),
            Some(CompareEQ),
            Some(CompareNE),
            Some(Compare),
            Some(CompareLE),
            Some(CompareLT),
            Some(CompareGT),
            Some(CompareGE),
            Some(CompareSame),
            Some(CompareNotSame),
            Some(CompareNull),
            Some(CompareNotNull),
            Some(ReturnVoid),
            Some(ReturnObj),
            Some(Pop),
            Some(Dup),
            Some(DupDown),
            Some(Is),
            Some(As),
            Some(Cast),
            Some(Switch),
            Some(Throw),
            Some(Leave),
            Some(JumpFinally),
            Some(CatchAllStart),
            Some(CatchErrStart),
            Some(CatchEnd),
            Some(FinallyStart),
            Some(FinallyEnd),
            Some(LoadDecimal),
        ];
        TABLE
            .get(value as usize)
            .copied()
            .flatten()
            .ok_or(FcodeError::UnknownOpcode(value))
    }
}

/// 一条解码后的 fcode 指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FInstr {
    /// 指令在 fcode 缓冲区中的偏移
    pub pos: usize,
    pub op: FOpcode,
    /// 操作数（switch 为全部跳转目标）
    pub args: SmallVec<[u16; 2]>,
}

impl FInstr {
    /// 第一个操作数
    pub fn arg(&self) -> u16 {
        self.args.first().copied().unwrap_or(0)
    }
}

/// 读取一条指令
pub fn read_instr(r: &mut FReader<'_>) -> FcodeResult<FInstr> {
    let pos = r.pos();
    let op = FOpcode::try_from(r.u1()?)?;
    let mut args = SmallVec::new();
    match op.shape() {
        OperandShape::None => {}
        OperandShape::Index | OperandShape::Jump => args.push(r.u2()?),
        OperandShape::TypePair => {
            args.push(r.u2()?);
            args.push(r.u2()?);
        }
        OperandShape::Switch => {
            let count = r.u2()?;
            for _ in 0..count {
                args.push(r.u2()?);
            }
        }
    }
    Ok(FInstr { pos, op, args })
}

/// 反汇编整段 fcode
pub fn disassemble(code: &[u8]) -> FcodeResult<Vec<FInstr>> {
    let mut r = FReader::new(code, "code");
    let mut out = Vec::new();
    while !r.is_empty() {
        out.push(read_instr(&mut r)?);
    }
    Ok(out)
}

/// 单条指令的文本形式
pub fn format_instr(instr: &FInstr) -> String {
    if instr.args.is_empty() {
        format!("{:4}: {}", instr.pos, instr.op)
    } else {
        let args: Vec<String> = instr.args.iter().map(|a| a.to_string()).collect();
        format!("{:4}: {} {}", instr.pos, instr.op, args.join(", "))
    }
}
