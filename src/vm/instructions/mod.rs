//! 指令编码格式与解码
//!
//! 每条指令是一个 32 位字，操作码占 31..24 位：
//! - R 型: rd[23:20] rs1[19:16] rs2[15:12]
//! - I 型: rd[23:20] imm16[15:0]（符号扩展）
//! - J 型: imm24[23:0]（符号扩展，绝对跳转目标）

pub mod alu;
mod execute;

pub(crate) use execute::Flow;

use thiserror::Error;

use crate::utils::bit_utils::{BitField, sign_extend_32};

const OPCODE_BITS: std::ops::Range<u32> = 24..32;
const RD_BITS: std::ops::Range<u32> = 20..24;
const RS1_BITS: std::ops::Range<u32> = 16..20;
const RS2_BITS: std::ops::Range<u32> = 12..16;
const IMM16_BITS: std::ops::Range<u32> = 0..16;
const IMM24_BITS: std::ops::Range<u32> = 0..24;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("未知操作码 {opcode:#04x} (指令 {word:#010x})")]
    UnknownOpcode { opcode: u8, word: u32 },
}

/// 操作数格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    J,
}

macro_rules! opcodes {
    ($($variant:ident = $value:literal, $name:literal, $format:ident;)*) => {
        /// 操作码
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $value,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// 助记符
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $(Opcode::$variant => Format::$format,)*
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Opcode::$variant),)*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", R;
    Halt = 0x01, "halt", R;

    Add = 0x10, "add", R;
    Sub = 0x11, "sub", R;
    Mul = 0x12, "mul", R;
    Div = 0x13, "div", R;
    Mod = 0x14, "mod", R;
    Neg = 0x15, "neg", R;
    Addi = 0x16, "addi", I;

    And = 0x20, "and", R;
    Or = 0x21, "or", R;
    Xor = 0x22, "xor", R;
    Not = 0x23, "not", R;
    Shl = 0x24, "shl", R;
    Shr = 0x25, "shr", R;

    Load = 0x30, "load", R;
    Store = 0x31, "store", R;
    LoadB = 0x32, "loadb", R;
    StoreB = 0x33, "storeb", R;
    LoadI = 0x34, "loadi", I;
    Lui = 0x35, "lui", I;
    Push = 0x36, "push", R;
    Pop = 0x37, "pop", R;

    Mov = 0x40, "mov", R;
    Cmp = 0x41, "cmp", R;
    Test = 0x42, "test", R;
    Slt = 0x43, "slt", R;
    Sle = 0x44, "sle", R;
    Seq = 0x45, "seq", R;
    Sne = 0x46, "sne", R;

    Jmp = 0x50, "jmp", J;
    Jz = 0x51, "jz", J;
    Jnz = 0x52, "jnz", J;
    Jc = 0x53, "jc", J;
    Jnc = 0x54, "jnc", J;
    Call = 0x55, "call", J;
    Ret = 0x56, "ret", R;

    Syscall = 0xF0, "syscall", R;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatR {
    pub rd: usize,
    pub rs1: usize,
    pub rs2: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatI {
    pub rd: usize,
    pub imm: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatJ {
    pub imm: i32,
}

impl FormatJ {
    /// 绝对跳转目标
    #[inline(always)]
    pub fn target(self) -> u32 {
        self.imm as u32
    }
}

#[inline(always)]
pub fn parse_opcode(inst: u32) -> u8 {
    inst.field(OPCODE_BITS) as u8
}

#[inline(always)]
pub fn parse_format_r(inst: u32) -> FormatR {
    FormatR {
        rd: inst.field(RD_BITS) as usize,
        rs1: inst.field(RS1_BITS) as usize,
        rs2: inst.field(RS2_BITS) as usize,
    }
}

#[inline(always)]
pub fn parse_format_i(inst: u32) -> FormatI {
    FormatI {
        rd: inst.field(RD_BITS) as usize,
        imm: sign_extend_32(inst.field(IMM16_BITS), 16),
    }
}

#[inline(always)]
pub fn parse_format_j(inst: u32) -> FormatJ {
    FormatJ {
        imm: sign_extend_32(inst.field(IMM24_BITS), 24),
    }
}

/// 组装 R 型指令，寄存器号取低 4 位
pub fn encode_r(op: Opcode, rd: u8, rs1: u8, rs2: u8) -> u32 {
    0u32.with_field(OPCODE_BITS, op as u32)
        .with_field(RD_BITS, rd as u32)
        .with_field(RS1_BITS, rs1 as u32)
        .with_field(RS2_BITS, rs2 as u32)
}

/// 组装 I 型指令
pub fn encode_i(op: Opcode, rd: u8, imm: i16) -> u32 {
    0u32.with_field(OPCODE_BITS, op as u32)
        .with_field(RD_BITS, rd as u32)
        .with_field(IMM16_BITS, imm as u16 as u32)
}

/// 组装 J 型指令，立即数截断为 24 位
pub fn encode_j(op: Opcode, imm: i32) -> u32 {
    0u32.with_field(OPCODE_BITS, op as u32)
        .with_field(IMM24_BITS, imm as u32)
}

/// 解码后的指令：每个操作码一个变体，携带对应的操作数格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Halt,
    Add(FormatR),
    Sub(FormatR),
    Mul(FormatR),
    Div(FormatR),
    Mod(FormatR),
    Neg(FormatR),
    Addi(FormatI),
    And(FormatR),
    Or(FormatR),
    Xor(FormatR),
    Not(FormatR),
    Shl(FormatR),
    Shr(FormatR),
    Load(FormatR),
    Store(FormatR),
    LoadB(FormatR),
    StoreB(FormatR),
    LoadI(FormatI),
    Lui(FormatI),
    Push(FormatR),
    Pop(FormatR),
    Mov(FormatR),
    Cmp(FormatR),
    Test(FormatR),
    Slt(FormatR),
    Sle(FormatR),
    Seq(FormatR),
    Sne(FormatR),
    Jmp(FormatJ),
    Jz(FormatJ),
    Jnz(FormatJ),
    Jc(FormatJ),
    Jnc(FormatJ),
    Call(FormatJ),
    Ret,
    Syscall,
}

impl Instruction {
    /// 解码一个指令字，纯函数
    pub fn decode(word: u32) -> Result<Instruction, DecodeError> {
        let opcode = Opcode::try_from(parse_opcode(word))
            .map_err(|opcode| DecodeError::UnknownOpcode { opcode, word })?;
        let r = || parse_format_r(word);
        let i = || parse_format_i(word);
        let j = || parse_format_j(word);
        Ok(match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Halt => Instruction::Halt,
            Opcode::Add => Instruction::Add(r()),
            Opcode::Sub => Instruction::Sub(r()),
            Opcode::Mul => Instruction::Mul(r()),
            Opcode::Div => Instruction::Div(r()),
            Opcode::Mod => Instruction::Mod(r()),
            Opcode::Neg => Instruction::Neg(r()),
            Opcode::Addi => Instruction::Addi(i()),
            Opcode::And => Instruction::And(r()),
            Opcode::Or => Instruction::Or(r()),
            Opcode::Xor => Instruction::Xor(r()),
            Opcode::Not => Instruction::Not(r()),
            Opcode::Shl => Instruction::Shl(r()),
            Opcode::Shr => Instruction::Shr(r()),
            Opcode::Load => Instruction::Load(r()),
            Opcode::Store => Instruction::Store(r()),
            Opcode::LoadB => Instruction::LoadB(r()),
            Opcode::StoreB => Instruction::StoreB(r()),
            Opcode::LoadI => Instruction::LoadI(i()),
            Opcode::Lui => Instruction::Lui(i()),
            Opcode::Push => Instruction::Push(r()),
            Opcode::Pop => Instruction::Pop(r()),
            Opcode::Mov => Instruction::Mov(r()),
            Opcode::Cmp => Instruction::Cmp(r()),
            Opcode::Test => Instruction::Test(r()),
            Opcode::Slt => Instruction::Slt(r()),
            Opcode::Sle => Instruction::Sle(r()),
            Opcode::Seq => Instruction::Seq(r()),
            Opcode::Sne => Instruction::Sne(r()),
            Opcode::Jmp => Instruction::Jmp(j()),
            Opcode::Jz => Instruction::Jz(j()),
            Opcode::Jnz => Instruction::Jnz(j()),
            Opcode::Jc => Instruction::Jc(j()),
            Opcode::Jnc => Instruction::Jnc(j()),
            Opcode::Call => Instruction::Call(j()),
            Opcode::Ret => Instruction::Ret,
            Opcode::Syscall => Instruction::Syscall,
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Halt => Opcode::Halt,
            Instruction::Add(_) => Opcode::Add,
            Instruction::Sub(_) => Opcode::Sub,
            Instruction::Mul(_) => Opcode::Mul,
            Instruction::Div(_) => Opcode::Div,
            Instruction::Mod(_) => Opcode::Mod,
            Instruction::Neg(_) => Opcode::Neg,
            Instruction::Addi(_) => Opcode::Addi,
            Instruction::And(_) => Opcode::And,
            Instruction::Or(_) => Opcode::Or,
            Instruction::Xor(_) => Opcode::Xor,
            Instruction::Not(_) => Opcode::Not,
            Instruction::Shl(_) => Opcode::Shl,
            Instruction::Shr(_) => Opcode::Shr,
            Instruction::Load(_) => Opcode::Load,
            Instruction::Store(_) => Opcode::Store,
            Instruction::LoadB(_) => Opcode::LoadB,
            Instruction::StoreB(_) => Opcode::StoreB,
            Instruction::LoadI(_) => Opcode::LoadI,
            Instruction::Lui(_) => Opcode::Lui,
            Instruction::Push(_) => Opcode::Push,
            Instruction::Pop(_) => Opcode::Pop,
            Instruction::Mov(_) => Opcode::Mov,
            Instruction::Cmp(_) => Opcode::Cmp,
            Instruction::Test(_) => Opcode::Test,
            Instruction::Slt(_) => Opcode::Slt,
            Instruction::Sle(_) => Opcode::Sle,
            Instruction::Seq(_) => Opcode::Seq,
            Instruction::Sne(_) => Opcode::Sne,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Jz(_) => Opcode::Jz,
            Instruction::Jnz(_) => Opcode::Jnz,
            Instruction::Jc(_) => Opcode::Jc,
            Instruction::Jnc(_) => Opcode::Jnc,
            Instruction::Call(_) => Opcode::Call,
            Instruction::Ret => Opcode::Ret,
            Instruction::Syscall => Opcode::Syscall,
        }
    }

    /// 重新编码为指令字
    pub fn encode(&self) -> u32 {
        let op = self.opcode();
        match *self {
            Instruction::Nop | Instruction::Halt | Instruction::Ret | Instruction::Syscall => {
                encode_r(op, 0, 0, 0)
            }
            Instruction::Addi(i) | Instruction::LoadI(i) | Instruction::Lui(i) => {
                encode_i(op, i.rd as u8, i.imm as i16)
            }
            Instruction::Jmp(j)
            | Instruction::Jz(j)
            | Instruction::Jnz(j)
            | Instruction::Jc(j)
            | Instruction::Jnc(j)
            | Instruction::Call(j) => encode_j(op, j.imm),
            Instruction::Add(r)
            | Instruction::Sub(r)
            | Instruction::Mul(r)
            | Instruction::Div(r)
            | Instruction::Mod(r)
            | Instruction::Neg(r)
            | Instruction::And(r)
            | Instruction::Or(r)
            | Instruction::Xor(r)
            | Instruction::Not(r)
            | Instruction::Shl(r)
            | Instruction::Shr(r)
            | Instruction::Load(r)
            | Instruction::Store(r)
            | Instruction::LoadB(r)
            | Instruction::StoreB(r)
            | Instruction::Push(r)
            | Instruction::Pop(r)
            | Instruction::Mov(r)
            | Instruction::Cmp(r)
            | Instruction::Test(r)
            | Instruction::Slt(r)
            | Instruction::Sle(r)
            | Instruction::Seq(r)
            | Instruction::Sne(r) => encode_r(op, r.rd as u8, r.rs1 as u8, r.rs2 as u8),
        }
    }
}
