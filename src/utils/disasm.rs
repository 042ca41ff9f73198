//! 指令反汇编模块

use crate::vm::instructions::{FormatI, FormatR, Instruction};

fn fmt_r3(name: &str, r: FormatR) -> String {
    format!("{} r{}, r{}, r{}", name, r.rd, r.rs1, r.rs2)
}

fn fmt_r2(name: &str, rd: usize, rs: usize) -> String {
    format!("{} r{}, r{}", name, rd, rs)
}

fn fmt_i(name: &str, i: FormatI) -> String {
    format!("{} r{}, {}", name, i.rd, i.imm)
}

/// 反汇编单条指令，永不失败：未知操作码输出为原始字
pub fn disassemble(word: u32) -> String {
    let inst = match Instruction::decode(word) {
        Ok(inst) => inst,
        Err(_) => return format!(".word {:#010x}", word),
    };
    let name = inst.opcode().mnemonic();
    match inst {
        Instruction::Nop | Instruction::Halt | Instruction::Ret | Instruction::Syscall => {
            name.to_string()
        }
        Instruction::Add(r)
        | Instruction::Sub(r)
        | Instruction::Mul(r)
        | Instruction::Div(r)
        | Instruction::Mod(r)
        | Instruction::And(r)
        | Instruction::Or(r)
        | Instruction::Xor(r)
        | Instruction::Shl(r)
        | Instruction::Shr(r)
        | Instruction::Load(r)
        | Instruction::Store(r)
        | Instruction::LoadB(r)
        | Instruction::StoreB(r)
        | Instruction::Slt(r)
        | Instruction::Sle(r)
        | Instruction::Seq(r)
        | Instruction::Sne(r) => fmt_r3(name, r),
        Instruction::Neg(r) | Instruction::Not(r) | Instruction::Mov(r) => {
            fmt_r2(name, r.rd, r.rs1)
        }
        Instruction::Cmp(r) | Instruction::Test(r) => fmt_r2(name, r.rs1, r.rs2),
        Instruction::Push(r) => format!("{} r{}", name, r.rs1),
        Instruction::Pop(r) => format!("{} r{}", name, r.rd),
        Instruction::Addi(i) | Instruction::LoadI(i) => fmt_i(name, i),
        Instruction::Lui(i) => format!("{} r{}, {:#06x}", name, i.rd, i.imm as u16),
        Instruction::Jmp(j)
        | Instruction::Jz(j)
        | Instruction::Jnz(j)
        | Instruction::Jc(j)
        | Instruction::Jnc(j)
        | Instruction::Call(j) => format!("{} {:#08x}", name, j.target()),
    }
}

/// 带地址和机器码的反汇编
pub fn disasm_with_details(word: u32, address: u32) -> String {
    format!("{:#06x}: {:08x}    {}", address, word, disassemble(word))
}

/// 反汇编小端字节流，末尾不足 4 字节的部分忽略
pub fn disasm_buffer(code: &[u8], start_address: u32) -> Vec<String> {
    code.chunks_exact(4)
        .enumerate()
        .map(|(i, bytes)| {
            let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            disasm_with_details(word, start_address.wrapping_add(i as u32 * 4))
        })
        .collect()
}
