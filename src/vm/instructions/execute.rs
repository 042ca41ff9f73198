//! 指令执行

use super::alu::{self, AluResult};
use super::{FormatR, Instruction};
use crate::vm::Vm;
use crate::vm::fault::Fault;
use crate::vm::memory::{MemoryError, PageFlags};
use crate::vm::state::Flags;

/// 指令执行后 PC 的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// 顺序执行，PC += 4
    Next,
    /// 指令自己设置了 PC
    Jump(u32),
    /// 停机，PC += 4
    Halt,
}

impl Vm {
    /// 执行一条已解码的指令。出错时不修改寄存器、SP、标志位或内存
    pub(crate) fn execute(&mut self, inst: Instruction, pc: u32) -> Result<Flow, Fault> {
        let mem_fault = move |source: MemoryError| Fault::Memory { pc, source };

        match inst {
            Instruction::Nop => {}
            Instruction::Halt => {
                self.state.set_halted(true);
                return Ok(Flow::Halt);
            }

            Instruction::Add(r) => self.arith(r, alu::add)?,
            Instruction::Sub(r) => self.arith(r, alu::sub)?,
            Instruction::Mul(r) => self.arith(r, alu::mul)?,
            Instruction::Div(r) => self.divide(r, pc, u32::checked_div)?,
            Instruction::Mod(r) => self.divide(r, pc, u32::checked_rem)?,
            Instruction::Neg(r) => {
                let res = alu::neg(self.state.get_reg(r.rs1)?);
                self.write_result(r.rd, res)?;
            }
            Instruction::Addi(i) => {
                let res = alu::add(self.state.get_reg(i.rd)?, i.imm as u32);
                self.write_result(i.rd, res)?;
            }

            Instruction::And(r) => self.logic(r, |a, b| a & b)?,
            Instruction::Or(r) => self.logic(r, |a, b| a | b)?,
            Instruction::Xor(r) => self.logic(r, |a, b| a ^ b)?,
            Instruction::Not(r) => self.logic(r, |a, _| !a)?,
            Instruction::Shl(r) => self.logic(r, |a, b| a << (b & 0x1F))?,
            Instruction::Shr(r) => self.logic(r, |a, b| a >> (b & 0x1F))?,

            Instruction::Load(r) => {
                let addr = self.effective_address(r)?;
                let value = self
                    .memory
                    .read_word(addr, PageFlags::READ)
                    .map_err(mem_fault)?;
                self.state.set_reg(r.rd, value)?;
            }
            Instruction::Store(r) => {
                let addr = self.effective_address(r)?;
                let value = self.state.get_reg(r.rd)?;
                self.memory
                    .write_word(addr, value, PageFlags::WRITE)
                    .map_err(mem_fault)?;
            }
            Instruction::LoadB(r) => {
                let addr = self.effective_address(r)?;
                let value = self
                    .memory
                    .read_byte(addr, PageFlags::READ)
                    .map_err(mem_fault)?;
                self.state.set_reg(r.rd, value as u32)?;
            }
            Instruction::StoreB(r) => {
                let addr = self.effective_address(r)?;
                let value = self.state.get_reg(r.rd)? as u8;
                self.memory
                    .write_byte(addr, value, PageFlags::WRITE)
                    .map_err(mem_fault)?;
            }
            Instruction::LoadI(i) => self.state.set_reg(i.rd, i.imm as u32)?,
            Instruction::Lui(i) => self.state.set_reg(i.rd, (i.imm as u32) << 16)?,
            Instruction::Push(r) => {
                let value = self.state.get_reg(r.rs1)?;
                self.push_word(value).map_err(mem_fault)?;
            }
            Instruction::Pop(r) => {
                let value = self.peek_word().map_err(mem_fault)?;
                self.state.set_reg(r.rd, value)?;
                self.state.set_sp(self.state.get_sp().wrapping_add(4));
            }

            Instruction::Mov(r) => {
                let value = self.state.get_reg(r.rs1)?;
                self.state.set_reg(r.rd, value)?;
            }
            Instruction::Cmp(r) => {
                let res = alu::sub(self.state.get_reg(r.rs1)?, self.state.get_reg(r.rs2)?);
                res.apply(self.state.flags_mut());
            }
            Instruction::Test(r) => {
                let value = self.state.get_reg(r.rs1)? & self.state.get_reg(r.rs2)?;
                self.state.flags_mut().update_zn(value);
            }
            Instruction::Slt(r) => self.set_if(r, |a, b| (a as i32) < (b as i32))?,
            Instruction::Sle(r) => self.set_if(r, |a, b| (a as i32) <= (b as i32))?,
            Instruction::Seq(r) => self.set_if(r, |a, b| a == b)?,
            Instruction::Sne(r) => self.set_if(r, |a, b| a != b)?,

            Instruction::Jmp(j) => return Ok(Flow::Jump(j.target())),
            Instruction::Jz(j) => return Ok(self.branch_if(Flags::ZERO, true, j.target())),
            Instruction::Jnz(j) => return Ok(self.branch_if(Flags::ZERO, false, j.target())),
            Instruction::Jc(j) => return Ok(self.branch_if(Flags::CARRY, true, j.target())),
            Instruction::Jnc(j) => return Ok(self.branch_if(Flags::CARRY, false, j.target())),
            Instruction::Call(j) => {
                self.push_word(pc.wrapping_add(4)).map_err(mem_fault)?;
                return Ok(Flow::Jump(j.target()));
            }
            Instruction::Ret => {
                let target = self.peek_word().map_err(mem_fault)?;
                self.state.set_sp(self.state.get_sp().wrapping_add(4));
                return Ok(Flow::Jump(target));
            }

            Instruction::Syscall => {
                self.handle_syscall();
                if self.state.is_halted() {
                    return Ok(Flow::Halt);
                }
            }
        }
        Ok(Flow::Next)
    }

    #[inline(always)]
    fn effective_address(&self, r: FormatR) -> Result<u32, Fault> {
        Ok(self
            .state
            .get_reg(r.rs1)?
            .wrapping_add(self.state.get_reg(r.rs2)?))
    }

    #[inline(always)]
    fn write_result(&mut self, rd: usize, res: AluResult) -> Result<(), Fault> {
        self.state.set_reg(rd, res.value)?;
        res.apply(self.state.flags_mut());
        Ok(())
    }

    #[inline(always)]
    fn arith(&mut self, r: FormatR, op: fn(u32, u32) -> AluResult) -> Result<(), Fault> {
        let res = op(self.state.get_reg(r.rs1)?, self.state.get_reg(r.rs2)?);
        self.write_result(r.rd, res)
    }

    /// 除法/取模，除数为零是故障
    #[inline(always)]
    fn divide(
        &mut self,
        r: FormatR,
        pc: u32,
        op: fn(u32, u32) -> Option<u32>,
    ) -> Result<(), Fault> {
        let value = op(self.state.get_reg(r.rs1)?, self.state.get_reg(r.rs2)?)
            .ok_or(Fault::DivideByZero { pc })?;
        self.state.set_reg(r.rd, value)?;
        self.state.flags_mut().update_zn(value);
        Ok(())
    }

    /// 逻辑/移位运算，只更新 ZERO/NEGATIVE
    #[inline(always)]
    fn logic(&mut self, r: FormatR, op: fn(u32, u32) -> u32) -> Result<(), Fault> {
        let value = op(self.state.get_reg(r.rs1)?, self.state.get_reg(r.rs2)?);
        self.state.set_reg(r.rd, value)?;
        self.state.flags_mut().update_zn(value);
        Ok(())
    }

    #[inline(always)]
    fn set_if(&mut self, r: FormatR, cond: fn(u32, u32) -> bool) -> Result<(), Fault> {
        let value = cond(self.state.get_reg(r.rs1)?, self.state.get_reg(r.rs2)?);
        self.state.set_reg(r.rd, value as u32)?;
        Ok(())
    }

    #[inline(always)]
    fn branch_if(&self, flag: Flags, expected: bool, target: u32) -> Flow {
        if self.state.flags().contains(flag) == expected {
            Flow::Jump(target)
        } else {
            Flow::Next
        }
    }

    /// SP 先减 4 再写入；写入失败时 SP 不变
    fn push_word(&mut self, value: u32) -> Result<(), MemoryError> {
        let sp = self.state.get_sp().wrapping_sub(4);
        self.memory.write_word(sp, value, PageFlags::WRITE)?;
        self.state.set_sp(sp);
        Ok(())
    }

    fn peek_word(&self) -> Result<u32, MemoryError> {
        self.memory.read_word(self.state.get_sp(), PageFlags::READ)
    }
}
