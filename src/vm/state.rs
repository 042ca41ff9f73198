//! CPU状态管理

use std::fmt;

use thiserror::Error;

use crate::const_values::{REGISTER_COUNT, STACK_TOP};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("寄存器访问错误: 寄存器 r{0} 超出范围")]
    InvalidRegister(usize),
}

/// 条件标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const ZERO: Flags = Flags(1 << 0);
    pub const NEGATIVE: Flags = Flags(1 << 1);
    pub const CARRY: Flags = Flags(1 << 2);
    pub const OVERFLOW: Flags = Flags(1 << 3);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, flag: Flags, value: bool) {
        if value {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }

    /// 只更新 ZERO/NEGATIVE，保留 CARRY/OVERFLOW
    pub fn update_zn(&mut self, result: u32) {
        self.set(Flags::ZERO, result == 0);
        self.set(Flags::NEGATIVE, result & 0x8000_0000 != 0);
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag: Flags, c: char| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            bit(Flags::ZERO, 'Z'),
            bit(Flags::NEGATIVE, 'N'),
            bit(Flags::CARRY, 'C'),
            bit(Flags::OVERFLOW, 'V')
        )
    }
}

/// 虚拟机整体执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ExecState {
    #[default]
    Idle,
    Running,
    /// 调试器暂停
    Paused,
    /// 已停机
    End,
    /// 上一条指令出错
    Faulted,
}

/// 单步执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Continue,
    Halted,
    Paused,
}

/// `run` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 客户程序停机，携带退出码
    Exited(i32),
    /// 调试器在该 PC 处暂停
    Paused(u32),
}

/// 调试事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    Halted,
    Breakpoint(u32),
    SingleStep(u32),
    Syscall(u32),
}

/// CPU状态
#[derive(Debug, Clone)]
pub struct State {
    // 通用寄存器
    registers: [u32; REGISTER_COUNT],
    // 程序计数器
    pc: u32,
    // 栈指针
    sp: u32,
    // 帧指针
    fp: u32,
    halted: bool,
    flags: Flags,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// 复位后的CPU状态
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            pc: 0,
            sp: STACK_TOP,
            fp: STACK_TOP,
            halted: false,
            flags: Flags::empty(),
        }
    }

    #[inline(always)]
    pub fn get_regs(&self) -> &[u32; REGISTER_COUNT] {
        &self.registers
    }

    /// 获取寄存器值
    #[inline(always)]
    pub fn get_reg(&self, reg: usize) -> Result<u32, StateError> {
        self.registers
            .get(reg)
            .copied()
            .ok_or(StateError::InvalidRegister(reg))
    }

    /// 设置寄存器值
    #[inline(always)]
    pub fn set_reg(&mut self, reg: usize, value: u32) -> Result<(), StateError> {
        let slot = self
            .registers
            .get_mut(reg)
            .ok_or(StateError::InvalidRegister(reg))?;
        *slot = value;
        Ok(())
    }

    #[inline(always)]
    pub fn get_pc(&self) -> u32 {
        self.pc
    }

    #[inline(always)]
    pub fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }

    #[inline(always)]
    pub fn get_sp(&self) -> u32 {
        self.sp
    }

    #[inline(always)]
    pub fn set_sp(&mut self, value: u32) {
        self.sp = value;
    }

    #[inline(always)]
    pub fn get_fp(&self) -> u32 {
        self.fp
    }

    #[inline(always)]
    pub fn set_fp(&mut self, value: u32) {
        self.fp = value;
    }

    #[inline(always)]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[inline(always)]
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    #[inline(always)]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[inline(always)]
    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== CPU State ===")?;
        writeln!(
            f,
            "PC: 0x{:08x}  SP: 0x{:08x}  FP: 0x{:08x}  Flags: {}{}",
            self.pc,
            self.sp,
            self.fp,
            self.flags,
            if self.halted { "  [halted]" } else { "" }
        )?;
        writeln!(f)?;
        writeln!(f, "Registers:")?;
        for (i, pair) in self.registers.chunks(4).enumerate() {
            let base = i * 4;
            writeln!(
                f,
                "  r{:<2}: 0x{:08x}  r{:<2}: 0x{:08x}  r{:<2}: 0x{:08x}  r{:<2}: 0x{:08x}",
                base,
                pair[0],
                base + 1,
                pair[1],
                base + 2,
                pair[2],
                base + 3,
                pair[3]
            )?;
        }
        Ok(())
    }
}
