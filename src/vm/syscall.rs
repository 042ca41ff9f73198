//! 系统调用分发
//!
//! 约定：r0 传入调用号并返回结果，r1..r3 为参数。失败返回 -1，不会产生故障。

use std::io;

use thiserror::Error;
use tracing::{debug, warn};

use super::Vm;
use super::memory::{MemoryError, PageFlags};
use super::state::Event;
use crate::const_values::SYSCALL_FAILURE;

/// 系统调用错误，对客户程序表现为 r0 = -1
#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("未实现的系统调用: {0}")]
    Unimplemented(u32),
    #[error("未知的系统调用: {0}")]
    Unknown(u32),
    #[error("内存访问错误: {0}")]
    Memory(#[from] MemoryError),
    #[error("主机输入输出错误: {0}")]
    Io(#[from] io::Error),
}

/// 系统调用上下文
#[derive(Debug, Clone, Copy)]
pub struct SyscallContext {
    /// 系统调用号
    pub number: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub arg2: u32,
}

/// 系统调用号
pub mod syscall_num {
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_PRINT: u32 = 2;
    pub const SYS_READ: u32 = 3;
    pub const SYS_GET_TIME: u32 = 4;
    pub const SYS_SLEEP: u32 = 5;
    pub const SYS_ALLOC: u32 = 6;
    pub const SYS_FREE: u32 = 7;
    pub const SYS_OPEN: u32 = 8;
    pub const SYS_CLOSE: u32 = 9;
    pub const SYS_READ_FILE: u32 = 10;
    pub const SYS_WRITE_FILE: u32 = 11;
}

impl Vm {
    /// 执行 SYSCALL 指令：读取 r0..r3，把结果写回 r0
    pub(super) fn handle_syscall(&mut self) {
        let regs = self.state.get_regs();
        let ctx = SyscallContext {
            number: regs[0],
            arg0: regs[1],
            arg1: regs[2],
            arg2: regs[3],
        };
        self.debugger.record(Event::Syscall(ctx.number));

        let result = match self.dispatch_syscall(ctx) {
            Ok(value) => value,
            Err(SyscallError::Unknown(number)) => {
                warn!(number, pc = self.state.get_pc(), "未知的系统调用");
                SYSCALL_FAILURE
            }
            Err(e) => {
                debug!(number = ctx.number, error = %e, "系统调用失败");
                SYSCALL_FAILURE
            }
        };
        // 寄存器 0 总在范围内
        let _ = self.state.set_reg(0, result);
    }

    fn dispatch_syscall(&mut self, ctx: SyscallContext) -> Result<u32, SyscallError> {
        use syscall_num::*;

        debug!(
            number = ctx.number,
            arg0 = ctx.arg0,
            arg1 = ctx.arg1,
            arg2 = ctx.arg2,
            "系统调用"
        );
        match ctx.number {
            SYS_EXIT => {
                self.exit_code = ctx.arg0 as i32;
                self.state.set_halted(true);
                debug!(exit_code = self.exit_code, "客户程序退出");
                Ok(0)
            }

            SYS_PRINT => {
                let data = self
                    .memory
                    .read(ctx.arg0, ctx.arg1 as usize, PageFlags::READ)?;
                self.console.write(data)?;
                Ok(ctx.arg1)
            }

            SYS_READ => {
                let capacity = ctx.arg1 as usize;
                if !self.memory.check_access(ctx.arg0, capacity, PageFlags::WRITE) {
                    return Err(MemoryError::AccessViolation {
                        addr: ctx.arg0,
                        size: capacity,
                        required: PageFlags::WRITE,
                    }
                    .into());
                }
                let limit = capacity.min(self.config.syscall.read_limit);
                let line = self.console.read_line(limit)?;
                self.memory.write(ctx.arg0, &line, PageFlags::WRITE)?;
                Ok(line.len() as u32)
            }

            SYS_GET_TIME => Ok(self.timer.ticks() as u32),

            SYS_SLEEP => {
                self.timer.advance(ctx.arg0 as u64);
                self.debugger.add_cycles(ctx.arg0 as u64);
                Ok(0)
            }

            SYS_ALLOC => Ok(self.heap.alloc(ctx.arg0)),

            SYS_FREE => {
                self.heap.free(ctx.arg0);
                Ok(0)
            }

            SYS_OPEN | SYS_CLOSE | SYS_READ_FILE | SYS_WRITE_FILE => {
                Err(SyscallError::Unimplemented(ctx.number))
            }

            _ => Err(SyscallError::Unknown(ctx.number)),
        }
    }
}
