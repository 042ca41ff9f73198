//! 故障类型：不可恢复的单条指令错误，立即终止 step/run 并上报调用方

use thiserror::Error;

use super::memory::MemoryError;
use super::state::StateError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("取指失败: pc={pc:#06x}: {source}")]
    Fetch { pc: u32, source: MemoryError },

    #[error("非法指令: {word:#010x} at {pc:#06x}")]
    InvalidOpcode { pc: u32, word: u32 },

    #[error("访存错误: pc={pc:#06x}: {source}")]
    Memory { pc: u32, source: MemoryError },

    #[error("除零错误: pc={pc:#06x}")]
    DivideByZero { pc: u32 },

    #[error("寄存器错误: {0}")]
    Register(#[from] StateError),
}

impl Fault {
    /// 出错指令的地址（寄存器错误没有地址）
    pub fn pc(&self) -> Option<u32> {
        match self {
            Fault::Fetch { pc, .. }
            | Fault::InvalidOpcode { pc, .. }
            | Fault::Memory { pc, .. }
            | Fault::DivideByZero { pc } => Some(*pc),
            Fault::Register(_) => None,
        }
    }
}
