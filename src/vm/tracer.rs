//! 指令追踪器：保存最近执行的指令

use crate::utils::disasm::disasm_with_details;
use crate::utils::ringbuf::RingBuffer;

/// 指令和地址结构体
#[derive(Debug, Clone, Copy)]
struct TraceEntry {
    pc: u32,
    code: u32,
}

pub struct ITracer {
    instructions: RingBuffer<TraceEntry>,
}

impl ITracer {
    pub fn new(capacity: usize) -> Self {
        ITracer {
            instructions: RingBuffer::new(capacity),
        }
    }

    /// 追踪一条指令
    pub fn trace(&mut self, pc: u32, code: u32) {
        self.instructions.push_overwrite(TraceEntry { pc, code });
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    /// 最近的指令（带反汇编），从旧到新
    pub fn get_instructions_log(&self) -> String {
        self.instructions
            .iter()
            .map(|inst| disasm_with_details(inst.code, inst.pc) + "\n")
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::instructions::{Opcode, encode_r};

    #[test]
    fn keeps_most_recent_entries() {
        let mut tracer = ITracer::new(2);
        tracer.trace(0, encode_r(Opcode::Nop, 0, 0, 0));
        tracer.trace(4, encode_r(Opcode::Nop, 0, 0, 0));
        tracer.trace(8, encode_r(Opcode::Halt, 0, 0, 0));
        let log = tracer.get_instructions_log();
        assert_eq!(log.lines().count(), 2);
        assert!(log.lines().last().unwrap().ends_with("halt"));
        assert!(log.starts_with("0x0004"));
    }
}
