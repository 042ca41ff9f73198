//! 调试器：断点、单步、计数器与事件列表
//!
//! 调试器不是独立线程，而是叠加在执行引擎上的状态机，每次取指之前由 `Vm::step` 查询。

use thiserror::Error;
use tracing::debug;

use super::state::Event;
use crate::const_values::DebugConfig;
use crate::utils::ringbuf::RingBuffer;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DebugError {
    #[error("断点数量已达上限 {capacity}")]
    Full { capacity: usize },
}

#[derive(Debug, Clone)]
pub struct Debugger {
    enabled: bool,
    single_step: bool,
    /// 断点地址，容量固定，线性查找
    breakpoints: Vec<u32>,
    capacity: usize,
    /// 在该地址暂停过一次，下一次 step 放行
    resume_at: Option<u32>,
    instructions: u64,
    cycles: u64,
    event_list: RingBuffer<Event>,
}

impl Debugger {
    pub fn new(config: &DebugConfig) -> Self {
        Self {
            enabled: false,
            single_step: false,
            breakpoints: Vec::with_capacity(config.breakpoint_capacity),
            capacity: config.breakpoint_capacity,
            resume_at: None,
            instructions: 0,
            cycles: 0,
            event_list: RingBuffer::new(config.event_list_size),
        }
    }

    /// 清空所有调试状态，包括计数器
    pub fn reset(&mut self) {
        self.enabled = false;
        self.single_step = false;
        self.breakpoints.clear();
        self.resume_at = None;
        self.instructions = 0;
        self.cycles = 0;
        self.event_list.clear();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        debug!(enabled, "调试器开关");
        self.enabled = enabled;
        if !enabled {
            self.resume_at = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_single_step(&mut self, single_step: bool) {
        self.single_step = single_step;
    }

    pub fn is_single_step(&self) -> bool {
        self.enabled && self.single_step
    }

    /// 添加断点；重复添加视为成功
    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), DebugError> {
        if self.breakpoints.contains(&addr) {
            return Ok(());
        }
        if self.breakpoints.len() >= self.capacity {
            return Err(DebugError::Full {
                capacity: self.capacity,
            });
        }
        debug!(addr = format_args!("{:#06x}", addr), "添加断点");
        self.breakpoints.push(addr);
        Ok(())
    }

    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        match self.breakpoints.iter().position(|&bp| bp == addr) {
            Some(index) => {
                self.breakpoints.remove(index);
                if self.resume_at == Some(addr) {
                    self.resume_at = None;
                }
                true
            }
            None => false,
        }
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
        self.resume_at = None;
    }

    pub fn breakpoints(&self) -> &[u32] {
        &self.breakpoints
    }

    /// 取指前检查：命中断点时返回 true，并标记下一次在此处放行
    pub fn should_pause_before(&mut self, pc: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if self.resume_at.take() == Some(pc) {
            return false;
        }
        if self.breakpoints.contains(&pc) {
            self.resume_at = Some(pc);
            self.record(Event::Breakpoint(pc));
            return true;
        }
        false
    }

    /// 每执行一条指令调用一次
    pub fn count_instruction(&mut self) {
        self.instructions += 1;
        self.cycles += 1;
    }

    /// SLEEP 等额外消耗的周期
    pub fn add_cycles(&mut self, cycles: u64) {
        self.cycles = self.cycles.wrapping_add(cycles);
    }

    pub fn instruction_count(&self) -> u64 {
        self.instructions
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    /// 仅在调试器启用时记录事件
    pub fn record(&mut self, event: Event) {
        if self.enabled {
            self.event_list.push_overwrite(event);
        }
    }

    /// 取出全部事件（从旧到新）
    pub fn take_events(&mut self) -> Vec<Event> {
        self.event_list.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debugger(capacity: usize) -> Debugger {
        Debugger::new(&DebugConfig {
            breakpoint_capacity: capacity,
            ..DebugConfig::default()
        })
    }

    #[test]
    fn test_breakpoint_capacity() {
        let mut dbg = debugger(2);
        dbg.add_breakpoint(0x10).unwrap();
        dbg.add_breakpoint(0x10).unwrap();
        dbg.add_breakpoint(0x20).unwrap();
        assert_eq!(dbg.add_breakpoint(0x30), Err(DebugError::Full { capacity: 2 }));
        assert!(dbg.remove_breakpoint(0x10));
        assert!(!dbg.remove_breakpoint(0x10));
        dbg.add_breakpoint(0x30).unwrap();
        assert_eq!(dbg.breakpoints(), &[0x20, 0x30]);
        dbg.clear_breakpoints();
        assert!(dbg.breakpoints().is_empty());
    }

    #[test]
    fn test_pause_then_resume_once() {
        let mut dbg = debugger(4);
        dbg.add_breakpoint(0x8).unwrap();
        // 未启用时不暂停
        assert!(!dbg.should_pause_before(0x8));
        dbg.set_enabled(true);
        assert!(dbg.should_pause_before(0x8));
        assert!(!dbg.should_pause_before(0x8));
        assert!(dbg.should_pause_before(0x8));
        assert_eq!(
            dbg.take_events(),
            vec![Event::Breakpoint(0x8), Event::Breakpoint(0x8)]
        );
    }

    #[test]
    fn test_counters_and_reset() {
        let mut dbg = debugger(4);
        dbg.count_instruction();
        dbg.count_instruction();
        dbg.add_cycles(10);
        assert_eq!(dbg.instruction_count(), 2);
        assert_eq!(dbg.cycle_count(), 12);
        dbg.reset();
        assert_eq!(dbg.instruction_count(), 0);
        assert_eq!(dbg.cycle_count(), 0);
    }

    #[test]
    fn test_events_only_when_enabled() {
        let mut dbg = debugger(4);
        dbg.record(Event::Halted);
        assert!(dbg.take_events().is_empty());
        dbg.set_enabled(true);
        dbg.record(Event::Syscall(2));
        dbg.record(Event::SingleStep(8));
        assert_eq!(
            dbg.take_events(),
            vec![Event::Syscall(2), Event::SingleStep(8)]
        );
    }
}
