//! 虚拟机核心模块

pub mod console;
pub mod debugger;
mod fault;
mod heap;
pub mod instructions;
pub mod memory;
pub mod state;
mod syscall;
mod timer;

#[cfg(feature = "tracer")] // 条件编译追踪器模块
pub mod tracer;

use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::const_values::VmConfig;
use crate::utils::disasm::disassemble;
pub use console::{BufferConsole, Console, StdConsole};
pub use debugger::{DebugError, Debugger};
pub use fault::Fault;
pub use heap::HeapAllocator;
use instructions::{Flow, Instruction};
pub use memory::{AddressSpace, MemoryError, PageFlags};
pub use state::{Event, ExecState, Flags, RunOutcome, State, StateError, StepStatus};
pub use syscall::{SyscallContext, SyscallError, syscall_num};
pub use timer::Timer;

/// 虚拟机实例，独立拥有全部状态
pub struct Vm {
    /// CPU状态
    state: State,
    /// 地址空间与页表
    memory: AddressSpace,
    heap: HeapAllocator,
    timer: Timer,
    debugger: Debugger,
    exec_state: ExecState,
    exit_code: i32,
    console: Box<dyn Console>,
    config: VmConfig,
    #[cfg(feature = "tracer")] // 条件编译追踪器相关
    tracer: tracer::ITracer,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// 使用默认配置创建虚拟机，控制台为标准输入输出
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut state = State::new();
        state.set_pc(config.memory.entry_pc);
        Self {
            state,
            memory: AddressSpace::new(),
            heap: HeapAllocator::default(),
            timer: Timer::new(),
            debugger: Debugger::new(&config.debug),
            exec_state: ExecState::Idle,
            exit_code: 0,
            console: Box::new(StdConsole),
            #[cfg(feature = "tracer")]
            tracer: tracer::ITracer::new(config.debug.instruction_tracer_list_size),
            config,
        }
    }

    /// 替换主机控制台
    pub fn with_console(mut self, console: Box<dyn Console>) -> Self {
        self.set_console(console);
        self
    }

    pub fn set_console(&mut self, console: Box<dyn Console>) {
        debug!(console = console.name(), "设置控制台");
        self.console = console;
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 恢复到初始状态（内存清零、页表、堆、定时器、调试器全部复位）
    pub fn reset(&mut self) {
        self.state = State::new();
        self.state.set_pc(self.config.memory.entry_pc);
        self.memory.reset();
        self.heap.reset();
        self.timer.reset();
        self.debugger.reset();
        self.exec_state = ExecState::Idle;
        self.exit_code = 0;
        #[cfg(feature = "tracer")]
        self.tracer.clear();
        debug!("虚拟机已复位");
    }

    /// 加载程序镜像，目标页必须全部存在
    pub fn load_program(&mut self, addr: u32, image: &[u8]) -> Result<(), MemoryError> {
        self.memory.load(addr, image)?;
        info!(
            addr = format_args!("{:#06x}", addr),
            size = image.len(),
            "加载程序镜像"
        );
        Ok(())
    }

    /// 执行单步指令
    pub fn step(&mut self) -> Result<StepStatus, Fault> {
        if self.state.is_halted() {
            self.exec_state = ExecState::End;
            return Ok(StepStatus::Halted);
        }

        let pc = self.state.get_pc();
        if self.debugger.should_pause_before(pc) {
            debug!(pc = format_args!("{:#06x}", pc), "命中断点");
            self.exec_state = ExecState::Paused;
            return Ok(StepStatus::Paused);
        }

        self.exec_state = ExecState::Running;
        match self.step_internal(pc) {
            Ok(status) => {
                self.exec_state = match status {
                    StepStatus::Continue => ExecState::Idle,
                    StepStatus::Halted => ExecState::End,
                    StepStatus::Paused => ExecState::Paused,
                };
                Ok(status)
            }
            Err(fault) => {
                warn!(%fault, "指令执行故障");
                self.exec_state = ExecState::Faulted;
                Err(fault)
            }
        }
    }

    #[inline(always)]
    fn step_internal(&mut self, pc: u32) -> Result<StepStatus, Fault> {
        // 取指
        let word = self
            .memory
            .read_word(pc, PageFlags::READ | PageFlags::EXECUTE)
            .map_err(|source| Fault::Fetch { pc, source })?;
        let inst =
            Instruction::decode(word).map_err(|_| Fault::InvalidOpcode { pc, word })?;
        trace!(pc = format_args!("{:#06x}", pc), "{}", disassemble(word));

        let flow = self.execute(inst, pc)?;
        match flow {
            Flow::Next | Flow::Halt => self.state.set_pc(pc.wrapping_add(4)),
            Flow::Jump(target) => self.state.set_pc(target),
        }
        self.debugger.count_instruction();
        #[cfg(feature = "tracer")]
        self.tracer.trace(pc, word);

        if flow == Flow::Halt {
            self.debugger.record(Event::Halted);
            return Ok(StepStatus::Halted);
        }
        if self.debugger.is_single_step() {
            self.debugger.record(Event::SingleStep(pc));
            return Ok(StepStatus::Paused);
        }
        Ok(StepStatus::Continue)
    }

    /// 最多执行 `n` 步；返回最后一步的状态，预算用完时为 `Continue`
    pub fn steps(&mut self, n: u64) -> Result<StepStatus, Fault> {
        let mut status = StepStatus::Continue;
        for _ in 0..n {
            status = self.step()?;
            if status != StepStatus::Continue {
                break;
            }
        }
        Ok(status)
    }

    /// 运行直到停机、调试暂停或故障
    pub fn run(&mut self) -> Result<RunOutcome, Fault> {
        loop {
            match self.step()? {
                StepStatus::Continue => {}
                StepStatus::Halted => return Ok(RunOutcome::Exited(self.exit_code)),
                StepStatus::Paused => return Ok(RunOutcome::Paused(self.state.get_pc())),
            }
        }
    }

    #[inline(always)]
    pub fn get_state_ref(&self) -> &State {
        &self.state
    }

    #[inline(always)]
    pub fn exec_state(&self) -> ExecState {
        self.exec_state
    }

    pub fn reg(&self, reg: usize) -> Result<u32, StateError> {
        self.state.get_reg(reg)
    }

    pub fn set_reg(&mut self, reg: usize, value: u32) -> Result<(), StateError> {
        self.state.set_reg(reg, value)
    }

    pub fn pc(&self) -> u32 {
        self.state.get_pc()
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.state.set_pc(pc);
    }

    pub fn sp(&self) -> u32 {
        self.state.get_sp()
    }

    pub fn set_sp(&mut self, sp: u32) {
        self.state.set_sp(sp);
    }

    pub fn fp(&self) -> u32 {
        self.state.get_fp()
    }

    pub fn set_fp(&mut self, fp: u32) {
        self.state.set_fp(fp);
    }

    pub fn flags(&self) -> Flags {
        self.state.flags()
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_halted()
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// 读取内存，与客户程序一样需要读权限
    pub fn read_memory(&self, addr: u32, size: usize) -> Result<Vec<u8>, MemoryError> {
        Ok(self.memory.read(addr, size, PageFlags::READ)?.to_vec())
    }

    /// 写入内存，与客户程序一样需要写权限
    pub fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.memory.write(addr, data, PageFlags::WRITE)
    }

    pub fn check_access(&self, addr: u32, size: usize, required: PageFlags) -> bool {
        self.memory.check_access(addr, size, required)
    }

    pub fn page_protection(&self, page: usize) -> Result<PageFlags, MemoryError> {
        self.memory.page_protection(page)
    }

    pub fn set_page_protection(&mut self, page: usize, flags: PageFlags) -> Result<(), MemoryError> {
        debug!(page, flags = %flags, "设置页保护");
        self.memory.set_page_protection(page, flags)
    }

    /// 十六进制转储，需要读权限
    pub fn hexdump(&self, addr: u32, size: usize) -> Result<String, MemoryError> {
        let bytes = self.memory.read(addr, size, PageFlags::READ)?;
        Ok(bytes
            .chunks(16)
            .enumerate()
            .map(|(i, line)| {
                format!(
                    "{:#06x}: {}\n",
                    addr.wrapping_add(i as u32 * 16),
                    hex::encode(line)
                )
            })
            .collect())
    }

    pub fn heap(&self) -> &HeapAllocator {
        &self.heap
    }

    /// 主机侧堆分配，与 ALLOC 系统调用相同
    pub fn alloc(&mut self, size: u32) -> u32 {
        self.heap.alloc(size)
    }

    pub fn free(&mut self, addr: u32) -> bool {
        self.heap.free(addr)
    }

    pub fn ticks(&self) -> u64 {
        self.timer.ticks()
    }

    pub fn advance_timer(&mut self, ticks: u64) {
        self.timer.advance(ticks);
    }

    /// 启用调试模式
    pub fn enable_debugger(&mut self) {
        self.debugger.set_enabled(true);
    }

    pub fn disable_debugger(&mut self) {
        self.debugger.set_enabled(false);
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub fn set_single_step(&mut self, single_step: bool) {
        self.debugger.set_single_step(single_step);
    }

    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), DebugError> {
        self.debugger.add_breakpoint(addr)
    }

    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        self.debugger.remove_breakpoint(addr)
    }

    pub fn clear_breakpoints(&mut self) {
        self.debugger.clear_breakpoints();
    }

    pub fn instruction_count(&self) -> u64 {
        self.debugger.instruction_count()
    }

    pub fn cycle_count(&self) -> u64 {
        self.debugger.cycle_count()
    }

    // 返回事件列表
    pub fn take_events(&mut self) -> Vec<Event> {
        self.debugger.take_events()
    }

    #[cfg(feature = "tracer")]
    pub fn trace_log(&self) -> String {
        self.tracer.get_instructions_log()
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        writeln!(f)?;
        writeln!(
            f,
            "Exec: {:?}  Instructions: {}  Cycles: {}  Ticks: {}",
            self.exec_state,
            self.debugger.instruction_count(),
            self.debugger.cycle_count(),
            self.timer.ticks()
        )?;
        writeln!(f)?;

        // 显示PC前后各4条指令（共9条）
        writeln!(f, "Memory around PC:")?;
        let pc = self.state.get_pc();
        let start_addr = pc.saturating_sub(4 * 4);
        for i in 0..9u32 {
            let addr = start_addr.wrapping_add(i * 4);
            let marker = if addr == pc { " <-- PC" } else { "" };
            match self.memory.read_word(addr, PageFlags::READ) {
                Ok(word) => writeln!(f, "  {:#06x}: {:08x}    {}{}", addr, word, disassemble(word), marker)?,
                Err(_) => writeln!(f, "  {:#06x}: <no access>{}", addr, marker)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::const_values::{HEAP_BASE, STACK_TOP, SYSCALL_FAILURE};
    use crate::utils::image::words_to_image;
    use instructions::{Opcode, encode_i, encode_j, encode_r};

    fn vm_with(words: &[u32]) -> Vm {
        let mut vm = Vm::new().with_console(Box::new(BufferConsole::new()));
        vm.load_program(0, &words_to_image(words)).unwrap();
        vm
    }

    fn loadi(rd: u8, imm: i16) -> u32 {
        encode_i(Opcode::LoadI, rd, imm)
    }

    fn halt() -> u32 {
        encode_r(Opcode::Halt, 0, 0, 0)
    }

    fn syscall() -> u32 {
        encode_r(Opcode::Syscall, 0, 0, 0)
    }

    #[test]
    fn test_fresh_vm() {
        let vm = Vm::new();
        assert!(vm.get_state_ref().get_regs().iter().all(|&r| r == 0));
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.sp(), STACK_TOP);
        assert_eq!(vm.fp(), STACK_TOP);
        assert_eq!(vm.flags(), Flags::empty());
        assert!(!vm.is_halted());
        assert_eq!(vm.exec_state(), ExecState::Idle);
        assert_eq!(
            vm.page_protection(0).unwrap(),
            PageFlags::PRESENT | PageFlags::READ | PageFlags::EXECUTE
        );
        assert_eq!(vm.page_protection(200).unwrap(), PageFlags::NONE);
    }

    #[test]
    fn test_loadi_halt() {
        let mut vm = vm_with(&[loadi(1, 5), halt()]);
        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
        assert_eq!(vm.reg(1).unwrap(), 5);
        assert_eq!(vm.pc(), 8);
        assert!(vm.is_halted());
        assert_eq!(vm.instruction_count(), 2);
        assert_eq!(vm.exec_state(), ExecState::End);

        // 停机后不再执行
        assert_eq!(vm.step().unwrap(), StepStatus::Halted);
        assert_eq!(vm.instruction_count(), 2);
    }

    #[test]
    fn test_add_sets_zero_and_carry() {
        let mut vm = vm_with(&[
            loadi(1, -1),
            loadi(2, 1),
            encode_r(Opcode::Add, 3, 1, 2),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(3).unwrap(), 0);
        let flags = vm.flags();
        assert!(flags.contains(Flags::ZERO));
        assert!(flags.contains(Flags::CARRY));
        assert!(!flags.contains(Flags::OVERFLOW));
        assert!(!flags.contains(Flags::NEGATIVE));
    }

    #[test]
    fn test_divide_by_zero_faults_repeatably() {
        let mut vm = vm_with(&[
            loadi(1, 10),
            loadi(2, 0),
            loadi(3, 42),
            encode_r(Opcode::Div, 3, 1, 2),
        ]);
        let fault = vm.run().unwrap_err();
        assert_eq!(fault, Fault::DivideByZero { pc: 12 });
        assert_eq!(fault.pc(), Some(12));
        assert_eq!(vm.reg(3).unwrap(), 42);
        assert_eq!(vm.pc(), 12);
        assert!(!vm.is_halted());
        assert_eq!(vm.exec_state(), ExecState::Faulted);

        assert_eq!(vm.step().unwrap_err(), fault);
        assert_eq!(vm.instruction_count(), 3);
    }

    #[test]
    fn test_mod_by_zero_faults() {
        let mut vm = vm_with(&[loadi(1, 10), encode_r(Opcode::Mod, 3, 1, 2)]);
        assert_eq!(vm.run().unwrap_err(), Fault::DivideByZero { pc: 4 });
    }

    #[test]
    fn test_store_to_code_page_faults_without_write() {
        // r1 = 0 (代码页不可写)
        let mut vm = vm_with(&[loadi(2, 0x77), encode_r(Opcode::Store, 2, 1, 0)]);
        let before = vm.read_memory(0, 8).unwrap();
        let fault = vm.run().unwrap_err();
        assert!(matches!(
            fault,
            Fault::Memory {
                pc: 4,
                source: MemoryError::AccessViolation { addr: 0, .. }
            }
        ));
        assert_eq!(vm.read_memory(0, 8).unwrap(), before);
    }

    #[test]
    fn test_store_and_load_heap() {
        let mut vm = vm_with(&[
            encode_i(Opcode::Lui, 1, 0),
            encode_i(Opcode::Addi, 1, HEAP_BASE as i16),
            loadi(2, -2),
            encode_r(Opcode::Store, 2, 1, 0),
            encode_r(Opcode::Load, 3, 1, 0),
            encode_r(Opcode::LoadB, 4, 1, 0),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(3).unwrap(), 0xFFFF_FFFE);
        assert_eq!(vm.reg(4).unwrap(), 0xFE);
        assert_eq!(vm.read_memory(HEAP_BASE, 4).unwrap(), vec![0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_jz_taken_and_jnz_untaken() {
        let mut vm = vm_with(&[
            loadi(1, 3),
            loadi(2, 3),
            encode_r(Opcode::Cmp, 0, 1, 2),
            encode_j(Opcode::Jnz, 0x40),
            encode_j(Opcode::Jz, 0x20),
        ]);
        vm.steps(3).unwrap();
        assert!(vm.flags().contains(Flags::ZERO));
        vm.step().unwrap();
        assert_eq!(vm.pc(), 0x10);
        vm.step().unwrap();
        assert_eq!(vm.pc(), 0x20);
    }

    #[test]
    fn test_call_and_ret() {
        let mut program = vec![encode_j(Opcode::Call, 0x10), halt(), 0, 0];
        program.push(loadi(5, 9));
        program.push(encode_r(Opcode::Ret, 0, 0, 0));
        let mut vm = vm_with(&program);

        vm.step().unwrap();
        assert_eq!(vm.pc(), 0x10);
        assert_eq!(vm.sp(), STACK_TOP - 4);
        assert_eq!(vm.read_memory(STACK_TOP - 4, 4).unwrap(), 4u32.to_le_bytes());

        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
        assert_eq!(vm.reg(5).unwrap(), 9);
        assert_eq!(vm.sp(), STACK_TOP);
        assert_eq!(vm.pc(), 8);
    }

    #[test]
    fn test_push_pop() {
        let mut vm = vm_with(&[
            loadi(1, 11),
            encode_r(Opcode::Push, 0, 1, 0),
            encode_r(Opcode::Pop, 2, 0, 0),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(2).unwrap(), 11);
        assert_eq!(vm.sp(), STACK_TOP);
    }

    #[test]
    fn test_invalid_opcode_and_fetch_faults() {
        let mut vm = vm_with(&[0xEE00_0000]);
        assert_eq!(
            vm.step().unwrap_err(),
            Fault::InvalidOpcode { pc: 0, word: 0xEE00_0000 }
        );

        vm.set_pc(HEAP_BASE);
        assert!(matches!(vm.step().unwrap_err(), Fault::Fetch { pc, .. } if pc == HEAP_BASE));
    }

    #[test]
    fn test_breakpoint_pauses_then_resumes() {
        let mut vm = vm_with(&[loadi(1, 1), loadi(2, 2), halt()]);
        vm.enable_debugger();
        vm.add_breakpoint(4).unwrap();

        assert_eq!(vm.run().unwrap(), RunOutcome::Paused(4));
        assert_eq!(vm.reg(1).unwrap(), 1);
        assert_eq!(vm.reg(2).unwrap(), 0);
        assert_eq!(vm.exec_state(), ExecState::Paused);

        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
        assert_eq!(vm.reg(2).unwrap(), 2);
        assert_eq!(
            vm.take_events(),
            vec![Event::Breakpoint(4), Event::Halted]
        );
    }

    #[test]
    fn test_breakpoint_ignored_when_disabled() {
        let mut vm = vm_with(&[loadi(1, 1), halt()]);
        vm.add_breakpoint(0).unwrap();
        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
        assert!(vm.take_events().is_empty());
    }

    #[test]
    fn test_single_step() {
        let mut vm = vm_with(&[loadi(1, 1), halt()]);
        vm.enable_debugger();
        vm.set_single_step(true);

        assert_eq!(vm.step().unwrap(), StepStatus::Paused);
        assert_eq!(vm.pc(), 4);
        assert_eq!(vm.step().unwrap(), StepStatus::Halted);
        assert_eq!(vm.take_events(), vec![Event::SingleStep(0), Event::Halted]);
    }

    #[test]
    fn test_exit_syscall() {
        let mut vm = vm_with(&[loadi(0, 1), loadi(1, -3), syscall(), loadi(4, 1)]);
        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(-3));
        assert_eq!(vm.exit_code(), -3);
        assert_eq!(vm.reg(0).unwrap(), 0);
        assert_eq!(vm.reg(4).unwrap(), 0);
        assert_eq!(vm.pc(), 12);
    }

    #[test]
    fn test_print_and_read() {
        let console = BufferConsole::with_input(["hello world\n"]);
        let output = console.output_handle();
        let mut vm = vm_with(&[
            // READ(heap, 5)
            loadi(0, 3),
            encode_i(Opcode::Lui, 1, 0),
            encode_i(Opcode::Addi, 1, HEAP_BASE as i16),
            loadi(2, 5),
            syscall(),
            // PRINT(heap, r0)
            encode_r(Opcode::Mov, 2, 0, 0),
            loadi(0, 2),
            syscall(),
            halt(),
        ]);
        vm.set_console(Box::new(console));
        vm.run().unwrap();
        assert_eq!(vm.reg(0).unwrap(), 5);
        assert_eq!(output.borrow().as_slice(), b"hello");
    }

    #[test]
    fn test_print_without_read_permission() {
        let mut vm = vm_with(&[
            loadi(0, 2),
            encode_i(Opcode::Lui, 1, 0),
            encode_i(Opcode::Addi, 1, HEAP_BASE as i16),
            loadi(2, 4),
            syscall(),
            halt(),
        ]);
        vm.set_page_protection(64, PageFlags::PRESENT | PageFlags::WRITE)
            .unwrap();
        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
        assert_eq!(vm.reg(0).unwrap(), SYSCALL_FAILURE);
    }

    #[test]
    fn test_alloc_time_and_unknown_syscalls() {
        let mut vm = vm_with(&[
            loadi(0, 6),
            loadi(1, 100),
            syscall(),
            encode_r(Opcode::Mov, 8, 0, 0),
            loadi(0, 5),
            loadi(1, 30),
            syscall(),
            loadi(0, 4),
            syscall(),
            encode_r(Opcode::Mov, 9, 0, 0),
            loadi(0, 99),
            syscall(),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(8).unwrap(), HEAP_BASE);
        assert_eq!(vm.heap().used(), 100);
        assert_eq!(vm.reg(9).unwrap(), 30);
        assert_eq!(vm.ticks(), 30);
        assert_eq!(vm.reg(0).unwrap(), SYSCALL_FAILURE);
        assert!(vm.cycle_count() > vm.instruction_count());
    }

    #[test]
    fn test_reset() {
        let mut vm = vm_with(&[loadi(1, 5), halt()]);
        vm.enable_debugger();
        vm.add_breakpoint(0x100).unwrap();
        vm.set_page_protection(200, PageFlags::PRESENT).unwrap();
        vm.alloc(16);
        vm.advance_timer(3);
        vm.steps(5).unwrap();

        vm.reset();
        assert_eq!(vm.reg(1).unwrap(), 0);
        assert_eq!(vm.pc(), 0);
        assert!(!vm.is_halted());
        assert_eq!(vm.instruction_count(), 0);
        assert_eq!(vm.ticks(), 0);
        assert_eq!(vm.heap().used(), 0);
        assert!(vm.debugger().breakpoints().is_empty());
        assert!(!vm.debugger().is_enabled());
        assert_eq!(vm.page_protection(200).unwrap(), PageFlags::NONE);
        assert_eq!(vm.read_memory(0, 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_host_memory_access_is_checked() {
        let mut vm = Vm::new();
        assert!(vm.write_memory(0, &[1]).is_err());
        assert!(vm.read_memory(0xC000, 1).is_err());
        vm.write_memory(HEAP_BASE, &[0xAB, 0xCD]).unwrap();
        assert_eq!(vm.hexdump(HEAP_BASE, 2).unwrap(), "0x4000: abcd\n");
        assert!(vm.load_program(0xFFFE, &[0; 4]).is_err());
    }

    #[test]
    fn test_load_empty_program() {
        let mut vm = Vm::new();
        assert_eq!(vm.load_program(0, &[]), Ok(()));
        assert!(matches!(
            vm.load_program(0x2_0000, &[]),
            Err(MemoryError::OutOfRange { addr: 0x2_0000, size: 0 })
        ));
        assert_eq!(vm.read_memory(0, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_host_sets_stack_and_frame_pointers() {
        let mut vm = Vm::new();
        vm.set_sp(0xF000);
        vm.set_fp(0xF010);
        assert_eq!((vm.sp(), vm.fp()), (0xF000, 0xF010));
        vm.reset();
        assert_eq!((vm.sp(), vm.fp()), (STACK_TOP, STACK_TOP));
    }

    #[test]
    fn test_shift_amount_masked_to_five_bits() {
        let mut vm = vm_with(&[
            loadi(1, 3),
            loadi(2, 33),
            encode_r(Opcode::Shl, 3, 1, 2),
            encode_r(Opcode::Shr, 4, 1, 2),
            loadi(5, 32),
            encode_r(Opcode::Shl, 6, 1, 5),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(3).unwrap(), 6);
        assert_eq!(vm.reg(4).unwrap(), 1);
        assert_eq!(vm.reg(6).unwrap(), 3);
    }

    #[test]
    fn test_logic_ops_keep_carry_and_overflow() {
        let mut vm = vm_with(&[
            loadi(1, 1),
            loadi(2, 2),
            encode_r(Opcode::Cmp, 0, 1, 2),
            encode_r(Opcode::And, 3, 1, 2),
            encode_i(Opcode::Lui, 4, i16::MIN),
            encode_r(Opcode::Cmp, 0, 4, 1),
            encode_r(Opcode::Or, 5, 4, 4),
            encode_r(Opcode::Xor, 6, 1, 1),
            encode_r(Opcode::Not, 7, 4, 0),
            halt(),
        ]);

        // cmp 1, 2 借位；and 结果为 0
        vm.steps(4).unwrap();
        let flags = vm.flags();
        assert_eq!(vm.reg(3).unwrap(), 0);
        assert!(flags.contains(Flags::ZERO) && flags.contains(Flags::CARRY));
        assert!(!flags.contains(Flags::NEGATIVE) && !flags.contains(Flags::OVERFLOW));

        // cmp 0x8000_0000, 1 有符号溢出；or 结果为负
        vm.steps(3).unwrap();
        let flags = vm.flags();
        assert_eq!(vm.reg(5).unwrap(), 0x8000_0000);
        assert!(flags.contains(Flags::NEGATIVE) && flags.contains(Flags::OVERFLOW));
        assert!(!flags.contains(Flags::ZERO) && !flags.contains(Flags::CARRY));

        vm.run().unwrap();
        assert_eq!(vm.reg(6).unwrap(), 0);
        assert_eq!(vm.reg(7).unwrap(), 0x7FFF_FFFF);
        let flags = vm.flags();
        assert!(!flags.contains(Flags::NEGATIVE) && !flags.contains(Flags::ZERO));
        assert!(flags.contains(Flags::OVERFLOW));
    }

    #[test]
    fn test_set_compares_are_signed_and_leave_flags() {
        let mut vm = vm_with(&[
            loadi(1, -1),
            loadi(2, 1),
            encode_r(Opcode::Slt, 3, 1, 2),
            encode_r(Opcode::Slt, 4, 2, 1),
            encode_r(Opcode::Sle, 5, 1, 1),
            encode_r(Opcode::Seq, 6, 1, 2),
            encode_r(Opcode::Sne, 7, 1, 2),
            encode_r(Opcode::Seq, 8, 2, 2),
            halt(),
        ]);
        vm.run().unwrap();
        assert_eq!(vm.reg(3).unwrap(), 1);
        assert_eq!(vm.reg(4).unwrap(), 0);
        assert_eq!(vm.reg(5).unwrap(), 1);
        assert_eq!(vm.reg(6).unwrap(), 0);
        assert_eq!(vm.reg(7).unwrap(), 1);
        assert_eq!(vm.reg(8).unwrap(), 1);
        assert_eq!(vm.flags(), Flags::empty());
    }

    #[test]
    fn test_neg_sets_flags() {
        let mut vm = vm_with(&[
            encode_i(Opcode::Lui, 1, i16::MIN),
            encode_r(Opcode::Neg, 2, 1, 0),
            encode_r(Opcode::Neg, 3, 0, 0),
            halt(),
        ]);
        vm.steps(2).unwrap();
        assert_eq!(vm.reg(2).unwrap(), 0x8000_0000);
        let flags = vm.flags();
        assert!(flags.contains(Flags::NEGATIVE));
        assert!(flags.contains(Flags::CARRY));
        assert!(flags.contains(Flags::OVERFLOW));

        vm.run().unwrap();
        assert_eq!(vm.reg(3).unwrap(), 0);
        assert_eq!(vm.flags(), Flags::ZERO);
    }

    #[test]
    fn test_jnc_taken_and_untaken() {
        let mut vm = vm_with(&[
            loadi(1, 2),
            loadi(2, 1),
            encode_r(Opcode::Cmp, 0, 1, 2),
            encode_j(Opcode::Jnc, 0x20),
            halt(),
            halt(),
            halt(),
            halt(),
            encode_r(Opcode::Cmp, 0, 2, 1), // 0x20
            encode_j(Opcode::Jnc, 0x40),
            halt(),
        ]);
        vm.steps(4).unwrap();
        assert_eq!(vm.pc(), 0x20);
        vm.steps(2).unwrap();
        assert!(vm.flags().contains(Flags::CARRY));
        assert_eq!(vm.pc(), 0x28);
        assert_eq!(vm.run().unwrap(), RunOutcome::Exited(0));
    }

    #[test]
    fn test_display_marks_pc() {
        let vm = vm_with(&[loadi(1, 5), halt()]);
        let dump = vm.to_string();
        assert!(dump.contains("loadi r1, 5 <-- PC"));
        assert!(dump.contains("halt"));
    }
}
