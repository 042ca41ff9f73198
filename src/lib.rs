//! 32位软件CPU虚拟机库
pub mod const_values;
pub mod utils;
pub mod vm;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use tracing::{error, info, warn};

use const_values::VmConfig;
pub use utils::disasm::{disasm_buffer, disasm_with_details, disassemble};
pub use vm::instructions::{Instruction, Opcode, encode_i, encode_j, encode_r};
pub use vm::{Event, Fault, RunOutcome, StepStatus, Vm};

/// 32位软件CPU
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// 程序镜像路径
    #[arg(short, long)]
    pub image: Option<String>,

    /// 镜像为十六进制文本（每个字8个十六进制字符）
    #[arg(long)]
    pub hex: bool,

    /// 加载地址，覆盖配置文件
    #[arg(short, long, value_parser = parse_u32)]
    pub load_addr: Option<u32>,

    /// 入口PC，覆盖配置文件
    #[arg(short, long, value_parser = parse_u32)]
    pub entry: Option<u32>,

    /// 配置文件地址
    #[arg(short, long, default_value = "profile/config.toml")]
    pub config: String,

    /// 是否启用调试器
    #[arg(short, long)]
    pub debug: bool,

    /// 断点地址，可重复指定
    #[arg(short = 'b', long = "break", value_parser = parse_u32)]
    pub breakpoints: Vec<u32>,

    /// 单步模式（需要 --debug）
    #[arg(short, long)]
    pub single_step: bool,

    /// 最大执行指令数
    #[arg(short, long)]
    pub max_steps: Option<u64>,

    /// 只反汇编镜像，不执行
    #[arg(long)]
    pub disasm: bool,
}

/// 解析十进制或 0x 前缀的十六进制地址
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("无效的地址 {s:?}: {e}"))
}

/// 相对路径相对于项目目录解析
fn load_config(path: &str) -> Result<VmConfig> {
    let arg_cfg_path = PathBuf::from(path);
    let config_path = if arg_cfg_path.is_absolute() {
        arg_cfg_path
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(path)
    };
    if !config_path.exists() {
        warn!(path = %config_path.display(), "配置文件不存在，使用默认配置");
        return Ok(VmConfig::default());
    }
    VmConfig::new(config_path)
}

fn report_pause(vm: &mut Vm) {
    println!(
        "{}",
        format!("调试器暂停 @ {:#06x}", vm.pc()).yellow().bold()
    );
    println!("{}", vm);
    for event in vm.take_events() {
        info!(?event, "调试事件");
    }
}

pub fn build_vm_run_blocking(args: Args) -> Result<i32> {
    let mut config = load_config(&args.config)?;
    if let Some(addr) = args.load_addr {
        config.memory.load_addr = addr;
    }
    if let Some(entry) = args.entry {
        config.memory.entry_pc = entry;
    }
    let load_addr = config.memory.load_addr;

    let Some(image_path) = &args.image else {
        bail!("未指定程序镜像 (--image)");
    };
    info!(path = %image_path, hex = args.hex, "读取程序镜像");
    let image = utils::image::load_image(image_path, args.hex)?;

    if args.disasm {
        for line in disasm_buffer(&image, load_addr) {
            println!("{}", line);
        }
        return Ok(0);
    }

    let mut vm = Vm::with_config(config);
    vm.load_program(load_addr, &image)
        .with_context(|| format!("无法加载程序镜像到 {:#06x}", load_addr))?;

    if args.debug {
        info!(breakpoints = ?args.breakpoints, single_step = args.single_step, "启用调试模式");
        vm.enable_debugger();
        vm.set_single_step(args.single_step);
        for &addr in &args.breakpoints {
            vm.add_breakpoint(addr)?;
        }
    }

    let budget = args.max_steps.unwrap_or(u64::MAX);
    let exit_code = loop {
        let left = budget.saturating_sub(vm.instruction_count());
        if left == 0 {
            error!("CPU状态:\n{}", vm);
            bail!("达到最大执行指令数 {}", budget);
        }
        match vm.steps(left) {
            Ok(StepStatus::Halted) => break vm.exit_code(),
            Ok(StepStatus::Paused) => report_pause(&mut vm),
            Ok(StepStatus::Continue) => {}
            Err(fault) => {
                error!("CPU状态:\n{}", vm);
                return Err(fault).context("客户程序执行故障");
            }
        }
    };

    let summary = format!(
        "执行完成: {} 条指令, {} 个周期, 退出码 {}",
        vm.instruction_count(),
        vm.cycle_count(),
        exit_code
    );
    if exit_code == 0 {
        info!("{}", summary.green());
    } else {
        info!("{}", summary.red());
    }

    #[cfg(feature = "tracer")]
    {
        // 打印追踪日志
        let log = vm.trace_log();
        if log.is_empty() {
            info!("没有追踪日志");
        } else {
            info!("追踪日志:\n{}", log);
        }
    }

    Ok(exit_code)
}
