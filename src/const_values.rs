use anyhow::{self, Context};
use serde::Deserialize;
use std::path::Path;

/// 页大小（字节）
pub const PAGE_SIZE: u32 = 256;
/// 页数量
pub const PAGE_COUNT: usize = 256;
/// 地址空间总大小（64 KiB）
pub const MEMORY_SIZE: u32 = PAGE_SIZE * PAGE_COUNT as u32;

/// 代码区: 页 0..=63
pub const CODE_PAGES: std::ops::Range<usize> = 0..64;
/// 堆区: 页 64..=191
pub const HEAP_PAGES: std::ops::Range<usize> = 64..192;
/// 保留区（未映射）: 页 192..=223
pub const RESERVED_PAGES: std::ops::Range<usize> = 192..224;
/// 栈区: 页 224..=255
pub const STACK_PAGES: std::ops::Range<usize> = 224..256;

pub const HEAP_BASE: u32 = HEAP_PAGES.start as u32 * PAGE_SIZE;
pub const HEAP_SIZE: u32 = (HEAP_PAGES.end - HEAP_PAGES.start) as u32 * PAGE_SIZE;

/// 复位后的栈顶（栈向下增长）
pub const STACK_TOP: u32 = MEMORY_SIZE - 4;

pub const REGISTER_COUNT: usize = 16;

/// 系统调用失败返回值 (-1)
pub const SYSCALL_FAILURE: u32 = u32::MAX;

/// 程序加载相关配置
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub load_addr: u32,
    pub entry_pc: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            load_addr: 0,
            entry_pc: 0,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DebugConfig {
    pub event_list_size: usize,
    pub breakpoint_capacity: usize,
    pub instruction_tracer_list_size: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            event_list_size: 64,
            breakpoint_capacity: 16,
            instruction_tracer_list_size: 32,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SyscallConfig {
    /// READ 系统调用单次最多读取的字节数
    pub read_limit: usize,
}

impl Default for SyscallConfig {
    fn default() -> Self {
        Self { read_limit: 256 }
    }
}

/// 虚拟机配置（来自 profile/config.toml），所有字段都有默认值
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VmConfig {
    pub memory: MemoryConfig,
    pub debug: DebugConfig,
    pub syscall: SyscallConfig,
}

impl VmConfig {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<VmConfig> {
        let toml_str = std::fs::read_to_string(&path)
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref().as_os_str()))?;
        Self::from_toml(&toml_str)
            .with_context(|| format!("无法解析配置文件: {:?}", path.as_ref().as_os_str()))
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<VmConfig> {
        let config: VmConfig = toml::from_str(toml_str)?;
        if config.debug.event_list_size == 0 {
            anyhow::bail!("debug.event_list_size 必须大于 0");
        }
        anyhow::Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_consistent() {
        assert_eq!(MEMORY_SIZE, 0x1_0000);
        assert_eq!(HEAP_BASE, 0x4000);
        assert_eq!(HEAP_SIZE, 0x8000);
        assert_eq!(STACK_TOP, 0xFFFC);
        assert_eq!(RESERVED_PAGES.end, STACK_PAGES.start);
        assert_eq!(CODE_PAGES.end, HEAP_PAGES.start);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config = VmConfig::from_toml(
            r#"
            [memory]
            load_addr = 0x100

            [syscall]
            read_limit = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.memory.load_addr, 0x100);
        assert_eq!(config.memory.entry_pc, 0);
        assert_eq!(config.syscall.read_limit, 16);
        assert_eq!(config.debug.breakpoint_capacity, 16);
    }

    #[test]
    fn zero_event_list_is_rejected() {
        let result = VmConfig::from_toml("[debug]\nevent_list_size = 0\n");
        assert!(result.is_err());
    }
}
