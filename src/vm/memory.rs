//! 地址空间与页表
//!
//! 所有访存（取指、读、写、字节读写、主机侧内省）都必须经过
//! [`AddressSpace::check_access`]，不存在绕过权限检查的路径。

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use thiserror::Error;

use crate::const_values::{
    CODE_PAGES, HEAP_PAGES, MEMORY_SIZE, PAGE_COUNT, PAGE_SIZE, RESERVED_PAGES, STACK_PAGES,
};

/// 内存错误类型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("内存访问违例: 地址 {addr:#06x}, 大小 {size}, 需要权限 {required}")]
    AccessViolation {
        addr: u32,
        size: usize,
        required: PageFlags,
    },
    #[error("内存访问越界: 地址 {addr:#x}, 大小 {size}")]
    OutOfRange { addr: u32, size: usize },
    #[error("无效的页号: {0}")]
    InvalidPage(usize),
}

/// 页保护位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PageFlags(u8);

impl PageFlags {
    pub const NONE: PageFlags = PageFlags(0);
    pub const PRESENT: PageFlags = PageFlags(1 << 0);
    pub const READ: PageFlags = PageFlags(1 << 1);
    pub const WRITE: PageFlags = PageFlags(1 << 2);
    pub const EXECUTE: PageFlags = PageFlags(1 << 3);

    pub const fn from_bits(bits: u8) -> Self {
        PageFlags(bits & 0x0F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: PageFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PageFlags {
    type Output = PageFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        PageFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag: PageFlags, c: char| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            bit(PageFlags::PRESENT, 'p'),
            bit(PageFlags::READ, 'r'),
            bit(PageFlags::WRITE, 'w'),
            bit(PageFlags::EXECUTE, 'x')
        )
    }
}

/// 默认页表布局
fn default_page_table() -> Vec<PageFlags> {
    let mut table = vec![PageFlags::NONE; PAGE_COUNT];
    let code = PageFlags::PRESENT | PageFlags::READ | PageFlags::EXECUTE;
    let data = PageFlags::PRESENT | PageFlags::READ | PageFlags::WRITE;
    table[CODE_PAGES].fill(code);
    table[HEAP_PAGES].fill(data);
    table[RESERVED_PAGES].fill(PageFlags::NONE);
    table[STACK_PAGES].fill(data);
    table
}

/// 分页地址空间
#[derive(Debug, Clone)]
pub struct AddressSpace {
    /// 内存数据
    data: Vec<u8>,
    /// 每页的保护位
    pages: Vec<PageFlags>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// 创建默认布局的地址空间
    pub fn new() -> Self {
        Self {
            data: vec![0; MEMORY_SIZE as usize],
            pages: default_page_table(),
        }
    }

    /// 清零内存并恢复默认页表
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.pages = default_page_table();
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 计算访问覆盖的页范围（左闭右开），越界时返回 None，空访问得到空范围
    #[inline(always)]
    fn page_span(&self, addr: u32, size: usize) -> Option<std::ops::Range<usize>> {
        let end = (addr as usize).checked_add(size)?;
        if end > self.data.len() {
            return None;
        }
        let first = addr as usize / PAGE_SIZE as usize;
        if size == 0 {
            return Some(first..first);
        }
        Some(first..(end - 1) / PAGE_SIZE as usize + 1)
    }

    /// 检查 `[addr, addr+size)` 覆盖的每一页都存在且具备 `required` 的全部权限
    ///
    /// 空访问不触及任何页，只要求起始地址不超出地址空间。
    pub fn check_access(&self, addr: u32, size: usize, required: PageFlags) -> bool {
        let Some(pages) = self.page_span(addr, size) else {
            return false;
        };
        let required = required | PageFlags::PRESENT;
        self.pages[pages].iter().all(|page| page.contains(required))
    }

    #[inline(always)]
    fn checked_range(
        &self,
        addr: u32,
        size: usize,
        required: PageFlags,
    ) -> Result<std::ops::Range<usize>, MemoryError> {
        if !self.check_access(addr, size, required) {
            return Err(MemoryError::AccessViolation {
                addr,
                size,
                required,
            });
        }
        let start = addr as usize;
        Ok(start..start + size)
    }

    /// 读取内存
    pub fn read(&self, addr: u32, size: usize, required: PageFlags) -> Result<&[u8], MemoryError> {
        let range = self.checked_range(addr, size, required)?;
        Ok(&self.data[range])
    }

    /// 写入内存，检查失败时不写入任何字节
    pub fn write(&mut self, addr: u32, data: &[u8], required: PageFlags) -> Result<(), MemoryError> {
        let range = self.checked_range(addr, data.len(), required)?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    /// 读取字（小端）
    pub fn read_word(&self, addr: u32, required: PageFlags) -> Result<u32, MemoryError> {
        let bytes = self.read(addr, 4, required)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 写入字（小端）
    pub fn write_word(&mut self, addr: u32, value: u32, required: PageFlags) -> Result<(), MemoryError> {
        self.write(addr, &value.to_le_bytes(), required)
    }

    /// 读取字节
    pub fn read_byte(&self, addr: u32, required: PageFlags) -> Result<u8, MemoryError> {
        Ok(self.read(addr, 1, required)?[0])
    }

    /// 写入字节
    pub fn write_byte(&mut self, addr: u32, value: u8, required: PageFlags) -> Result<(), MemoryError> {
        self.write(addr, &[value], required)
    }

    /// 加载程序镜像：只要求目标页存在，不要求写权限
    pub fn load(&mut self, addr: u32, image: &[u8]) -> Result<(), MemoryError> {
        if self.page_span(addr, image.len()).is_none() {
            return Err(MemoryError::OutOfRange {
                addr,
                size: image.len(),
            });
        }
        self.write(addr, image, PageFlags::PRESENT)
    }

    /// 获取页保护位
    pub fn page_protection(&self, page: usize) -> Result<PageFlags, MemoryError> {
        self.pages
            .get(page)
            .copied()
            .ok_or(MemoryError::InvalidPage(page))
    }

    /// 覆盖单页的保护位
    pub fn set_page_protection(&mut self, page: usize, flags: PageFlags) -> Result<(), MemoryError> {
        let entry = self
            .pages
            .get_mut(page)
            .ok_or(MemoryError::InvalidPage(page))?;
        *entry = flags;
        Ok(())
    }
}
