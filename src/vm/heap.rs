//! 单调递增的 bump 分配器
//!
//! `free` 故意为空操作：分配器从不回收，客户程序可以依赖堆偏移单调递增。

use tracing::debug;

use crate::const_values::{HEAP_BASE, HEAP_SIZE};

#[derive(Debug, Clone)]
pub struct HeapAllocator {
    base: u32,
    size: u32,
    used: u32,
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new(HEAP_BASE, HEAP_SIZE)
    }
}

#[inline(always)]
fn align4(size: u32) -> Option<u32> {
    size.checked_add(3).map(|v| v & !3)
}

impl HeapAllocator {
    pub fn new(base: u32, size: u32) -> Self {
        Self { base, size, used: 0 }
    }

    /// 分配 `size` 字节，失败返回 0
    pub fn alloc(&mut self, size: u32) -> u32 {
        let fits = self
            .used
            .checked_add(size)
            .is_some_and(|end| end <= self.size);
        if !fits {
            debug!(size, used = self.used, "堆空间不足");
            return 0;
        }
        let addr = self.base + self.used;
        // 对齐后可能超出堆尾，此时后续分配都会失败
        self.used = align4(size)
            .and_then(|aligned| self.used.checked_add(aligned))
            .map_or(self.size, |used| used.min(self.size));
        addr
    }

    /// 空操作，总是成功
    pub fn free(&mut self, _addr: u32) -> bool {
        true
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.size - self.used
    }
}
