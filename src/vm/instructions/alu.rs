//! 带标志位的 32 位算术

use crate::vm::state::Flags;

const SIGN_BIT: u32 = 0x8000_0000;

/// 算术结果及其进位/溢出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u32,
    pub carry: bool,
    pub overflow: bool,
}

impl AluResult {
    /// 写入全部四个标志位
    pub fn apply(self, flags: &mut Flags) {
        flags.update_zn(self.value);
        flags.set(Flags::CARRY, self.carry);
        flags.set(Flags::OVERFLOW, self.overflow);
    }
}

#[inline(always)]
pub fn add(lhs: u32, rhs: u32) -> AluResult {
    let value = lhs.wrapping_add(rhs);
    AluResult {
        value,
        carry: value < lhs,
        overflow: (lhs ^ value) & (rhs ^ value) & SIGN_BIT != 0,
    }
}

#[inline(always)]
pub fn sub(lhs: u32, rhs: u32) -> AluResult {
    let value = lhs.wrapping_sub(rhs);
    AluResult {
        value,
        carry: lhs < rhs,
        overflow: (lhs ^ rhs) & (lhs ^ value) & SIGN_BIT != 0,
    }
}

/// 乘法：在 64 位中计算，CARRY 表示无符号结果溢出 32 位，OVERFLOW 表示有符号溢出
#[inline(always)]
pub fn mul(lhs: u32, rhs: u32) -> AluResult {
    let wide = lhs as u64 * rhs as u64;
    let signed = lhs as i32 as i64 * rhs as i32 as i64;
    AluResult {
        value: wide as u32,
        carry: wide > u32::MAX as u64,
        overflow: signed != signed as i32 as i64,
    }
}

#[inline(always)]
pub fn neg(value: u32) -> AluResult {
    sub(0, value)
}
