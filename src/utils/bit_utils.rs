//! Bit field helpers for 32-bit instruction words

use std::ops::Range;

/// Field access on a 32-bit word, LSB is bit 0.
pub trait BitField: Sized {
    /// Extract bits `[start..end)`.
    /// Panics if the range is out of bounds or reversed.
    fn field(self, range: Range<u32>) -> u32;

    /// Return a copy with bits `[start..end)` replaced by the low bits of `value`.
    /// Bits of `value` that do not fit the field are discarded.
    fn with_field(self, range: Range<u32>, value: u32) -> Self;
}

#[inline(always)]
fn field_mask(range: &Range<u32>) -> u32 {
    assert!(range.end <= 32, "Bit range end out of bounds");
    assert!(range.start <= range.end, "Invalid bit range");
    let width = range.end - range.start;
    if width == 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

impl BitField for u32 {
    #[inline(always)]
    fn field(self, range: Range<u32>) -> u32 {
        let mask = field_mask(&range);
        if range.start == range.end {
            return 0;
        }
        (self >> range.start) & mask
    }

    #[inline(always)]
    fn with_field(self, range: Range<u32>, value: u32) -> Self {
        let mask = field_mask(&range);
        if range.start == range.end {
            return self;
        }
        (self & !(mask << range.start)) | ((value & mask) << range.start)
    }
}

/// Sign-extend the low `num_bits` of `value` to a full `i32`.
#[inline(always)]
pub fn sign_extend_32(value: u32, num_bits: u32) -> i32 {
    assert!((1..=32).contains(&num_bits), "Invalid sign bit position");
    let shift = 32 - num_bits;
    ((value << shift) as i32) >> shift
}
