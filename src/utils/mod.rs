//! 工具模块

pub mod bit_utils;
pub mod disasm;
pub mod image;
pub mod ringbuf;

pub use disasm::{disasm_buffer, disasm_with_details, disassemble};
pub use image::{ImageError, load_image, parse_hex_image, words_to_image};
pub use ringbuf::{RingBuffer, RingBufferError};
