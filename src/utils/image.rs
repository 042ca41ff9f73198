//! 程序镜像加载：原始二进制或十六进制文本

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("十六进制镜像解析失败: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("镜像长度 {0} 不是 4 的倍数")]
    Unaligned(usize),
}

/// 解析十六进制文本镜像
///
/// 每行可包含若干以空白分隔的字节或指令字，`#` 之后为注释。
/// 8 个十六进制字符的记号按大端书写的指令字处理，并以小端写入镜像，
/// 与 `disasm_with_details` 的显示格式一致。
pub fn parse_hex_image(text: &str) -> Result<Vec<u8>, ImageError> {
    let mut image = Vec::new();
    for line in text.lines() {
        let code = line.split('#').next().unwrap_or_default();
        for token in code.split_whitespace() {
            let token = token.trim_start_matches("0x");
            let bytes = hex::decode(token)?;
            if bytes.len() == 4 {
                image.extend(bytes.iter().rev());
            } else {
                image.extend_from_slice(&bytes);
            }
        }
    }
    Ok(image)
}

/// 把指令字序列转成小端字节镜像
pub fn words_to_image(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// 读取镜像文件
pub fn load_image(path: impl AsRef<Path>, is_hex: bool) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let image = if is_hex {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取镜像文件 '{}'", path.display()))?;
        parse_hex_image(&text)
            .with_context(|| format!("无法解析镜像文件 '{}'", path.display()))?
    } else {
        std::fs::read(path).with_context(|| format!("无法读取镜像文件 '{}'", path.display()))?
    };
    if image.len() % 4 != 0 {
        tracing::warn!(len = image.len(), "{}", ImageError::Unaligned(image.len()));
    }
    Ok(image)
}
