//! 主机控制台接口
//!
//! PRINT/READ 系统调用通过该 trait 访问主机的输入输出流。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

pub trait Console {
    /// 输出字节
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// 读取一行（不含换行符），最多 `limit` 字节。输入结束时返回空
    fn read_line(&mut self, limit: usize) -> io::Result<Vec<u8>>;

    /// 获取控制台名称（用于调试）
    fn name(&self) -> &str {
        "unknown"
    }
}

fn trim_line(mut line: Vec<u8>, limit: usize) -> Vec<u8> {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    line.truncate(limit);
    line
}

/// 进程标准输入输出
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(data)?;
        out.flush()
    }

    fn read_line(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        io::stdin().lock().read_until(b'\n', &mut line)?;
        Ok(trim_line(line, limit))
    }

    fn name(&self) -> &str {
        "stdio"
    }
}

/// 内存中的控制台：收集输出，按行提供预置输入
///
/// 输出缓冲区是共享的，控制台交给虚拟机之后仍可通过 [`BufferConsole::output_handle`] 读取。
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    output: Rc<RefCell<Vec<u8>>>,
    input: VecDeque<Vec<u8>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置输入，每个元素为一行
    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            output: Rc::default(),
            input: lines.into_iter().map(|l| l.as_ref().to_vec()).collect(),
        }
    }

    /// 当前输出的快照
    pub fn output(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }

    pub fn output_handle(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.output)
    }
}

impl Console for BufferConsole {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.output.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn read_line(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        Ok(self
            .input
            .pop_front()
            .map(|line| trim_line(line, limit))
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "buffer"
    }
}
