use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("Buffer is full")]
    Full,
    #[error("Buffer is empty")]
    Empty,
}

/// 定长环形缓冲区，满了之后可以选择覆盖最旧的元素
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), RingBufferError> {
        if self.is_full() {
            return Err(RingBufferError::Full);
        }
        self.buf.push_back(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, RingBufferError> {
        self.buf.pop_front().ok_or(RingBufferError::Empty)
    }

    /// 写入元素；缓冲区已满时丢弃最旧的元素
    pub fn push_overwrite(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.is_full() {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    /// 按从旧到新的顺序取出全部元素
    pub fn drain(&mut self) -> Vec<T> {
        self.buf.drain(..).collect()
    }

    /// 从旧到新遍历，不移除元素
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}
