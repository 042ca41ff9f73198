//! 虚拟定时器：由主机或 SLEEP 系统调用推进，不读取墙上时钟

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    ticks: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// 推进 `ticks` 个时钟周期
    pub fn advance(&mut self, ticks: u64) {
        self.ticks = self.ticks.wrapping_add(ticks);
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_and_reset() {
        let mut t = Timer::new();
        t.advance(10);
        t.advance(5);
        assert_eq!(t.ticks(), 15);
        t.reset();
        assert_eq!(t.ticks(), 0);
    }
}
