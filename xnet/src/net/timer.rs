//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 轮询时钟
//!
//! 协议栈没有墙上时间。每 `XNET_POLLS_PER_TICK` 次 poll 记为一个滴答，
//! ARP 重试/过期、RTT 和 traceroute 等待都以滴答计。

use crate::config::XNET_POLLS_PER_TICK;

/// 滴答时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    ticks: u32,
    polls: u32,
}

impl Clock {
    pub const fn new() -> Self {
        Self { ticks: 0, polls: 0 }
    }

    /// 当前滴答数 (回绕)
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// 记录一次 poll
    ///
    /// # 返回
    /// 本次 poll 推进了一个滴答时返回 true
    pub fn on_poll(&mut self) -> bool {
        self.polls += 1;
        if self.polls < XNET_POLLS_PER_TICK {
            return false;
        }

        self.polls = 0;
        self.ticks = self.ticks.wrapping_add(1);
        true
    }
}

/// 从 `then` 到 `now` 经过的滴答数
///
/// `then` 在 `now` 之后 (时钟回绕或对端伪造) 时记为 0。
pub fn elapsed_ticks(now: u32, then: u32) -> u32 {
    now.saturating_sub(then)
}
