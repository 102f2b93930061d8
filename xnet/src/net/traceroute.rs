//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! traceroute 驱动器
//!
//! 每个 poll 周期调用一次 [`Traceroute::step`]。每个 TTL 发送一个探测报文，
//! 收到这一跳的应答或等待超时 (先到者为准) 后 TTL 加一；
//! 到达目标或超过最大跳数后结束，不再发送探测。

use core::net::Ipv4Addr;

use log::{debug, info};

use crate::config::{TRACEROUTE_HOP_TIMEOUT_TICKS, TRACEROUTE_MAX_HOPS};
use crate::drivers::net::space::NetDriver;
use crate::error::Result;
use crate::net::icmp::HopReply;
use crate::net::stack::{SendStatus, Xnet};
use crate::net::timer::elapsed_ticks;

/// 一次 [`Traceroute::step`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// 没有新进展
    Idle,
    /// 已发送探测报文
    ProbeSent { ttl: u8, seq: u16 },
    /// 目标正在解析，探测稍后重发
    ProbePending { ttl: u8 },
    /// 收到一跳
    Hop { ttl: u8, hop: HopReply },
    /// 这一跳等待超时
    Timeout { ttl: u8 },
    /// 到达目标 (或目标不可达)，会话结束
    Reached { ttl: u8, hop: Option<HopReply> },
    /// 超过最大跳数，会话结束
    MaxHops,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// 待发送当前 TTL 的探测，`pending_since` 记录开始等待 ARP 的时刻
    Probe { pending_since: Option<u32> },
    /// 已发送，等待应答
    Waiting { since: u32 },
    /// 最后一跳已结束
    Exhausted,
    Done,
}

/// traceroute 驱动器
pub struct Traceroute {
    target: Ipv4Addr,
    id: u16,
    max_hops: u8,
    hop_timeout: u32,
    ttl: u8,
    seq: u16,
    started: bool,
    phase: Phase,
}

impl Traceroute {
    /// 创建驱动器
    ///
    /// # 参数
    /// - `target`: 目标地址
    /// - `id`: 探测报文的 ICMP 标识
    /// - `max_hops`: 最大 TTL
    /// - `hop_timeout_ticks`: 每跳的等待时间 (滴答)
    pub fn new(target: Ipv4Addr, id: u16, max_hops: u8, hop_timeout_ticks: u32) -> Self {
        Self {
            target,
            id,
            max_hops,
            hop_timeout: hop_timeout_ticks,
            ttl: 1,
            seq: 0,
            started: false,
            phase: if max_hops == 0 {
                Phase::Exhausted
            } else {
                Phase::Probe {
                    pending_since: None,
                }
            },
        }
    }

    /// 使用 Xnet.toml 中的最大跳数和等待时间
    pub fn with_defaults(target: Ipv4Addr, id: u16) -> Self {
        Self::new(target, id, TRACEROUTE_MAX_HOPS, TRACEROUTE_HOP_TIMEOUT_TICKS)
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    /// 当前 TTL
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    fn next_hop(&mut self) {
        if self.ttl >= self.max_hops {
            self.phase = Phase::Exhausted;
            return;
        }
        self.ttl += 1;
        self.seq = self.seq.wrapping_add(1);
        self.phase = Phase::Probe {
            pending_since: None,
        };
    }

    /// 推进一步
    ///
    /// # 返回
    /// 驱动发送失败时返回错误，驱动器状态不变，可以再次调用
    pub fn step<D: NetDriver>(&mut self, xnet: &mut Xnet<D>) -> Result<TraceEvent> {
        if !self.started {
            xnet.traceroute_reset(self.target, self.id);
            self.started = true;
        }

        let active = matches!(self.phase, Phase::Probe { .. } | Phase::Waiting { .. });
        if active && xnet.is_traceroute_complete() {
            self.phase = Phase::Done;
            return Ok(TraceEvent::Reached {
                ttl: self.ttl,
                hop: xnet.traceroute_final_hop(),
            });
        }

        let now = xnet.ticks();
        match self.phase {
            Phase::Done => Ok(TraceEvent::Idle),
            Phase::Exhausted => {
                xnet.traceroute_cancel();
                self.phase = Phase::Done;
                info!("traceroute: {} not reached in {} hops", self.target, self.max_hops);
                Ok(TraceEvent::MaxHops)
            }
            Phase::Probe { pending_since } => {
                let ttl = self.ttl;
                match xnet.traceroute_probe(self.target, self.id, self.seq, ttl)? {
                    SendStatus::Sent => {
                        debug!("traceroute: probe ttl {} seq {}", ttl, self.seq);
                        self.phase = Phase::Waiting { since: now };
                        Ok(TraceEvent::ProbeSent { ttl, seq: self.seq })
                    }
                    SendStatus::Pending => {
                        let since = pending_since.unwrap_or(now);
                        if elapsed_ticks(now, since) >= self.hop_timeout {
                            self.next_hop();
                            return Ok(TraceEvent::Timeout { ttl });
                        }
                        self.phase = Phase::Probe {
                            pending_since: Some(since),
                        };
                        Ok(TraceEvent::ProbePending { ttl })
                    }
                }
            }
            Phase::Waiting { since } => {
                let ttl = self.ttl;
                if let Some(hop) = xnet.take_hop_reply() {
                    // 上一跳迟到的应答不算
                    if hop.seq.map_or(true, |seq| seq == self.seq) {
                        self.next_hop();
                        return Ok(TraceEvent::Hop { ttl, hop });
                    }
                    debug!("traceroute: stale hop from {}", hop.from);
                }

                if elapsed_ticks(now, since) >= self.hop_timeout {
                    debug!("traceroute: ttl {} timed out", ttl);
                    self.next_hop();
                    return Ok(TraceEvent::Timeout { ttl });
                }
                Ok(TraceEvent::Idle)
            }
        }
    }
}
