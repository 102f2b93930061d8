//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议栈实例
//!
//! [`Xnet`] 持有驱动、本机身份、收发缓冲区、ARP 缓存、ICMP 状态和时钟。
//! 所有操作都通过 `&mut self` 进行，同一实例只能有一个调用者；
//! 多个实例互不影响。

use core::net::Ipv4Addr;

use log::{debug, info, trace};

use crate::config::{XNET_NAME, XNET_VERSION};
use crate::drivers::net::space::{DeviceStats, NetDriver};
use crate::error::Result;
use crate::net::arp::ArpCache;
use crate::net::buffer::SkBuff;
use crate::net::ethernet::{MacAddr, MacDisplay, Netif};
use crate::net::icmp::IcmpState;
use crate::net::timer::Clock;

/// 发送结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// 已交给驱动
    Sent,
    /// 目标地址正在解析，报文已丢弃，稍后重试
    Pending,
}

/// 协议栈
pub struct Xnet<D: NetDriver> {
    pub(crate) netif: Netif<D>,
    /// 发送缓冲区
    pub(crate) tx: SkBuff,
    /// 接收缓冲区
    pub(crate) rx: SkBuff,
    pub(crate) arp: ArpCache,
    pub(crate) icmp: IcmpState,
    pub(crate) clock: Clock,
}

impl<D: NetDriver> Xnet<D> {
    /// 创建协议栈
    ///
    /// # 参数
    /// - `driver`: 网络设备
    /// - `ip`: 本机 IPv4 地址
    ///
    /// # 说明
    /// 驱动在 [`Xnet::init`] 中才打开，之前没有 MAC 地址，也不能收发。
    pub fn new(driver: D, ip: Ipv4Addr) -> Self {
        Self {
            netif: Netif::new(driver, ip),
            tx: SkBuff::new(),
            rx: SkBuff::new(),
            arp: ArpCache::new(),
            icmp: IcmpState::new(),
            clock: Clock::new(),
        }
    }

    /// 打开驱动并发送无回报 ARP
    pub fn init(&mut self) -> Result<()> {
        self.netif.open()?;
        info!(
            "{} {}: up, ip {} mac {}",
            XNET_NAME,
            XNET_VERSION,
            self.netif.ip,
            MacDisplay(&self.netif.mac)
        );
        self.arp_send_gratuitous()
    }

    /// 轮询一次
    ///
    /// 从驱动读取至多一个帧并处理；每 `XNET_POLLS_PER_TICK` 次推进一个滴答，
    /// 同时推进 ARP 定时器。
    ///
    /// # 返回
    /// 本次是否处理了一个帧
    pub fn poll(&mut self) -> bool {
        let mut received = false;

        if self.netif.is_open() {
            if let Some(len) = self.netif.driver.read(self.rx.storage_mut()) {
                self.rx.alloc_for_read(len);
                self.netif.stats.rx_packets += 1;
                self.netif.stats.rx_bytes += self.rx.len() as u64;
                trace!("eth: rx {} bytes", self.rx.len());

                self.ethernet_in();
                received = true;
            }
        }

        if self.clock.on_poll() {
            self.arp_tick();
        }
        received
    }

    /// 丢弃接收缓冲区中的报文
    pub(crate) fn drop_rx(&mut self, reason: &'static str) {
        debug!("{}", reason);
        self.netif.stats.rx_dropped += 1;
    }

    pub fn mac(&self) -> MacAddr {
        self.netif.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.netif.ip
    }

    /// 当前滴答数
    pub fn ticks(&self) -> u32 {
        self.clock.ticks()
    }

    /// 接口统计
    pub fn stats(&self) -> DeviceStats {
        self.netif.stats
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp
    }

    pub fn driver(&self) -> &D {
        &self.netif.driver
    }
}
