//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ARP 协议
//!
//! 参考: RFC 826, include/uapi/linux/if_arp.h
//!
//! 缓存表项的生命周期：
//! ```text
//! FREE --resolve--> PENDING --reply--> RESOLVED
//!   ^                  |                   |
//!   +--- 重试耗尽 -----+                   |
//!   +------------------- 过期 -------------+
//! ```

use core::net::Ipv4Addr;

use log::{debug, trace, warn};

use crate::config::{ARP_CACHE_SIZE, ARP_MAX_RETRIES, ARP_PENDING_TICKS, ARP_STABLE_TICKS};
use crate::drivers::net::space::NetDriver;
use crate::error::Result;
use crate::net::buffer::{EthProtocol, SkBuff};
use crate::net::ethernet::{
    eth_is_valid_unicast_addr, MacAddr, MacDisplay, Netif, ETH_ALEN, ETH_BROADCAST,
};
use crate::net::stack::Xnet;

/// ARP 报文长度 (以太网 + IPv4)
pub const ARP_HLEN: usize = 28;

/// IPv4 地址长度
const ARP_PLEN: u8 = 4;

/// ARP 硬件类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpHrd {
    /// 以太网
    ARPHRD_ETHER = 1,
}

/// ARP 协议类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpPro {
    /// IPv4
    ARPPROTO_IP = 0x0800,
}

/// ARP 操作类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpOp {
    /// ARP 请求
    ARPOP_REQUEST = 1,
    /// ARP 响应
    ARPOP_REPLY = 2,
}

impl ArpOp {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(ArpOp::ARPOP_REQUEST),
            2 => Some(ArpOp::ARPOP_REPLY),
            _ => None,
        }
    }
}

/// ARP 报文视图
///
/// ```text
/// | hrd (2) | pro (2) | hln (1) | pln (1) | op (2) |
/// | sha (6) | sip (4) | tha (6) | tip (4) |
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ArpPacket<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> ArpPacket<T> {
    /// 长度检查后创建视图
    pub fn new_checked(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ARP_HLEN {
            return None;
        }
        Some(Self { buffer })
    }

    pub(crate) fn new_unchecked(buffer: T) -> Self {
        debug_assert!(buffer.as_ref().len() >= ARP_HLEN);
        Self { buffer }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[offset], b[offset + 1]])
    }

    fn read_mac(&self, offset: usize) -> MacAddr {
        let mut mac = [0u8; ETH_ALEN];
        mac.copy_from_slice(&self.buffer.as_ref()[offset..offset + ETH_ALEN]);
        mac
    }

    fn read_ip(&self, offset: usize) -> Ipv4Addr {
        let b = self.buffer.as_ref();
        Ipv4Addr::new(b[offset], b[offset + 1], b[offset + 2], b[offset + 3])
    }

    /// 硬件类型
    pub fn hrd(&self) -> u16 {
        self.read_u16(0)
    }

    /// 协议类型
    pub fn pro(&self) -> u16 {
        self.read_u16(2)
    }

    /// 硬件地址长度
    pub fn hln(&self) -> u8 {
        self.buffer.as_ref()[4]
    }

    /// 协议地址长度
    pub fn pln(&self) -> u8 {
        self.buffer.as_ref()[5]
    }

    pub fn op_raw(&self) -> u16 {
        self.read_u16(6)
    }

    /// 操作类型，未知操作码返回 None
    pub fn op(&self) -> Option<ArpOp> {
        ArpOp::from_u16(self.op_raw())
    }

    pub fn sender_mac(&self) -> MacAddr {
        self.read_mac(8)
    }

    pub fn sender_ip(&self) -> Ipv4Addr {
        self.read_ip(14)
    }

    pub fn target_mac(&self) -> MacAddr {
        self.read_mac(18)
    }

    pub fn target_ip(&self) -> Ipv4Addr {
        self.read_ip(24)
    }

    /// 是否为以太网 + IPv4 的 ARP 报文
    pub fn is_ether_ipv4(&self) -> bool {
        self.hrd() == ArpHrd::ARPHRD_ETHER as u16
            && self.pro() == ArpPro::ARPPROTO_IP as u16
            && self.hln() == ETH_ALEN as u8
            && self.pln() == ARP_PLEN
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> ArpPacket<T> {
    /// 填写固定头部 (以太网 + IPv4) 和操作码
    pub fn fill_header(&mut self, op: ArpOp) {
        let b = self.buffer.as_mut();
        b[0..2].copy_from_slice(&(ArpHrd::ARPHRD_ETHER as u16).to_be_bytes());
        b[2..4].copy_from_slice(&(ArpPro::ARPPROTO_IP as u16).to_be_bytes());
        b[4] = ETH_ALEN as u8;
        b[5] = ARP_PLEN;
        b[6..8].copy_from_slice(&(op as u16).to_be_bytes());
    }

    pub fn set_sender(&mut self, mac: &MacAddr, ip: Ipv4Addr) {
        let b = self.buffer.as_mut();
        b[8..14].copy_from_slice(mac);
        b[14..18].copy_from_slice(&ip.octets());
    }

    pub fn set_target(&mut self, mac: &MacAddr, ip: Ipv4Addr) {
        let b = self.buffer.as_mut();
        b[18..24].copy_from_slice(mac);
        b[24..28].copy_from_slice(&ip.octets());
    }
}

/// ARP 表项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    /// 空闲，ip/mac 无意义
    Free,
    /// 已发送请求，等待响应
    Pending,
    /// 已解析
    Resolved,
}

/// ARP 缓存条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub state: ArpState,
    /// 剩余重试次数
    pub retries: u8,
    /// 剩余滴答数
    pub ttl: u32,
}

impl ArpEntry {
    const FREE: ArpEntry = ArpEntry {
        ip: Ipv4Addr::UNSPECIFIED,
        mac: [0; ETH_ALEN],
        state: ArpState::Free,
        retries: 0,
        ttl: 0,
    };

    fn is_free(&self) -> bool {
        self.state == ArpState::Free
    }
}

/// [`ArpCache::begin_resolve`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpLookup {
    /// 命中
    Resolved(MacAddr),
    /// 新建了 PENDING 表项，调用者需要发送请求
    Started,
    /// 已有请求在途
    InFlight,
    /// 没有空闲表项
    Full,
}

/// ARP 缓存
///
/// 固定大小的表，线性查找。每个 IP 最多一个表项。
pub struct ArpCache {
    entries: [ArpEntry; ARP_CACHE_SIZE],
}

impl ArpCache {
    pub const fn new() -> Self {
        Self {
            entries: [ArpEntry::FREE; ARP_CACHE_SIZE],
        }
    }

    fn find(&self, ip: Ipv4Addr) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.is_free() && entry.ip == ip)
    }

    fn find_free(&self) -> Option<usize> {
        self.entries.iter().position(ArpEntry::is_free)
    }

    /// 查找已解析的 MAC 地址
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entry(ip)
            .filter(|entry| entry.state == ArpState::Resolved)
            .map(|entry| entry.mac)
    }

    /// 查找 IP 对应的表项 (PENDING 或 RESOLVED)
    pub fn entry(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.find(ip).map(|idx| &self.entries[idx])
    }

    /// 所有非空闲表项
    pub fn entries(&self) -> impl Iterator<Item = &ArpEntry> + '_ {
        self.entries.iter().filter(|entry| !entry.is_free())
    }

    /// 开始解析
    ///
    /// # 说明
    /// 未命中时占用一个空闲表项并置为 PENDING，请求由调用者发送。
    /// PENDING 表项的重发只由 [`ArpCache::tick`] 负责。
    pub fn begin_resolve(&mut self, ip: Ipv4Addr) -> ArpLookup {
        if let Some(idx) = self.find(ip) {
            let entry = &self.entries[idx];
            return match entry.state {
                ArpState::Resolved => ArpLookup::Resolved(entry.mac),
                _ => ArpLookup::InFlight,
            };
        }

        match self.find_free() {
            Some(idx) => {
                self.entries[idx] = ArpEntry {
                    ip,
                    mac: [0; ETH_ALEN],
                    state: ArpState::Pending,
                    retries: ARP_MAX_RETRIES,
                    ttl: ARP_PENDING_TICKS,
                };
                ArpLookup::Started
            }
            None => ArpLookup::Full,
        }
    }

    /// 记录一个 IP 到 MAC 的映射
    ///
    /// # 返回
    /// 表已满无法记录时返回 false
    pub fn update(&mut self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        let idx = match self.find(ip).or_else(|| self.find_free()) {
            Some(idx) => idx,
            None => return false,
        };

        self.entries[idx] = ArpEntry {
            ip,
            mac,
            state: ArpState::Resolved,
            retries: ARP_MAX_RETRIES,
            ttl: ARP_STABLE_TICKS,
        };
        true
    }

    /// 推进一个滴答
    ///
    /// # 参数
    /// - `retransmit`: PENDING 表项超时且仍有重试次数时，以目标 IP 调用
    pub fn tick(&mut self, mut retransmit: impl FnMut(Ipv4Addr)) {
        for entry in self.entries.iter_mut().filter(|entry| !entry.is_free()) {
            entry.ttl = entry.ttl.saturating_sub(1);
            if entry.ttl > 0 {
                continue;
            }

            match entry.state {
                ArpState::Pending if entry.retries > 0 => {
                    entry.retries -= 1;
                    entry.ttl = ARP_PENDING_TICKS;
                    debug!("arp: retry {} ({} left)", entry.ip, entry.retries);
                    retransmit(entry.ip);
                }
                ArpState::Pending => {
                    debug!("arp: {} unreachable, entry freed", entry.ip);
                    *entry = ArpEntry::FREE;
                }
                ArpState::Resolved => {
                    debug!("arp: {} expired", entry.ip);
                    *entry = ArpEntry::FREE;
                }
                ArpState::Free => {}
            }
        }
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

/// 在发送缓冲区中构造 ARP 请求并广播
///
/// 发送方 IP 总是本机 IP；`target_ip` 等于本机 IP 时即为无回报 ARP。
pub(crate) fn arp_make_request<D: NetDriver>(
    netif: &mut Netif<D>,
    tx: &mut SkBuff,
    target_ip: Ipv4Addr,
) -> Result<()> {
    tx.alloc_for_send(ARP_HLEN)?;

    let mut pkt = ArpPacket::new_unchecked(tx.data_mut());
    pkt.fill_header(ArpOp::ARPOP_REQUEST);
    pkt.set_sender(&netif.mac, netif.ip);
    pkt.set_target(&[0; ETH_ALEN], target_ip);

    trace!("arp: who-has {} tell {}", target_ip, netif.ip);
    netif.ethernet_out_to(EthProtocol::ETH_P_ARP, &ETH_BROADCAST, tx)
}

/// 检查收到的 ARP 报文是否需要处理
fn arp_validate(
    pkt: &ArpPacket<&[u8]>,
    local_ip: Ipv4Addr,
    local_mac: &MacAddr,
) -> core::result::Result<(), &'static str> {
    if !pkt.is_ether_ipv4() {
        return Err("arp: not ethernet/ipv4");
    }
    if pkt.target_ip() != local_ip {
        return Err("arp: target is not us");
    }
    if pkt.sender_mac() == *local_mac {
        return Err("arp: own frame looped back");
    }
    if !eth_is_valid_unicast_addr(&pkt.sender_mac()) {
        return Err("arp: sender is not a unicast address");
    }
    Ok(())
}

impl<D: NetDriver> Xnet<D> {
    /// 解析 IP 对应的 MAC 地址
    ///
    /// # 返回
    /// - `Ok(Some(mac))`: 已解析
    /// - `Ok(None)`: 正在解析或缓存已满，调用者稍后重试
    /// - `Err`: 发送 ARP 请求时驱动出错
    pub fn arp_resolve(&mut self, ip: Ipv4Addr) -> Result<Option<MacAddr>> {
        match self.arp.begin_resolve(ip) {
            ArpLookup::Resolved(mac) => Ok(Some(mac)),
            ArpLookup::Started => {
                debug!("arp: resolving {}", ip);
                arp_make_request(&mut self.netif, &mut self.tx, ip)?;
                Ok(None)
            }
            ArpLookup::InFlight => Ok(None),
            ArpLookup::Full => {
                debug!("arp: cache full, cannot resolve {}", ip);
                Ok(None)
            }
        }
    }

    /// 只读查询，不触发解析
    pub fn arp_lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.arp.lookup(ip)
    }

    /// 当前所有非空闲的 ARP 表项
    pub fn arp_entries(&self) -> impl Iterator<Item = &ArpEntry> + '_ {
        self.arp.entries()
    }

    /// 发送无回报 ARP (sender IP = target IP = 本机 IP)
    pub fn arp_send_gratuitous(&mut self) -> Result<()> {
        let ip = self.netif.ip;
        arp_make_request(&mut self.netif, &mut self.tx, ip)
    }

    /// ARP 输入处理，报文位于接收缓冲区
    pub(crate) fn arp_in(&mut self) {
        if self.rx.len() < ARP_HLEN {
            self.drop_rx("arp: packet too short");
            return;
        }
        // 去掉以太网填充
        self.rx.skb_trim(ARP_HLEN);

        let local_ip = self.netif.ip;
        let local_mac = self.netif.mac;

        let pkt = ArpPacket::new_unchecked(self.rx.data());
        if let Err(reason) = arp_validate(&pkt, local_ip, &local_mac) {
            self.drop_rx(reason);
            return;
        }
        let (op, sender_mac, sender_ip) = (pkt.op(), pkt.sender_mac(), pkt.sender_ip());

        match op {
            Some(ArpOp::ARPOP_REQUEST) => {
                trace!("arp: request from {} ({})", sender_ip, MacDisplay(&sender_mac));

                let mut pkt = ArpPacket::new_unchecked(self.rx.data_mut());
                pkt.fill_header(ArpOp::ARPOP_REPLY);
                pkt.set_target(&sender_mac, sender_ip);
                pkt.set_sender(&local_mac, local_ip);

                // 失败已在以太网层计数
                let _ = self
                    .netif
                    .ethernet_out_to(EthProtocol::ETH_P_ARP, &sender_mac, &mut self.rx);
            }
            Some(ArpOp::ARPOP_REPLY) => {
                if self.arp.update(sender_ip, sender_mac) {
                    debug!("arp: {} is-at {}", sender_ip, MacDisplay(&sender_mac));
                } else {
                    debug!("arp: cache full, reply from {} ignored", sender_ip);
                }
            }
            None => self.drop_rx("arp: unknown opcode"),
        }
    }

    /// 推进 ARP 缓存定时器，必要时重发请求
    pub(crate) fn arp_tick(&mut self) {
        let Xnet { arp, netif, tx, .. } = self;
        arp.tick(|ip| {
            if let Err(err) = arp_make_request(netif, tx, ip) {
                warn!("arp: retransmit to {} failed: {}", ip, err);
            }
        });
    }
}
