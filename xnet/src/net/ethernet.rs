//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 以太网层
//!
//! 所有上层协议的发送都经过 [`Netif::ethernet_out_to`]，
//! 这里是唯一写驱动、补齐最小帧长、填写源 MAC 的地方。

use core::fmt;
use core::net::Ipv4Addr;

use log::{trace, warn};

use crate::drivers::net::space::{DeviceStats, NetDriver};
use crate::error::{Result, XnetError};
use crate::net::buffer::{EthProtocol, SkBuff};
use crate::net::stack::Xnet;

/// 以太网头部长度
pub const ETH_HLEN: usize = 14;

/// 以太网最小帧长度 (不含 FCS)
pub const ETH_ZLEN: usize = 60;

/// 以太网地址长度 (MAC 地址)
pub const ETH_ALEN: usize = 6;

/// 广播 MAC 地址
pub const ETH_BROADCAST: MacAddr = [0xFF; ETH_ALEN];

/// MAC 地址
pub type MacAddr = [u8; ETH_ALEN];

/// 以太网帧头部视图
///
/// ```text
/// | dest (6) | source (6) | proto (2) |
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EthHdr<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> EthHdr<T> {
    /// 长度检查后创建视图
    pub fn new_checked(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ETH_HLEN {
            return None;
        }
        Some(Self { buffer })
    }

    /// 调用者保证长度至少为 ETH_HLEN
    pub(crate) fn new_unchecked(buffer: T) -> Self {
        debug_assert!(buffer.as_ref().len() >= ETH_HLEN);
        Self { buffer }
    }

    /// 目标 MAC 地址
    pub fn dest(&self) -> MacAddr {
        let mut mac = [0u8; ETH_ALEN];
        mac.copy_from_slice(&self.buffer.as_ref()[0..6]);
        mac
    }

    /// 源 MAC 地址
    pub fn source(&self) -> MacAddr {
        let mut mac = [0u8; ETH_ALEN];
        mac.copy_from_slice(&self.buffer.as_ref()[6..12]);
        mac
    }

    /// 原始协议字段 (主机字节序)
    pub fn protocol_raw(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[12], b[13]])
    }

    /// 协议类型，未知协议返回 None
    pub fn protocol(&self) -> Option<EthProtocol> {
        EthProtocol::from_u16(self.protocol_raw())
    }

    /// 检查是否为本机帧 (目标 MAC 为本机或广播/多播)
    pub fn is_for_us(&self, our_mac: &MacAddr) -> bool {
        let dest = self.dest();
        dest == *our_mac || eth_is_multicast_addr(&dest)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EthHdr<T> {
    pub fn set_dest(&mut self, mac: &MacAddr) {
        self.buffer.as_mut()[0..6].copy_from_slice(mac);
    }

    pub fn set_source(&mut self, mac: &MacAddr) {
        self.buffer.as_mut()[6..12].copy_from_slice(mac);
    }

    pub fn set_protocol(&mut self, proto: EthProtocol) {
        self.buffer.as_mut()[12..14].copy_from_slice(&proto.to_u16().to_be_bytes());
    }
}

/// 检查以太网地址是否为多播地址 (广播也是多播)
pub fn eth_is_multicast_addr(addr: &MacAddr) -> bool {
    addr[0] & 0x01 != 0
}

/// 检查以太网地址是否为合法单播地址 (非零、非多播)
pub fn eth_is_valid_unicast_addr(addr: &MacAddr) -> bool {
    !addr.iter().all(|&b| b == 0) && !eth_is_multicast_addr(addr)
}

/// MAC 地址格式化 (例如 "52:54:00:12:34:56")，用于日志
pub struct MacDisplay<'a>(pub &'a MacAddr);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// 网络接口
///
/// 持有驱动和本机身份 (MAC + IP)，初始化后身份不再改变。
pub struct Netif<D: NetDriver> {
    pub(crate) driver: D,
    pub(crate) mac: MacAddr,
    pub(crate) ip: Ipv4Addr,
    pub(crate) open: bool,
    /// 下一个 IP 标识
    pub(crate) ip_id: u16,
    pub(crate) stats: DeviceStats,
}

impl<D: NetDriver> Netif<D> {
    pub(crate) fn new(driver: D, ip: Ipv4Addr) -> Self {
        Self {
            driver,
            mac: [0; ETH_ALEN],
            ip,
            open: false,
            ip_id: 0,
            stats: DeviceStats::default(),
        }
    }

    /// 打开驱动并获取本机 MAC 地址
    pub(crate) fn open(&mut self) -> Result<()> {
        self.mac = self.driver.open()?;
        self.open = true;
        Ok(())
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    /// 发送一个以太网帧
    ///
    /// # 参数
    /// - `protocol`: 上层协议
    /// - `dest`: 目标 MAC 地址
    /// - `skb`: 数据包，data 指向上层协议头
    ///
    /// # 返回
    /// 驱动的发送结果原样返回
    pub fn ethernet_out_to(
        &mut self,
        protocol: EthProtocol,
        dest: &MacAddr,
        skb: &mut SkBuff,
    ) -> Result<()> {
        if !self.open {
            return Err(XnetError::NotOpen);
        }

        let hdr = skb.skb_push(ETH_HLEN).ok_or(XnetError::NoBufferSpace)?;
        let mut eth = EthHdr::new_unchecked(hdr);
        eth.set_dest(dest);
        eth.set_source(&self.mac);
        eth.set_protocol(protocol);

        skb.skb_pad_to(ETH_ZLEN)?;

        trace!(
            "eth: tx {:?} to {} ({} bytes)",
            protocol,
            MacDisplay(dest),
            skb.len()
        );

        match self.driver.send(skb.data()) {
            Ok(()) => {
                self.stats.tx_packets += 1;
                self.stats.tx_bytes += skb.len() as u64;
                Ok(())
            }
            Err(err) => {
                self.stats.tx_errors += 1;
                warn!("eth: driver send failed: {}", err);
                Err(err)
            }
        }
    }
}

impl<D: NetDriver> Xnet<D> {
    /// 以太网帧输入处理
    ///
    /// 帧位于接收缓冲区中，按协议字段分发给 ARP 或 IP。
    pub(crate) fn ethernet_in(&mut self) {
        let (protocol, for_us) = match EthHdr::new_checked(self.rx.data()) {
            Some(hdr) => (hdr.protocol(), hdr.is_for_us(&self.netif.mac)),
            None => {
                self.drop_rx("eth: frame shorter than header");
                return;
            }
        };

        if !for_us {
            self.drop_rx("eth: not addressed to us");
            return;
        }

        let protocol = match protocol {
            Some(protocol) => protocol,
            None => {
                self.drop_rx("eth: unknown protocol");
                return;
            }
        };

        // 长度已检查，pull 不会失败
        let _ = self.rx.skb_pull(ETH_HLEN);

        match protocol {
            EthProtocol::ETH_P_ARP => self.arp_in(),
            EthProtocol::ETH_P_IP => self.ip_in(),
        }
    }
}
