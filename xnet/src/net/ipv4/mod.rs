//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 协议
//!
//! 参考: RFC 791, include/uapi/linux/ip.h
//!
//! 只处理 20 字节无选项头部，不做分片和重组。

pub mod checksum;

use core::net::Ipv4Addr;

use bitflags::bitflags;
use log::trace;

use crate::drivers::net::space::NetDriver;
use crate::error::{Result, XnetError};
use crate::net::buffer::{EthProtocol, IpProtocol, SkBuff};
use crate::net::ethernet::{MacAddr, Netif};
use crate::net::stack::Xnet;

use self::checksum::ip_checksum;

/// IPv4 头部长度
pub const IPHDR_LEN: usize = 20;

/// 分片偏移掩码
pub const IP_OFFSET_MASK: u16 = 0x1FFF;

bitflags! {
    /// IPv4 分片标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IpFlags: u16 {
        /// 保留位
        const RB = 0x8000;
        /// 不分片 (Don't Fragment)
        const DF = 0x4000;
        /// 更多分片 (More Fragments)
        const MF = 0x2000;
    }
}

/// IPv4 头部视图
///
/// ```text
/// | ver/ihl (1) | tos (1) | tot_len (2) | id (2) | frag_off (2) |
/// | ttl (1) | protocol (1) | check (2) | saddr (4) | daddr (4) |
/// ```
#[derive(Debug, Clone, Copy)]
pub struct IpHdr<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> IpHdr<T> {
    /// 长度检查后创建视图
    pub fn new_checked(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < IPHDR_LEN {
            return None;
        }
        Some(Self { buffer })
    }

    pub(crate) fn new_unchecked(buffer: T) -> Self {
        debug_assert!(buffer.as_ref().len() >= IPHDR_LEN);
        Self { buffer }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[offset], b[offset + 1]])
    }

    fn read_ip(&self, offset: usize) -> Ipv4Addr {
        let b = self.buffer.as_ref();
        Ipv4Addr::new(b[offset], b[offset + 1], b[offset + 2], b[offset + 3])
    }

    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[0] >> 4
    }

    /// 头部长度 (32 位字)
    pub fn ihl(&self) -> u8 {
        self.buffer.as_ref()[0] & 0x0F
    }

    /// 头部长度 (字节)
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    pub fn total_len(&self) -> u16 {
        self.read_u16(2)
    }

    pub fn id(&self) -> u16 {
        self.read_u16(4)
    }

    pub fn flags(&self) -> IpFlags {
        IpFlags::from_bits_truncate(self.read_u16(6))
    }

    /// 分片偏移 (8 字节为单位)
    pub fn frag_offset(&self) -> u16 {
        self.read_u16(6) & IP_OFFSET_MASK
    }

    /// 是否为分片
    pub fn is_fragment(&self) -> bool {
        self.flags().contains(IpFlags::MF) || self.frag_offset() != 0
    }

    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[8]
    }

    pub fn protocol_raw(&self) -> u8 {
        self.buffer.as_ref()[9]
    }

    /// 上层协议，不支持的协议返回 None
    pub fn protocol(&self) -> Option<IpProtocol> {
        IpProtocol::from_u8(self.protocol_raw())
    }

    pub fn checksum(&self) -> u16 {
        self.read_u16(10)
    }

    pub fn src(&self) -> Ipv4Addr {
        self.read_ip(12)
    }

    pub fn dest(&self) -> Ipv4Addr {
        self.read_ip(16)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> IpHdr<T> {
    fn write_u16(&mut self, offset: usize, val: u16) {
        self.buffer.as_mut()[offset..offset + 2].copy_from_slice(&val.to_be_bytes());
    }

    pub fn set_version_ihl(&mut self, version: u8, ihl: u8) {
        self.buffer.as_mut()[0] = (version << 4) | (ihl & 0x0F);
    }

    pub fn set_tos(&mut self, tos: u8) {
        self.buffer.as_mut()[1] = tos;
    }

    pub fn set_total_len(&mut self, len: u16) {
        self.write_u16(2, len);
    }

    pub fn set_id(&mut self, id: u16) {
        self.write_u16(4, id);
    }

    pub fn set_flags_frag(&mut self, flags: IpFlags, offset: u16) {
        self.write_u16(6, flags.bits() | (offset & IP_OFFSET_MASK));
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[8] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: IpProtocol) {
        self.buffer.as_mut()[9] = protocol.to_u8();
    }

    pub fn set_checksum(&mut self, csum: u16) {
        self.write_u16(10, csum);
    }

    pub fn set_src(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[12..16].copy_from_slice(&ip.octets());
    }

    pub fn set_dest(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[16..20].copy_from_slice(&ip.octets());
    }

    /// 校验和字段清零后重新计算并写入
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let csum = ip_checksum(&self.buffer.as_ref()[..IPHDR_LEN]);
        self.set_checksum(csum);
    }

    /// 验证头部校验和
    ///
    /// 校验和字段清零后重新计算，与原值比较，最后恢复原值。
    pub fn verify_checksum(&mut self) -> bool {
        let original = self.checksum();
        self.set_checksum(0);
        let computed = ip_checksum(&self.buffer.as_ref()[..IPHDR_LEN]);
        self.set_checksum(original);
        computed == original
    }
}

/// 构造 IPv4 头部
///
/// # 参数
/// - `skb`: 数据包，data 指向上层协议负载
/// - `src` / `dest`: 源和目标地址
/// - `protocol`: 上层协议
/// - `ttl`: 生存时间
/// - `id`: 标识
///
/// # 说明
/// 在 SkBuff 前面添加 20 字节头部，总长度取 push 之后的数据长度，设置 DF 标志。
pub fn ip_push_header(
    skb: &mut SkBuff,
    src: Ipv4Addr,
    dest: Ipv4Addr,
    protocol: IpProtocol,
    ttl: u8,
    id: u16,
) -> Result<()> {
    let total_len = u16::try_from(skb.len() + IPHDR_LEN).map_err(|_| XnetError::PacketTooLarge)?;
    let hdr = skb.skb_push(IPHDR_LEN).ok_or(XnetError::NoBufferSpace)?;

    let mut ip = IpHdr::new_unchecked(hdr);
    ip.set_version_ihl(4, 5);
    ip.set_tos(0);
    ip.set_total_len(total_len);
    ip.set_id(id);
    ip.set_flags_frag(IpFlags::DF, 0);
    ip.set_ttl(ttl);
    ip.set_protocol(protocol);
    ip.set_src(src);
    ip.set_dest(dest);
    ip.fill_checksum();
    Ok(())
}

/// 发送 IPv4 数据报
///
/// # 说明
/// 目标 MAC 由调用者预先通过 ARP 解析得到。ARP 请求复用发送缓冲区，
/// 所以解析必须在调用者填写负载之前完成。
pub(crate) fn ip_out_to<D: NetDriver>(
    netif: &mut Netif<D>,
    dest_mac: &MacAddr,
    dest: Ipv4Addr,
    protocol: IpProtocol,
    ttl: u8,
    skb: &mut SkBuff,
) -> Result<()> {
    let id = netif.ip_id;
    netif.ip_id = netif.ip_id.wrapping_add(1);

    ip_push_header(skb, netif.ip, dest, protocol, ttl, id)?;
    trace!("ip: tx {:?} to {} ttl {} id {}", protocol, dest, ttl, id);
    netif.ethernet_out_to(EthProtocol::ETH_P_IP, dest_mac, skb)
}

/// 检查收到的 IPv4 头部
///
/// # 返回
/// 成功返回 (源地址, 上层协议, 总长度)，失败返回丢弃原因
fn ip_validate(
    data: &mut [u8],
    local: Ipv4Addr,
) -> core::result::Result<(Ipv4Addr, IpProtocol, usize), &'static str> {
    let received = data.len();
    let mut hdr = IpHdr::new_checked(data).ok_or("ip: packet too short")?;

    if hdr.version() != 4 || hdr.ihl() != 5 {
        return Err("ip: bad version or header length");
    }
    if !hdr.verify_checksum() {
        return Err("ip: bad checksum");
    }
    if hdr.dest() != local {
        return Err("ip: not addressed to us");
    }

    let total_len = hdr.total_len() as usize;
    if total_len < IPHDR_LEN || total_len > received {
        return Err("ip: bad total length");
    }
    if hdr.is_fragment() {
        return Err("ip: fragments not supported");
    }

    let protocol = hdr.protocol().ok_or("ip: unsupported protocol")?;
    Ok((hdr.src(), protocol, total_len))
}

impl<D: NetDriver> Xnet<D> {
    /// IPv4 输入处理，数据报位于接收缓冲区
    pub(crate) fn ip_in(&mut self) {
        let local = self.netif.ip;
        let (src, protocol, total_len) = match ip_validate(self.rx.data_mut(), local) {
            Ok(parsed) => parsed,
            Err(reason) => {
                self.drop_rx(reason);
                return;
            }
        };

        // 去掉以太网填充
        self.rx.skb_trim(total_len);
        let _ = self.rx.skb_pull(IPHDR_LEN);

        trace!("ip: rx {:?} from {} ({} bytes)", protocol, src, self.rx.len());
        match protocol {
            IpProtocol::IPPROTO_ICMP => self.icmp_in(src),
        }
    }
}
