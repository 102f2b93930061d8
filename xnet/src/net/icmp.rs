//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ICMP 协议
//!
//! 参考: RFC 792
//!
//! 回显请求的负载前 4 字节是发送时的滴答数 (小端)，回复到达时据此计算 RTT，
//! 单位为滴答。Time Exceeded / Destination Unreachable 报文引用原始数据报
//! (IP 头部 + ICMP 头部 + 时间戳)，traceroute 用它计算每一跳的 RTT。

use core::net::Ipv4Addr;

use log::{debug, info};

use crate::config::IP_DEFAULT_TTL;
use crate::drivers::net::space::NetDriver;
use crate::error::{Result, XnetError};
use crate::net::buffer::{IpProtocol, SkBuff};
use crate::net::ethernet::ETH_HLEN;
use crate::net::ipv4::checksum::{ip_checksum, verify_ip_checksum};
use crate::net::ipv4::{ip_out_to, IpHdr, IPHDR_LEN};
use crate::net::stack::{SendStatus, Xnet};
use crate::net::timer::elapsed_ticks;

/// ICMP 回显报文头部长度
pub const ICMP_HLEN: usize = 8;

/// 回显负载中时间戳的长度
pub const ICMP_TIMESTAMP_LEN: usize = 4;

/// traceroute 探测报文的负载长度
pub const TRACEROUTE_PAYLOAD_LEN: usize = 32;

/// ICMP 报文类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IcmpType {
    ICMP_ECHOREPLY = 0,
    ICMP_DEST_UNREACH = 3,
    ICMP_ECHO = 8,
    ICMP_TIME_EXCEEDED = 11,
}

impl IcmpType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(IcmpType::ICMP_ECHOREPLY),
            3 => Some(IcmpType::ICMP_DEST_UNREACH),
            8 => Some(IcmpType::ICMP_ECHO),
            11 => Some(IcmpType::ICMP_TIME_EXCEEDED),
            _ => None,
        }
    }
}

/// ICMP 报文视图 (头部 + 负载)
///
/// ```text
/// | type (1) | code (1) | checksum (2) | id (2) | seq (2) | payload ... |
/// ```
///
/// 对 Time Exceeded / Destination Unreachable，id/seq 位置是未使用字段。
#[derive(Debug, Clone, Copy)]
pub struct IcmpHdr<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> IcmpHdr<T> {
    pub fn new_checked(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ICMP_HLEN {
            return None;
        }
        Some(Self { buffer })
    }

    pub(crate) fn new_unchecked(buffer: T) -> Self {
        debug_assert!(buffer.as_ref().len() >= ICMP_HLEN);
        Self { buffer }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[offset], b[offset + 1]])
    }

    pub fn icmp_type_raw(&self) -> u8 {
        self.buffer.as_ref()[0]
    }

    pub fn icmp_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type_raw())
    }

    pub fn code(&self) -> u8 {
        self.buffer.as_ref()[1]
    }

    pub fn checksum(&self) -> u16 {
        self.read_u16(2)
    }

    pub fn id(&self) -> u16 {
        self.read_u16(4)
    }

    pub fn seq(&self) -> u16 {
        self.read_u16(6)
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[ICMP_HLEN..]
    }

    /// 负载开头的发送时间戳
    pub fn timestamp(&self) -> Option<u32> {
        let ts = self.payload().get(..ICMP_TIMESTAMP_LEN)?;
        Some(u32::from_le_bytes([ts[0], ts[1], ts[2], ts[3]]))
    }

    /// 整个报文的校验和是否正确
    pub fn verify_checksum(&self) -> bool {
        verify_ip_checksum(self.buffer.as_ref())
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> IcmpHdr<T> {
    fn write_u16(&mut self, offset: usize, val: u16) {
        self.buffer.as_mut()[offset..offset + 2].copy_from_slice(&val.to_be_bytes());
    }

    pub fn set_type(&mut self, icmp_type: IcmpType) {
        self.buffer.as_mut()[0] = icmp_type as u8;
    }

    pub fn set_code(&mut self, code: u8) {
        self.buffer.as_mut()[1] = code;
    }

    pub fn set_id(&mut self, id: u16) {
        self.write_u16(4, id);
    }

    pub fn set_seq(&mut self, seq: u16) {
        self.write_u16(6, seq);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[ICMP_HLEN..]
    }

    /// 写入时间戳，负载不足 4 字节时不写
    pub fn set_timestamp(&mut self, tick: u32) {
        if let Some(ts) = self.payload_mut().get_mut(..ICMP_TIMESTAMP_LEN) {
            ts.copy_from_slice(&tick.to_le_bytes());
        }
    }

    /// 校验和字段清零后对整个报文计算
    pub fn fill_checksum(&mut self) {
        self.write_u16(2, 0);
        let csum = ip_checksum(self.buffer.as_ref());
        self.write_u16(2, csum);
    }
}

/// 收到的回显应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub from: Ipv4Addr,
    pub id: u16,
    pub seq: u16,
    /// 往返时间 (滴答)，负载中没有时间戳时为 None
    pub rtt: Option<u32>,
}

/// 一跳的应答类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    /// 路由器返回的 Time Exceeded
    TimeExceeded,
    /// 目标返回的 Echo Reply
    EchoReply,
    /// Destination Unreachable，携带 code
    Unreachable(u8),
}

/// traceroute 的一跳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopReply {
    /// 应答者地址
    pub from: Ipv4Addr,
    /// 往返时间 (滴答)，无法恢复时间戳时为 None
    pub rtt: Option<u32>,
    /// 对应探测报文的序号 (从引用的原始报文或回显应答中取得)
    pub seq: Option<u16>,
    pub kind: HopKind,
}

/// traceroute 会话
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceSession {
    pub active: bool,
    /// 已到达目标
    pub reached: bool,
    pub target: Option<Ipv4Addr>,
    /// 探测报文的标识
    pub id: u16,
    pub final_hop: Option<HopReply>,
}

/// ICMP 层状态
#[derive(Debug, Default)]
pub struct IcmpState {
    pub(crate) trace: TraceSession,
    /// 未读取的一跳
    pub(crate) hop: Option<HopReply>,
    /// 未读取的回显应答
    pub(crate) echo: Option<EchoReply>,
}

impl IcmpState {
    pub const fn new() -> Self {
        Self {
            trace: TraceSession {
                active: false,
                reached: false,
                target: None,
                id: 0,
                final_hop: None,
            },
            hop: None,
            echo: None,
        }
    }
}

/// 从差错报文引用的原始数据报中找回探测报文
///
/// # 返回
/// - `Ok((seq, tick))`: 引用的是本会话的探测报文，字段不完整时为 None
/// - `Err`: 引用的报文不属于本会话
fn quoted_probe(
    quoted: &[u8],
    target: Option<Ipv4Addr>,
    id: u16,
) -> core::result::Result<(Option<u16>, Option<u32>), &'static str> {
    // 只有截断在 IP 头部之内的引用才放行
    let ip = match IpHdr::new_checked(quoted) {
        Some(ip) => ip,
        None => return Ok((None, None)),
    };
    if ip.header_len() < IPHDR_LEN {
        return Err("icmp: quoted header malformed");
    }

    if Some(ip.dest()) != target {
        return Err("icmp: quoted datagram not sent to trace target");
    }
    if ip.protocol() != Some(IpProtocol::IPPROTO_ICMP) {
        return Err("icmp: quoted datagram is not a probe");
    }

    let probe = match quoted.get(ip.header_len()..).and_then(IcmpHdr::new_checked) {
        Some(probe) => probe,
        None => return Ok((None, None)),
    };
    if probe.id() != id {
        return Err("icmp: quoted probe from another session");
    }
    Ok((Some(probe.seq()), probe.timestamp()))
}

impl<D: NetDriver> Xnet<D> {
    /// 发送回显请求
    ///
    /// # 参数
    /// - `dest`: 目标地址
    /// - `id` / `seq`: 标识和序号
    /// - `payload_size`: 负载长度，至少为时间戳长度
    /// - `ttl`: IP 生存时间
    ///
    /// # 返回
    /// 目标未解析时返回 `Pending`，调用者稍后以相同参数重试
    pub fn icmp_echo_request(
        &mut self,
        dest: Ipv4Addr,
        id: u16,
        seq: u16,
        payload_size: usize,
        ttl: u8,
    ) -> Result<SendStatus> {
        let max_payload = SkBuff::CAPACITY - ETH_HLEN - IPHDR_LEN - ICMP_HLEN;
        if payload_size > max_payload {
            return Err(XnetError::PacketTooLarge);
        }
        let size = ICMP_HLEN + payload_size.max(ICMP_TIMESTAMP_LEN);

        // 解析必须在填写负载之前：ARP 请求会占用发送缓冲区
        let mac = match self.arp_resolve(dest)? {
            Some(mac) => mac,
            None => return Ok(SendStatus::Pending),
        };

        let now = self.clock.ticks();
        self.tx.alloc_for_send(size)?;
        let data = self.tx.data_mut();
        data.fill(0);

        let mut icmp = IcmpHdr::new_unchecked(data);
        icmp.set_type(IcmpType::ICMP_ECHO);
        icmp.set_code(0);
        icmp.set_id(id);
        icmp.set_seq(seq);
        icmp.set_timestamp(now);
        icmp.fill_checksum();

        ip_out_to(
            &mut self.netif,
            &mac,
            dest,
            IpProtocol::IPPROTO_ICMP,
            ttl,
            &mut self.tx,
        )?;
        Ok(SendStatus::Sent)
    }

    /// ping：以默认 TTL 发送回显请求
    pub fn ping(
        &mut self,
        dest: Ipv4Addr,
        id: u16,
        seq: u16,
        payload_size: usize,
    ) -> Result<SendStatus> {
        self.icmp_echo_request(dest, id, seq, payload_size, IP_DEFAULT_TTL)
    }

    /// 发送一个 traceroute 探测报文
    pub fn traceroute_probe(
        &mut self,
        dest: Ipv4Addr,
        id: u16,
        seq: u16,
        ttl: u8,
    ) -> Result<SendStatus> {
        self.icmp_echo_request(dest, id, seq, TRACEROUTE_PAYLOAD_LEN, ttl)
    }

    /// 开始一次新的 traceroute 会话，清除上一次的所有状态
    pub fn traceroute_reset(&mut self, target: Ipv4Addr, id: u16) {
        self.icmp.trace = TraceSession {
            active: true,
            reached: false,
            target: Some(target),
            id,
            final_hop: None,
        };
        self.icmp.hop = None;
    }

    /// 结束当前会话，之后的差错报文不再记录
    pub fn traceroute_cancel(&mut self) {
        self.icmp.trace.active = false;
    }

    /// 是否已到达目标
    ///
    /// 读取不清除，直到下一次 [`Xnet::traceroute_reset`]。
    pub fn is_traceroute_complete(&self) -> bool {
        self.icmp.trace.reached
    }

    /// 终止会话的那一跳
    pub fn traceroute_final_hop(&self) -> Option<HopReply> {
        self.icmp.trace.final_hop
    }

    /// 是否收到了新的一跳，读取后清除
    pub fn has_hop_reply(&mut self) -> bool {
        self.icmp.hop.take().is_some()
    }

    /// 取出新的一跳
    pub fn take_hop_reply(&mut self) -> Option<HopReply> {
        self.icmp.hop.take()
    }

    /// 取出最近一次 ping 的 RTT (滴答)
    ///
    /// None 表示没有未读取的应答，与 `Some(0)` 不同。
    /// 不带时间戳的应答也被取走并返回 None，需要区分时用 [`Xnet::take_echo_reply`]。
    pub fn last_rtt(&mut self) -> Option<u32> {
        self.icmp.echo.take().and_then(|reply| reply.rtt)
    }

    /// 取出最近一次 ping 的完整应答
    pub fn take_echo_reply(&mut self) -> Option<EchoReply> {
        self.icmp.echo.take()
    }

    /// ICMP 输入处理，报文位于接收缓冲区
    pub(crate) fn icmp_in(&mut self, src: Ipv4Addr) {
        let now = self.clock.ticks();

        let icmp = match IcmpHdr::new_checked(self.rx.data()) {
            Some(icmp) => icmp,
            None => {
                self.drop_rx("icmp: packet too short");
                return;
            }
        };
        if !icmp.verify_checksum() {
            self.drop_rx("icmp: bad checksum");
            return;
        }

        let (icmp_type, code) = (icmp.icmp_type(), icmp.code());
        let (id, seq) = (icmp.id(), icmp.seq());
        let rtt = icmp.timestamp().map(|tick| elapsed_ticks(now, tick));
        let trace = self.icmp.trace;
        let quoted = match icmp_type {
            Some(IcmpType::ICMP_TIME_EXCEEDED) | Some(IcmpType::ICMP_DEST_UNREACH) => {
                Some(quoted_probe(icmp.payload(), trace.target, trace.id))
            }
            _ => None,
        };

        match (icmp_type, code) {
            (Some(IcmpType::ICMP_ECHO), 0) => self.icmp_echo_reply_to(src),
            (Some(IcmpType::ICMP_ECHOREPLY), 0) => {
                if trace.active && trace.target == Some(src) && trace.id == id {
                    let hop = HopReply {
                        from: src,
                        rtt,
                        seq: Some(seq),
                        kind: HopKind::EchoReply,
                    };
                    info!("traceroute: reached {} rtt {:?}", src, rtt);
                    self.icmp.trace.reached = true;
                    self.icmp.trace.active = false;
                    self.icmp.trace.final_hop = Some(hop);
                } else {
                    info!("icmp: echo reply from {} id {} seq {} rtt {:?}", src, id, seq, rtt);
                    self.icmp.echo = Some(EchoReply {
                        from: src,
                        id,
                        seq,
                        rtt,
                    });
                }
            }
            (Some(IcmpType::ICMP_TIME_EXCEEDED), _) | (Some(IcmpType::ICMP_DEST_UNREACH), _) => {
                if !trace.active {
                    self.drop_rx("icmp: error message outside traceroute");
                    return;
                }
                let (probe_seq, sent) = match quoted {
                    Some(Ok(probe)) => probe,
                    Some(Err(reason)) => {
                        self.drop_rx(reason);
                        return;
                    }
                    None => (None, None),
                };

                let rtt = sent.map(|tick| elapsed_ticks(now, tick));
                let kind = match icmp_type {
                    Some(IcmpType::ICMP_TIME_EXCEEDED) => HopKind::TimeExceeded,
                    _ => HopKind::Unreachable(code),
                };
                let hop = HopReply {
                    from: src,
                    rtt,
                    seq: probe_seq,
                    kind,
                };

                if kind == HopKind::TimeExceeded {
                    info!("traceroute: hop {} rtt {:?}", src, rtt);
                    self.icmp.hop = Some(hop);
                } else {
                    info!("traceroute: {} unreachable (code {})", src, code);
                    self.icmp.trace.reached = true;
                    self.icmp.trace.active = false;
                    self.icmp.trace.final_hop = Some(hop);
                }
            }
            _ => self.drop_rx("icmp: unsupported type"),
        }
    }

    /// 把接收缓冲区中的回显请求原地改为应答并发回
    fn icmp_echo_reply_to(&mut self, src: Ipv4Addr) {
        let mac = match self.arp_resolve(src) {
            Ok(Some(mac)) => mac,
            Ok(None) => {
                debug!("icmp: {} not resolved, echo reply dropped", src);
                return;
            }
            Err(err) => {
                debug!("icmp: resolving {} failed: {}", src, err);
                return;
            }
        };

        let mut icmp = IcmpHdr::new_unchecked(self.rx.data_mut());
        icmp.set_type(IcmpType::ICMP_ECHOREPLY);
        icmp.set_code(0);
        icmp.fill_checksum();

        // 失败已在以太网层计数
        let _ = ip_out_to(
            &mut self.netif,
            &mac,
            src,
            IpProtocol::IPPROTO_ICMP,
            IP_DEFAULT_TTL,
            &mut self.rx,
        );
    }
}
