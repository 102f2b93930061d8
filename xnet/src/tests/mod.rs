//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议栈测试
//!
//! 通过队列驱动注入帧、检查发出的帧，覆盖整条收发路径。

mod traceroute;

use alloc::vec::Vec;
use core::net::Ipv4Addr;

use crate::config::XNET_POLLS_PER_TICK;
use crate::drivers::net::loopback::{queue_driver, QueueDriver, QueueHandle};
use crate::net::arp::{ArpOp, ArpPacket, ARP_HLEN};
use crate::net::buffer::{EthProtocol, IpProtocol};
use crate::net::ethernet::{EthHdr, MacAddr, ETH_HLEN, ETH_ZLEN};
use crate::net::icmp::{IcmpHdr, IcmpType, ICMP_HLEN};
use crate::net::ipv4::{IpFlags, IpHdr, IPHDR_LEN};
use crate::net::stack::Xnet;

pub const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 108, 200);
pub const LOCAL_MAC: MacAddr = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 108, 1);
pub const PEER_MAC: MacAddr = [0x52, 0x54, 0x00, 0xAB, 0xCD, 0xEF];

/// 以太网头部之后 IP 负载的偏移
pub const IP_PAYLOAD: usize = ETH_HLEN + IPHDR_LEN;

/// 已初始化的协议栈，初始化时发出的帧已清除
pub fn setup() -> (Xnet<QueueDriver>, QueueHandle) {
    let (driver, handle) = queue_driver(LOCAL_MAC);
    let mut xnet = Xnet::new(driver, LOCAL_IP);
    xnet.init().unwrap();
    handle.take_sent();
    (xnet, handle)
}

/// 已初始化且已解析 PEER 的协议栈
pub fn setup_resolved() -> (Xnet<QueueDriver>, QueueHandle) {
    let (mut xnet, handle) = setup();
    assert_eq!(xnet.arp_resolve(PEER_IP), Ok(None));
    handle.inject(&arp_frame(
        ArpOp::ARPOP_REPLY,
        PEER_MAC,
        PEER_IP,
        LOCAL_MAC,
        LOCAL_IP,
    ));
    xnet.poll();
    assert_eq!(xnet.arp_lookup(PEER_IP), Some(PEER_MAC));
    handle.take_sent();
    (xnet, handle)
}

/// 轮询直到没有待处理的帧
pub fn drain(xnet: &mut Xnet<QueueDriver>) {
    while xnet.poll() {}
}

/// 轮询 `ticks` 个滴答
pub fn run_ticks(xnet: &mut Xnet<QueueDriver>, ticks: u32) {
    for _ in 0..ticks * XNET_POLLS_PER_TICK {
        xnet.poll();
    }
}

/// 构造以太网帧，补齐到最小帧长
pub fn eth_frame(dest: MacAddr, src: MacAddr, proto: EthProtocol, payload: &[u8]) -> Vec<u8> {
    let mut frame = alloc::vec![0u8; ETH_HLEN + payload.len()];
    let mut eth = EthHdr::new_unchecked(&mut frame[..]);
    eth.set_dest(&dest);
    eth.set_source(&src);
    eth.set_protocol(proto);
    frame[ETH_HLEN..].copy_from_slice(payload);
    if frame.len() < ETH_ZLEN {
        frame.resize(ETH_ZLEN, 0);
    }
    frame
}

/// 构造发给本机的 ARP 帧
pub fn arp_frame(
    op: ArpOp,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut arp = [0u8; ARP_HLEN];
    let mut pkt = ArpPacket::new_unchecked(&mut arp[..]);
    pkt.fill_header(op);
    pkt.set_sender(&sender_mac, sender_ip);
    pkt.set_target(&target_mac, target_ip);

    let dest = match op {
        ArpOp::ARPOP_REQUEST => [0xFF; 6],
        ArpOp::ARPOP_REPLY => LOCAL_MAC,
    };
    eth_frame(dest, sender_mac, EthProtocol::ETH_P_ARP, &arp)
}

/// 构造 IPv4 数据报 (头部 + 负载)
pub fn ip_datagram(src: Ipv4Addr, dest: Ipv4Addr, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let mut datagram = alloc::vec![0u8; IPHDR_LEN + payload.len()];
    let mut ip = IpHdr::new_unchecked(&mut datagram[..]);
    ip.set_version_ihl(4, 5);
    ip.set_total_len((IPHDR_LEN + payload.len()) as u16);
    ip.set_flags_frag(IpFlags::DF, 0);
    ip.set_ttl(ttl);
    ip.set_protocol(IpProtocol::IPPROTO_ICMP);
    ip.set_src(src);
    ip.set_dest(dest);
    ip.fill_checksum();
    datagram[IPHDR_LEN..].copy_from_slice(payload);
    datagram
}

/// 构造 ICMP 报文
pub fn icmp_message(icmp_type: IcmpType, code: u8, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut message = alloc::vec![0u8; ICMP_HLEN + payload.len()];
    message[ICMP_HLEN..].copy_from_slice(payload);
    let mut icmp = IcmpHdr::new_unchecked(&mut message[..]);
    icmp.set_type(icmp_type);
    icmp.set_code(code);
    icmp.set_id(id);
    icmp.set_seq(seq);
    icmp.fill_checksum();
    message
}

/// 构造从 `src` 发往本机的 ICMP 帧
pub fn icmp_frame(src_mac: MacAddr, src: Ipv4Addr, message: &[u8]) -> Vec<u8> {
    let datagram = ip_datagram(src, LOCAL_IP, 64, message);
    eth_frame(LOCAL_MAC, src_mac, EthProtocol::ETH_P_IP, &datagram)
}

/// 发出帧中的 ICMP 报文 (按 IP 总长度截取，去掉填充)
pub fn sent_icmp(frame: &[u8]) -> &[u8] {
    let ip = IpHdr::new_checked(&frame[ETH_HLEN..]).unwrap();
    &frame[IP_PAYLOAD..ETH_HLEN + ip.total_len() as usize]
}

/// 把发出的回显请求改为对端的回显应答
pub fn echo_reply_for(request_frame: &[u8]) -> Vec<u8> {
    let mut message = sent_icmp(request_frame).to_vec();
    let mut icmp = IcmpHdr::new_unchecked(&mut message[..]);
    icmp.set_type(IcmpType::ICMP_ECHOREPLY);
    icmp.fill_checksum();

    let ip = IpHdr::new_checked(&request_frame[ETH_HLEN..]).unwrap();
    icmp_frame(PEER_MAC, ip.dest(), &message)
}
