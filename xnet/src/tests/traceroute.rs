//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! traceroute 测试
//!
//! 目标就是 PEER，路由器只用不同的源地址模拟。

use super::*;
use crate::net::icmp::{HopKind, HopReply};
use crate::net::stack::SendStatus;
use crate::net::traceroute::{TraceEvent, Traceroute};

const TRACE_ID: u16 = 0x77;

fn router(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, n, 254)
}

/// 路由器对探测报文返回的差错报文，引用原始 IP 头部 + 8 字节 ICMP 头部 + 时间戳
fn error_for(probe_frame: &[u8], icmp_type: IcmpType, code: u8, from: Ipv4Addr) -> Vec<u8> {
    let quoted = &probe_frame[ETH_HLEN..IP_PAYLOAD + ICMP_HLEN + 4];
    let message = icmp_message(icmp_type, code, 0, 0, quoted);
    icmp_frame(PEER_MAC, from, &message)
}

fn expect_probe(trace: &mut Traceroute, xnet: &mut Xnet<QueueDriver>, ttl: u8) -> u16 {
    match trace.step(xnet).unwrap() {
        TraceEvent::ProbeSent { ttl: sent, seq } => {
            assert_eq!(sent, ttl);
            seq
        }
        other => panic!("expected probe for ttl {}, got {:?}", ttl, other),
    }
}

#[test]
fn test_three_hop_traceroute() {
    let (mut xnet, handle) = setup_resolved();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 30);

    let mut hops = Vec::new();
    for ttl in 1..=3u8 {
        let seq = expect_probe(&mut trace, &mut xnet, ttl);
        let probe = handle.take_sent().remove(0);
        let ip = IpHdr::new_checked(&probe[ETH_HLEN..]).unwrap();
        assert_eq!(ip.ttl(), ttl);
        assert_eq!(ip.dest(), PEER_IP);
        let icmp = IcmpHdr::new_checked(sent_icmp(&probe)).unwrap();
        assert_eq!((icmp.id(), icmp.seq()), (TRACE_ID, seq));

        // 没有应答前不前进
        assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Idle);

        run_ticks(&mut xnet, 1);
        handle.inject(&error_for(&probe, IcmpType::ICMP_TIME_EXCEEDED, 0, router(ttl)));
        xnet.poll();

        match trace.step(&mut xnet).unwrap() {
            TraceEvent::Hop { ttl: hop_ttl, hop } => {
                assert_eq!(hop_ttl, ttl);
                hops.push(hop);
            }
            other => panic!("expected hop, got {:?}", other),
        }
    }

    assert_eq!(hops.len(), 3);
    for (i, hop) in hops.iter().enumerate() {
        assert_eq!(hop.from, router(i as u8 + 1));
        assert_eq!(hop.kind, HopKind::TimeExceeded);
        assert_eq!(hop.rtt, Some(1));
    }
    assert!(!xnet.is_traceroute_complete());

    // 第 4 跳到达目标
    expect_probe(&mut trace, &mut xnet, 4);
    let probe = handle.take_sent().remove(0);
    handle.inject(&echo_reply_for(&probe));
    xnet.poll();

    assert!(xnet.is_traceroute_complete());
    // 会话内目标的应答不算作 ping 应答
    assert_eq!(xnet.take_echo_reply(), None);

    match trace.step(&mut xnet).unwrap() {
        TraceEvent::Reached { ttl, hop } => {
            assert_eq!(ttl, 4);
            let hop = hop.unwrap();
            assert_eq!(hop.from, PEER_IP);
            assert_eq!(hop.kind, HopKind::EchoReply);
        }
        other => panic!("expected reached, got {:?}", other),
    }
    assert!(trace.is_done());

    // 结束后不再发送探测
    for _ in 0..100 {
        assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Idle);
        xnet.poll();
    }
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn test_hop_timeout_advances() {
    let (mut xnet, handle) = setup_resolved();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 5);

    expect_probe(&mut trace, &mut xnet, 1);
    run_ticks(&mut xnet, 4);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Idle);
    run_ticks(&mut xnet, 1);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Timeout { ttl: 1 });

    expect_probe(&mut trace, &mut xnet, 2);
    assert_eq!(handle.take_sent().len(), 2);
}

#[test]
fn test_stale_hop_ignored() {
    let (mut xnet, handle) = setup_resolved();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 1);

    expect_probe(&mut trace, &mut xnet, 1);
    let first = handle.take_sent().remove(0);
    run_ticks(&mut xnet, 1);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Timeout { ttl: 1 });
    expect_probe(&mut trace, &mut xnet, 2);
    let second = handle.take_sent().remove(0);

    // 第 1 跳迟到的应答
    handle.inject(&error_for(&first, IcmpType::ICMP_TIME_EXCEEDED, 0, router(1)));
    xnet.poll();
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Idle);

    handle.inject(&error_for(&second, IcmpType::ICMP_TIME_EXCEEDED, 0, router(2)));
    xnet.poll();
    match trace.step(&mut xnet).unwrap() {
        TraceEvent::Hop { ttl: 2, hop } => assert_eq!(hop.from, router(2)),
        other => panic!("expected hop 2, got {:?}", other),
    }
}

#[test]
fn test_max_hops() {
    let (mut xnet, handle) = setup_resolved();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 2, 1);

    expect_probe(&mut trace, &mut xnet, 1);
    run_ticks(&mut xnet, 1);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Timeout { ttl: 1 });
    expect_probe(&mut trace, &mut xnet, 2);
    run_ticks(&mut xnet, 1);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Timeout { ttl: 2 });
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::MaxHops);
    assert!(trace.is_done());
    assert!(!xnet.is_traceroute_complete());

    let probes = handle.take_sent();
    assert_eq!(probes.len(), 2);

    // 会话已结束，迟到的差错报文被丢弃
    let dropped = xnet.stats().rx_dropped;
    handle.inject(&error_for(&probes[1], IcmpType::ICMP_TIME_EXCEEDED, 0, router(2)));
    xnet.poll();
    assert_eq!(xnet.stats().rx_dropped, dropped + 1);
    assert!(!xnet.has_hop_reply());

    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Idle);
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn test_unreachable_ends_trace() {
    let (mut xnet, handle) = setup_resolved();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 30);

    expect_probe(&mut trace, &mut xnet, 1);
    let probe = handle.take_sent().remove(0);
    handle.inject(&error_for(&probe, IcmpType::ICMP_DEST_UNREACH, 3, PEER_IP));
    xnet.poll();

    assert!(xnet.is_traceroute_complete());
    // 读取不清除
    assert!(xnet.is_traceroute_complete());
    match trace.step(&mut xnet).unwrap() {
        TraceEvent::Reached { ttl: 1, hop } => {
            assert_eq!(
                hop,
                Some(HopReply {
                    from: PEER_IP,
                    rtt: Some(0),
                    seq: Some(0),
                    kind: HopKind::Unreachable(3),
                })
            );
        }
        other => panic!("expected reached, got {:?}", other),
    }
    assert!(xnet.is_traceroute_complete());
    xnet.traceroute_reset(PEER_IP, TRACE_ID);
    assert!(!xnet.is_traceroute_complete());
    assert_eq!(xnet.traceroute_final_hop(), None);
}

#[test]
fn test_probe_pending_until_resolved() {
    let (mut xnet, handle) = setup();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 30);

    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::ProbePending { ttl: 1 });
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::ProbePending { ttl: 1 });
    // 只发出一次 ARP 请求
    assert_eq!(handle.take_sent().len(), 1);

    handle.inject(&arp_frame(ArpOp::ARPOP_REPLY, PEER_MAC, PEER_IP, LOCAL_MAC, LOCAL_IP));
    xnet.poll();
    expect_probe(&mut trace, &mut xnet, 1);
}

#[test]
fn test_pending_times_out() {
    let (mut xnet, _handle) = setup();
    let mut trace = Traceroute::new(PEER_IP, TRACE_ID, 30, 2);

    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::ProbePending { ttl: 1 });
    run_ticks(&mut xnet, 2);
    assert_eq!(trace.step(&mut xnet).unwrap(), TraceEvent::Timeout { ttl: 1 });
    assert_eq!(trace.ttl(), 2);
}

#[test]
fn test_manual_probe_api() {
    let (mut xnet, handle) = setup_resolved();
    xnet.traceroute_reset(PEER_IP, TRACE_ID);
    assert_eq!(xnet.traceroute_probe(PEER_IP, TRACE_ID, 0, 1), Ok(SendStatus::Sent));
    let probe = handle.take_sent().remove(0);
    assert_eq!(sent_icmp(&probe).len(), ICMP_HLEN + crate::net::icmp::TRACEROUTE_PAYLOAD_LEN);

    handle.inject(&error_for(&probe, IcmpType::ICMP_TIME_EXCEEDED, 0, router(1)));
    xnet.poll();
    assert!(xnet.has_hop_reply());
    // 读取后清除
    assert!(!xnet.has_hop_reply());
    assert_eq!(xnet.take_hop_reply(), None);

    // 另一个会话的差错报文
    let other = xnet.stats().rx_dropped;
    xnet.traceroute_reset(PEER_IP, TRACE_ID + 1);
    handle.inject(&error_for(&probe, IcmpType::ICMP_TIME_EXCEEDED, 0, router(1)));
    xnet.poll();
    assert_eq!(xnet.take_hop_reply(), None);
    assert_eq!(xnet.stats().rx_dropped, other + 1);
}
