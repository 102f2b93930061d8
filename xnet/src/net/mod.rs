//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络协议栈
//!
//! 自底向上：缓冲区 -> 以太网 -> ARP / IPv4 -> ICMP，
//! 由 [`Xnet::poll`] 驱动接收和定时器。

pub mod buffer;
pub mod ethernet;
pub mod arp;
pub mod ipv4;
pub mod icmp;
pub mod timer;
pub mod stack;
pub mod traceroute;

pub use buffer::{EthProtocol, IpProtocol, SkBuff};
pub use ethernet::{MacAddr, MacDisplay, ETH_BROADCAST};
pub use arp::{ArpCache, ArpEntry, ArpState};
pub use icmp::{EchoReply, HopKind, HopReply};
pub use stack::{SendStatus, Xnet};
pub use traceroute::{TraceEvent, Traceroute};
