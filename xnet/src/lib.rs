//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! XNET - 微型以太网/ARP/IPv4/ICMP 协议栈
//!
//! 直接运行在链路层驱动之上，支持 ARP 解析、ping 和 traceroute。
//! 单线程、非阻塞：调用者循环调用 [`Xnet::poll`]，
//! 地址未解析时发送返回 [`SendStatus::Pending`]，由调用者稍后重试。
//!
//! ```ignore
//! let (driver, _handle) = xnet::drivers::net::queue_driver(mac);
//! let mut stack = xnet::Xnet::new(driver, Ipv4Addr::new(192, 168, 108, 200));
//! stack.init()?;
//! loop {
//!     stack.poll();
//! }
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod error;
pub mod net;

#[cfg(test)]
mod tests;

pub use drivers::net::{DeviceStats, NetDriver};
pub use error::{Result, XnetError};
pub use net::{EchoReply, HopKind, HopReply, MacAddr, SendStatus, TraceEvent, Traceroute, Xnet};
