//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备驱动
//!
//! 协议栈只通过 [`NetDriver`] 访问网卡。真实网卡 (pcap、TAP 等) 的驱动
//! 在协议栈之外实现；这里提供一个内存队列驱动用于仿真和测试。

pub mod space;
pub mod loopback;

pub use space::{DeviceStats, NetDriver};

pub use loopback::{queue_driver, wire_pair, QueueDriver, QueueHandle};
