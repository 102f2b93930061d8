//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备接口
//!
//! 参考 Linux 的 net_device_ops，但只保留协议栈需要的三个操作。

use crate::error::Result;
use crate::net::ethernet::MacAddr;

/// 链路层驱动
///
/// 驱动收发的都是完整的以太网帧 (不含 FCS)。
pub trait NetDriver {
    /// 打开网卡
    ///
    /// # 返回
    /// 成功返回网卡的 MAC 地址
    fn open(&mut self) -> Result<MacAddr>;

    /// 发送一个完整的以太网帧
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// 非阻塞地读取一帧到 `buf`
    ///
    /// # 返回
    /// 有数据时返回帧长度，无数据立即返回 None
    fn read(&mut self, buf: &mut [u8]) -> Option<usize>;
}

impl<D: NetDriver + ?Sized> NetDriver for &mut D {
    fn open(&mut self) -> Result<MacAddr> {
        (**self).open()
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        (**self).read(buf)
    }
}

/// 网络接口统计信息
///
/// 对应 Linux 的 rtnl_link_stats64 的一个子集
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// 接收包数
    pub rx_packets: u64,
    /// 发送包数
    pub tx_packets: u64,
    /// 接收字节数
    pub rx_bytes: u64,
    /// 发送字节数
    pub tx_bytes: u64,
    /// 接收丢弃数 (畸形、非本机、未知协议)
    pub rx_dropped: u64,
    /// 发送错误数
    pub tx_errors: u64,
}
