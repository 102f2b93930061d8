//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络缓冲区 (SkBuff)
//!
//! 固定容量，不做动态分配。协议栈只持有一个发送缓冲区和一个接收缓冲区，
//! 每次分配都会覆盖同一个槽位之前的内容。

use crate::config::XNET_CFG_PACKET_MAX_SIZE;
use crate::error::{Result, XnetError};

/// 以太网协议类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum EthProtocol {
    /// IPv4
    ETH_P_IP = 0x0800,
    /// ARP
    ETH_P_ARP = 0x0806,
}

impl EthProtocol {
    /// 从 u16 转换
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(EthProtocol::ETH_P_IP),
            0x0806 => Some(EthProtocol::ETH_P_ARP),
            _ => None,
        }
    }

    /// 转换为 u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// IP 协议类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IpProtocol {
    /// ICMP
    IPPROTO_ICMP = 1,
}

impl IpProtocol {
    /// 从 u8 转换
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(IpProtocol::IPPROTO_ICMP),
            _ => None,
        }
    }

    /// 转换为 u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// 网络缓冲区 (SkBuff)
///
/// # 内存布局
/// ```text
/// |<- headroom ->|<- data (len) ->|<- tailroom ->|
/// 0             data         data + len      CAPACITY
/// ```
///
/// 不变式：`data + len <= CAPACITY`。
/// - 发送：`alloc_for_send` 把负载放在缓冲区末尾，各层头部向前增长
/// - 接收：`alloc_for_read` 从 0 开始，各层逐个 `skb_pull` 去掉头部
pub struct SkBuff {
    /// 存储区
    head: [u8; XNET_CFG_PACKET_MAX_SIZE],
    /// 当前协议层数据的起始偏移
    data: usize,
    /// 有效数据长度
    len: usize,
}

impl SkBuff {
    /// 缓冲区容量
    pub const CAPACITY: usize = XNET_CFG_PACKET_MAX_SIZE;

    /// 创建空缓冲区
    pub const fn new() -> Self {
        Self {
            head: [0; XNET_CFG_PACKET_MAX_SIZE],
            data: 0,
            len: 0,
        }
    }

    /// 分配一个发送用的数据包
    ///
    /// # 参数
    /// - `size`: 负载大小
    ///
    /// # 说明
    /// 负载区域结束于缓冲区末尾，长度正好为 `size`，头部空间全部在前面。
    /// 负载内容不清零，由调用者填写。
    pub fn alloc_for_send(&mut self, size: usize) -> Result<()> {
        if size > Self::CAPACITY {
            return Err(XnetError::PacketTooLarge);
        }

        self.data = Self::CAPACITY - size;
        self.len = size;
        Ok(())
    }

    /// 分配一个接收用的数据包
    ///
    /// 数据从缓冲区起始处开始，长度超过容量时截断到容量。
    pub fn alloc_for_read(&mut self, size: usize) {
        self.data = 0;
        self.len = core::cmp::min(size, Self::CAPACITY);
    }

    /// 在数据头部添加空间
    ///
    /// # 返回
    /// 返回新暴露出来的头部区域，空间不足时返回 None
    pub fn skb_push(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.data {
            return None;
        }

        self.data -= len;
        self.len += len;
        Some(&mut self.head[self.data..self.data + len])
    }

    /// 从数据头部移除数据
    ///
    /// # 返回
    /// 返回移除后剩余的数据，`len` 超过当前长度时返回 None
    pub fn skb_pull(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.len {
            return None;
        }

        self.data += len;
        self.len -= len;
        Some(self.data_mut())
    }

    /// 在数据尾部添加空间
    ///
    /// # 返回
    /// 返回新增的尾部区域，空间不足时返回 None
    pub fn skb_put(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.tailroom() {
            return None;
        }

        let start = self.data + self.len;
        self.len += len;
        Some(&mut self.head[start..start + len])
    }

    /// 将数据长度裁剪为不超过 `max`
    pub fn skb_trim(&mut self, max: usize) {
        self.len = core::cmp::min(self.len, max);
    }

    /// 用 0 把数据补齐到至少 `min` 字节
    ///
    /// # 说明
    /// 发送缓冲区的负载贴着末尾，尾部没有空间时先把数据整体前移。
    pub fn skb_pad_to(&mut self, min: usize) -> Result<()> {
        if self.len >= min {
            return Ok(());
        }
        if min > Self::CAPACITY {
            return Err(XnetError::PacketTooLarge);
        }

        let pad = min - self.len;
        if pad > self.tailroom() {
            let shift = pad - self.tailroom();
            let end = self.data + self.len;
            self.head.copy_within(self.data..end, self.data - shift);
            self.data -= shift;
        }

        let tail = self.skb_put(pad).ok_or(XnetError::NoBufferSpace)?;
        tail.fill(0);
        Ok(())
    }

    /// 获取数据
    pub fn data(&self) -> &[u8] {
        &self.head[self.data..self.data + self.len]
    }

    /// 获取可变数据
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.head[self.data..self.data + self.len]
    }

    /// 整个存储区，供驱动读取整帧
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.head
    }

    /// 获取数据长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 检查是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 数据起始偏移
    pub fn offset(&self) -> usize {
        self.data
    }

    /// 头部剩余空间
    pub fn headroom(&self) -> usize {
        self.data
    }

    /// 尾部剩余空间
    pub fn tailroom(&self) -> usize {
        Self::CAPACITY - self.data - self.len
    }
}

impl Default for SkBuff {
    fn default() -> Self {
        Self::new()
    }
}
