//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内存队列网络设备
//!
//! 发送的帧记录在发送日志中，接收的帧来自注入队列。
//! [`wire_pair`] 把两个设备背靠背连起来：一端发送的帧进入另一端的接收队列。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::drivers::net::space::NetDriver;
use crate::error::{Result, XnetError};
use crate::net::ethernet::MacAddr;

/// 设备队列
#[derive(Default)]
struct Queues {
    /// 待接收的帧
    rx: VecDeque<Vec<u8>>,
    /// 已发送、尚未取走的帧
    tx: Vec<Vec<u8>>,
    /// 设置后所有发送都失败并返回该状态码
    fail_send: Option<i32>,
    /// 设置后 open 失败并返回该状态码
    fail_open: Option<i32>,
    opened: bool,
}

/// 队列设备
pub struct QueueDriver {
    mac: MacAddr,
    local: Arc<Mutex<Queues>>,
    /// 对端设备的队列 (wire_pair)
    peer: Option<Arc<Mutex<Queues>>>,
}

/// 队列设备的控制句柄，可以在协议栈持有设备时注入和检查帧
#[derive(Clone)]
pub struct QueueHandle {
    local: Arc<Mutex<Queues>>,
}

/// 创建一个队列设备
///
/// # 参数
/// - `mac`: open 时报告的 MAC 地址
pub fn queue_driver(mac: MacAddr) -> (QueueDriver, QueueHandle) {
    let local = Arc::new(Mutex::new(Queues::default()));
    let driver = QueueDriver {
        mac,
        local: local.clone(),
        peer: None,
    };
    (driver, QueueHandle { local })
}

/// 创建一对背靠背连接的队列设备
pub fn wire_pair(
    mac_a: MacAddr,
    mac_b: MacAddr,
) -> ((QueueDriver, QueueHandle), (QueueDriver, QueueHandle)) {
    let (mut a, handle_a) = queue_driver(mac_a);
    let (mut b, handle_b) = queue_driver(mac_b);
    a.peer = Some(b.local.clone());
    b.peer = Some(a.local.clone());
    ((a, handle_a), (b, handle_b))
}

impl NetDriver for QueueDriver {
    fn open(&mut self) -> Result<MacAddr> {
        let mut queues = self.local.lock();
        if let Some(code) = queues.fail_open {
            return Err(XnetError::Io(code));
        }
        queues.opened = true;
        Ok(self.mac)
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        {
            let mut queues = self.local.lock();
            if let Some(code) = queues.fail_send {
                return Err(XnetError::Io(code));
            }
            queues.tx.push(frame.to_vec());
        }

        if let Some(peer) = &self.peer {
            peer.lock().rx.push_back(frame.to_vec());
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        let frame = self.local.lock().rx.pop_front()?;
        let len = core::cmp::min(frame.len(), buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Some(len)
    }
}

impl QueueHandle {
    /// 注入一个待接收的帧
    pub fn inject(&self, frame: &[u8]) {
        self.local.lock().rx.push_back(frame.to_vec());
    }

    /// 取走已发送的帧
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.local.lock().tx)
    }

    /// 已发送、尚未取走的帧数
    pub fn sent_count(&self) -> usize {
        self.local.lock().tx.len()
    }

    /// 尚未被读取的帧数
    pub fn pending_rx(&self) -> usize {
        self.local.lock().rx.len()
    }

    /// 设置发送失败的状态码，None 恢复正常
    pub fn fail_sends(&self, code: Option<i32>) {
        self.local.lock().fail_send = code;
    }

    /// 设置 open 失败的状态码，None 恢复正常
    pub fn fail_open(&self, code: Option<i32>) {
        self.local.lock().fail_open = code;
    }

    /// 设备是否已打开
    pub fn is_opened(&self) -> bool {
        self.local.lock().opened
    }
}
