//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议栈错误代码
//!
//! 畸形报文不属于错误：它们在各层被静默丢弃。
//! 这里只描述需要告知调用者的情况。

use core::fmt;

/// 协议栈结果类型
pub type Result<T> = core::result::Result<T, XnetError>;

/// 协议栈错误
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XnetError {
    /// 驱动 I/O 失败，携带驱动返回的原始状态码
    Io(i32),

    /// 驱动尚未打开 (init 之前调用了发送)
    NotOpen,

    /// 请求的数据包超过缓冲区容量
    PacketTooLarge,

    /// 缓冲区剩余空间不足以添加头部
    NoBufferSpace,
}

impl XnetError {
    /// 驱动层通用 I/O 错误 (XNET_ERR_IO)
    pub const IO: XnetError = XnetError::Io(-1);
}

impl fmt::Display for XnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(code) => write!(f, "driver I/O error ({})", code),
            Self::NotOpen => write!(f, "driver not opened"),
            Self::PacketTooLarge => write!(f, "packet exceeds buffer capacity"),
            Self::NoBufferSpace => write!(f, "no headroom left in packet buffer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", XnetError::IO), "driver I/O error (-1)");
        assert_eq!(format!("{}", XnetError::Io(-7)), "driver I/O error (-7)");
        assert_eq!(format!("{}", XnetError::NotOpen), "driver not opened");
    }
}
