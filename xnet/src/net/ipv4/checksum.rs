//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Internet 校验和
//!
//! RFC 1071 - Computing the Internet Checksum，IP 头部和 ICMP 报文共用。

/// 计算 Internet 校验和
///
/// # 参数
/// - `data`: 数据，长度可以为奇数
///
/// # 返回
/// 校验和 (主机字节序，写入报文时用 `to_be_bytes`)
///
/// # 说明
/// 奇数长度时最后一个字节作为 16 位字的高字节。
pub fn ip_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = words.remainder() {
        sum += (*last as u32) << 8;
    }

    // 处理进位
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// 验证校验和：包含校验和字段在内的整体校验和为 0
pub fn verify_ip_checksum(data: &[u8]) -> bool {
    ip_checksum(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_checksum() {
        // 校验和字段 (偏移 10) 为 0
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(ip_checksum(&header), 0xb861);

        let header = [
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xac, 0x10,
            0x0a, 0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        assert_eq!(ip_checksum(&header), 0xb1e6);
    }

    #[test]
    fn test_verify_filled_checksum() {
        let mut header = [
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xac, 0x10,
            0x0a, 0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        let csum = ip_checksum(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        assert!(verify_ip_checksum(&header));

        header[8] = 0x3f;
        assert!(!verify_ip_checksum(&header));
    }

    #[test]
    fn test_odd_length() {
        assert_eq!(ip_checksum(&[0x01]), 0xfeff);
        // 末尾补 0 与奇数长度等价
        assert_eq!(ip_checksum(&[0x12, 0x34, 0x56]), ip_checksum(&[0x12, 0x34, 0x56, 0x00]));
    }

    #[test]
    fn test_empty() {
        assert_eq!(ip_checksum(&[]), 0xffff);
    }
}
