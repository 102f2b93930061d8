//! XNET 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Xnet.toml 配置文件
//! 2. 生成配置代码到 OUT_DIR/config.rs

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XnetToml {
    general: General,
    packet: Packet,
    arp: Arp,
    timer: Timer,
    ip: Ip,
    traceroute: Traceroute,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct General {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Packet {
    max_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Arp {
    cache_size: usize,
    max_retries: u8,
    pending_ticks: u32,
    stable_ticks: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Timer {
    polls_per_tick: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Ip {
    default_ttl: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Traceroute {
    max_hops: u8,
    hop_timeout_ticks: u32,
}

impl Default for General {
    fn default() -> Self {
        Self {
            name: "xnet".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self { max_size: 1516 }
    }
}

impl Default for Arp {
    fn default() -> Self {
        Self {
            cache_size: 8,
            max_retries: 3,
            pending_ticks: 10,
            stable_ticks: 3000,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self { polls_per_tick: 10 }
    }
}

impl Default for Ip {
    fn default() -> Self {
        Self { default_ttl: 64 }
    }
}

impl Default for Traceroute {
    fn default() -> Self {
        Self {
            max_hops: 30,
            hop_timeout_ticks: 30,
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../Xnet.toml");
    println!("cargo:rerun-if-env-changed=XNET_CONFIG");

    // 优先使用 XNET_CONFIG 指定的配置文件，否则回退到工作区根目录的 Xnet.toml
    let path = match env::var("XNET_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"))
            .join("../Xnet.toml"),
    };
    let config: XnetToml = match fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).expect("配置文件解析失败"),
        Err(_) => {
            println!("cargo:warning={} not found, using built-in defaults", path.display());
            XnetToml::default()
        }
    };

    check_config(&config);

    println!("cargo:rustc-env=XNET_NAME={}", config.general.name);
    println!("cargo:rustc-env=XNET_VERSION={}", config.general.version);

    generate_config_code(&config);
}

/// 拒绝协议栈无法工作的配置
fn check_config(config: &XnetToml) {
    // 以太网头 + IP 头 + ICMP 头 + 时间戳，且至少能容纳最小帧
    assert!(config.packet.max_size >= 60, "packet.max_size 必须 >= 60");
    assert!(config.packet.max_size <= u16::MAX as usize, "packet.max_size 过大");
    assert!(config.arp.cache_size >= 1, "arp.cache_size 必须 >= 1");
    assert!(config.arp.pending_ticks >= 1, "arp.pending_ticks 必须 >= 1");
    assert!(config.arp.stable_ticks >= 1, "arp.stable_ticks 必须 >= 1");
    assert!(config.timer.polls_per_tick >= 1, "timer.polls_per_tick 必须 >= 1");
    assert!(config.ip.default_ttl >= 1, "ip.default_ttl 必须 >= 1");
    assert!(config.traceroute.max_hops >= 1, "traceroute.max_hops 必须 >= 1");
}

fn generate_config_code(config: &XnetToml) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR 未设置"));

    let code = format!(
        r#"// ============================================================
// 基本信息
// ============================================================

/// 协议栈名称
pub const XNET_NAME: &str = "{}";

/// 协议栈版本
pub const XNET_VERSION: &str = "{}";

// ============================================================
// 缓冲区配置
// ============================================================

/// 收发数据包的最大大小
pub const XNET_CFG_PACKET_MAX_SIZE: usize = {};

// ============================================================
// ARP 配置
// ============================================================

/// ARP 缓存大小
pub const ARP_CACHE_SIZE: usize = {};

/// ARP 请求最大重试次数
pub const ARP_MAX_RETRIES: u8 = {};

/// PENDING 表项超时（滴答）
pub const ARP_PENDING_TICKS: u32 = {};

/// RESOLVED 表项有效期（滴答）
pub const ARP_STABLE_TICKS: u32 = {};

// ============================================================
// 定时器配置
// ============================================================

/// 每个滴答包含的 poll 次数
pub const XNET_POLLS_PER_TICK: u32 = {};

// ============================================================
// IP / ICMP 配置
// ============================================================

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = {};

/// traceroute 最大跳数
pub const TRACEROUTE_MAX_HOPS: u8 = {};

/// traceroute 每跳等待时间（滴答）
pub const TRACEROUTE_HOP_TIMEOUT_TICKS: u32 = {};
"#,
        config.general.name,
        config.general.version,
        config.packet.max_size,
        config.arp.cache_size,
        config.arp.max_retries,
        config.arp.pending_ticks,
        config.arp.stable_ticks,
        config.timer.polls_per_tick,
        config.ip.default_ttl,
        config.traceroute.max_hops,
        config.traceroute.hop_timeout_ticks,
    );

    let config_file = out_dir.join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != code {
        fs::write(&config_file, &code).expect("写入配置文件失败");
    }
}
