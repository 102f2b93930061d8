//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! XNET 配置
//!
//! 常量由 build.rs 根据 Xnet.toml 生成，请修改 Xnet.toml 而不是这里

include!(concat!(env!("OUT_DIR"), "/config.rs"));
