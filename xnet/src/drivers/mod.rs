//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 设备驱动

pub mod net;
