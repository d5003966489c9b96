// crates/of_foundation/src/lib.rs

//! OdeFlow Foundation Layer (Layer 1)
//!
//! 基础层，提供整个工作区共享的错误类型与日志初始化。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `OfError` / `OfResult`
//! - [`logging`]: 基于 `env_logger` 的日志初始化
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: of_compute    ─> 设备计算后端
//! Layer 3: of_model      ─> ODE 系统模型、CPU 参考步进器
//! Layer 2: of_config     ─> BackendConfig
//! Layer 1: of_foundation ─> OfError, logging (本层)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod logging;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出常用类型
pub use error::{OfError, OfResult};
pub use logging::{init_logging, init_test_logging};
