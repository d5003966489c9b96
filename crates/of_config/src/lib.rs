// crates/of_config/src/lib.rs

//! OdeFlow Config Layer (Layer 2)
//!
//! 设备计算后端的配置，JSON 文件读写与校验。
//!
//! # 示例
//!
//! ```
//! use of_config::BackendConfig;
//!
//! let config = BackendConfig::from_json(r#"{ "workgroup_size": 8 }"#).unwrap();
//! assert_eq!(config.workgroup_size, 8);
//! assert_eq!(config.program_cache_capacity, 16);
//! ```

#![warn(missing_docs)]

pub mod backend_config;
pub mod error;
pub mod power;

/// 层级标识
pub const LAYER: u8 = 2;

pub use backend_config::{BackendConfig, MAX_WORKGROUP_SIZE};
pub use error::ConfigError;
pub use power::PowerPreference;
