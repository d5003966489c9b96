// crates/of_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `OfError` 枚举和 `OfResult` 类型别名，作为跨 crate 的公共错误出口。
//!
//! # 错误分类
//!
//! | 分类 | 变体 | 典型来源 |
//! |------|------|----------|
//! | 配置错误 | [`OfError::Config`] | 缺少设备描述、未知 RHS 名称、未知步进方法 |
//! | 资源错误 | [`OfError::Resource`] | 设备打开、上下文创建、内核编译/链接失败 |
//! | 容量错误 | [`OfError::Capacity`] | uniform 超过 16 个、缓冲区超出设备限制 |
//! | 查找错误 | [`OfError::Lookup`] | RHS 注册表未命中 |
//!
//! 各层在自己的 crate 中定义细化的错误类型，并通过 `From` 转换到 `OfError`。
//!
//! # 示例
//!
//! ```
//! use of_foundation::error::{OfError, OfResult};
//!
//! fn lookup() -> OfResult<()> {
//!     Err(OfError::lookup("lorenz96"))
//! }
//!
//! assert!(lookup().is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type OfResult<T> = Result<T, OfError>;

/// OdeFlow 错误类型
#[derive(Error, Debug)]
pub enum OfError {
    // ========================================================================
    // 配置与查找
    // ========================================================================

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 查找失败
    #[error("未找到: {name}")]
    Lookup {
        /// 查找的名称
        name: String,
    },

    // ========================================================================
    // 设备资源
    // ========================================================================

    /// 设备资源错误
    #[error("设备资源错误: {message}")]
    Resource {
        /// 具体错误信息
        message: String,
    },

    /// 容量超限
    #[error("容量超限: {what} 请求 {requested}, 上限 {limit}")]
    Capacity {
        /// 超限的资源
        what: &'static str,
        /// 请求数量
        requested: usize,
        /// 允许上限
        limit: usize,
    },

    // ========================================================================
    // 通用
    // ========================================================================

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl OfError {
    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 查找失败
    pub fn lookup(name: impl Into<String>) -> Self {
        Self::Lookup { name: name.into() }
    }

    /// 设备资源错误
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    /// 容量超限
    pub fn capacity(what: &'static str, requested: usize, limit: usize) -> Self {
        Self::Capacity {
            what,
            requested,
            limit,
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 是否为配置类错误
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// 是否为设备资源类错误
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl OfError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &str, expected: usize, actual: usize) -> OfResult<()> {
        if expected != actual {
            Err(Self::invalid_input(format!(
                "{} 期望长度 {}, 实际 {}",
                name, expected, actual
            )))
        } else {
            Ok(())
        }
    }

    /// 检查数量是否超过上限
    #[inline]
    pub fn check_capacity(what: &'static str, requested: usize, limit: usize) -> OfResult<()> {
        if requested > limit {
            Err(Self::capacity(what, requested, limit))
        } else {
            Ok(())
        }
    }
}
