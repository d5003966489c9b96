// crates/of_compute/src/error.rs

//! 设备计算错误
//!
//! | 分类 | 变体 |
//! |------|------|
//! | 配置 | `UnsupportedSystem`, `MissingRhs`, `HostOnly`, `UnsupportedMethod`, `Config`, `Model(UnknownMethod)` |
//! | 资源 | `NoAdapter`, `DeviceCreation`, `ContextNotInitialized`, `ContextAlreadyClaimed`, `ContextReleased`, `Compile`, `Link`, `BufferAllocation`, `BufferMap`, `NotAllocated`, `Dispatch` |
//! | 容量 | `TooManyUniforms`, `BufferTooLarge`, `TooManyWorkgroups` |
//! | 查找 | `RhsNotFound` |
//! | 模板 | `TemplateNotFound`, `MissingPlaceholder`, `InvalidUniformName` |

use of_config::ConfigError;
use of_foundation::OfError;
use of_model::ModelError;

use crate::params::MAX_UNIFORMS;

/// 设备计算错误
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    // ========================================================================
    // 配置
    // ========================================================================
    /// 系统没有设备描述
    #[error("系统 '{system}' 没有设备描述，无法在设备上求解")]
    UnsupportedSystem {
        /// 系统名称
        system: String,
    },

    /// 设备描述既没有内置名称也没有自定义片段
    #[error("系统 '{system}' 的设备描述未提供 RHS")]
    MissingRhs {
        /// 系统名称
        system: String,
    },

    /// 系统被标记为只在主机执行
    #[error("系统 '{system}' 被标记为仅主机执行")]
    HostOnly {
        /// 系统名称
        system: String,
    },

    /// 设备不支持该步进方法
    #[error("设备内核不支持步进方法 '{method}'")]
    UnsupportedMethod {
        /// 方法名
        method: String,
    },

    /// 后端配置无效
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 模型输入无效
    #[error(transparent)]
    Model(#[from] ModelError),

    // ========================================================================
    // 设备资源
    // ========================================================================
    /// 没有可用的适配器
    #[error("没有可用的计算适配器")]
    NoAdapter,

    /// 设备创建失败
    #[error("设备创建失败: {0}")]
    DeviceCreation(String),

    /// 上下文尚未初始化
    #[error("计算上下文尚未初始化")]
    ContextNotInitialized,

    /// 进程内已存在计算上下文
    #[error("计算上下文已被占用，每个进程只允许一个实例")]
    ContextAlreadyClaimed,

    /// 内核编译失败
    #[error("内核编译失败: {diagnostic}")]
    Compile {
        /// 编译器诊断
        diagnostic: String,
    },

    /// 管线链接失败
    #[error("管线链接失败: {diagnostic}")]
    Link {
        /// 链接诊断
        diagnostic: String,
    },

    /// 缓冲区分配失败
    #[error("缓冲区 '{label}' 分配失败: {reason}")]
    BufferAllocation {
        /// 缓冲区标签
        label: &'static str,
        /// 原因
        reason: String,
    },

    /// 缓冲区映射失败
    #[error("缓冲区映射失败: {0}")]
    BufferMap(String),

    /// 缓冲区集合尚未分配
    #[error("缓冲区集合尚未分配")]
    NotAllocated,

    /// 上下文已释放，不能再次初始化
    #[error("计算上下文已释放")]
    ContextReleased,

    /// 时间步调度被设备拒绝
    #[error("第 {step} 步调度失败: {diagnostic}")]
    Dispatch {
        /// 步号
        step: usize,
        /// 设备诊断
        diagnostic: String,
    },

    // ========================================================================
    // 容量
    // ========================================================================
    /// uniform 数量超限
    #[error("uniform 数量 {requested} 超过上限 {}", MAX_UNIFORMS)]
    TooManyUniforms {
        /// 请求数量
        requested: usize,
    },

    /// 缓冲区超过设备限制
    #[error("缓冲区 '{label}' 需要 {requested} 字节, 设备上限 {limit} 字节")]
    BufferTooLarge {
        /// 缓冲区标签
        label: &'static str,
        /// 请求字节数
        requested: u64,
        /// 设备上限
        limit: u64,
    },

    /// 工作组数超过每维上限
    #[error("需要 {requested} 个工作组, 设备每维上限 {limit}")]
    TooManyWorkgroups {
        /// 请求的工作组数
        requested: u32,
        /// 设备上限
        limit: u32,
    },

    // ========================================================================
    // 查找与模板
    // ========================================================================
    /// 注册表中没有该 RHS
    #[error("未知的 RHS 系统: '{name}'")]
    RhsNotFound {
        /// RHS 名称
        name: String,
    },

    /// 找不到内核模板
    #[error("找不到内核模板: {path}")]
    TemplateNotFound {
        /// 模板路径
        path: String,
    },

    /// 模板占位符缺失或重复
    #[error("模板占位符 {token} 出现 {count} 次, 期望恰好 1 次")]
    MissingPlaceholder {
        /// 占位符
        token: &'static str,
        /// 实际出现次数
        count: usize,
    },

    /// uniform 名称不是合法标识符
    #[error("非法的 uniform 名称: '{name}'")]
    InvalidUniformName {
        /// 名称
        name: String,
    },
}

impl ComputeError {
    /// 是否为配置类错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSystem { .. }
                | Self::MissingRhs { .. }
                | Self::HostOnly { .. }
                | Self::UnsupportedMethod { .. }
                | Self::Config(_)
                | Self::Model(ModelError::UnknownMethod { .. })
        )
    }

    /// 是否为设备资源类错误
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Self::NoAdapter
                | Self::DeviceCreation(_)
                | Self::ContextNotInitialized
                | Self::ContextAlreadyClaimed
                | Self::Compile { .. }
                | Self::Link { .. }
                | Self::BufferAllocation { .. }
                | Self::BufferMap(_)
                | Self::NotAllocated
                | Self::ContextReleased
                | Self::Dispatch { .. }
        )
    }
}

impl From<ComputeError> for OfError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::Config(e) => e.into(),
            ComputeError::Model(e) => e.into(),
            ComputeError::RhsNotFound { name } => OfError::lookup(name),
            ComputeError::TooManyUniforms { requested } => {
                OfError::capacity("uniforms", requested, MAX_UNIFORMS)
            }
            ComputeError::BufferTooLarge {
                requested, limit, ..
            } => OfError::capacity(
                "buffer bytes",
                usize::try_from(requested).unwrap_or(usize::MAX),
                usize::try_from(limit).unwrap_or(usize::MAX),
            ),
            ComputeError::TooManyWorkgroups { requested, limit } => {
                OfError::capacity("workgroups", requested as usize, limit as usize)
            }
            e if e.is_configuration() => OfError::config(e.to_string()),
            e if e.is_resource() => OfError::resource(e.to_string()),
            e => OfError::config(e.to_string()),
        }
    }
}
