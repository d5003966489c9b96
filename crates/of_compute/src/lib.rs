// crates/of_compute/src/lib.rs

//! OdeFlow Compute Layer (Layer 4)
//!
//! 基于 wgpu 的设备端 ODE 积分后端。
//!
//! # 模块概览
//!
//! - [`registry`]: 内置与注册的 RHS 定义（WGSL 片段 + uniform 名称）
//! - [`kernel`]: 欧拉内核模板与源码生成
//! - [`context`]: 进程内唯一的计算上下文，内核编译
//! - [`buffer`]: 单次求解的设备缓冲区会话
//! - [`cache`]: 已编译程序的 LRU 缓存
//! - [`backend`]: 设备求解主循环
//! - [`selection`]: `cpu_*` / `gpu_*` 求解器选择
//!
//! # 绑定约定
//!
//! | 绑定 | 缓冲区 | 访问 |
//! |------|--------|------|
//! | 0 | STATE | 读写 |
//! | 1 | PARAMS | 只读 |
//! | 2 | TIMESERIES | 读写 |
//! | 3 | TIME_CONTROL | 只读 |
//!
//! # 示例
//!
//! ```no_run
//! use of_compute::{BackendConfig, ComputeBackend, OdeSolver};
//! use of_model::{DeviceInfo, OdeSystem};
//!
//! let system = OdeSystem::builder("decay", 1, |_t, y| vec![-2.0 * y[0]])
//!     .initial_conditions(vec![1.0])
//!     .parameter("lambda", 2.0)
//!     .device(DeviceInfo::builtin("exponential"))
//!     .build()
//!     .unwrap();
//!
//! let mut backend = ComputeBackend::new(BackendConfig::default()).unwrap();
//! let trajectory = backend.solve(&system, 0.0, 1.0, 0.01, &[1.0]);
//! assert!(trajectory.is_empty() || trajectory.len() == 101);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod buffer;
pub mod cache;
pub mod capabilities;
pub mod context;
pub mod error;
pub mod kernel;
pub mod params;
pub mod registry;
pub mod selection;

/// 层级标识
pub const LAYER: u8 = 4;

pub use backend::{ComputeBackend, ResolvedProgram, SolveStats};
pub use buffer::DeviceBufferManager;
pub use cache::ProgramCache;
pub use capabilities::{DeviceCapabilities, DeviceType};
pub use context::{ComputeContext, KernelProgram, ProgramId};
pub use error::ComputeError;
pub use kernel::{KernelGenerator, KernelKey};
pub use params::{SystemParams, TimeControl, MAX_UNIFORMS};
pub use registry::{RhsDefinition, RhsRegistry};
pub use selection::{ExecutionTarget, SolverKind};

pub use of_config::BackendConfig;
pub use of_model::OdeSolver;
