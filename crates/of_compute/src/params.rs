// crates/of_compute/src/params.rs

//! 主机与内核共享的缓冲区布局
//!
//! 布局与 `kernels/euler_template.wgsl` 中的结构体逐字节一致：
//!
//! ```text
//! SystemParams (76 字节)          TimeControl (8 字节)
//! ┌────────────┬────────┐        ┌──────────────┬────────┐
//! │ dt         │ f32    │        │ current_step │ i32    │
//! │ t_current  │ f32    │        │ total_steps  │ i32    │
//! │ n_equations│ i32    │        └──────────────┴────────┘
//! │ uniforms   │ f32×16 │
//! └────────────┴────────┘
//! ```
//!
//! 两者都绑定为只读存储缓冲区，`array<f32, 16>` 步长为 4 字节。

use bytemuck::{Pod, Zeroable};
use of_model::OdeSystem;

use crate::error::ComputeError;

/// uniform 槽位数
pub const MAX_UNIFORMS: usize = 16;

/// 绑定点：状态
pub const BINDING_STATE: u32 = 0;
/// 绑定点：参数
pub const BINDING_PARAMS: u32 = 1;
/// 绑定点：时间序列
pub const BINDING_TIMESERIES: u32 = 2;
/// 绑定点：时间控制
pub const BINDING_TIME_CONTROL: u32 = 3;

/// 系统参数 (PARAMS)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SystemParams {
    /// 时间步长
    pub dt: f32,
    /// 当前时间
    pub t_current: f32,
    /// 方程数
    pub n_equations: i32,
    /// uniform 槽位
    pub uniforms: [f32; MAX_UNIFORMS],
}

impl SystemParams {
    /// 创建参数
    pub fn new(dt: f64, t_current: f64, n_equations: usize, uniforms: [f32; MAX_UNIFORMS]) -> Self {
        Self {
            dt: dt as f32,
            t_current: t_current as f32,
            n_equations: n_equations as i32,
            uniforms,
        }
    }
}

/// 时间控制 (TIME_CONTROL)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct TimeControl {
    /// 当前步
    pub current_step: i32,
    /// 总步数
    pub total_steps: i32,
}

/// 填充 uniform 槽位
///
/// 设备描述中的显式向量优先，复制到前 `len` 个槽位，其余为 0；
/// 否则按 `uniform_names` 顺序从 `system.parameters` 取值，缺失时为 0。
/// 任一来源超过 [`MAX_UNIFORMS`] 都返回 `TooManyUniforms`。
pub fn resolve_uniforms(
    system: &OdeSystem,
    uniform_names: &[String],
) -> Result<[f32; MAX_UNIFORMS], ComputeError> {
    let mut slots = [0.0f32; MAX_UNIFORMS];

    let explicit = system
        .device
        .as_ref()
        .map(|d| d.uniforms.as_slice())
        .unwrap_or_default();

    if !explicit.is_empty() {
        if explicit.len() > MAX_UNIFORMS {
            return Err(ComputeError::TooManyUniforms {
                requested: explicit.len(),
            });
        }
        slots[..explicit.len()].copy_from_slice(explicit);
        return Ok(slots);
    }

    if uniform_names.len() > MAX_UNIFORMS {
        return Err(ComputeError::TooManyUniforms {
            requested: uniform_names.len(),
        });
    }
    for (slot, name) in slots.iter_mut().zip(uniform_names) {
        *slot = system.parameter_or_zero(name) as f32;
    }
    Ok(slots)
}
