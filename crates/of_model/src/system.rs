// crates/of_model/src/system.rs

//! ODE 系统描述
//!
//! `OdeSystem` 同时服务于两条执行路径：
//!
//! - 主机路径直接调用 RHS 闭包 `f(t, y)`；
//! - 设备路径读取可选的 [`DeviceInfo`]，通过内置 RHS 名称或自定义内核片段生成内核。
//!
//! 没有 `DeviceInfo` 的系统只能在主机上求解。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ModelError;

/// 主机端 RHS：`f(t, y) -> dy/dt`
pub type RhsFn = Arc<dyn Fn(f64, &[f64]) -> Vec<f64> + Send + Sync>;

/// 解析解：`t -> y(t)`
pub type AnalyticalFn = Arc<dyn Fn(f64) -> Vec<f64> + Send + Sync>;

/// 设备执行描述
///
/// `builtin_name` 非空时优先使用注册表中的内置 RHS，否则使用 `custom_snippet`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    /// 自定义 WGSL 函数体
    pub custom_snippet: String,
    /// 显式 uniform 向量（非空时优先于按名称查找参数）
    pub uniforms: Vec<f32>,
    /// 内置 RHS 名称
    pub builtin_name: String,
    /// 强制只在主机执行
    pub force_host_only: bool,
}

impl DeviceInfo {
    /// 使用内置 RHS
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            builtin_name: name.into(),
            ..Default::default()
        }
    }

    /// 使用自定义内核片段
    pub fn custom(snippet: impl Into<String>) -> Self {
        Self {
            custom_snippet: snippet.into(),
            ..Default::default()
        }
    }

    /// 设置显式 uniform 向量
    pub fn with_uniforms(mut self, uniforms: Vec<f32>) -> Self {
        self.uniforms = uniforms;
        self
    }

    /// 标记为只在主机执行
    pub fn host_only(mut self) -> Self {
        self.force_host_only = true;
        self
    }

    /// 是否使用内置 RHS
    pub fn uses_builtin_rhs(&self) -> bool {
        !self.builtin_name.is_empty()
    }
}

/// ODE 系统
#[derive(Clone)]
pub struct OdeSystem {
    /// 系统名称
    pub name: String,
    /// 方程数
    pub dimension: usize,
    rhs: RhsFn,
    analytical: Option<AnalyticalFn>,
    /// 初始状态
    pub initial_conditions: Vec<f64>,
    /// 起始时间
    pub t_start: f64,
    /// 结束时间
    pub t_end: f64,
    /// 命名标量参数
    pub parameters: BTreeMap<String, f64>,
    /// 设备执行描述
    pub device: Option<DeviceInfo>,
}

impl OdeSystem {
    /// 创建构建器
    pub fn builder<F>(name: impl Into<String>, dimension: usize, rhs: F) -> OdeSystemBuilder
    where
        F: Fn(f64, &[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        OdeSystemBuilder {
            system: OdeSystem {
                name: name.into(),
                dimension,
                rhs: Arc::new(rhs),
                analytical: None,
                initial_conditions: vec![0.0; dimension],
                t_start: 0.0,
                t_end: 1.0,
                parameters: BTreeMap::new(),
                device: None,
            },
        }
    }

    /// 计算 `dy/dt`
    #[inline]
    pub fn evaluate_rhs(&self, t: f64, y: &[f64]) -> Vec<f64> {
        (self.rhs)(t, y)
    }

    /// 解析解（若提供）
    pub fn analytical(&self, t: f64) -> Option<Vec<f64>> {
        self.analytical.as_ref().map(|f| f(t))
    }

    /// 是否提供解析解
    pub fn has_analytical(&self) -> bool {
        self.analytical.is_some()
    }

    /// 是否可在设备上执行
    pub fn has_device_support(&self) -> bool {
        self.device.is_some()
    }

    /// 是否使用内置 RHS
    pub fn uses_builtin_rhs(&self) -> bool {
        self.device.as_ref().is_some_and(DeviceInfo::uses_builtin_rhs)
    }

    /// 获取参数，缺失时为 0
    pub fn parameter_or_zero(&self, name: &str) -> f64 {
        self.parameters.get(name).copied().unwrap_or(0.0)
    }

    /// 验证系统描述
    pub fn validate(&self) -> Result<(), ModelError> {
        ModelError::check_dimension(
            "initial_conditions",
            self.dimension,
            self.initial_conditions.len(),
        )?;

        if !(self.t_start < self.t_end) {
            return Err(ModelError::InvalidTimeSpan {
                t0: self.t_start,
                tf: self.t_end,
                dt: 0.0,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for OdeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdeSystem")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("initial_conditions", &self.initial_conditions)
            .field("t_span", &(self.t_start, self.t_end))
            .field("parameters", &self.parameters)
            .field("has_analytical", &self.has_analytical())
            .field("device", &self.device)
            .finish()
    }
}

/// `OdeSystem` 构建器
pub struct OdeSystemBuilder {
    system: OdeSystem,
}

impl OdeSystemBuilder {
    /// 初始状态
    pub fn initial_conditions(mut self, y0: Vec<f64>) -> Self {
        self.system.initial_conditions = y0;
        self
    }

    /// 时间区间
    pub fn time_span(mut self, t_start: f64, t_end: f64) -> Self {
        self.system.t_start = t_start;
        self.system.t_end = t_end;
        self
    }

    /// 命名参数
    pub fn parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.system.parameters.insert(name.into(), value);
        self
    }

    /// 解析解
    pub fn analytical<F>(mut self, solution: F) -> Self
    where
        F: Fn(f64) -> Vec<f64> + Send + Sync + 'static,
    {
        self.system.analytical = Some(Arc::new(solution));
        self
    }

    /// 设备执行描述
    pub fn device(mut self, info: DeviceInfo) -> Self {
        self.system.device = Some(info);
        self
    }

    /// 完成构建并验证
    pub fn build(self) -> Result<OdeSystem, ModelError> {
        self.system.validate()?;
        Ok(self.system)
    }
}
