// crates/of_model/src/solver.rs

//! 求解器接口与主机参考求解器
//!
//! 后端 = {执行位置: 主机 | 设备} × {算法}。本模块定义统一的
//! [`OdeSolver`] 接口，并提供主机端实现 [`HostSolver`]。

use of_foundation::OfResult;

use crate::error::ModelError;
use crate::stepper::{create_stepper, StepperKind, TimeStepper};
use crate::system::OdeSystem;

/// 轨迹：每个时间步一个状态向量，第 0 个为初始条件
pub type Trajectory = Vec<Vec<f64>>;

/// 步数上限，设备端 TIME_CONTROL 以 i32 记录步号
pub const MAX_STEPS: usize = i32::MAX as usize;

/// 轨迹预分配的最大步数，更长的轨迹按需增长
const PREALLOC_STEPS: usize = 1 << 16;

/// 计算时间步数 `floor((tf - t0) / dt) + 1`
///
/// 要求 `dt > 0` 且 `tf >= t0`，均为有限值；结果超过 [`MAX_STEPS`] 时返回 `TooManySteps`。
pub fn step_count(t0: f64, tf: f64, dt: f64) -> Result<usize, ModelError> {
    let valid = t0.is_finite() && tf.is_finite() && dt.is_finite() && dt > 0.0 && tf >= t0;
    if !valid {
        return Err(ModelError::InvalidTimeSpan { t0, tf, dt });
    }
    let requested = ((tf - t0) / dt).floor() + 1.0;
    if !requested.is_finite() || requested > MAX_STEPS as f64 {
        return Err(ModelError::TooManySteps {
            requested,
            limit: MAX_STEPS,
        });
    }
    Ok(requested as usize)
}

/// 轨迹容器，预分配量有上限
pub fn trajectory_with_steps(n_steps: usize) -> Trajectory {
    Vec::with_capacity(n_steps.min(PREALLOC_STEPS))
}

/// ODE 求解器
pub trait OdeSolver {
    /// 求解器名称
    fn name(&self) -> String;

    /// 求解并返回错误原因
    fn try_solve(
        &mut self,
        system: &OdeSystem,
        t0: f64,
        tf: f64,
        dt: f64,
        y0: &[f64],
    ) -> OfResult<Trajectory>;

    /// 求解，失败时记录日志并返回空轨迹
    fn solve(&mut self, system: &OdeSystem, t0: f64, tf: f64, dt: f64, y0: &[f64]) -> Trajectory {
        match self.try_solve(system, t0, tf, dt, y0) {
            Ok(trajectory) => trajectory,
            Err(e) => {
                log::error!("{} 求解失败: {}", self.name(), e);
                Vec::new()
            }
        }
    }
}

/// 主机参考求解器
pub struct HostSolver {
    stepper: Box<dyn TimeStepper>,
}

impl HostSolver {
    /// 使用给定步进器
    pub fn new(stepper: Box<dyn TimeStepper>) -> Self {
        Self { stepper }
    }

    /// 按类型创建
    pub fn with_kind(kind: StepperKind) -> Self {
        Self::new(kind.create())
    }

    /// 按方法名创建
    pub fn from_method(method: &str) -> Result<Self, ModelError> {
        create_stepper(method).map(Self::new)
    }

    /// 当前步进器
    pub fn stepper(&self) -> &dyn TimeStepper {
        self.stepper.as_ref()
    }

    /// 积分，返回模型层错误
    pub fn integrate(
        &self,
        system: &OdeSystem,
        t0: f64,
        tf: f64,
        dt: f64,
        y0: &[f64],
    ) -> Result<Trajectory, ModelError> {
        ModelError::check_dimension("y0", system.dimension, y0.len())?;
        let n_steps = step_count(t0, tf, dt)?;

        // RHS 输出长度只检查一次
        let dydt = system.evaluate_rhs(t0, y0);
        ModelError::check_dimension("rhs", system.dimension, dydt.len())?;

        let mut trajectory = trajectory_with_steps(n_steps);
        let mut y = y0.to_vec();
        trajectory.push(y.clone());

        for i in 1..n_steps {
            let t = t0 + (i - 1) as f64 * dt;
            y = self.stepper.step(system, t, dt, &y);
            trajectory.push(y.clone());
        }

        log::debug!(
            "{}: {} 步完成, 系统 '{}'",
            self.name(),
            n_steps,
            system.name
        );
        Ok(trajectory)
    }
}

impl OdeSolver for HostSolver {
    fn name(&self) -> String {
        format!("CPU_{}", self.stepper.name())
    }

    fn try_solve(
        &mut self,
        system: &OdeSystem,
        t0: f64,
        tf: f64,
        dt: f64,
        y0: &[f64],
    ) -> OfResult<Trajectory> {
        Ok(self.integrate(system, t0, tf, dt, y0)?)
    }
}
