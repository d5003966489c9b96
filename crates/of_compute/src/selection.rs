// crates/of_compute/src/selection.rs

//! 求解器选择
//!
//! 名称形如 `<目标>_<方法>`：`cpu_euler`、`cpu_rk45`、`gpu_euler`。
//! 设备内核只实现显式欧拉步，`gpu_rk45` 可以解析但无法构建。

use std::fmt;
use std::str::FromStr;

use of_config::BackendConfig;
use of_model::{HostSolver, ModelError, OdeSolver, StepperKind};

use crate::backend::ComputeBackend;
use crate::error::ComputeError;

/// 执行目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionTarget {
    /// 主机参考实现
    #[default]
    Host,
    /// wgpu 设备
    Device,
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "cpu"),
            Self::Device => write!(f, "gpu"),
        }
    }
}

/// 求解器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SolverKind {
    /// 执行目标
    pub target: ExecutionTarget,
    /// 单步算法
    pub stepper: StepperKind,
}

impl SolverKind {
    /// 主机求解器
    pub const fn host(stepper: StepperKind) -> Self {
        Self {
            target: ExecutionTarget::Host,
            stepper,
        }
    }

    /// 设备欧拉求解器
    pub const fn device() -> Self {
        Self {
            target: ExecutionTarget::Device,
            stepper: StepperKind::ExplicitEuler,
        }
    }

    /// 该组合是否可构建
    pub fn is_supported(&self) -> bool {
        !matches!(
            (self.target, self.stepper),
            (ExecutionTarget::Device, StepperKind::Rk45)
        )
    }

    /// 构建求解器
    ///
    /// 设备求解器会占用进程内唯一的计算上下文，`config` 只对设备目标生效。
    pub fn build(self, config: BackendConfig) -> Result<Box<dyn OdeSolver>, ComputeError> {
        match (self.target, self.stepper) {
            (ExecutionTarget::Host, stepper) => Ok(Box::new(HostSolver::with_kind(stepper))),
            (ExecutionTarget::Device, StepperKind::ExplicitEuler) => {
                Ok(Box::new(ComputeBackend::new(config)?))
            }
            (ExecutionTarget::Device, StepperKind::Rk45) => Err(ComputeError::UnsupportedMethod {
                method: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.stepper {
            StepperKind::ExplicitEuler => "euler",
            StepperKind::Rk45 => "rk45",
        };
        write!(f, "{}_{}", self.target, method)
    }
}

impl FromStr for SolverKind {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let unknown = || {
            ComputeError::from(ModelError::UnknownMethod {
                name: s.to_string(),
            })
        };

        let (target, method) = lower.split_once('_').ok_or_else(unknown)?;
        let target = match target {
            "cpu" | "host" => ExecutionTarget::Host,
            "gpu" | "device" => ExecutionTarget::Device,
            _ => return Err(unknown()),
        };
        let stepper = method.parse::<StepperKind>().map_err(|_| unknown())?;
        Ok(Self { target, stepper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "cpu_euler".parse::<SolverKind>().unwrap(),
            SolverKind::host(StepperKind::ExplicitEuler)
        );
        assert_eq!(
            "CPU_RK45".parse::<SolverKind>().unwrap(),
            SolverKind::host(StepperKind::Rk45)
        );
        assert_eq!("gpu_euler".parse::<SolverKind>().unwrap(), SolverKind::device());
        assert_eq!(
            "host_dopri5".parse::<SolverKind>().unwrap().stepper,
            StepperKind::Rk45
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for name in ["euler", "tpu_euler", "cpu_leapfrog", ""] {
            let err = name.parse::<SolverKind>().unwrap_err();
            assert!(err.is_configuration(), "{name}: {err}");
        }
    }

    #[test]
    fn test_display_round_trip() {
        for name in ["cpu_euler", "cpu_rk45", "gpu_euler", "gpu_rk45"] {
            assert_eq!(name.parse::<SolverKind>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_device_rk45_rejected() {
        let kind: SolverKind = "gpu_rk45".parse().unwrap();
        assert!(!kind.is_supported());
        let err = kind.build(BackendConfig::default()).err().unwrap();
        assert!(matches!(err, ComputeError::UnsupportedMethod { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_host_solvers() {
        let euler = SolverKind::host(StepperKind::ExplicitEuler)
            .build(BackendConfig::default())
            .unwrap();
        assert_eq!(euler.name(), "CPU_Explicit_Euler");

        let rk45 = SolverKind::host(StepperKind::Rk45)
            .build(BackendConfig::default())
            .unwrap();
        assert_eq!(rk45.name(), "CPU_RK45_Dormand_Prince");
    }

    #[test]
    #[serial]
    fn test_build_device_solver_claims_context() {
        let solver = SolverKind::device().build(BackendConfig::default()).unwrap();
        assert_eq!(solver.name(), "GPU_Explicit_Euler");
        assert!(matches!(
            SolverKind::device().build(BackendConfig::default()).err(),
            Some(ComputeError::ContextAlreadyClaimed)
        ));
    }
}
