// crates/of_model/src/lib.rs

//! OdeFlow Model Layer (Layer 3)
//!
//! ODE 系统描述与主机端参考实现。
//!
//! # 模块概览
//!
//! - [`system`]: `OdeSystem` / `DeviceInfo`
//! - [`stepper`]: 显式欧拉与 Dormand-Prince RK45 单步算法及工厂
//! - [`solver`]: `OdeSolver` 接口、`HostSolver`、步数计算
//!
//! # 示例
//!
//! ```
//! use of_model::{HostSolver, OdeSolver, OdeSystem};
//!
//! let system = OdeSystem::builder("decay", 1, |_t, y| vec![-2.0 * y[0]])
//!     .initial_conditions(vec![1.0])
//!     .build()
//!     .unwrap();
//!
//! let mut solver = HostSolver::from_method("rk45").unwrap();
//! let trajectory = solver.solve(&system, 0.0, 1.0, 0.01, &[1.0]);
//! assert_eq!(trajectory.len(), 101);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod solver;
pub mod stepper;
pub mod system;

/// 层级标识
pub const LAYER: u8 = 3;

pub use error::ModelError;
pub use solver::{step_count, trajectory_with_steps, HostSolver, OdeSolver, Trajectory, MAX_STEPS};
pub use stepper::{create_stepper, ExplicitEuler, Rk45, StepperKind, TimeStepper};
pub use system::{AnalyticalFn, DeviceInfo, OdeSystem, OdeSystemBuilder, RhsFn};
