// crates/of_model/src/stepper.rs

//! CPU 参考步进器
//!
//! 双精度单步算法，作为设备路径的数值基准：
//!
//! - [`ExplicitEuler`]: 一阶前向欧拉 `y += dt·f(t, y)`
//! - [`Rk45`]: Dormand-Prince 六级显式方法，只取五阶解
//!
//! ## Dormand-Prince 系数
//!
//! ```text
//! c2 = 1/5   a21 = 1/5
//! c3 = 3/10  a31 = 3/40        a32 = 9/40
//! c4 = 4/5   a41 = 44/45       a42 = -56/15       a43 = 32/9
//! c5 = 8/9   a51 = 19372/6561  a52 = -25360/2187  a53 = 64448/6561  a54 = -212/729
//! c6 = 1     a61 = 9017/3168   a62 = -355/33      a63 = 46732/5247  a64 = 49/176  a65 = -5103/18656
//!
//! b = [35/384, 0, 500/1113, 125/192, -2187/6784, 11/84]
//! ```
//!
//! 固定步长：不计算嵌入的四阶解，也不做误差估计和步长调整。

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::system::OdeSystem;

/// 单步算法
pub trait TimeStepper: Send + Sync {
    /// 步进器名称
    fn name(&self) -> &'static str;

    /// 时间精度阶数
    fn order(&self) -> u8;

    /// RHS 求值次数
    fn stages(&self) -> u8;

    /// 从 `(t, y)` 推进一步，返回新状态
    fn step(&self, system: &OdeSystem, t: f64, dt: f64, y: &[f64]) -> Vec<f64>;
}

/// 一阶前向欧拉
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl TimeStepper for ExplicitEuler {
    fn name(&self) -> &'static str {
        "Explicit_Euler"
    }

    fn order(&self) -> u8 {
        1
    }

    fn stages(&self) -> u8 {
        1
    }

    fn step(&self, system: &OdeSystem, t: f64, dt: f64, y: &[f64]) -> Vec<f64> {
        let dydt = system.evaluate_rhs(t, y);
        y.iter().zip(&dydt).map(|(yi, fi)| yi + dt * fi).collect()
    }
}

// Dormand-Prince 节点与系数
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

/// Dormand-Prince RK45（固定步长）
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk45;

impl Rk45 {
    /// 计算 `h·f(t, y + Σ a_j k_j)`
    fn stage(system: &OdeSystem, t: f64, h: f64, y: &[f64], terms: &[(f64, &[f64])]) -> Vec<f64> {
        let y_stage: Vec<f64> = (0..y.len())
            .map(|i| y[i] + terms.iter().map(|(a, k)| a * k[i]).sum::<f64>())
            .collect();
        let mut k = system.evaluate_rhs(t, &y_stage);
        k.iter_mut().for_each(|v| *v *= h);
        k
    }
}

impl TimeStepper for Rk45 {
    fn name(&self) -> &'static str {
        "RK45_Dormand_Prince"
    }

    fn order(&self) -> u8 {
        5
    }

    fn stages(&self) -> u8 {
        6
    }

    fn step(&self, system: &OdeSystem, t: f64, h: f64, y: &[f64]) -> Vec<f64> {
        let k1 = Self::stage(system, t, h, y, &[]);
        let k2 = Self::stage(system, t + C2 * h, h, y, &[(A21, &k1[..])]);
        let k3 = Self::stage(system, t + C3 * h, h, y, &[(A31, &k1[..]), (A32, &k2[..])]);
        let k4 = Self::stage(
            system,
            t + C4 * h,
            h,
            y,
            &[(A41, &k1[..]), (A42, &k2[..]), (A43, &k3[..])],
        );
        let k5 = Self::stage(
            system,
            t + C5 * h,
            h,
            y,
            &[(A51, &k1[..]), (A52, &k2[..]), (A53, &k3[..]), (A54, &k4[..])],
        );
        let k6 = Self::stage(
            system,
            t + h,
            h,
            y,
            &[(A61, &k1[..]), (A62, &k2[..]), (A63, &k3[..]), (A64, &k4[..]), (A65, &k5[..])],
        );

        (0..y.len())
            .map(|i| y[i] + B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i])
            .collect()
    }
}

/// 步进器类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StepperKind {
    /// 一阶前向欧拉
    #[default]
    ExplicitEuler,
    /// Dormand-Prince RK45
    Rk45,
}

impl StepperKind {
    /// 创建步进器实例
    pub fn create(self) -> Box<dyn TimeStepper> {
        match self {
            Self::ExplicitEuler => Box::new(ExplicitEuler),
            Self::Rk45 => Box::new(Rk45),
        }
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitEuler => write!(f, "Explicit_Euler"),
            Self::Rk45 => write!(f, "RK45_Dormand_Prince"),
        }
    }
}

impl FromStr for StepperKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euler" | "explicit_euler" => Ok(Self::ExplicitEuler),
            "rk45" | "runge_kutta" | "dopri5" => Ok(Self::Rk45),
            _ => Err(ModelError::UnknownMethod {
                name: s.to_string(),
            }),
        }
    }
}

/// 按方法名创建步进器
pub fn create_stepper(method: &str) -> Result<Box<dyn TimeStepper>, ModelError> {
    method.parse::<StepperKind>().map(StepperKind::create)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay() -> OdeSystem {
        OdeSystem::builder("decay", 1, |_t, y| vec![-y[0]])
            .initial_conditions(vec![1.0])
            .build()
            .unwrap()
    }

    /// 从 0 积分到 t_final，返回终值误差
    fn final_error(stepper: &dyn TimeStepper, dt: f64) -> f64 {
        let sys = decay();
        let steps = (1.0 / dt).round() as usize;
        let mut y = vec![1.0];
        for i in 0..steps {
            y = stepper.step(&sys, i as f64 * dt, dt, &y);
        }
        (y[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn test_euler_single_step() {
        let sys = decay();
        let y = ExplicitEuler.step(&sys, 0.0, 0.1, &[1.0]);
        assert!((y[0] - 0.9).abs() < 1e-15);
    }

    #[test]
    fn test_rk45_single_step_matches_taylor() {
        // exp(-h) 的五阶截断误差为 O(h^6)
        let sys = decay();
        let h = 0.1;
        let y = Rk45.step(&sys, 0.0, h, &[1.0]);
        assert!((y[0] - (-h).exp()).abs() < 1e-7);
    }

    #[test]
    fn test_rk45_time_dependent_rhs() {
        // dy/dt = cos(t)，y = sin(t)，各级节点时间必须正确
        let sys = OdeSystem::builder("forced", 1, |t, _y| vec![t.cos()])
            .initial_conditions(vec![0.0])
            .build()
            .unwrap();
        let mut y = vec![0.0];
        let dt = 0.1;
        for i in 0..10 {
            y = Rk45.step(&sys, i as f64 * dt, dt, &y);
        }
        assert!((y[0] - 1.0f64.sin()).abs() < 1e-7);
    }

    #[test]
    fn test_convergence_order() {
        let e1 = final_error(&ExplicitEuler, 0.01);
        let e2 = final_error(&ExplicitEuler, 0.005);
        let ratio = e1 / e2;
        assert!((ratio - 2.0).abs() < 0.1, "Euler 收敛比 {}", ratio);

        let r1 = final_error(&Rk45, 0.1);
        let r2 = final_error(&Rk45, 0.05);
        assert!(r1 / r2 > 20.0, "RK45 收敛比 {}", r1 / r2);
    }

    #[test]
    fn test_factory_aliases() {
        for name in ["euler", "explicit_euler", "Euler"] {
            let s = create_stepper(name).unwrap();
            assert_eq!(s.name(), "Explicit_Euler");
            assert_eq!(s.order(), 1);
        }
        for name in ["rk45", "runge_kutta", "dopri5"] {
            let s = create_stepper(name).unwrap();
            assert_eq!(s.name(), "RK45_Dormand_Prince");
            assert_eq!(s.order(), 5);
            assert_eq!(s.stages(), 6);
        }
    }

    #[test]
    fn test_factory_unknown_method() {
        let err = create_stepper("leapfrog").err().unwrap();
        assert_eq!(
            err,
            ModelError::UnknownMethod {
                name: "leapfrog".into()
            }
        );
    }

    #[test]
    fn test_kind_display_matches_stepper_name() {
        for kind in [StepperKind::ExplicitEuler, StepperKind::Rk45] {
            assert_eq!(kind.to_string(), kind.create().name());
        }
    }
}
