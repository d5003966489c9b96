// crates/of_model/src/error.rs

//! 模型层错误类型

use of_foundation::OfError;

/// 模型错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// 未知的步进方法名
    #[error("未知的步进方法: '{name}' (可用: euler, explicit_euler, rk45, runge_kutta, dopri5)")]
    UnknownMethod {
        /// 请求的方法名
        name: String,
    },

    /// 向量长度与系统维数不符
    #[error("{what} 维数不匹配: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch {
        /// 出错的量
        what: &'static str,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 时间区间或步长无效
    #[error("无效的时间区间: t0={t0}, tf={tf}, dt={dt}")]
    InvalidTimeSpan {
        /// 起始时间
        t0: f64,
        /// 结束时间
        tf: f64,
        /// 步长
        dt: f64,
    },

    /// 步数超过上限
    #[error("时间步数过多: 需要 {requested:.3e} 步, 上限 {limit}")]
    TooManySteps {
        /// 需要的步数
        requested: f64,
        /// 上限
        limit: usize,
    },
}

impl ModelError {
    /// 检查长度，不符时返回 `DimensionMismatch`
    pub fn check_dimension(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

impl From<ModelError> for OfError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnknownMethod { .. } => OfError::config(err.to_string()),
            ModelError::DimensionMismatch { .. } | ModelError::InvalidTimeSpan { .. } => {
                OfError::invalid_input(err.to_string())
            }
            ModelError::TooManySteps { requested, limit } => {
                // f64 → usize 的 as 转换是饱和的
                OfError::capacity("time steps", requested as usize, limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_method_is_config_error() {
        let err: OfError = ModelError::UnknownMethod {
            name: "leapfrog".into(),
        }
        .into();
        assert!(err.is_config());
        assert!(err.to_string().contains("leapfrog"));
    }

    #[test]
    fn test_too_many_steps_is_capacity_error() {
        let err: OfError = ModelError::TooManySteps {
            requested: 1e300,
            limit: 100,
        }
        .into();
        assert!(matches!(
            err,
            OfError::Capacity {
                requested: usize::MAX,
                limit: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_check_dimension() {
        assert!(ModelError::check_dimension("y0", 3, 3).is_ok());
        assert_eq!(
            ModelError::check_dimension("y0", 3, 2),
            Err(ModelError::DimensionMismatch {
                what: "y0",
                expected: 3,
                actual: 2
            })
        );
    }
}
