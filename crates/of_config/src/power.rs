// crates/of_config/src/power.rs

//! 适配器电源偏好
//!
//! 配置层不依赖 wgpu，使用自己的 `PowerPreference` 枚举，
//! 由 of_compute 在请求适配器时转换为 `wgpu::PowerPreference`。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 适配器电源偏好
///
/// 目标设备是只有少量 ALU 的嵌入式 GPU，默认选择低功耗（集成）适配器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    /// 低功耗（集成显卡 / SoC GPU）
    #[default]
    LowPower,
    /// 高性能（独立显卡）
    HighPerformance,
    /// 不指定
    None,
}

impl PowerPreference {
    /// 获取名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::LowPower => "low_power",
            Self::HighPerformance => "high_performance",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for PowerPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 电源偏好解析错误
#[derive(Debug, Clone)]
pub struct PowerPreferenceParseError(String);

impl FromStr for PowerPreference {
    type Err = PowerPreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low_power" | "low" | "integrated" => Ok(Self::LowPower),
            "high_performance" | "high" | "discrete" => Ok(Self::HighPerformance),
            "none" | "any" => Ok(Self::None),
            _ => Err(PowerPreferenceParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for PowerPreferenceParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "无效的电源偏好: '{}', 期望 'low_power'、'high_performance' 或 'none'",
            self.0
        )
    }
}

impl std::error::Error for PowerPreferenceParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_preference_default() {
        assert_eq!(PowerPreference::default(), PowerPreference::LowPower);
    }

    #[test]
    fn test_power_preference_parse() {
        assert_eq!(
            "HIGH_PERFORMANCE".parse::<PowerPreference>().unwrap(),
            PowerPreference::HighPerformance
        );
        assert_eq!("low".parse::<PowerPreference>().unwrap(), PowerPreference::LowPower);
        assert_eq!("any".parse::<PowerPreference>().unwrap(), PowerPreference::None);
        assert!("turbo".parse::<PowerPreference>().is_err());
    }

    #[test]
    fn test_power_preference_serde_name() {
        let json = serde_json::to_string(&PowerPreference::HighPerformance).unwrap();
        assert_eq!(json, "\"high_performance\"");
    }
}
