// crates/of_config/src/backend_config.rs

//! BackendConfig - 设备计算后端配置
//!
//! 描述设备后端的全部可调参数，JSON 序列化，所有字段都有默认值，
//! 因此空对象 `{}` 也是合法配置。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::power::PowerPreference;

/// 工作组大小上限（WebGPU 下限保证值）
pub const MAX_WORKGROUP_SIZE: u32 = 256;

/// 设备计算后端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 适配器电源偏好
    #[serde(default)]
    pub power_preference: PowerPreference,

    /// 是否强制使用软件回退适配器
    #[serde(default)]
    pub force_fallback_adapter: bool,

    /// 本地工作组大小
    ///
    /// 默认 4：Mali G31 MP2 一类设备只有 4 个 ALU，每个 ALU 一个工作项。
    #[serde(default = "default_workgroup_size")]
    pub workgroup_size: u32,

    /// 内核程序缓存容量（LRU）
    #[serde(default = "default_cache_capacity")]
    pub program_cache_capacity: usize,

    /// 内核模板目录，None 时使用内嵌模板
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// wgpu 设备标签
    #[serde(default = "default_device_label")]
    pub device_label: String,
}

fn default_workgroup_size() -> u32 { 4 }
fn default_cache_capacity() -> usize { 16 }
fn default_device_label() -> String { "OdeFlow Compute Device".to_string() }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            workgroup_size: default_workgroup_size(),
            program_cache_capacity: default_cache_capacity(),
            template_dir: None,
            device_label: default_device_label(),
        }
    }
}

impl BackendConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json(&content)
    }

    /// 从 JSON 字符串解析配置
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: BackendConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workgroup_size == 0 || self.workgroup_size > MAX_WORKGROUP_SIZE {
            return Err(ConfigError::invalid_value(
                "workgroup_size",
                self.workgroup_size,
                format!("必须在 [1, {}] 范围内", MAX_WORKGROUP_SIZE),
            ));
        }

        if self.program_cache_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "program_cache_capacity",
                self.program_cache_capacity,
                "缓存容量至少为 1",
            ));
        }

        if let Some(dir) = &self.template_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::invalid_value(
                    "template_dir",
                    "\"\"",
                    "模板目录不能为空路径",
                ));
            }
        }

        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 设置工作组大小
    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size;
        self
    }

    /// 设置模板目录
    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }

    /// 设置程序缓存容量
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.program_cache_capacity = capacity;
        self
    }

    /// 计算覆盖 `n` 个方程所需的工作组数量
    pub fn workgroups_for(&self, n: u32) -> u32 {
        n.div_ceil(self.workgroup_size)
    }
}
