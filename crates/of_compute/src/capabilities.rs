// crates/of_compute/src/capabilities.rs

//! 设备能力描述
//!
//! 由 wgpu 适配器信息与设备限制构建，用于日志和工作组大小的约束。

use crate::error::ComputeError;

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// CPU（软件实现）
    Cpu,
    /// 独立显卡
    DiscreteGpu,
    /// 集成显卡 / SoC GPU
    IntegratedGpu,
    /// 虚拟GPU
    VirtualGpu,
    /// 未知类型
    Unknown,
}

impl DeviceType {
    /// 是否为GPU类型
    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            DeviceType::DiscreteGpu | DeviceType::IntegratedGpu | DeviceType::VirtualGpu
        )
    }
}

impl From<wgpu::DeviceType> for DeviceType {
    fn from(ty: wgpu::DeviceType) -> Self {
        match ty {
            wgpu::DeviceType::DiscreteGpu => Self::DiscreteGpu,
            wgpu::DeviceType::IntegratedGpu => Self::IntegratedGpu,
            wgpu::DeviceType::VirtualGpu => Self::VirtualGpu,
            wgpu::DeviceType::Cpu => Self::Cpu,
            wgpu::DeviceType::Other => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::DiscreteGpu => write!(f, "Discrete GPU"),
            DeviceType::IntegratedGpu => write!(f, "Integrated GPU"),
            DeviceType::VirtualGpu => write!(f, "Virtual GPU"),
            DeviceType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// 设备能力描述
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// 设备名称
    pub name: String,
    /// 厂商名称
    pub vendor: String,
    /// 图形 API 后端
    pub backend: String,
    /// 设备类型
    pub device_type: DeviceType,
    /// 单个工作组最大调用数
    pub max_workgroup_size: u32,
    /// 每维最大工作组数
    pub max_workgroups_per_dimension: u32,
    /// 存储缓冲区绑定上限（字节）
    pub max_storage_buffer_binding_size: u64,
    /// 单个缓冲区上限（字节）
    pub max_buffer_size: u64,
}

impl DeviceCapabilities {
    /// 由适配器信息和设备限制构建
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            vendor: vendor_name(info.vendor),
            backend: format!("{:?}", info.backend),
            device_type: info.device_type.into(),
            max_workgroup_size: limits
                .max_compute_invocations_per_workgroup
                .min(limits.max_compute_workgroup_size_x),
            max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: u64::from(limits.max_storage_buffer_binding_size),
            max_buffer_size: limits.max_buffer_size,
        }
    }

    /// 单个存储缓冲区可用的最大字节数
    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_buffer_binding_size.min(self.max_buffer_size)
    }

    /// 将请求的工作组大小限制在设备范围内
    pub fn clamp_workgroup_size(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_workgroup_size.max(1))
    }

    /// 覆盖 `n` 个方程需要的工作组数
    pub fn workgroups_for(&self, n: u32, workgroup_size: u32) -> u32 {
        n.div_ceil(workgroup_size.max(1))
    }

    /// 一维调度的工作组数，超过每维上限时返回 `TooManyWorkgroups`
    pub fn dispatch_for(&self, n: u32, workgroup_size: u32) -> Result<u32, ComputeError> {
        let requested = self.workgroups_for(n, workgroup_size);
        if requested > self.max_workgroups_per_dimension {
            return Err(ComputeError::TooManyWorkgroups {
                requested,
                limit: self.max_workgroups_per_dimension,
            });
        }
        Ok(requested)
    }
}

impl std::fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] ({}, {}), 工作组上限 {}, 存储缓冲区上限 {:.1} MB",
            self.name,
            self.vendor,
            self.device_type,
            self.backend,
            self.max_workgroup_size,
            self.max_storage_bytes() as f64 / (1024.0 * 1024.0)
        )
    }
}

/// PCI 厂商 ID → 名称
pub fn vendor_name(vendor_id: u32) -> String {
    match vendor_id {
        0x10DE => "NVIDIA".to_string(),
        0x1002 => "AMD".to_string(),
        0x8086 => "Intel".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x1010 => "Imagination".to_string(),
        0x106B => "Apple".to_string(),
        0x10005 => "Mesa".to_string(),
        _ => format!("Unknown (0x{:04X})", vendor_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mali_like() -> DeviceCapabilities {
        DeviceCapabilities {
            name: "Mali-G31".to_string(),
            vendor: vendor_name(0x13B5),
            backend: "Gl".to_string(),
            device_type: DeviceType::IntegratedGpu,
            max_workgroup_size: 128,
            max_workgroups_per_dimension: 65535,
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 256 << 20,
        }
    }

    #[test]
    fn test_vendor_name() {
        assert_eq!(vendor_name(0x13B5), "ARM");
        assert_eq!(vendor_name(0x1234), "Unknown (0x1234)");
    }

    #[test]
    fn test_device_type_mapping() {
        assert_eq!(DeviceType::from(wgpu::DeviceType::IntegratedGpu), DeviceType::IntegratedGpu);
        assert!(!DeviceType::from(wgpu::DeviceType::Cpu).is_gpu());
        assert_eq!(DeviceType::DiscreteGpu.to_string(), "Discrete GPU");
    }

    #[test]
    fn test_limits() {
        let caps = mali_like();
        assert_eq!(caps.max_storage_bytes(), 128 << 20);
        assert_eq!(caps.clamp_workgroup_size(4), 4);
        assert_eq!(caps.clamp_workgroup_size(1024), 128);
        assert_eq!(caps.clamp_workgroup_size(0), 1);
        assert_eq!(caps.workgroups_for(10, 4), 3);
        assert!(caps.to_string().contains("Mali-G31"));
    }

    #[test]
    fn test_dispatch_limit() {
        let caps = mali_like();
        assert_eq!(caps.dispatch_for(65535 * 4, 4).unwrap(), 65535);
        let err = caps.dispatch_for(65535 * 4 + 4, 4).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::TooManyWorkgroups {
                requested: 65536,
                limit: 65535
            }
        ));
        assert!(caps.dispatch_for(u32::MAX, 1).is_err());
    }

    #[test]
    fn test_from_wgpu_limits() {
        let info = wgpu::AdapterInfo {
            name: "Test Adapter".to_string(),
            vendor: 0x8086,
            device: 0,
            device_type: wgpu::DeviceType::IntegratedGpu,
            driver: String::new(),
            driver_info: String::new(),
            backend: wgpu::Backend::Vulkan,
        };
        let limits = wgpu::Limits::downlevel_defaults();
        let caps = DeviceCapabilities::from_wgpu(&info, &limits);
        assert_eq!(caps.vendor, "Intel");
        assert_eq!(caps.max_workgroup_size, 256);
        assert_eq!(caps.backend, "Vulkan");
    }
}
