// crates/of_compute/src/context.rs

//! 计算上下文
//!
//! 进程内唯一的设备执行上下文。嵌入式 GPU 驱动在反复创建/销毁上下文时
//! 容易崩溃，因此：
//!
//! - 同一进程同时只能存在一个 `ComputeContext`（[`ComputeContext::claim`]）；
//! - [`ComputeContext::initialize`] 幂等，已初始化时直接返回，不触碰硬件；
//! - 设备句柄按获取的逆序释放（队列、设备、适配器、实例）；
//! - [`ComputeContext::cleanup`] 是终结操作，释放后不能再初始化。
//!
//! 上下文不可复制，由计算后端独占持有，应在进程退出前一直保留。
//! 丢弃上下文会释放占用标记。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use wgpu::{
    Adapter, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BufferBindingType, ComputePipeline, ComputePipelineDescriptor, Device, DeviceDescriptor,
    DownlevelFlags, ErrorFilter, Features, Instance, InstanceDescriptor, Limits,
    PipelineCompilationOptions, PipelineLayoutDescriptor, Queue, RequestAdapterOptions,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

use of_config::{BackendConfig, PowerPreference};

use crate::capabilities::DeviceCapabilities;
use crate::error::ComputeError;
use crate::kernel::{workgroup_size_declaration, ENTRY_POINT};
use crate::params::{BINDING_PARAMS, BINDING_STATE, BINDING_TIMESERIES, BINDING_TIME_CONTROL};

/// 进程内上下文占用标记
static CONTEXT_CLAIMED: AtomicBool = AtomicBool::new(false);

/// 程序编号
static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// 已编译内核程序的编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// 已编译的内核程序
pub struct KernelProgram {
    id: ProgramId,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    workgroup_size: u32,
}

impl KernelProgram {
    /// 程序编号
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// 计算管线
    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    /// 绑定组布局
    pub fn bind_group_layout(&self) -> &BindGroupLayout {
        &self.bind_group_layout
    }

    /// 编译时使用的工作组大小
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }
}

impl std::fmt::Debug for KernelProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelProgram")
            .field("id", &self.id)
            .field("workgroup_size", &self.workgroup_size)
            .finish()
    }
}

/// 设备句柄，字段顺序即释放顺序
struct DeviceHandles {
    queue: Arc<Queue>,
    device: Arc<Device>,
    #[allow(dead_code)]
    adapter: Adapter,
    #[allow(dead_code)]
    instance: Instance,
}

/// 计算上下文
pub struct ComputeContext {
    config: BackendConfig,
    handles: Option<DeviceHandles>,
    capabilities: Option<DeviceCapabilities>,
    workgroup_size: u32,
    device_setups: usize,
    released: bool,
}

impl ComputeContext {
    /// 占用进程内唯一的上下文
    ///
    /// 已有实例存活时返回 `ContextAlreadyClaimed`。只校验配置，不触碰硬件。
    pub fn claim(config: BackendConfig) -> Result<Self, ComputeError> {
        config.validate()?;

        CONTEXT_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ComputeError::ContextAlreadyClaimed)?;

        Ok(Self {
            workgroup_size: config.workgroup_size,
            config,
            handles: None,
            capabilities: None,
            device_setups: 0,
            released: false,
        })
    }

    /// 初始化设备（幂等）
    ///
    /// `cleanup` 之后返回 `ContextReleased`。
    pub fn initialize(&mut self) -> Result<(), ComputeError> {
        if self.released {
            error!("计算上下文已释放，拒绝重新初始化");
            return Err(ComputeError::ContextReleased);
        }
        if self.handles.is_some() {
            debug!("计算上下文已初始化，跳过设备创建");
            return Ok(());
        }

        let (handles, capabilities) = pollster::block_on(Self::acquire(&self.config))
            .inspect_err(|e| error!("计算上下文初始化失败: {}", e))?;

        let clamped = capabilities.clamp_workgroup_size(self.config.workgroup_size);
        if clamped != self.config.workgroup_size {
            warn!(
                "工作组大小 {} 超出设备上限，改用 {}",
                self.config.workgroup_size, clamped
            );
        }
        self.workgroup_size = clamped;

        info!("计算上下文就绪: {}", capabilities);
        self.handles = Some(handles);
        self.capabilities = Some(capabilities);
        self.device_setups += 1;
        Ok(())
    }

    async fn acquire(
        config: &BackendConfig,
    ) -> Result<(DeviceHandles, DeviceCapabilities), ComputeError> {
        let instance = Instance::new(InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: power_preference(config.power_preference),
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or(ComputeError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            "Found compute adapter: {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(ComputeError::DeviceCreation(format!(
                "适配器 {} 不支持计算着色器",
                adapter_info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some(config.device_label.as_str()),
                    required_features: Features::empty(),
                    required_limits: required_limits(&adapter),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| ComputeError::DeviceCreation(e.to_string()))?;

        // 未捕获的设备错误只记录，不中止进程
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            error!("未捕获的设备错误: {}", e);
        }));

        let capabilities = DeviceCapabilities::from_wgpu(&adapter_info, &device.limits());

        Ok((
            DeviceHandles {
                queue: Arc::new(queue),
                device: Arc::new(device),
                adapter,
                instance,
            },
            capabilities,
        ))
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.handles.is_some()
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 硬件初始化执行次数
    pub fn device_setups(&self) -> usize {
        self.device_setups
    }

    /// 后端配置
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// 实际使用的工作组大小
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// 设备能力
    pub fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.capabilities.as_ref()
    }

    /// 设备
    pub fn device(&self) -> Result<&Arc<Device>, ComputeError> {
        self.handles
            .as_ref()
            .map(|h| &h.device)
            .ok_or(ComputeError::ContextNotInitialized)
    }

    /// 队列
    pub fn queue(&self) -> Result<&Arc<Queue>, ComputeError> {
        self.handles
            .as_ref()
            .map(|h| &h.queue)
            .ok_or(ComputeError::ContextNotInitialized)
    }

    /// 编译内核源码
    ///
    /// 着色器模块错误报告为 `Compile`，管线创建错误报告为 `Link`，
    /// 都附带驱动诊断信息。
    pub fn compile(&self, source: &str) -> Result<Arc<KernelProgram>, ComputeError> {
        let device = self.device()?;
        let id = ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed));

        let source = format!("{}{}", workgroup_size_declaration(self.workgroup_size), source);

        device.push_error_scope(ErrorFilter::Validation);
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("of_euler_kernel"),
            source: ShaderSource::Wgsl(source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            let diagnostic = err.to_string();
            error!("内核编译失败 (program {}): {}", id.0, diagnostic);
            return Err(ComputeError::Compile { diagnostic });
        }

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("of_buffer_set_layout"),
            entries: &[
                storage_entry(BINDING_STATE, false),
                storage_entry(BINDING_PARAMS, true),
                storage_entry(BINDING_TIMESERIES, false),
                storage_entry(BINDING_TIME_CONTROL, true),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("of_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("of_euler_pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(ENTRY_POINT),
            compilation_options: PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            let diagnostic = err.to_string();
            error!("管线链接失败 (program {}): {}", id.0, diagnostic);
            return Err(ComputeError::Link { diagnostic });
        }

        debug!(
            "内核程序 {} 编译完成, 工作组大小 {}",
            id.0, self.workgroup_size
        );
        Ok(Arc::new(KernelProgram {
            id,
            pipeline,
            bind_group_layout,
            workgroup_size: self.workgroup_size,
        }))
    }

    /// 释放设备资源
    ///
    /// 只应在进程结束前调用。之后 `initialize` 返回 `ContextReleased`，
    /// 重复调用无操作。
    pub fn cleanup(&mut self) {
        self.released = true;
        if let Some(handles) = self.handles.take() {
            handles.device.poll(wgpu::Maintain::Wait);
            drop(handles);
            self.capabilities = None;
            info!("计算上下文已释放");
        }
    }
}

impl Drop for ComputeContext {
    fn drop(&mut self) {
        self.cleanup();
        CONTEXT_CLAIMED.store(false, Ordering::Release);
    }
}

fn storage_entry(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn power_preference(pref: PowerPreference) -> wgpu::PowerPreference {
    match pref {
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        PowerPreference::None => wgpu::PowerPreference::None,
    }
}

/// 嵌入式设备只保证 downlevel 限制，缓冲区上限取适配器实际值
fn required_limits(adapter: &Adapter) -> Limits {
    let supported = adapter.limits();
    Limits {
        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
        max_buffer_size: supported.max_buffer_size,
        max_compute_workgroup_size_x: supported.max_compute_workgroup_size_x,
        max_compute_invocations_per_workgroup: supported.max_compute_invocations_per_workgroup,
        max_compute_workgroups_per_dimension: supported.max_compute_workgroups_per_dimension,
        ..Limits::downlevel_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_single_claim() {
        let first = ComputeContext::claim(BackendConfig::default()).unwrap();
        assert!(!first.is_initialized());
        assert_eq!(first.device_setups(), 0);

        let second = ComputeContext::claim(BackendConfig::default());
        assert!(matches!(second, Err(ComputeError::ContextAlreadyClaimed)));

        drop(first);
        assert!(ComputeContext::claim(BackendConfig::default()).is_ok());
    }

    #[test]
    #[serial]
    fn test_invalid_config_does_not_claim() {
        let bad = BackendConfig::default().with_workgroup_size(0);
        assert!(matches!(ComputeContext::claim(bad), Err(ComputeError::Config(_))));
        assert!(ComputeContext::claim(BackendConfig::default()).is_ok());
    }

    #[test]
    #[serial]
    fn test_compile_requires_initialization() {
        let ctx = ComputeContext::claim(BackendConfig::default()).unwrap();
        assert!(matches!(ctx.compile("fn main() {}"), Err(ComputeError::ContextNotInitialized)));
        assert!(ctx.device().is_err());
        assert!(ctx.queue().is_err());
    }

    #[test]
    #[serial]
    fn test_cleanup_is_terminal() {
        let mut ctx = ComputeContext::claim(BackendConfig::default()).unwrap();
        ctx.cleanup();
        ctx.cleanup();
        assert!(ctx.is_released());
        assert!(matches!(ctx.initialize(), Err(ComputeError::ContextReleased)));
        assert_eq!(ctx.device_setups(), 0);
    }

    #[test]
    fn test_power_preference_mapping() {
        assert_eq!(power_preference(PowerPreference::LowPower), wgpu::PowerPreference::LowPower);
        assert_eq!(
            power_preference(PowerPreference::HighPerformance),
            wgpu::PowerPreference::HighPerformance
        );
    }
}
