// crates/of_compute/src/backend.rs

//! 设备计算后端
//!
//! 完整的设备端 `solve(system, t0, tf, dt, y0)`：
//!
//! 1. 确保计算上下文已初始化
//! 2. 拒绝没有设备描述的系统
//! 3. 解析内核程序（缓存命中则复用，否则生成并编译）
//! 4. `n_steps = floor((tf - t0) / dt) + 1`
//! 5. 分配缓冲区会话，`y0` 转为 f32
//! 6. 填充 uniform 槽位
//! 7. 逐步调度：写 TIME_CONTROL / PARAMS，调度 `ceil(n / wg)` 个工作组
//!    （超过设备每维上限时在分配前拒绝），编码与提交在验证错误作用域内，
//!    等待设备完成后读回 STATE 并扩展为 f64
//! 8. 释放缓冲区会话；程序与上下文保留以供后续调用
//!
//! 任一步失败都在发生处记录日志，`solve` 返回空轨迹，错误不会越过设备边界。

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, trace};
use wgpu::{CommandEncoderDescriptor, ComputePassDescriptor, ErrorFilter};

use of_config::BackendConfig;
use of_foundation::OfResult;
use of_model::{
    step_count, trajectory_with_steps, DeviceInfo, ModelError, OdeSolver, OdeSystem, Trajectory,
};

use crate::buffer::DeviceBufferManager;
use crate::cache::ProgramCache;
use crate::context::{ComputeContext, KernelProgram};
use crate::error::ComputeError;
use crate::kernel::{KernelGenerator, KernelKey};
use crate::params::{resolve_uniforms, SystemParams, TimeControl};
use crate::registry::RhsRegistry;

/// 单次求解统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveStats {
    /// 时间步数（含初始点）
    pub steps: usize,
    /// 内核调度次数
    pub dispatches: usize,
    /// 每次调度的工作组数
    pub workgroups: u32,
    /// 内核程序是否来自缓存
    pub cache_hit: bool,
    /// 总耗时（毫秒）
    pub elapsed_ms: f64,
}

/// 解析后的内核程序
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    /// 缓存键
    pub key: KernelKey,
    /// 已编译程序
    pub program: Arc<KernelProgram>,
    /// uniform 名称（自定义片段为空）
    pub uniform_names: Vec<String>,
    /// 是否命中缓存
    pub cache_hit: bool,
}

/// 设备计算后端
pub struct ComputeBackend {
    context: ComputeContext,
    registry: RhsRegistry,
    generator: KernelGenerator,
    cache: ProgramCache<KernelProgram>,
    last_stats: Option<SolveStats>,
}

impl ComputeBackend {
    /// 占用计算上下文并创建后端（不触碰硬件）
    pub fn new(config: BackendConfig) -> Result<Self, ComputeError> {
        let context = ComputeContext::claim(config)?;
        Ok(Self::with_context(context))
    }

    /// 使用已有上下文
    pub fn with_context(context: ComputeContext) -> Self {
        let config = context.config();
        Self {
            registry: RhsRegistry::with_builtins(),
            generator: KernelGenerator::from_config(config),
            cache: ProgramCache::new(config.program_cache_capacity),
            last_stats: None,
            context,
        }
    }

    /// 取回上下文
    pub fn into_context(self) -> ComputeContext {
        self.context
    }

    /// 计算上下文
    pub fn context(&self) -> &ComputeContext {
        &self.context
    }

    /// 计算上下文（可变）
    pub fn context_mut(&mut self) -> &mut ComputeContext {
        &mut self.context
    }

    /// RHS 注册表
    pub fn registry(&self) -> &RhsRegistry {
        &self.registry
    }

    /// RHS 注册表（可变），用于注册新的 RHS
    ///
    /// 覆盖已有名称时，缓存中旧的程序不会自动失效，需要调用 [`Self::clear_cache`]。
    pub fn registry_mut(&mut self) -> &mut RhsRegistry {
        &mut self.registry
    }

    /// 已缓存的程序数
    pub fn cached_programs(&self) -> usize {
        self.cache.len()
    }

    /// 清空程序缓存
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// 上一次成功求解的统计
    pub fn last_stats(&self) -> Option<&SolveStats> {
        self.last_stats.as_ref()
    }

    /// 初始化上下文（幂等）
    pub fn initialize(&mut self) -> Result<(), ComputeError> {
        self.context.initialize()
    }

    /// 解析系统对应的内核程序
    pub fn program_for(&mut self, system: &OdeSystem) -> Result<ResolvedProgram, ComputeError> {
        self.context.initialize()?;
        let device = device_info(system)?;

        let (key, uniform_names) = if device.uses_builtin_rhs() {
            let definition = self.registry.get(&device.builtin_name)?;
            (
                KernelKey::Builtin(device.builtin_name.clone()),
                definition.uniform_names.clone(),
            )
        } else if !device.custom_snippet.is_empty() {
            (KernelKey::custom(&device.custom_snippet), Vec::new())
        } else {
            return Err(ComputeError::MissingRhs {
                system: system.name.clone(),
            });
        };

        let context = &self.context;
        let registry = &self.registry;
        let generator = &self.generator;
        let (program, cache_hit) = self.cache.get_or_try_insert(key.clone(), || {
            let source = if device.uses_builtin_rhs() {
                generator.generate_from_builtin(registry, &device.builtin_name)?
            } else {
                generator.generate_from_custom(&device.custom_snippet)?
            };
            context.compile(&source)
        })?;

        Ok(ResolvedProgram {
            key,
            program,
            uniform_names,
            cache_hit,
        })
    }

    /// 在设备上求解
    ///
    /// 统计信息通过 [`Self::last_stats`] 获取。
    pub fn solve_on_device(
        &mut self,
        system: &OdeSystem,
        t0: f64,
        tf: f64,
        dt: f64,
        y0: &[f64],
    ) -> Result<Trajectory, ComputeError> {
        let started = Instant::now();

        let resolved = self.program_for(system)?;

        let n_steps = step_count(t0, tf, dt)?;
        ModelError::check_dimension("y0", system.dimension, y0.len())?;
        let n_equations = y0.len();

        let uniforms = resolve_uniforms(system, &resolved.uniform_names)?;
        let initial: Vec<f32> = y0.iter().map(|&v| v as f32).collect();

        let workgroups = self
            .context
            .capabilities()
            .ok_or(ComputeError::ContextNotInitialized)?
            .dispatch_for(
                u32::try_from(n_equations).unwrap_or(u32::MAX),
                resolved.program.workgroup_size(),
            )
            .inspect_err(|e| error!("设备求解 '{}': {}", system.name, e))?;

        let mut buffers = DeviceBufferManager::new(&self.context)?;
        buffers.allocate(n_equations, n_steps, &initial)?;
        let bind_group = buffers.bind(&resolved.program)?;

        let device = self.context.device()?;
        let queue = self.context.queue()?;

        debug!(
            "设备求解 '{}': n={}, steps={}, 工作组 {}×{}",
            system.name,
            n_equations,
            n_steps,
            workgroups,
            resolved.program.workgroup_size()
        );

        let mut params = SystemParams::new(dt, t0, n_equations, uniforms);
        let mut trajectory = trajectory_with_steps(n_steps);

        for step in 0..n_steps {
            params.t_current = (t0 + step as f64 * dt) as f32;
            buffers.update_time_control(&TimeControl {
                current_step: step as i32,
                total_steps: n_steps as i32,
            })?;
            buffers.update_params(&params)?;

            device.push_error_scope(ErrorFilter::Validation);
            let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("of_step"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("of_euler_step"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(resolved.program.pipeline());
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }
            queue.submit(std::iter::once(encoder.finish()));
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                let diagnostic = err.to_string();
                error!("设备求解 '{}' 第 {} 步调度失败: {}", system.name, step, diagnostic);
                return Err(ComputeError::Dispatch { step, diagnostic });
            }

            // 等待本步写入全部完成
            device.poll(wgpu::Maintain::Wait);

            let state = buffers.read_state()?;
            trace!("step {}: {:?}", step, state);
            trajectory.push(state.into_iter().map(f64::from).collect());
        }

        buffers.cleanup();

        let stats = SolveStats {
            steps: n_steps,
            dispatches: n_steps,
            workgroups,
            cache_hit: resolved.cache_hit,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            "设备求解 '{}' 完成: {} 步, {:.2} ms, 缓存{}",
            system.name,
            stats.steps,
            stats.elapsed_ms,
            if stats.cache_hit { "命中" } else { "未命中" }
        );
        self.last_stats = Some(stats);

        Ok(trajectory)
    }
}

/// 取设备描述，缺失或仅主机时报错
fn device_info(system: &OdeSystem) -> Result<&DeviceInfo, ComputeError> {
    let device = system
        .device
        .as_ref()
        .ok_or_else(|| ComputeError::UnsupportedSystem {
            system: system.name.clone(),
        })?;
    if device.force_host_only {
        return Err(ComputeError::HostOnly {
            system: system.name.clone(),
        });
    }
    Ok(device)
}

impl OdeSolver for ComputeBackend {
    fn name(&self) -> String {
        "GPU_Explicit_Euler".to_string()
    }

    fn try_solve(
        &mut self,
        system: &OdeSystem,
        t0: f64,
        tf: f64,
        dt: f64,
        y0: &[f64],
    ) -> OfResult<Trajectory> {
        Ok(self.solve_on_device(system, t0, tf, dt, y0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn host_only_system() -> OdeSystem {
        OdeSystem::builder("decay", 1, |_t, y| vec![-y[0]])
            .initial_conditions(vec![1.0])
            .build()
            .unwrap()
    }

    #[test]
    fn test_device_info_checks() {
        let sys = host_only_system();
        assert!(matches!(
            device_info(&sys),
            Err(ComputeError::UnsupportedSystem { .. })
        ));

        let mut sys = host_only_system();
        sys.device = Some(DeviceInfo::builtin("exponential").host_only());
        assert!(matches!(device_info(&sys), Err(ComputeError::HostOnly { .. })));

        sys.device = Some(DeviceInfo::builtin("exponential"));
        assert!(device_info(&sys).is_ok());
    }

    #[test]
    #[serial]
    fn test_backend_is_exclusive() {
        let backend = ComputeBackend::new(BackendConfig::default()).unwrap();
        assert_eq!(backend.cached_programs(), 0);
        assert!(backend.last_stats().is_none());
        assert!(matches!(
            ComputeBackend::new(BackendConfig::default()),
            Err(ComputeError::ContextAlreadyClaimed)
        ));

        let context = backend.into_context();
        assert_eq!(context.device_setups(), 0);
    }

    #[test]
    #[serial]
    fn test_cache_capacity_from_config() {
        let backend = ComputeBackend::new(BackendConfig::default().with_cache_capacity(3)).unwrap();
        assert_eq!(backend.cache.capacity(), 3);
        assert_eq!(backend.registry().len(), 4);
    }
}
