// crates/of_compute/src/buffer.rs

//! 设备缓冲区管理
//!
//! 一次求解会话持有一组缓冲区：
//!
//! | 绑定 | 缓冲区 | 大小 |
//! |------|--------|------|
//! | 0 | STATE | `n` × f32 |
//! | 1 | PARAMS | [`SystemParams`] |
//! | 2 | TIMESERIES | `n × n_steps` × f32，仅 `n_steps > 1` 时分配，否则为 16 字节占位 |
//! | 3 | TIME_CONTROL | [`TimeControl`] |
//!
//! 缓冲区大小在会话内固定；再次 `allocate` 会先释放旧的集合。

use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, Buffer, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, Device, ErrorFilter, Limits, Queue,
};

use crate::context::{ComputeContext, KernelProgram};
use crate::error::ComputeError;
use crate::params::{
    SystemParams, TimeControl, BINDING_PARAMS, BINDING_STATE, BINDING_TIMESERIES,
    BINDING_TIME_CONTROL,
};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// 时间序列占位缓冲区大小
const PLACEHOLDER_BYTES: u64 = 16;

/// 时间序列槽位
enum SeriesBuffer {
    /// 记录每步状态
    Recorded(Buffer),
    /// 单步会话的占位缓冲区，内核不会写入
    Placeholder(Buffer),
}

impl SeriesBuffer {
    fn buffer(&self) -> &Buffer {
        match self {
            Self::Recorded(b) | Self::Placeholder(b) => b,
        }
    }
}

/// 一次会话的缓冲区集合
struct DeviceBufferSet {
    state: Buffer,
    params: Buffer,
    timeseries: SeriesBuffer,
    time_control: Buffer,
    n_equations: usize,
    n_steps: usize,
    total_bytes: u64,
}

impl DeviceBufferSet {
    fn destroy(self) {
        self.state.destroy();
        self.params.destroy();
        self.timeseries.buffer().destroy();
        self.time_control.destroy();
    }
}

/// 设备缓冲区管理器
pub struct DeviceBufferManager {
    device: Arc<Device>,
    queue: Arc<Queue>,
    limits: Limits,
    set: Option<DeviceBufferSet>,
}

impl DeviceBufferManager {
    /// 从已初始化的上下文创建
    pub fn new(context: &ComputeContext) -> Result<Self, ComputeError> {
        let device = Arc::clone(context.device()?);
        let queue = Arc::clone(context.queue()?);
        let limits = device.limits();
        Ok(Self {
            device,
            queue,
            limits,
            set: None,
        })
    }

    /// 分配缓冲区集合
    ///
    /// 任一缓冲区失败时，本次已创建的缓冲区随作用域一起释放，不留下部分集合。
    pub fn allocate(
        &mut self,
        n_equations: usize,
        n_steps: usize,
        initial_state: &[f32],
    ) -> Result<(), ComputeError> {
        self.cleanup();

        if n_equations == 0 || n_steps == 0 {
            return Err(ComputeError::BufferAllocation {
                label: "of_state",
                reason: format!("无效的尺寸: n_equations={}, n_steps={}", n_equations, n_steps),
            });
        }
        if initial_state.len() != n_equations {
            return Err(ComputeError::BufferAllocation {
                label: "of_state",
                reason: format!(
                    "初始状态长度 {} 与方程数 {} 不符",
                    initial_state.len(),
                    n_equations
                ),
            });
        }
        if i32::try_from(n_equations).is_err() || i32::try_from(n_steps).is_err() {
            return Err(ComputeError::BufferTooLarge {
                label: "of_time_control",
                requested: n_equations.max(n_steps) as u64,
                limit: i32::MAX as u64,
            });
        }

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
        let read_only = BufferUsages::STORAGE | BufferUsages::COPY_DST;

        let state_bytes = n_equations as u64 * F32_BYTES;
        self.check_size("of_state", state_bytes)?;
        let state = self.create_buffer("of_state", state_bytes, storage, Some(bytemuck::cast_slice(initial_state)))?;

        let params_bytes = std::mem::size_of::<SystemParams>() as u64;
        let params = self.create_buffer("of_params", params_bytes, read_only, None)?;

        let timeseries = if n_steps > 1 {
            let bytes = (n_equations as u64)
                .checked_mul(n_steps as u64)
                .and_then(|v| v.checked_mul(F32_BYTES))
                .unwrap_or(u64::MAX);
            self.check_size("of_timeseries", bytes)?;
            SeriesBuffer::Recorded(self.create_buffer("of_timeseries", bytes, storage, None)?)
        } else {
            SeriesBuffer::Placeholder(self.create_buffer(
                "of_timeseries_placeholder",
                PLACEHOLDER_BYTES,
                storage,
                None,
            )?)
        };

        let time_bytes = std::mem::size_of::<TimeControl>() as u64;
        let time_control = self.create_buffer("of_time_control", time_bytes, read_only, None)?;

        let total_bytes = state.size() + params.size() + timeseries.buffer().size() + time_control.size();
        log::debug!(
            "缓冲区集合已分配: n={}, steps={}, {} 字节",
            n_equations,
            n_steps,
            total_bytes
        );

        self.set = Some(DeviceBufferSet {
            state,
            params,
            timeseries,
            time_control,
            n_equations,
            n_steps,
            total_bytes,
        });
        Ok(())
    }

    fn check_size(&self, label: &'static str, bytes: u64) -> Result<(), ComputeError> {
        let limit = u64::from(self.limits.max_storage_buffer_binding_size).min(self.limits.max_buffer_size);
        if bytes > limit {
            log::error!("缓冲区 {} 需要 {} 字节, 超出设备上限 {}", label, bytes, limit);
            return Err(ComputeError::BufferTooLarge {
                label,
                requested: bytes,
                limit,
            });
        }
        Ok(())
    }

    /// 在错误作用域内创建缓冲区，验证错误与内存不足都报告为 `BufferAllocation`
    fn create_buffer(
        &self,
        label: &'static str,
        size: u64,
        usage: BufferUsages,
        contents: Option<&[u8]>,
    ) -> Result<Buffer, ComputeError> {
        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.device.push_error_scope(ErrorFilter::Validation);

        let buffer = match contents {
            Some(contents) => self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            }),
            None => self.device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            None => Ok(buffer),
            Some(err) => {
                buffer.destroy();
                log::error!("缓冲区 {} 分配失败: {}", label, err);
                Err(ComputeError::BufferAllocation {
                    label,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// 按固定绑定约定创建绑定组
    pub fn bind(&self, program: &KernelProgram) -> Result<BindGroup, ComputeError> {
        let set = self.set.as_ref().ok_or(ComputeError::NotAllocated)?;
        Ok(self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("of_buffer_set"),
            layout: program.bind_group_layout(),
            entries: &[
                BindGroupEntry {
                    binding: BINDING_STATE,
                    resource: set.state.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: BINDING_PARAMS,
                    resource: set.params.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: BINDING_TIMESERIES,
                    resource: set.timeseries.buffer().as_entire_binding(),
                },
                BindGroupEntry {
                    binding: BINDING_TIME_CONTROL,
                    resource: set.time_control.as_entire_binding(),
                },
            ],
        }))
    }

    /// 写入 PARAMS
    pub fn update_params(&self, params: &SystemParams) -> Result<(), ComputeError> {
        let set = self.set.as_ref().ok_or(ComputeError::NotAllocated)?;
        self.queue.write_buffer(&set.params, 0, bytemuck::bytes_of(params));
        Ok(())
    }

    /// 写入 TIME_CONTROL
    pub fn update_time_control(&self, control: &TimeControl) -> Result<(), ComputeError> {
        let set = self.set.as_ref().ok_or(ComputeError::NotAllocated)?;
        self.queue.write_buffer(&set.time_control, 0, bytemuck::bytes_of(control));
        Ok(())
    }

    /// 读回 STATE，未分配时返回空向量
    pub fn read_state(&self) -> Result<Vec<f32>, ComputeError> {
        match &self.set {
            None => Ok(Vec::new()),
            Some(set) => self.read_buffer(&set.state, set.n_equations),
        }
    }

    /// 读回 TIMESERIES 的前 `n_equations × n_steps` 个值（行优先，`step * n + i`）
    ///
    /// 未分配或会话不记录时间序列时返回空向量；请求超过已分配大小时截断。
    pub fn read_timeseries(&self, n_equations: usize, n_steps: usize) -> Result<Vec<f32>, ComputeError> {
        match &self.set {
            Some(DeviceBufferSet {
                timeseries: SeriesBuffer::Recorded(buffer),
                n_equations: n,
                n_steps: steps,
                ..
            }) => {
                let count = n_equations.saturating_mul(n_steps).min(n * steps);
                self.read_buffer(buffer, count)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// 拷贝到暂存缓冲区后映射读取
    fn read_buffer(&self, source: &Buffer, count: usize) -> Result<Vec<f32>, ComputeError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = count as u64 * F32_BYTES;
        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("of_staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("of_readback"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| ComputeError::BufferMap(e.to_string()))?
            .map_err(|e| ComputeError::BufferMap(e.to_string()))?;

        let data = slice.get_mapped_range();
        let values: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        staging.destroy();

        Ok(values)
    }

    /// 释放缓冲区集合（幂等）
    pub fn cleanup(&mut self) {
        if let Some(set) = self.set.take() {
            log::trace!("释放缓冲区集合: {} 字节", set.total_bytes);
            set.destroy();
        }
    }

    /// 是否已分配
    pub fn is_allocated(&self) -> bool {
        self.set.is_some()
    }

    /// 方程数（未分配时为 0）
    pub fn n_equations(&self) -> usize {
        self.set.as_ref().map_or(0, |s| s.n_equations)
    }

    /// 步数（未分配时为 0）
    pub fn n_steps(&self) -> usize {
        self.set.as_ref().map_or(0, |s| s.n_steps)
    }

    /// 是否记录时间序列
    pub fn records_timeseries(&self) -> bool {
        matches!(
            self.set,
            Some(DeviceBufferSet {
                timeseries: SeriesBuffer::Recorded(_),
                ..
            })
        )
    }

    /// 已分配的设备内存（字节）
    pub fn total_bytes(&self) -> u64 {
        self.set.as_ref().map_or(0, |s| s.total_bytes)
    }
}

impl Drop for DeviceBufferManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
