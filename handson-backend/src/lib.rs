//! wgpu backend for the handson exercises.
//!
//! Owns the pieces every exercise repeats: finding an adapter, opening a
//! device and queue, moving typed data in and out of storage buffers,
//! building WGSL programs at run time and launching their kernels.

use std::sync::Arc;
use wgpu::{util::DeviceExt, Adapter, Device, Instance, Queue};

pub use wgpu; // Re-export wgpu for downstream crates

pub mod adapters;
pub mod buffer;
pub mod error;
pub mod kernel;
pub mod pool;

pub use adapters::{device_list, enumerate_devices, DeviceInfo};
pub use buffer::DeviceBuffer;
pub use error::{BackendError, BackendResult};
pub use kernel::{grid_1d, validate_workgroup, Kernel, Launch, Program};
use pool::BufferPool;

/// Environment variable consulted for a device index when none is given.
pub const DEVICE_ENV: &str = "HANDSON_DEVICE";

/// How to pick the adapter a context runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelector {
    pub index: Option<usize>,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            index: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl DeviceSelector {
    /// Selector seeded from `HANDSON_DEVICE`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let index = match std::env::var(DEVICE_ENV) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(i) => Some(i),
                Err(_) => {
                    log::warn!("Ignoring {}={:?}: not a device index", DEVICE_ENV, raw);
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: Option<usize>) -> Self {
        if index.is_some() {
            self.index = index;
        }
        self
    }

    pub fn with_power_preference(mut self, pref: wgpu::PowerPreference) -> Self {
        self.power_preference = pref;
        self
    }
}

/// An opened compute device: adapter, device, queue and a buffer pool.
#[derive(Debug)]
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub pool: Arc<BufferPool>,
}

impl GpuContext {
    /// Blocking wrapper over [`GpuContext::new_async`].
    pub fn new(selector: &DeviceSelector) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(selector))
    }

    pub async fn new_async(selector: &DeviceSelector) -> BackendResult<Self> {
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match selector.index {
            Some(index) => {
                let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
                let available = adapters.len();
                if index >= available {
                    return Err(BackendError::DeviceIndexOutOfRange { index, available });
                }
                adapters.swap_remove(index)
            }
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: selector.power_preference,
                    force_fallback_adapter: false,
                    compatible_surface: None,
                })
                .await
                .ok_or(BackendError::NoAdapter)?,
        };

        // Ask for everything the adapter offers so work-group sizes can go
        // up to the hardware maximum.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Handson Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let pool = Arc::new(BufferPool::new(
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        ));

        let ctx = Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            pool,
        };
        log::info!("Using device: {}", ctx.adapter_info());
        Ok(ctx)
    }

    pub fn adapter_info(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_adapter(&self.adapter)
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Largest 1-D work-group the device accepts.
    pub fn max_workgroup_size(&self) -> u32 {
        let limits = self.limits();
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
    }

    /// Bytes of work-group (local) memory available to one work-group.
    pub fn max_workgroup_storage(&self) -> u32 {
        self.limits().max_compute_workgroup_storage_size
    }

    /// Uniform buffer initialised with `value`.
    pub fn uniform<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Records every launch into a single compute pass and submits it.
    pub fn enqueue(&self, launches: &[Launch<'_>]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Handson Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Handson Pass"),
                timestamp_writes: None,
            });
            for launch in launches {
                let (x, y, z) = launch.workgroups;
                log::debug!(
                    "launch {} over {}x{}x{} work-groups",
                    launch.kernel.name(),
                    x,
                    y,
                    z
                );
                pass.set_pipeline(launch.kernel.pipeline());
                pass.set_bind_group(0, launch.bind_group, &[]);
                pass.dispatch_workgroups(x, y, z);
            }
        }
        self.queue.submit(Some(encoder.finish()));
    }

    /// Blocks until all submitted work has completed.
    pub fn finish(&self) {
        self.queue.submit([]);
        self.device.poll(wgpu::Maintain::Wait);
    }
}
