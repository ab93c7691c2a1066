//! Run-time kernel compilation and launch description.

use std::borrow::Cow;
use wgpu::{BindGroup, Buffer, ComputePipeline, ShaderModule};

use crate::{BackendError, BackendResult, GpuContext};

/// A compiled WGSL module.
#[derive(Debug)]
pub struct Program {
    label: String,
    module: ShaderModule,
}

fn scoped<R>(ctx: &GpuContext, label: &str, f: impl FnOnce() -> R) -> BackendResult<R> {
    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(ctx.device.pop_error_scope()) {
        None => Ok(value),
        Some(err) => Err(BackendError::KernelBuild {
            label: label.to_string(),
            log: err.to_string(),
        }),
    }
}

impl Program {
    /// Compiles `source`. Validation failures come back as
    /// [`BackendError::KernelBuild`] carrying the compiler output.
    pub fn build(ctx: &GpuContext, label: &str, source: &str) -> BackendResult<Self> {
        let module = scoped(ctx, label, || {
            ctx.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
                })
        })?;
        log::info!("Built program '{}'", label);
        Ok(Self {
            label: label.to_string(),
            module,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Creates the pipeline for `entry_point` with an automatic layout.
    pub fn kernel(&self, ctx: &GpuContext, entry_point: &str) -> BackendResult<Kernel> {
        let label = format!("{}::{}", self.label, entry_point);
        let pipeline = scoped(ctx, &label, || {
            ctx.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&label),
                    layout: None,
                    module: &self.module,
                    entry_point,
                    compilation_options: Default::default(),
                    cache: None,
                })
        })?;
        Ok(Kernel {
            name: entry_point.to_string(),
            pipeline,
        })
    }
}

/// One entry point of a [`Program`], ready to launch.
#[derive(Debug)]
pub struct Kernel {
    name: String,
    pipeline: ComputePipeline,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    /// Bind group 0 with `buffers[i]` at binding `i`.
    pub fn bind(&self, ctx: &GpuContext, buffers: &[&Buffer]) -> BindGroup {
        let layout = self.pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.name),
            layout: &layout,
            entries: &entries,
        })
    }
}

/// A kernel, its arguments and the number of work-groups to run.
#[derive(Debug, Clone, Copy)]
pub struct Launch<'a> {
    pub kernel: &'a Kernel,
    pub bind_group: &'a BindGroup,
    pub workgroups: (u32, u32, u32),
}

impl<'a> Launch<'a> {
    pub fn new(kernel: &'a Kernel, bind_group: &'a BindGroup, workgroups: (u32, u32, u32)) -> Self {
        Self {
            kernel,
            bind_group,
            workgroups,
        }
    }
}

/// Work-group counts covering `items` with groups of `workgroup`.
///
/// Ranges needing more than `max_per_dim` groups spill into y; kernels
/// rebuild the flat index as `gid.y * num_workgroups.x * workgroup + gid.x`.
pub fn grid_1d(items: u32, workgroup: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = items.div_ceil(workgroup).max(1);
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        let y = groups.div_ceil(max_per_dim);
        (groups.div_ceil(y), y)
    }
}

/// Checks a work-group shape against the device limits.
pub fn validate_workgroup(ctx: &GpuContext, size: (u32, u32, u32)) -> BackendResult<()> {
    check_workgroup(&ctx.limits(), size)
}

fn check_workgroup(limits: &wgpu::Limits, (x, y, z): (u32, u32, u32)) -> BackendResult<()> {
    if x == 0 || y == 0 || z == 0 {
        return Err(BackendError::InvalidLaunch(format!(
            "work-group {}x{}x{} has a zero dimension",
            x, y, z
        )));
    }
    let dims = [
        limits.max_compute_workgroup_size_x,
        limits.max_compute_workgroup_size_y,
        limits.max_compute_workgroup_size_z,
    ];
    if x > dims[0] || y > dims[1] || z > dims[2] {
        return Err(BackendError::InvalidLaunch(format!(
            "work-group {}x{}x{} exceeds device dims {}x{}x{}",
            x, y, z, dims[0], dims[1], dims[2]
        )));
    }
    let total = u64::from(x) * u64::from(y) * u64::from(z);
    if total > u64::from(limits.max_compute_invocations_per_workgroup) {
        return Err(BackendError::InvalidLaunch(format!(
            "work-group of {} invocations exceeds device maximum {}",
            total, limits.max_compute_invocations_per_workgroup
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_fits_in_one_dimension() {
        assert_eq!(grid_1d(1024, 64, 65535), (16, 1));
        assert_eq!(grid_1d(1000, 64, 65535), (16, 1));
        assert_eq!(grid_1d(0, 64, 65535), (1, 1));
    }

    #[test]
    fn grid_spills_into_y() {
        let (x, y) = grid_1d(64 * 70_000, 64, 65535);
        assert!(x <= 65535);
        assert_eq!(y, 2);
        assert!(u64::from(x) * u64::from(y) >= 70_000);
    }

    #[test]
    fn workgroup_limits_are_enforced() {
        let limits = wgpu::Limits::default();
        assert!(check_workgroup(&limits, (16, 16, 1)).is_ok());
        assert!(check_workgroup(&limits, (256, 1, 1)).is_ok());
        assert!(check_workgroup(&limits, (32, 16, 1)).is_err());
        assert!(check_workgroup(&limits, (1, 1, 65)).is_err());
        assert!(check_workgroup(&limits, (0, 1, 1)).is_err());
    }
}
