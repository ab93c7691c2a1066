//! Numerical integration of 4/(1+x^2) over [0,1], scalar and vectorised.

use std::fmt;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use handson_backend::{grid_1d, DeviceBuffer, GpuContext, Launch, Program};

use crate::config::PiConfig;
use crate::kernels::{render, PI_BODY_SCALAR, PI_BODY_VEC4, PI_BODY_VEC8, PI_WGSL};
use crate::{LabError, LabResult};

/// Host midpoint rule.
pub fn pi_serial(num_steps: u64) -> f64 {
    if num_steps == 0 {
        return 0.0;
    }
    let step = 1.0 / num_steps as f64;
    let sum: f64 = (0..num_steps)
        .map(|i| {
            let x = (i as f64 + 0.5) * step;
            4.0 / (1.0 + x * x)
        })
        .sum();
    step * sum
}

/// Steps each work-item takes per loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorWidth {
    Scalar,
    Vec4,
    Vec8,
}

impl VectorWidth {
    pub fn lanes(self) -> u32 {
        match self {
            VectorWidth::Scalar => 1,
            VectorWidth::Vec4 => 4,
            VectorWidth::Vec8 => 8,
        }
    }

    fn body(self) -> &'static str {
        match self {
            VectorWidth::Scalar => PI_BODY_SCALAR,
            VectorWidth::Vec4 => PI_BODY_VEC4,
            VectorWidth::Vec8 => PI_BODY_VEC8,
        }
    }
}

impl TryFrom<u32> for VectorWidth {
    type Error = LabError;

    fn try_from(width: u32) -> Result<Self, Self::Error> {
        match width {
            1 => Ok(VectorWidth::Scalar),
            4 => Ok(VectorWidth::Vec4),
            8 => Ok(VectorWidth::Vec8),
            other => Err(LabError::InvalidParams(format!(
                "Invalid vector size {} (expected 1, 4 or 8)",
                other
            ))),
        }
    }
}

/// Work decomposition for one integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiPlan {
    pub width: VectorWidth,
    /// Loop iterations per work-item; each covers `width` steps.
    pub niters: u32,
    pub workgroup_size: u32,
    pub groups: u32,
    pub nsteps: u64,
    pub step_size: f32,
}

impl PiPlan {
    pub fn new(in_steps: u32, iterations: u32, width: VectorWidth, max_wg: u32) -> LabResult<Self> {
        let lanes = width.lanes();
        let niters = iterations / lanes;
        if niters == 0 {
            return Err(LabError::InvalidParams(format!(
                "{} iterations cannot be split across {} lanes",
                iterations, lanes
            )));
        }

        let per_item = u64::from(niters) * u64::from(lanes);
        let mut workgroup_size = max_wg;
        let mut groups = u64::from(in_steps) / (u64::from(workgroup_size) * per_item);
        if groups < 1 {
            groups = 1;
            workgroup_size = (u64::from(in_steps) / per_item).min(u64::from(max_wg)) as u32;
        }
        if workgroup_size == 0 {
            return Err(LabError::InvalidParams(format!(
                "{} steps is fewer than one work-item's share of {}",
                in_steps, per_item
            )));
        }

        let groups = groups as u32;
        let nsteps = u64::from(workgroup_size) * per_item * u64::from(groups);
        Ok(Self {
            width,
            niters,
            workgroup_size,
            groups,
            nsteps,
            step_size: (1.0 / nsteps as f64) as f32,
        })
    }

    /// Dispatch shape for `groups` work-groups, folded into a second
    /// dimension past `max_per_dim`.
    pub fn grid(&self, max_per_dim: u32) -> LabResult<(u32, u32)> {
        let (x, y) = grid_1d(self.groups, 1, max_per_dim);
        if y > max_per_dim {
            return Err(LabError::InvalidParams(format!(
                "{} work groups exceed a {}x{} dispatch",
                self.groups, max_per_dim, max_per_dim
            )));
        }
        Ok((x, y))
    }
}

impl fmt::Display for PiPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} work groups of size {}. {} Integration steps",
            self.groups, self.workgroup_size, self.nsteps
        )
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PiParams {
    niters: u32,
    step_size: f32,
    groups: u32,
    _pad: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PiReport {
    pub plan: PiPlan,
    pub pi: f32,
    pub run_time: Duration,
}

impl fmt::Display for PiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "The calculation ran in {:.6} seconds",
            self.run_time.as_secs_f64()
        )?;
        write!(f, "pi = {} for {} steps", self.pi, self.plan.nsteps)
    }
}

pub fn run_pi(ctx: &GpuContext, cfg: &PiConfig, width: VectorWidth) -> LabResult<PiReport> {
    let plan = PiPlan::new(cfg.in_steps, cfg.iterations, width, ctx.max_workgroup_size())?;
    log::info!("{}", plan);
    let (gx, gy) = plan.grid(ctx.limits().max_compute_workgroups_per_dimension)?;
    if gy > 1 {
        log::debug!("pi dispatch folded to {}x{} groups", gx, gy);
    }

    let wg = plan.workgroup_size;
    let source = render(
        &PI_WGSL.replace("{{BODY}}", width.body()),
        &[("WG", wg), ("WIDTH", width.lanes())],
    );
    let kernel = Program::build(ctx, "pi", &source)?.kernel(ctx, "pi")?;

    let d_partial_sums = DeviceBuffer::<f32>::empty(ctx, plan.groups as usize);
    let params = ctx.uniform(
        "pi params",
        &PiParams {
            niters: plan.niters,
            step_size: plan.step_size,
            groups: plan.groups,
            _pad: 0,
        },
    );
    let bind_group = kernel.bind(ctx, &[d_partial_sums.buffer(), &params]);

    let start = Instant::now();
    ctx.enqueue(&[Launch::new(&kernel, &bind_group, (gx, gy, 1))]);
    let partial_sums = d_partial_sums.read(ctx)?;
    // f64 accumulation: a folded dispatch can return over 65535 partials.
    let total: f64 = partial_sums.iter().copied().map(f64::from).sum();
    let pi = (total * f64::from(plan.step_size)) as f32;
    let run_time = start.elapsed();

    Ok(PiReport { plan, pi, run_time })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_converges() {
        assert!((pi_serial(100_000) - std::f64::consts::PI).abs() < 1e-8);
        assert_eq!(pi_serial(0), 0.0);
    }

    #[test]
    fn plan_with_classic_constants() {
        let plan = PiPlan::new(512 * 512 * 512, 262_144, VectorWidth::Scalar, 256).unwrap();
        assert_eq!(plan.groups, 2);
        assert_eq!(plan.workgroup_size, 256);
        assert_eq!(plan.nsteps, 134_217_728);
        assert_eq!(
            plan.to_string(),
            "2 work groups of size 256. 134217728 Integration steps"
        );
    }

    #[test]
    fn vector_width_divides_iterations() {
        let plan = PiPlan::new(512 * 512 * 512, 262_144, VectorWidth::Vec8, 256).unwrap();
        assert_eq!(plan.niters, 32_768);
        assert_eq!(plan.nsteps, 134_217_728);
    }

    #[test]
    fn small_problems_fall_back_to_one_group() {
        let plan = PiPlan::new(1 << 20, 262_144, VectorWidth::Scalar, 256).unwrap();
        assert_eq!(plan.groups, 1);
        assert_eq!(plan.workgroup_size, 4);
        assert_eq!(plan.nsteps, 1 << 20);
    }

    #[test]
    fn too_few_steps_is_an_error() {
        assert!(PiPlan::new(1000, 262_144, VectorWidth::Scalar, 256).is_err());
        assert!(PiPlan::new(1 << 20, 2, VectorWidth::Vec4, 256).is_err());
    }

    #[test]
    fn many_groups_fold_into_two_dimensions() {
        // Four steps per work-item leaves 2^17 groups of 256.
        let plan = PiPlan::new(1 << 27, 4, VectorWidth::Scalar, 256).unwrap();
        assert_eq!(plan.groups, 131_072);
        assert_eq!(plan.nsteps, 1 << 27);

        let (x, y) = plan.grid(65535).unwrap();
        assert!(x <= 65535);
        assert_eq!(y, 3);
        assert!(u64::from(x) * u64::from(y) >= u64::from(plan.groups));

        assert_eq!(plan.grid(1 << 20).unwrap(), (131_072, 1));
    }

    #[test]
    fn grid_beyond_two_dimensions_is_refused() {
        let plan = PiPlan::new(1 << 27, 4, VectorWidth::Scalar, 256).unwrap();
        assert!(matches!(plan.grid(256), Err(LabError::InvalidParams(_))));
    }

    #[test]
    fn only_three_widths() {
        assert_eq!(VectorWidth::try_from(4).unwrap(), VectorWidth::Vec4);
        let err = VectorWidth::try_from(2).unwrap_err();
        assert!(err.to_string().contains("Invalid vector size"));
    }
}
