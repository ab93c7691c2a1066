//! Matrix multiplication driver: the same product C = A * B computed by a
//! sequence of increasingly memory-aware kernels.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use handson_backend::{
    validate_workgroup, wgpu, BackendError, DeviceBuffer, GpuContext, Kernel, Launch, Program,
};

use crate::config::MatmulConfig;
use crate::kernels::{
    mmul_source, render, MMUL_BLOCKED_WGSL, MMUL_ELEMENT_WGSL, MMUL_ROW_PRIV_LOCAL_WGSL,
    MMUL_ROW_PRIV_WGSL, MMUL_ROW_WGSL,
};
use crate::matrix::{error, init_mat, seq_mat_mul_sdot, MatmulResult, A_MOD, B_MOD};
use crate::{LabError, LabResult};

const ELEMENT_TILE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatmulVariant {
    /// Host triple loop.
    Sequential,
    /// One work-item per element of C.
    Element,
    /// One work-item per row of C.
    Row,
    /// Row per work-item, A row in private memory.
    RowPrivate,
    /// Row per work-item, A row private, B column in work-group memory.
    RowPrivateLocal,
    /// Tiled through work-group memory.
    Blocked,
}

impl MatmulVariant {
    /// Every variant, in the order the driver runs them.
    pub const ALL: [MatmulVariant; 6] = [
        MatmulVariant::Sequential,
        MatmulVariant::Element,
        MatmulVariant::Row,
        MatmulVariant::RowPrivate,
        MatmulVariant::RowPrivateLocal,
        MatmulVariant::Blocked,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatmulVariant::Sequential => "seq",
            MatmulVariant::Element => "element",
            MatmulVariant::Row => "row",
            MatmulVariant::RowPrivate => "row-priv",
            MatmulVariant::RowPrivateLocal => "row-priv-local",
            MatmulVariant::Blocked => "blocked",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MatmulVariant::Sequential => "Sequential, matrix mult (dot prod)",
            MatmulVariant::Element => "Device, matrix mult, C(i,j) per work item",
            MatmulVariant::Row => "Device, matrix mult, C row per work item",
            MatmulVariant::RowPrivate => "Device, matrix mult, C row, A row in priv mem",
            MatmulVariant::RowPrivateLocal => "Device, mat mult, C row, priv A, B cols loc",
            MatmulVariant::Blocked => "Parallel matrix mult (blocked)",
        }
    }

    /// Section header printed before a variant's results.
    pub fn heading(self, order: usize) -> String {
        let place = if self == MatmulVariant::Sequential {
            " on host CPU"
        } else {
            " on device"
        };
        format!("\n===== {}, order {}{} ======\n", self.description(), order, place)
    }
}

impl fmt::Display for MatmulVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatmulVariant {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatmulVariant::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| LabError::InvalidParams(format!("unknown matmul variant '{}'", s)))
    }
}

/// A and B resident on the device, with the host reference product.
pub struct MatmulSession<'a> {
    ctx: &'a GpuContext,
    order: usize,
    a: Vec<f32>,
    b: Vec<f32>,
    reference: Vec<f32>,
    d_a: DeviceBuffer<f32>,
    d_b: DeviceBuffer<f32>,
    d_c: DeviceBuffer<f32>,
    params: wgpu::Buffer,
}

impl<'a> MatmulSession<'a> {
    pub fn new(ctx: &'a GpuContext, order: usize) -> LabResult<Self> {
        if order == 0 {
            return Err(LabError::InvalidParams("matrix order must be positive".to_string()));
        }
        let n = u32::try_from(order)
            .map_err(|_| LabError::InvalidParams(format!("matrix order {} too large", order)))?;

        let a = init_mat(order, A_MOD);
        let b = init_mat(order, B_MOD);
        let mut reference = vec![0.0f32; order * order];
        seq_mat_mul_sdot(order, &a, &b, &mut reference);

        let d_a = DeviceBuffer::from_slice(ctx, "A", &a);
        let d_b = DeviceBuffer::from_slice(ctx, "B", &b);
        let d_c = DeviceBuffer::empty(ctx, order * order);
        let params = ctx.uniform("mmul params", &[n, 0u32, 0, 0]);

        Ok(Self {
            ctx,
            order,
            a,
            b,
            reference,
            d_a,
            d_b,
            d_c,
            params,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn reference(&self) -> &[f32] {
        &self.reference
    }

    /// Runs `variant` `cfg.count` times and checks each product.
    pub fn run(&self, variant: MatmulVariant, cfg: &MatmulConfig) -> LabResult<Vec<MatmulResult>> {
        if variant == MatmulVariant::Sequential {
            return Ok(self.run_host(cfg));
        }

        let (kernel, grid) = self.build(variant, cfg)?;
        let bind_group = kernel.bind(
            self.ctx,
            &[self.d_a.buffer(), self.d_b.buffer(), self.d_c.buffer(), &self.params],
        );
        let zeros = vec![0.0f32; self.order * self.order];

        let mut results = Vec::with_capacity(cfg.count);
        for _ in 0..cfg.count {
            self.d_c.write(self.ctx, &zeros)?;
            self.ctx.finish();

            let start = Instant::now();
            self.ctx.enqueue(&[Launch::new(&kernel, &bind_group, grid)]);
            self.ctx.finish();
            let run_time = start.elapsed();

            let c = self.d_c.read(self.ctx)?;
            let result = MatmulResult::new(
                variant.name(),
                self.order,
                run_time,
                error(&c, &self.reference),
                cfg.tolerance,
            );
            log::info!(
                "{} order {}: {:?}, errsq {}",
                variant,
                self.order,
                run_time,
                result.errsq
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Every variant in [`MatmulVariant::ALL`] order. A variant the device
    /// refuses keeps its error in place; the rest still run.
    pub fn run_all(&self, cfg: &MatmulConfig) -> Vec<(MatmulVariant, LabResult<Vec<MatmulResult>>)> {
        MatmulVariant::ALL
            .into_iter()
            .map(|variant| {
                log::info!("{}", variant.heading(self.order).trim());
                let outcome = self.run(variant, cfg);
                if let Err(e) = &outcome {
                    log::warn!("{} skipped: {}", variant, e);
                }
                (variant, outcome)
            })
            .collect()
    }

    fn run_host(&self, cfg: &MatmulConfig) -> Vec<MatmulResult> {
        let mut c = vec![0.0f32; self.order * self.order];
        (0..cfg.count)
            .map(|_| {
                c.fill(0.0);
                let start = Instant::now();
                seq_mat_mul_sdot(self.order, &self.a, &self.b, &mut c);
                let run_time = start.elapsed();
                MatmulResult::new(
                    MatmulVariant::Sequential.name(),
                    self.order,
                    run_time,
                    error(&c, &self.reference),
                    cfg.tolerance,
                )
            })
            .collect()
    }

    fn build(&self, variant: MatmulVariant, cfg: &MatmulConfig) -> LabResult<(Kernel, (u32, u32, u32))> {
        let ctx = self.ctx;
        let n = self.order as u32;
        let max_groups = ctx.limits().max_compute_workgroups_per_dimension;

        let (source, grid) = match variant {
            MatmulVariant::Sequential => {
                return Err(LabError::InvalidParams(
                    "the sequential variant has no kernel".to_string(),
                ))
            }
            MatmulVariant::Element => {
                workgroup_fits(ctx, (ELEMENT_TILE, ELEMENT_TILE, 1))?;
                let g = n.div_ceil(ELEMENT_TILE);
                (mmul_source(MMUL_ELEMENT_WGSL), (g, g, 1))
            }
            MatmulVariant::Row | MatmulVariant::RowPrivate | MatmulVariant::RowPrivateLocal => {
                let wg = cfg.row_workgroup;
                workgroup_fits(ctx, (wg, 1, 1))?;
                let template = match variant {
                    MatmulVariant::Row => MMUL_ROW_WGSL,
                    MatmulVariant::RowPrivate => MMUL_ROW_PRIV_WGSL,
                    _ => {
                        column_fits(n, ctx.max_workgroup_storage())?;
                        MMUL_ROW_PRIV_LOCAL_WGSL
                    }
                };
                let groups = n.div_ceil(wg);
                if groups > max_groups {
                    return Err(LabError::InvalidParams(format!(
                        "{} work-groups of {} exceed the device limit of {}",
                        groups, wg, max_groups
                    )));
                }
                (mmul_source(&render(template, &[("WG", wg), ("N", n)])), (groups, 1, 1))
            }
            MatmulVariant::Blocked => {
                let bs = cfg.block_size;
                workgroup_fits(ctx, (bs, bs, 1))?;
                let needed = 2 * u64::from(bs) * u64::from(bs) * 4;
                if needed > u64::from(ctx.max_workgroup_storage()) {
                    return Err(LabError::InvalidParams(format!(
                        "block size {} needs {} bytes of work-group memory",
                        bs, needed
                    )));
                }
                let g = n.div_ceil(bs);
                let source = render(MMUL_BLOCKED_WGSL, &[("BS", bs), ("BS2", bs * bs)]);
                (mmul_source(&source), (g, g, 1))
            }
        };

        if grid.0 > max_groups || grid.1 > max_groups {
            return Err(LabError::InvalidParams(format!(
                "order {} needs a {}x{} grid, device limit is {} per dimension",
                n, grid.0, grid.1, max_groups
            )));
        }

        let label = format!("mmul-{}", variant.name());
        let kernel = Program::build(ctx, &label, &source)?.kernel(ctx, "mmul")?;
        log::debug!("{} grid {:?}", label, grid);
        Ok((kernel, grid))
    }
}

/// Work-group shapes the device rejects are a refusal, like any other
/// shape it cannot hold.
fn workgroup_fits(ctx: &GpuContext, size: (u32, u32, u32)) -> LabResult<()> {
    validate_workgroup(ctx, size).map_err(|e| match e {
        BackendError::InvalidLaunch(reason) => LabError::InvalidParams(reason),
        other => LabError::Backend(other),
    })
}

/// One column of B, staged in work-group memory.
fn column_fits(order: u32, available: u32) -> LabResult<()> {
    let needed = u64::from(order) * 4;
    if needed > u64::from(available) {
        return Err(LabError::InvalidParams(format!(
            "a B column of order {} needs {} bytes of work-group memory, device has {}",
            order, needed, available
        )));
    }
    Ok(())
}
