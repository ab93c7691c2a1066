//! Vector addition exercises: c = a + b, a chain of three adds, and a
//! three-input add.

use std::fmt;

use handson_backend::{grid_1d, DeviceBuffer, GpuContext, Kernel, Launch, Program};
use rand::Rng;

use crate::config::VaddConfig;
use crate::kernels::{VADD3_WGSL, VADD_WGSL, VADD_WORKGROUP};
use crate::{LabError, LabResult};

/// Outcome of one vector-add exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaddReport {
    pub label: String,
    pub correct: usize,
    pub total: usize,
}

impl VaddReport {
    pub fn is_success(&self) -> bool {
        self.correct == self.total
    }
}

impl fmt::Display for VaddReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} out of {} results were correct.",
            self.label, self.correct, self.total
        )
    }
}

/// Counts elements with `(expected - actual)^2 < tol^2`, logging the rest.
pub fn count_correct(expected: &[f32], actual: &[f32], tol: f32) -> usize {
    let mut correct = 0;
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        let diff = e - a;
        if diff * diff < tol * tol {
            correct += 1;
        } else {
            log::warn!("element {}: expected {} got {} (diff {})", i, e, a, diff);
        }
    }
    correct
}

pub fn random_vector(len: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen::<f32>()).collect()
}

fn check_lengths(vectors: &[&[f32]]) -> LabResult<usize> {
    let len = vectors.first().map_or(0, |v| v.len());
    if vectors.iter().any(|v| v.len() != len) {
        return Err(LabError::InvalidParams(
            "vector lengths differ".to_string(),
        ));
    }
    u32::try_from(len)
        .map_err(|_| LabError::InvalidParams(format!("vector length {} too large", len)))?;
    Ok(len)
}

fn count_uniform(ctx: &GpuContext, len: usize) -> handson_backend::wgpu::Buffer {
    ctx.uniform("vadd params", &[len as u32, 0, 0, 0])
}

fn workgroups(ctx: &GpuContext, len: usize) -> (u32, u32, u32) {
    let max = ctx.limits().max_compute_workgroups_per_dimension;
    let (x, y) = grid_1d(len as u32, VADD_WORKGROUP, max);
    (x, y, 1)
}

fn vadd_kernel(ctx: &GpuContext) -> LabResult<Kernel> {
    Ok(Program::build(ctx, "vadd", VADD_WGSL)?.kernel(ctx, "vadd")?)
}

/// c = a + b on the device.
pub fn add_vectors(ctx: &GpuContext, a: &[f32], b: &[f32]) -> LabResult<Vec<f32>> {
    let len = check_lengths(&[a, b])?;
    let kernel = vadd_kernel(ctx)?;

    let d_a = DeviceBuffer::from_slice(ctx, "a", a);
    let d_b = DeviceBuffer::from_slice(ctx, "b", b);
    let d_c = DeviceBuffer::<f32>::empty(ctx, len);
    let params = count_uniform(ctx, len);

    let bg = kernel.bind(ctx, &[d_a.buffer(), d_b.buffer(), d_c.buffer(), &params]);
    ctx.enqueue(&[Launch::new(&kernel, &bg, workgroups(ctx, len))]);
    Ok(d_c.read(ctx)?)
}

/// C = A + B, D = E + C, F = G + D, submitted together; returns F.
pub fn add_chain(
    ctx: &GpuContext,
    a: &[f32],
    b: &[f32],
    e: &[f32],
    g: &[f32],
) -> LabResult<Vec<f32>> {
    let len = check_lengths(&[a, b, e, g])?;
    let kernel = vadd_kernel(ctx)?;

    let d_a = DeviceBuffer::from_slice(ctx, "a", a);
    let d_b = DeviceBuffer::from_slice(ctx, "b", b);
    let d_e = DeviceBuffer::from_slice(ctx, "e", e);
    let d_g = DeviceBuffer::from_slice(ctx, "g", g);
    let d_c = DeviceBuffer::<f32>::empty(ctx, len);
    let d_d = DeviceBuffer::<f32>::empty(ctx, len);
    let d_f = DeviceBuffer::<f32>::empty(ctx, len);
    let params = count_uniform(ctx, len);

    let first = kernel.bind(ctx, &[d_a.buffer(), d_b.buffer(), d_c.buffer(), &params]);
    let second = kernel.bind(ctx, &[d_e.buffer(), d_c.buffer(), d_d.buffer(), &params]);
    let third = kernel.bind(ctx, &[d_g.buffer(), d_d.buffer(), d_f.buffer(), &params]);
    let grid = workgroups(ctx, len);
    ctx.enqueue(&[
        Launch::new(&kernel, &first, grid),
        Launch::new(&kernel, &second, grid),
        Launch::new(&kernel, &third, grid),
    ]);
    Ok(d_f.read(ctx)?)
}

/// r = a + b + c with a single three-input kernel.
pub fn add_three(ctx: &GpuContext, a: &[f32], b: &[f32], c: &[f32]) -> LabResult<Vec<f32>> {
    let len = check_lengths(&[a, b, c])?;
    let kernel = Program::build(ctx, "vadd_abc", VADD3_WGSL)?.kernel(ctx, "vadd")?;

    let d_a = DeviceBuffer::from_slice(ctx, "a", a);
    let d_b = DeviceBuffer::from_slice(ctx, "b", b);
    let d_c = DeviceBuffer::from_slice(ctx, "c", c);
    let d_r = DeviceBuffer::<f32>::empty(ctx, len);
    let params = count_uniform(ctx, len);

    let bg = kernel.bind(
        ctx,
        &[d_a.buffer(), d_b.buffer(), d_c.buffer(), d_r.buffer(), &params],
    );
    ctx.enqueue(&[Launch::new(&kernel, &bg, workgroups(ctx, len))]);
    Ok(d_r.read(ctx)?)
}

pub fn vadd(ctx: &GpuContext, cfg: &VaddConfig) -> LabResult<VaddReport> {
    let a = random_vector(cfg.length);
    let b = random_vector(cfg.length);
    let c = add_vectors(ctx, &a, &b)?;

    let expected: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
    Ok(VaddReport {
        label: "C = A+B".to_string(),
        correct: count_correct(&expected, &c, cfg.tolerance),
        total: cfg.length,
    })
}

pub fn vadd_chain(ctx: &GpuContext, cfg: &VaddConfig) -> LabResult<VaddReport> {
    let a = random_vector(cfg.length);
    let b = random_vector(cfg.length);
    let e = random_vector(cfg.length);
    let g = random_vector(cfg.length);
    let f = add_chain(ctx, &a, &b, &e, &g)?;

    let expected: Vec<f32> = (0..cfg.length).map(|i| a[i] + b[i] + e[i] + g[i]).collect();
    Ok(VaddReport {
        label: "3 vector adds to find F = A+B+E+G".to_string(),
        correct: count_correct(&expected, &f, cfg.tolerance),
        total: cfg.length,
    })
}

pub fn vadd_abc(ctx: &GpuContext, cfg: &VaddConfig) -> LabResult<VaddReport> {
    let a = random_vector(cfg.length);
    let b = random_vector(cfg.length);
    let c = random_vector(cfg.length);
    let r = add_three(ctx, &a, &b, &c)?;

    let expected: Vec<f32> = (0..cfg.length).map(|i| a[i] + b[i] + c[i]).collect();
    Ok(VaddReport {
        label: "1 vector adds to find R = A+B+C".to_string(),
        correct: count_correct(&expected, &r, cfg.tolerance),
        total: cfg.length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_squared_comparison() {
        let expected = [1.0, 2.0, 3.0, 4.0];
        let actual = [1.0005, 2.0, 3.002, 3.0];
        assert_eq!(count_correct(&expected, &actual, 0.001), 2);
    }

    #[test]
    fn report_display_matches_classic_output() {
        let report = VaddReport {
            label: "C = A+B".to_string(),
            correct: 1024,
            total: 1024,
        };
        assert_eq!(
            report.to_string(),
            "C = A+B: 1024 out of 1024 results were correct."
        );
        assert!(report.is_success());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let a = [1.0; 4];
        let b = [1.0; 3];
        assert!(matches!(
            check_lengths(&[&a, &b]),
            Err(LabError::InvalidParams(_))
        ));
        assert_eq!(check_lengths(&[&a, &a]).unwrap(), 4);
    }

    #[test]
    fn random_vector_is_unit_interval() {
        let v = random_vector(256);
        assert_eq!(v.len(), 256);
        assert!(v.iter().all(|x| (0.0..1.0).contains(x)));
    }
}
