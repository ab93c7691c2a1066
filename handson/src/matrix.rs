//! Host-side matrix helpers for the multiplication driver.
//!
//! Matrices are square, order `n`, stored row-major in flat slices.

use std::fmt;
use std::time::Duration;

/// Seed used for A in [`init_mat`].
pub const A_MOD: u32 = 7;
/// Seed used for B in [`init_mat`].
pub const B_MOD: u32 = 11;

/// `n*n` values cycling `0, 1, .., m-1`. Small integers keep every
/// product exactly representable, so device and host agree bit for bit.
pub fn init_mat(n: usize, m: u32) -> Vec<f32> {
    (0..n * n).map(|i| (i as u32 % m) as f32).collect()
}

/// Reference product, dot-product form.
pub fn seq_mat_mul_sdot(n: usize, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..n {
        for j in 0..n {
            let mut tmp = 0.0f32;
            for k in 0..n {
                tmp += a[i * n + k] * b[k * n + j];
            }
            c[i * n + j] = tmp;
        }
    }
}

pub fn zero_mat(c: &mut [f32]) {
    c.fill(0.0);
}

/// Transpose of `b`.
pub fn trans(n: usize, b: &[f32]) -> Vec<f32> {
    let mut bt = vec![0.0f32; n * n];
    for i in 0..n {
        for j in 0..n {
            bt[j * n + i] = b[i * n + j];
        }
    }
    bt
}

/// Sum of squared differences.
pub fn error(c1: &[f32], c2: &[f32]) -> f32 {
    c1.iter()
        .zip(c2)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Timing and accuracy of one multiplication.
#[derive(Debug, Clone, PartialEq)]
pub struct MatmulResult {
    pub variant: String,
    pub order: usize,
    pub run_time: Duration,
    pub mflops: f64,
    pub errsq: f32,
    pub tolerance: f32,
}

impl MatmulResult {
    pub fn new(variant: &str, order: usize, run_time: Duration, errsq: f32, tolerance: f32) -> Self {
        Self {
            variant: variant.to_string(),
            order,
            run_time,
            mflops: mflops(order, run_time),
            errsq,
            tolerance,
        }
    }

    pub fn is_ok(&self) -> bool {
        !self.errsq.is_nan() && self.errsq <= self.tolerance
    }
}

/// `2 n^3` floating point operations over the run time.
pub fn mflops(n: usize, run_time: Duration) -> f64 {
    let secs = run_time.as_secs_f64();
    if secs == 0.0 {
        return f64::INFINITY;
    }
    let n = n as f64;
    2.0 * n * n * n / (1_000_000.0 * secs)
}

impl fmt::Display for MatmulResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " {:.2} seconds at {:.1} MFLOPS",
            self.run_time.as_secs_f64(),
            self.mflops
        )?;
        if !self.is_ok() {
            write!(f, "\n\n Errors in multiplication: {}", self.errsq)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_mat_cycles_modulo() {
        let a = init_mat(3, A_MOD);
        assert_eq!(a, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 1.0]);
    }

    #[test]
    fn product_with_identity_is_unchanged() {
        let n = 4;
        let a = init_mat(n, B_MOD);
        let mut id = vec![0.0; n * n];
        for i in 0..n {
            id[i * n + i] = 1.0;
        }
        let mut c = vec![0.0; n * n];
        seq_mat_mul_sdot(n, &a, &id, &mut c);
        assert_eq!(c, a);
        assert_eq!(error(&a, &c), 0.0);
    }

    #[test]
    fn small_product_by_hand() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0; 4];
        seq_mat_mul_sdot(2, &a, &b, &mut c);
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
        zero_mat(&mut c);
        assert_eq!(c, [0.0; 4]);
    }

    #[test]
    fn transpose_twice_is_identity() {
        let b = init_mat(5, B_MOD);
        let bt = trans(5, &b);
        assert_eq!(bt[1], b[5]);
        assert_eq!(trans(5, &bt), b);
    }

    #[test]
    fn error_is_sum_of_squares() {
        assert_eq!(error(&[1.0, 2.0, 3.0], &[1.0, 0.0, 6.0]), 13.0);
    }

    #[test]
    fn mflops_and_display() {
        let r = MatmulResult::new("blocked", 100, Duration::from_millis(500), 0.0, 0.001);
        assert!((r.mflops - 4.0).abs() < 1e-9);
        assert!(r.is_ok());
        assert_eq!(r.to_string(), " 0.50 seconds at 4.0 MFLOPS");
    }

    #[test]
    fn nan_error_is_a_failure() {
        let r = MatmulResult::new("row", 8, Duration::from_millis(1), f32::NAN, 0.001);
        assert!(!r.is_ok());
        assert!(r.to_string().contains("Errors in multiplication"));
        let r = MatmulResult::new("row", 8, Duration::from_millis(1), 0.5, 0.001);
        assert!(!r.is_ok());
    }
}
