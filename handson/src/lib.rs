//! # handson - GPU compute exercises
//!
//! A set of small, self-checking compute programs built on
//! [`handson_backend`]. Each exercise opens a device, builds a WGSL program,
//! moves data to the GPU, launches work and compares the result with a host
//! reference.
//!
//! - [`vadd`]: `C = A + B`, a chain of three adds, and a three-input add
//! - [`matmul`]: dense matrix multiply, from one work-item per element up to
//!   a tiled kernel using work-group memory
//! - [`pi`]: midpoint-rule integration with scalar or vector work-items
//! - [`life`]: Conway's Game of Life on a wrapping board
//! - [`errcode`]: error-name lookup tables generated from a C header
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handson::{open_context, vadd, LabConfig};
//! use handson_backend::DeviceSelector;
//!
//! let ctx = open_context(&DeviceSelector::from_env())?;
//! let report = vadd::vadd(&ctx, &LabConfig::default().vadd)?;
//! println!("{}", report);
//! # Ok::<(), handson::LabError>(())
//! ```

pub mod config;
pub mod errcode;
pub mod error;
pub mod kernels;
pub mod life;
pub mod matmul;
pub mod matrix;
pub mod pi;
pub mod vadd;

pub use config::LabConfig;
pub use error::{LabError, LabResult};

use handson_backend::{DeviceSelector, GpuContext};

/// Opens a context and logs the limits the exercises size themselves by.
pub fn open_context(selector: &DeviceSelector) -> LabResult<GpuContext> {
    let ctx = GpuContext::new(selector)?;
    log::debug!(
        "max work-group size {}, work-group storage {} bytes",
        ctx.max_workgroup_size(),
        ctx.max_workgroup_storage()
    );
    Ok(ctx)
}

/// Device selector from a config section, before command-line or
/// environment overrides are applied.
pub fn selector_from_config(cfg: &config::DeviceConfig) -> DeviceSelector {
    DeviceSelector::default()
        .with_power_preference(cfg.power_preference.into())
        .with_index(cfg.index)
}
