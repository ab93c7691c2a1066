//! Exercise configuration.
//!
//! Every value defaults to the constant the classic exercises hard-code, so
//! an empty JSON object (or no file at all) reproduces them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::LabResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub device: DeviceConfig,
    pub vadd: VaddConfig,
    pub matmul: MatmulConfig,
    pub pi: PiConfig,
}

impl LabConfig {
    pub fn from_file(path: &Path) -> LabResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    Low,
    #[default]
    High,
}

impl From<PowerPreference> for handson_backend::wgpu::PowerPreference {
    fn from(p: PowerPreference) -> Self {
        match p {
            PowerPreference::Low => Self::LowPower,
            PowerPreference::High => Self::HighPerformance,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Position in the device list; `None` lets the runtime choose.
    pub index: Option<usize>,
    pub power_preference: PowerPreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaddConfig {
    pub length: usize,
    pub tolerance: f32,
}

impl Default for VaddConfig {
    fn default() -> Self {
        Self {
            length: 1024,
            tolerance: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatmulConfig {
    /// Order of the square matrices.
    pub order: usize,
    /// Number of times each variant is run.
    pub count: usize,
    pub tolerance: f32,
    /// Edge of the square tile used by the blocked kernel.
    pub block_size: u32,
    /// 1-D work-group size for the row-per-work-item kernels.
    pub row_workgroup: u32,
}

impl Default for MatmulConfig {
    fn default() -> Self {
        Self {
            order: 1024,
            count: 1,
            tolerance: 0.001,
            block_size: 16,
            row_workgroup: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiConfig {
    /// Requested number of integration steps; the plan rounds it down.
    pub in_steps: u32,
    /// Scalar steps handled by each work-item.
    pub iterations: u32,
}

impl Default for PiConfig {
    fn default() -> Self {
        Self {
            in_steps: 512 * 512 * 512,
            iterations: 262_144,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_classic_constants() {
        let cfg: LabConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, LabConfig::default());
        assert_eq!(cfg.vadd.length, 1024);
        assert_eq!(cfg.matmul.order, 1024);
        assert_eq!(cfg.matmul.block_size, 16);
        assert_eq!(cfg.pi.in_steps, 134_217_728);
        assert_eq!(cfg.pi.iterations, 262_144);
        assert_eq!(cfg.device.index, None);
        assert_eq!(cfg.device.power_preference, PowerPreference::High);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{ "matmul": { "order": 256 }, "device": { "index": 1, "power_preference": "low" } }"#;
        let cfg: LabConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.matmul.order, 256);
        assert_eq!(cfg.matmul.count, 1);
        assert_eq!(cfg.device.index, Some(1));
        assert_eq!(cfg.device.power_preference, PowerPreference::Low);
        assert_eq!(cfg.vadd, VaddConfig::default());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        std::fs::write(&path, r#"{ "vadd": { "length": 4096 } }"#).unwrap();
        let cfg = LabConfig::from_file(&path).unwrap();
        assert_eq!(cfg.vadd.length, 4096);
    }
}
