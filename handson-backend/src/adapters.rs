//! Device discovery and the printable device summary.

use std::fmt;
use wgpu::{Adapter, Backend, DeviceType};

/// What the DeviceInfo exercise prints for each device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: DeviceType,
    pub driver: String,
    pub driver_info: String,
    pub backend: Backend,
    /// Total invocations allowed in one work-group.
    pub max_workgroup_size: u32,
    pub max_workgroup_dims: [u32; 3],
    /// Work-group shared memory in bytes (OpenCL "local memory").
    pub workgroup_storage: u32,
    pub max_buffer_size: u64,
    pub max_storage_binding: u32,
    pub max_workgroups_per_dim: u32,
}

impl DeviceInfo {
    pub fn from_adapter(adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();
        Self {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            driver: info.driver,
            driver_info: info.driver_info,
            backend: info.backend,
            max_workgroup_size: limits.max_compute_invocations_per_workgroup,
            max_workgroup_dims: [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
            ],
            workgroup_storage: limits.max_compute_workgroup_storage_size,
            max_buffer_size: limits.max_buffer_size,
            max_storage_binding: limits.max_storage_buffer_binding_size,
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
        }
    }

    /// One line of the `--list` output.
    pub fn list_entry(&self, index: usize) -> String {
        format!("{:2}: {}", index, self.name)
    }
}

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [dx, dy, dz] = self.max_workgroup_dims;
        writeln!(f, "\t-------------------------")?;
        writeln!(f, "\t\tName: {}", self.name)?;
        writeln!(f, "\t\tBackend: {:?}", self.backend)?;
        writeln!(f, "\t\tType: {:?}", self.device_type)?;
        if !self.driver.is_empty() {
            writeln!(f, "\t\tDriver: {} {}", self.driver, self.driver_info)?;
        }
        writeln!(f, "\t\tVendor/Device ID: {:#06x}/{:#06x}", self.vendor, self.device)?;
        writeln!(
            f,
            "\t\tLocal Memory Size: {} KB",
            u64::from(self.workgroup_storage) / KB
        )?;
        writeln!(f, "\t\tMax Buffer Size: {} MB", self.max_buffer_size / MB)?;
        writeln!(
            f,
            "\t\tMax Storage Binding: {} MB",
            u64::from(self.max_storage_binding) / MB
        )?;
        writeln!(f, "\t\tMax. Work-groups per Dim: {}", self.max_workgroups_per_dim)?;
        writeln!(f, "\t\tMax Work-group Total Size: {}", self.max_workgroup_size)?;
        writeln!(f, "\t\tMax Work-group Dims:( {} {} {} )", dx, dy, dz)?;
        write!(f, "\t-------------------------")
    }
}

/// Every adapter on every backend, in enumeration order.
///
/// The position in this list is the index `--device` and `HANDSON_DEVICE`
/// refer to.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .map(DeviceInfo::from_adapter)
        .collect()
}

/// Text printed for `--list`.
pub fn device_list(devices: &[DeviceInfo]) -> String {
    if devices.is_empty() {
        return "No devices found.".to_string();
    }
    let mut out = String::from("\nDevices:\n");
    for (i, d) in devices.iter().enumerate() {
        out.push_str(&d.list_entry(i));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceInfo {
        DeviceInfo {
            name: "Test GPU".to_string(),
            vendor: 0x10de,
            device: 0x2204,
            device_type: DeviceType::DiscreteGpu,
            driver: String::new(),
            driver_info: String::new(),
            backend: Backend::Vulkan,
            max_workgroup_size: 256,
            max_workgroup_dims: [256, 256, 64],
            workgroup_storage: 16384,
            max_buffer_size: 256 * MB,
            max_storage_binding: 128 * MB as u32,
            max_workgroups_per_dim: 65535,
        }
    }

    #[test]
    fn list_entry_pads_index() {
        assert_eq!(sample().list_entry(3), " 3: Test GPU");
    }

    #[test]
    fn empty_device_list_message() {
        assert_eq!(device_list(&[]), "No devices found.");
    }

    #[test]
    fn display_reports_memory_in_kb_and_mb() {
        let text = sample().to_string();
        assert!(text.contains("Name: Test GPU"));
        assert!(text.contains("Local Memory Size: 16 KB"));
        assert!(text.contains("Max Buffer Size: 256 MB"));
        assert!(text.contains("Max Work-group Dims:( 256 256 64 )"));
        assert!(!text.contains("Driver:"));
    }
}
