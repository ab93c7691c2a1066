use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No compute adapter found")]
    NoAdapter,
    #[error("Device index {index} out of range ({available} devices available)")]
    DeviceIndexOutOfRange { index: usize, available: usize },
    #[error("Device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Failed to build program '{label}':\n{log}")]
    KernelBuild { label: String, log: String },
    #[error("Buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("Read-back channel closed before the map completed")]
    ReadbackClosed,
    #[error("Invalid launch: {0}")]
    InvalidLaunch(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
