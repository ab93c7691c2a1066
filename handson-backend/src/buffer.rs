use std::marker::PhantomData;
use std::sync::Arc;
use wgpu::{util::DeviceExt, Buffer};

use crate::pool::BufferPool;
use crate::{BackendError, BackendResult, GpuContext};

// wgpu rejects zero-sized storage bindings.
const MIN_BINDING_BYTES: u64 = 4;

/// A storage buffer holding `len` values of `T`.
///
/// Copies move whole 4-byte words, so `T` is expected to be a 4-byte
/// multiple (`f32`, `u32`, vectors of those).
#[derive(Debug)]
pub struct DeviceBuffer<T: bytemuck::Pod> {
    buffer: Arc<Buffer>,
    len: usize,
    size_in_bytes: u64,
    pool: Option<Arc<BufferPool>>,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            if !pool.return_buffer(self.size_in_bytes, self.buffer.clone()) {
                log::trace!("pool full for {} bytes, releasing", self.size_in_bytes);
            }
        }
    }
}

fn byte_size<T>(len: usize) -> u64 {
    ((len * std::mem::size_of::<T>()) as u64).max(MIN_BINDING_BYTES)
}

impl<T: bytemuck::Pod> DeviceBuffer<T> {
    /// Device copy of `data`, readable and writable by kernels.
    pub fn from_slice(ctx: &GpuContext, label: &str, data: &[T]) -> Self {
        let size_in_bytes = byte_size::<T>(data.len());
        let buffer = if data.is_empty() {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size_in_bytes,
                usage: ctx.pool.usage(),
                mapped_at_creation: false,
            })
        } else {
            ctx.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(data),
                    usage: ctx.pool.usage(),
                })
        };
        Self {
            buffer: Arc::new(buffer),
            len: data.len(),
            size_in_bytes,
            pool: None,
            _marker: PhantomData,
        }
    }

    /// Uninitialised buffer of `len` elements taken from the context pool.
    pub fn empty(ctx: &GpuContext, len: usize) -> Self {
        let size_in_bytes = byte_size::<T>(len);
        let buffer = ctx.pool.get(&ctx.device, size_in_bytes);
        Self {
            buffer,
            len,
            size_in_bytes,
            pool: Some(ctx.pool.clone()),
            _marker: PhantomData,
        }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    /// Overwrites the front of the buffer with `data`.
    pub fn write(&self, ctx: &GpuContext, data: &[T]) -> BackendResult<()> {
        if data.len() > self.len {
            return Err(BackendError::InvalidLaunch(format!(
                "write of {} elements into a buffer of {}",
                data.len(),
                self.len
            )));
        }
        if !data.is_empty() {
            ctx.queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    /// Blocking wrapper over [`DeviceBuffer::read_async`].
    pub fn read(&self, ctx: &GpuContext) -> BackendResult<Vec<T>> {
        pollster::block_on(self.read_async(ctx))
    }

    /// Copies the buffer into a staging buffer, maps it and returns the
    /// contents. Waits for all previously submitted work.
    pub async fn read_async(&self, ctx: &GpuContext) -> BackendResult<Vec<T>> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let size = (self.len * std::mem::size_of::<T>()) as u64;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if the read was abandoned.
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.receive().await.ok_or(BackendError::ReadbackClosed)??;

        let data = slice.get_mapped_range();
        let res = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_has_binding_floor() {
        assert_eq!(byte_size::<f32>(0), 4);
        assert_eq!(byte_size::<u8>(3), 4);
        assert_eq!(byte_size::<f32>(10), 40);
        assert_eq!(byte_size::<u32>(1024), 4096);
    }
}
