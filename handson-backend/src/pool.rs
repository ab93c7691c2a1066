//! Recycling of device storage for exercise outputs.
//!
//! Every run of an exercise allocates output and scratch buffers whose sizes
//! depend only on the problem size: `count` matmul repeats, benchmark
//! iterations and ping-pong Life boards all ask for the same byte counts
//! again and again. A [`crate::DeviceBuffer`] created with `empty` hands its
//! storage back here when dropped, and the next request of that byte size
//! reuses it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device};

/// Free buffers kept per byte size. Beyond this, returned storage is freed.
pub const MAX_FREE_PER_SIZE: usize = 4;

type FreeLists = HashMap<u64, Vec<Arc<Buffer>>>;

/// Totals over every free list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub buffers: usize,
    pub bytes: u64,
}

/// Free lists of exercise buffers keyed by their exact byte size.
pub struct BufferPool {
    free: Mutex<FreeLists>,
    usage: BufferUsages,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("usage", &self.usage)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BufferPool {
    pub fn new(usage: BufferUsages) -> Self {
        Self {
            free: Mutex::new(HashMap::new()),
            usage,
        }
    }

    /// Usage flags every pooled buffer is created with.
    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    // The map stays consistent even if a holder panicked.
    fn free_lists(&self) -> MutexGuard<'_, FreeLists> {
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A buffer of `size` bytes, recycled when one is free.
    pub fn get(&self, device: &Device, size: u64) -> Arc<Buffer> {
        if let Some(buffer) = self.take(size) {
            log::trace!("pool: reusing {} bytes", size);
            return buffer;
        }
        log::trace!("pool: allocating {} bytes", size);
        Arc::new(device.create_buffer(&BufferDescriptor {
            label: Some("handson pooled storage"),
            size,
            usage: self.usage,
            mapped_at_creation: false,
        }))
    }

    fn take(&self, size: u64) -> Option<Arc<Buffer>> {
        self.free_lists().get_mut(&size).and_then(Vec::pop)
    }

    /// Hands `buffer` back. Returns false when the free list for `size`
    /// is full and the buffer was released instead.
    pub fn return_buffer(&self, size: u64, buffer: Arc<Buffer>) -> bool {
        let mut free = self.free_lists();
        let list = free.entry(size).or_default();
        if list.len() >= MAX_FREE_PER_SIZE {
            return false;
        }
        list.push(buffer);
        true
    }

    /// Number of free buffers of exactly `size` bytes.
    pub fn available(&self, size: u64) -> usize {
        self.free_lists().get(&size).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> PoolStats {
        self.free_lists()
            .iter()
            .fold(PoolStats::default(), |acc, (size, list)| PoolStats {
                buffers: acc.buffers + list.len(),
                bytes: acc.bytes + size * list.len() as u64,
            })
    }

    /// Releases every free buffer.
    pub fn clear(&self) {
        let released = self.stats();
        self.free_lists().clear();
        log::debug!(
            "pool: released {} buffers, {} bytes",
            released.buffers,
            released.bytes
        );
    }
}
