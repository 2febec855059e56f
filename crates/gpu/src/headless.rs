use std::collections::BTreeMap;

use tracing::trace;

use crate::buffers::{BufferBackend, BufferDescriptor, BufferHandle, BufferUsage};

/// A buffer as uploaded to [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBuffer {
    pub label: String,
    pub usage: BufferUsage,
    pub item_size: usize,
    pub num_items: usize,
    pub contents: Vec<u8>,
}

impl RecordedBuffer {
    pub fn as_f32(&self) -> Vec<f32> {
        self.contents
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect()
    }

    pub fn as_u32(&self) -> Vec<u32> {
        self.contents
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect()
    }
}

/// CPU-only backend that keeps copies of every live buffer.
///
/// Used for headless runs and for asserting what a layer uploads.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    initialized: bool,
    next: u32,
    live: BTreeMap<BufferHandle, RecordedBuffer>,
    deleted: usize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            initialized: true,
            next: 1,
            live: BTreeMap::new(),
            deleted: 0,
        }
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose context is not ready yet.
    pub fn uninitialized() -> Self {
        Self {
            initialized: false,
            ..Self::default()
        }
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&RecordedBuffer> {
        self.live.get(&handle)
    }

    /// Most recently created live buffer with this label.
    pub fn find(&self, label: &str) -> Option<&RecordedBuffer> {
        self.live.values().rev().find(|b| b.label == label)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted
    }
}

impl BufferBackend for HeadlessBackend {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> BufferHandle {
        let handle = BufferHandle(self.next);
        self.next += 1;
        trace!(
            "create buffer {} ({} items x {})",
            desc.label, desc.num_items, desc.item_size
        );
        self.live.insert(
            handle,
            RecordedBuffer {
                label: desc.label.to_string(),
                usage: desc.usage,
                item_size: desc.item_size,
                num_items: desc.num_items,
                contents: desc.contents.to_vec(),
            },
        );
        handle
    }

    fn delete_buffer(&mut self, handle: BufferHandle) {
        if self.live.remove(&handle).is_some() {
            self.deleted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HeadlessBackend;
    use crate::buffers::{BufferBackend, BufferDescriptor};
    use pretty_assertions::assert_eq;

    #[test]
    fn records_and_reads_back() {
        let mut backend = HeadlessBackend::new();
        let h = backend.create_buffer(&BufferDescriptor::vertex("v", &[0.5, -1.25], 2));
        let i = backend.create_buffer(&BufferDescriptor::index("i", &[7, 8, 9]));

        assert_eq!(backend.buffer(h).unwrap().as_f32(), vec![0.5, -1.25]);
        assert_eq!(backend.find("i").unwrap().as_u32(), vec![7, 8, 9]);
        assert_eq!(backend.live_count(), 2);

        backend.delete_buffer(i);
        backend.delete_buffer(i);
        assert_eq!(backend.deleted_count(), 1);
        assert!(backend.find("i").is_none());
    }

    #[test]
    fn uninitialized_reports_itself() {
        let mut backend = HeadlessBackend::uninitialized();
        assert!(!backend.is_initialized());
        backend.set_initialized(true);
        assert!(backend.is_initialized());
    }
}
