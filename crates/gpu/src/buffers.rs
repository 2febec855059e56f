/// Opaque id of a GPU-resident buffer owned by a backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Per-vertex attribute data.
    Vertex,
    /// Element (index) data.
    Index,
}

/// Everything a backend needs to create one buffer.
///
/// `item_size` is the number of components per element (2 for a `vec2`
/// attribute, 1 for indices) and `num_items` the element count, so
/// `contents.len() == item_size * num_items * 4` for 32-bit data.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub contents: &'a [u8],
    pub usage: BufferUsage,
    pub item_size: usize,
    pub num_items: usize,
}

impl<'a> BufferDescriptor<'a> {
    /// Vertex attribute buffer from flat `f32` components.
    pub fn vertex(label: &'a str, data: &'a [f32], item_size: usize) -> Self {
        debug_assert!(item_size > 0 && data.len() % item_size == 0);
        Self {
            label,
            contents: bytemuck::cast_slice(data),
            usage: BufferUsage::Vertex,
            item_size,
            num_items: data.len() / item_size.max(1),
        }
    }

    pub fn index(label: &'a str, data: &'a [u32]) -> Self {
        Self {
            label,
            contents: bytemuck::cast_slice(data),
            usage: BufferUsage::Index,
            item_size: 1,
            num_items: data.len(),
        }
    }
}

/// Buffer allocation primitives of a rendering backend.
///
/// Creation never fails from the caller's point of view: a backend that lost
/// its context is reported through `is_initialized`, which callers check
/// before rebuilding.
pub trait BufferBackend {
    fn is_initialized(&self) -> bool;

    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> BufferHandle;

    fn delete_buffer(&mut self, handle: BufferHandle);
}
