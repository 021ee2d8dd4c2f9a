//! Size metadata attached to a buffer
//!
//! A buffer carries one or more metadata slots. Slot 0 is the primary one and
//! defines the buffer's declared size; further slots describe sub-views
//! (e.g. the index part of a combined vertex/index buffer).

use ash::vk;

/// What the elements of a metadata slot are used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKind {
    Generic,
    Uniform,
    Storage,
    Vertex,
    Index,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferMeta {
    kind: MetaKind,
    element_size: vk::DeviceSize,
    num_elements: vk::DeviceSize,
}

impl BufferMeta {
    pub const fn new(kind: MetaKind, element_size: vk::DeviceSize, num_elements: vk::DeviceSize) -> Self {
        Self { kind, element_size, num_elements }
    }

    /// Single generic element spanning `size` bytes.
    pub const fn from_size(size: vk::DeviceSize) -> Self {
        Self::new(MetaKind::Generic, size, 1)
    }

    /// Metadata describing `data` element by element.
    pub fn from_slice<T>(kind: MetaKind, data: &[T]) -> Self {
        Self::new(kind, size_of::<T>() as vk::DeviceSize, data.len() as vk::DeviceSize)
    }

    #[inline]
    pub fn kind(&self) -> MetaKind {
        self.kind
    }

    #[inline]
    pub fn element_size(&self) -> vk::DeviceSize {
        self.element_size
    }

    #[inline]
    pub fn num_elements(&self) -> vk::DeviceSize {
        self.num_elements
    }

    #[inline]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.element_size * self.num_elements
    }

    /// Buffer usage implied by the slot kind.
    pub fn usage(&self) -> vk::BufferUsageFlags {
        match self.kind {
            MetaKind::Generic => vk::BufferUsageFlags::empty(),
            MetaKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            MetaKind::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            MetaKind::Vertex | MetaKind::Instance => vk::BufferUsageFlags::VERTEX_BUFFER,
            MetaKind::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        }
    }
}
