//! Buffer contract consumed by the copy planners

mod meta;

pub use meta::{BufferMeta, MetaKind};

use std::ops::DerefMut;

use ash::vk;

use crate::error::{Result, XferError};

/// Memory properties requested for staging buffers.
pub const STAGING_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Usage of staging buffers: they only ever feed a copy.
pub const STAGING_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::TRANSFER_SRC;

/// Intent of a host mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingAccess {
    Read,
    Write,
    ReadWrite,
}

impl MappingAccess {
    #[inline]
    pub fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A device buffer as seen by the copy planners.
///
/// Implementors own the handle, the backing memory and everything needed to
/// allocate a sibling staging buffer on the same device.
pub trait GpuBuffer: Sized + Send + 'static {
    /// Scoped host mapping. Unmapped when dropped.
    type Mapping<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    /// All metadata slots, primary first.
    fn metas(&self) -> &[BufferMeta];

    fn memory_properties(&self) -> vk::MemoryPropertyFlags;

    /// Maps the whole buffer.
    ///
    /// Fails with [`XferError::MappingUnavailable`] if the memory is not host-visible.
    fn map_memory(&self, access: MappingAccess) -> Result<Self::Mapping<'_>>;

    /// Allocates a host-visible, transfer-source buffer of exactly `size` bytes
    /// on the device this buffer lives on.
    fn create_staging_buffer(&self, size: vk::DeviceSize) -> Result<Self>;

    fn meta(&self, index: usize) -> Result<&BufferMeta> {
        let metas = self.metas();
        metas.get(index).ok_or(XferError::MetaIndexOutOfRange {
            index,
            count: metas.len(),
        })
    }

    #[inline]
    fn meta_count(&self) -> usize {
        self.metas().len()
    }

    /// Declared size according to the primary metadata slot.
    fn total_size(&self) -> vk::DeviceSize {
        self.metas().first().map_or(0, BufferMeta::total_size)
    }

    #[inline]
    fn is_host_visible(&self) -> bool {
        self.memory_properties().contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    #[inline]
    fn is_device_local(&self) -> bool {
        self.memory_properties().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
    }
}
