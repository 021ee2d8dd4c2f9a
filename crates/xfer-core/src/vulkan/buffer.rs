use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ash::vk;
use log::{trace, warn};

use super::VulkanDevice;
use super::memory::find_memory_type;
use crate::buffer::{BufferMeta, GpuBuffer, MappingAccess, STAGING_MEMORY, STAGING_USAGE};
use crate::error::{Result, XferError};

/// Buffer with its own dedicated memory allocation.
pub struct VulkanBuffer {
    device: Arc<VulkanDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    memory_flags: vk::MemoryPropertyFlags,
    metas: Vec<BufferMeta>,
}

impl VulkanBuffer {
    /// Creates a buffer large enough for every metadata slot.
    ///
    /// Usage is `usage` plus whatever the slot kinds imply. `properties` is a
    /// minimum; the chosen memory type may offer more (see
    /// [`GpuBuffer::memory_properties`]).
    pub fn new(
        device: &Arc<VulkanDevice>,
        metas: Vec<BufferMeta>,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let size = metas.iter().map(BufferMeta::total_size).max().unwrap_or(0);
        let usage = metas.iter().fold(usage, |acc, meta| acc | meta.usage());
        let raw = device.raw();

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { raw.create_buffer(&buffer_info, None)? };

        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let (memory_type_index, memory_flags) =
            match find_memory_type(device.memory_properties(), requirements.memory_type_bits, properties) {
                Ok(found) => found,
                Err(e) => {
                    unsafe { raw.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { raw.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe { raw.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                raw.destroy_buffer(buffer, None);
                raw.free_memory(memory, None);
            }
            return Err(e.into());
        }

        trace!("vulkan: created buffer {buffer:?} ({size} bytes, {memory_flags:?})");
        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
            memory_flags,
            metas,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn whole_range(&self) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }

    fn is_coherent(&self) -> bool {
        self.memory_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("memory_flags", &self.memory_flags)
            .finish()
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        let raw = self.device.raw();
        unsafe {
            raw.destroy_buffer(self.buffer, None);
            raw.free_memory(self.memory, None);
        }
        trace!("vulkan: destroyed buffer {:?}", self.buffer);
    }
}

/// Host mapping of a whole [`VulkanBuffer`]. Unmapped on drop; non-coherent
/// memory is flushed first if the mapping was taken for writing.
pub struct VulkanMapping<'a> {
    buffer: &'a VulkanBuffer,
    access: MappingAccess,
    ptr: *mut u8,
    len: usize,
}

impl Deref for VulkanMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr maps `len` bytes for as long as this guard exists
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for VulkanMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; the guard is the only handle to the mapping
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for VulkanMapping<'_> {
    fn drop(&mut self) {
        let raw = self.buffer.device.raw();
        if self.access.writes() && !self.buffer.is_coherent() {
            let range = self.buffer.whole_range();
            if let Err(e) = unsafe { raw.flush_mapped_memory_ranges(std::slice::from_ref(&range)) } {
                warn!("vulkan: flushing {:?} failed: {e}", self.buffer.buffer);
            }
        }
        unsafe { raw.unmap_memory(self.buffer.memory) };
    }
}

impl GpuBuffer for VulkanBuffer {
    type Mapping<'a> = VulkanMapping<'a>;

    fn metas(&self) -> &[BufferMeta] {
        &self.metas
    }

    fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_flags
    }

    fn map_memory(&self, access: MappingAccess) -> Result<VulkanMapping<'_>> {
        if !self.is_host_visible() {
            return Err(XferError::MappingUnavailable);
        }
        let raw = self.device.raw();
        let ptr = unsafe { raw.map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())? };

        if access != MappingAccess::Write && !self.is_coherent() {
            let range = self.whole_range();
            if let Err(e) = unsafe { raw.invalidate_mapped_memory_ranges(std::slice::from_ref(&range)) } {
                unsafe { raw.unmap_memory(self.memory) };
                return Err(e.into());
            }
        }

        Ok(VulkanMapping {
            buffer: self,
            access,
            ptr: ptr.cast::<u8>(),
            len: self.size as usize,
        })
    }

    fn create_staging_buffer(&self, size: vk::DeviceSize) -> Result<Self> {
        Self::new(&self.device, vec![BufferMeta::from_size(size)], STAGING_USAGE, STAGING_MEMORY)
    }
}
