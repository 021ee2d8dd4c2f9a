//! Vulkan backend
//!
//! [`VulkanBuffer`] and [`VulkanRecorder`] implement the buffer and recorder
//! contracts on top of `ash`. The backend does not create instances or logical
//! devices; it borrows an `ash::Device` the application already owns, which
//! must outlive every buffer and recorder created from it and have Vulkan 1.3
//! (`synchronization2`) enabled.

mod buffer;
mod memory;
mod recorder;

pub use buffer::{VulkanBuffer, VulkanMapping};
pub use memory::find_memory_type;
pub use recorder::VulkanRecorder;

use std::sync::Arc;

use ash::vk;

/// Logical device plus the memory table buffers allocate from.
pub struct VulkanDevice {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice, device: ash::Device) -> Arc<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        Arc::new(Self { device, memory_properties })
    }

    #[inline]
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("handle", &self.device.handle())
            .field("memory_types", &self.memory_properties.memory_type_count)
            .finish()
    }
}
