// crates/xfer-core/examples/vulkan_upload.rs
//
// Uploads host data into a device-local buffer through a staging buffer,
// copies it into a host-visible readback buffer and verifies the result.
// Needs a Vulkan 1.3 driver with synchronization2.

use std::ffi::CStr;

use ash::vk;
use xfer_core::vulkan::{VulkanBuffer, VulkanDevice, VulkanRecorder};
use xfer_core::{
    BufferMeta, CopySource, DestinationOptions, GpuBuffer, MappingAccess, MetaKind, Result, Sequence, XferError,
    copy_source_buffer, copy_source_pod,
};

#[cfg(feature = "metrics")]
use xfer_core::summary;
#[cfg(feature = "memtrace")]
use xfer_core::flush_csv;

const N: usize = 1 << 20;

struct Context {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
}

fn create_context() -> Result<Context> {
    let entry = unsafe { ash::Entry::load()? };

    let app_name = c"xfer vulkan_upload";
    let app_info = vk::ApplicationInfo::default()
        .application_name(app_name)
        .engine_name(app_name)
        .api_version(vk::API_VERSION_1_3);
    let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
    let instance = unsafe { entry.create_instance(&instance_info, None)? };

    let physical_devices = unsafe { instance.enumerate_physical_devices()? };
    let (physical_device, queue_family_index) = physical_devices
        .iter()
        .find_map(|&pdevice| {
            let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
            families
                .iter()
                .position(|info| info.queue_flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER))
                .map(|index| (pdevice, index as u32))
        })
        .ok_or(XferError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED))?;

    let name = unsafe { instance.get_physical_device_properties(physical_device) };
    let name = unsafe { CStr::from_ptr(name.device_name.as_ptr()) };
    println!("device: {}", name.to_string_lossy());

    let priorities = [1.0];
    let queue_info = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities)];
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
    let device_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_info)
        .push_next(&mut features13);
    let device = unsafe { instance.create_device(physical_device, &device_info, None)? };

    Ok(Context { _entry: entry, instance, physical_device, device, queue_family_index })
}

fn main() -> Result<()> {
    let ctx = create_context()?;
    let queue = unsafe { ctx.device.get_device_queue(ctx.queue_family_index, 0) };
    let device = VulkanDevice::new(&ctx.instance, ctx.physical_device, ctx.device.clone());

    let host: Vec<f32> = (0..N).map(|i| i as f32).collect();
    let meta = BufferMeta::new(MetaKind::Storage, std::mem::size_of::<f32>() as u64, N as u64);

    {
        let gpu = VulkanBuffer::new(
            &device,
            vec![meta],
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let readback = VulkanBuffer::new(
            &device,
            vec![meta],
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mut recorder = VulkanRecorder::new(&device, ctx.queue_family_index)?;
        Sequence::<VulkanRecorder>::new()
            .then(copy_source_pod(&host[..]).copy_destination(&gpu, DestinationOptions::default()))
            .then(copy_source_buffer(&gpu).copy_destination(&readback, DestinationOptions::default()))
            .record_into(&mut recorder)?;
        println!("retained until retirement: {}", recorder.retained());

        recorder.submit(queue)?;
        let released = recorder.wait_and_retire(u64::MAX)?;
        println!("released after retirement: {released}");

        let mapping = readback.map_memory(MappingAccess::Read)?;
        let out: &[f32] = bytemuck::cast_slice(&mapping[..]);
        let ok = out.iter().zip(&host).all(|(a, b)| a == b);
        println!("readback matches: {ok}");
    }

    #[cfg(feature = "metrics")]
    summary();

    #[cfg(feature = "memtrace")]
    if let Err(e) = flush_csv(".") {
        eprintln!("memtrace flush failed: {e}");
    }

    drop(device);
    unsafe {
        ctx.device.destroy_device(None);
        ctx.instance.destroy_instance(None);
    }
    Ok(())
}
