use std::any::Any;
use std::sync::Arc;

use ash::vk;
use log::{debug, warn};

use super::{VulkanBuffer, VulkanDevice};
use crate::error::{Result, XferError};
use crate::recorder::{CommandRecorder, RetainQueue};
use crate::sync::SyncDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Recording,
    /// Submitted, fence not yet observed.
    Pending,
    Retired,
}

/// One-shot primary command buffer with its own pool, fence and retain set.
///
/// Recording starts on creation. After [`submit`](Self::submit), retained objects
/// are released by [`wait_and_retire`](Self::wait_and_retire) or
/// [`try_retire`](Self::try_retire) once the fence signals. Dropping a pending
/// recorder blocks until the device is done with it.
pub struct VulkanRecorder {
    device: Arc<VulkanDevice>,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    state: State,
    retained: RetainQueue,
}

impl VulkanRecorder {
    pub fn new(device: &Arc<VulkanDevice>, queue_family_index: u32) -> Result<Self> {
        let raw = device.raw();

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let pool = unsafe { raw.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { raw.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { raw.destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        let fence = match unsafe { raw.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { raw.destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        let recorder = Self {
            device: device.clone(),
            pool,
            command_buffer,
            fence,
            state: State::Recording,
            retained: RetainQueue::new(),
        };

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { raw.begin_command_buffer(command_buffer, &begin_info)? };
        Ok(recorder)
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Objects waiting for retirement.
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// Ends recording and submits to `queue`, signalling the internal fence.
    pub fn submit(&mut self, queue: vk::Queue) -> Result<()> {
        self.ensure_recording()?;
        let raw = self.device.raw();
        unsafe { raw.end_command_buffer(self.command_buffer)? };

        let command_buffers = [self.command_buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe { raw.queue_submit(queue, std::slice::from_ref(&submit), self.fence)? };
        self.state = State::Pending;
        debug!("vulkan: submitted {:?} with {} retained object(s)", self.command_buffer, self.retained.len());
        Ok(())
    }

    /// Blocks up to `timeout_ns` for the submission, then releases retained objects.
    pub fn wait_and_retire(&mut self, timeout_ns: u64) -> Result<usize> {
        match self.state {
            State::Recording => return Err(XferError::Retired),
            State::Retired => return Ok(0),
            State::Pending => {}
        }
        unsafe { self.device.raw().wait_for_fences(&[self.fence], true, timeout_ns)? };
        Ok(self.retire())
    }

    /// Releases retained objects if the submission has completed.
    ///
    /// `Ok(None)` while the device is still working.
    pub fn try_retire(&mut self) -> Result<Option<usize>> {
        if self.state != State::Pending {
            return Ok(None);
        }
        let done = unsafe { self.device.raw().get_fence_status(self.fence)? };
        Ok(done.then(|| self.retire()))
    }

    fn retire(&mut self) -> usize {
        self.state = State::Retired;
        self.retained.retire()
    }
}

impl CommandRecorder for VulkanRecorder {
    type Buffer = VulkanBuffer;

    fn copy_buffer(&mut self, src: &VulkanBuffer, dst: &VulkanBuffer, region: vk::BufferCopy) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.device
                .raw()
                .cmd_copy_buffer(self.command_buffer, src.handle(), dst.handle(), &[region]);
        }
        Ok(())
    }

    fn pipeline_barrier(&mut self, src: SyncDescriptor, dst: SyncDescriptor) -> Result<()> {
        self.ensure_recording()?;
        let barrier = vk::MemoryBarrier2::default()
            .src_stage_mask(src.stage())
            .src_access_mask(src.access())
            .dst_stage_mask(dst.stage())
            .dst_access_mask(dst.access());
        let dependency = vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));
        unsafe {
            self.device
                .raw()
                .cmd_pipeline_barrier2(self.command_buffer, &dependency);
        }
        Ok(())
    }

    fn retain_until_retired(&mut self, object: Box<dyn Any + Send>) {
        self.retained.push(object);
    }

    fn ensure_recording(&self) -> Result<()> {
        if self.state == State::Recording { Ok(()) } else { Err(XferError::Retired) }
    }
}

impl Drop for VulkanRecorder {
    fn drop(&mut self) {
        let raw = self.device.raw();
        if self.state == State::Pending {
            if let Err(e) = unsafe { raw.wait_for_fences(&[self.fence], true, u64::MAX) } {
                warn!("vulkan: waiting on {:?} during drop failed: {e}", self.command_buffer);
            }
        }
        self.retained.retire();
        unsafe {
            raw.destroy_fence(self.fence, None);
            raw.destroy_command_pool(self.pool, None);
        }
    }
}
