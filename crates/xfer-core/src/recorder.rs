//! Recording context contract and the retain set used for lifetime extension

use std::any::Any;

use ash::vk;
use log::trace;

use crate::buffer::GpuBuffer;
use crate::error::Result;
use crate::sync::SyncDescriptor;

/// A live command-recording context.
///
/// The copy planners only ever append a copy, append a barrier, or hand over an
/// object that has to outlive the recorded work.
pub trait CommandRecorder {
    type Buffer: GpuBuffer;

    /// Appends one device-side buffer copy.
    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, region: vk::BufferCopy) -> Result<()>;

    /// Appends a global memory barrier from `src` to `dst`.
    fn pipeline_barrier(&mut self, src: SyncDescriptor, dst: SyncDescriptor) -> Result<()>;

    /// Takes ownership of `object` and destroys it no earlier than the retirement
    /// of the work recorded into this context.
    fn retain_until_retired(&mut self, object: Box<dyn Any + Send>);

    /// Fails with [`XferError::Retired`](crate::error::XferError::Retired) once the
    /// context has been submitted.
    fn ensure_recording(&self) -> Result<()>;
}

/// Objects waiting for the work of one recording context to retire.
///
/// Dropped in insertion order, either by [`RetainQueue::retire`] or when the
/// queue itself goes away.
#[derive(Default)]
pub struct RetainQueue {
    objects: Vec<Box<dyn Any + Send>>,
}

impl RetainQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: Box<dyn Any + Send>) {
        self.objects.push(object);
        trace!("retained object #{}", self.objects.len());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drops everything retained so far. Returns how many objects were released.
    ///
    /// Only call once the device has finished the associated work.
    pub fn retire(&mut self) -> usize {
        let n = self.objects.len();
        self.objects.clear();
        if n > 0 {
            trace!("retired {n} object(s)");
        }
        n
    }
}

impl Drop for RetainQueue {
    fn drop(&mut self) {
        self.retire();
    }
}

impl std::fmt::Debug for RetainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainQueue").field("len", &self.objects.len()).finish()
    }
}
