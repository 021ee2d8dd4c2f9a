//! Simulated device
//!
//! Deterministic stand-in for a GPU: buffers are plain byte vectors, recorded
//! copies execute on [`SimCommandList::submit`], and everything observable
//! (allocations, host mappings, copies, barriers, destruction) lands in a
//! journal shared by the device and all its buffers. Tests, benches and the
//! demos run against it.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use log::{trace, warn};

use crate::buffer::{BufferMeta, GpuBuffer, MappingAccess, STAGING_MEMORY};
use crate::error::{Result, XferError};
use crate::recorder::{CommandRecorder, RetainQueue};
use crate::sync::SyncDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

/// Byte ranges of a recorded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CopyRegion {
    pub src_offset: vk::DeviceSize,
    pub dst_offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl From<vk::BufferCopy> for CopyRegion {
    fn from(region: vk::BufferCopy) -> Self {
        Self {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        }
    }
}

/// Observable event on a [`SimDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    BufferCreated {
        buffer: BufferId,
        size: vk::DeviceSize,
        memory: vk::MemoryPropertyFlags,
    },
    BufferDestroyed {
        buffer: BufferId,
    },
    HostMapped {
        buffer: BufferId,
        access: MappingAccess,
    },
    HostUnmapped {
        buffer: BufferId,
    },
    CopyBuffer {
        src: BufferId,
        dst: BufferId,
        region: CopyRegion,
    },
    Barrier {
        src: SyncDescriptor,
        dst: SyncDescriptor,
    },
    Submitted {
        copies: usize,
    },
}

#[derive(Debug, Default)]
struct Shared {
    journal: Mutex<Vec<JournalEntry>>,
    next_id: AtomicU64,
    live: AtomicUsize,
}

impl Shared {
    fn log(&self, entry: JournalEntry) {
        lock(&self.journal).push(entry);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a simulated device. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    shared: Arc<Shared>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with the given metadata slots in memory with `memory` properties.
    ///
    /// Backing storage is as large as the largest slot and zero-initialised.
    pub fn create_buffer(&self, metas: Vec<BufferMeta>, memory: vk::MemoryPropertyFlags) -> SimBuffer {
        let size = metas.iter().map(BufferMeta::total_size).max().unwrap_or(0);
        let id = BufferId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.live.fetch_add(1, Ordering::Relaxed);
        self.shared.log(JournalEntry::BufferCreated { buffer: id, size, memory });
        trace!("sim: created buffer {id:?} ({size} bytes, {memory:?})");

        SimBuffer {
            id,
            shared: self.shared.clone(),
            metas,
            memory,
            storage: Arc::new(Mutex::new(vec![0; size as usize])),
        }
    }

    /// `size`-byte buffer the host can map.
    pub fn host_visible_buffer(&self, size: vk::DeviceSize) -> SimBuffer {
        self.create_buffer(vec![BufferMeta::from_size(size)], STAGING_MEMORY)
    }

    /// `size`-byte buffer only the device can address.
    pub fn device_local_buffer(&self, size: vk::DeviceSize) -> SimBuffer {
        self.create_buffer(vec![BufferMeta::from_size(size)], vk::MemoryPropertyFlags::DEVICE_LOCAL)
    }

    pub fn command_list(&self) -> SimCommandList {
        SimCommandList {
            shared: self.shared.clone(),
            pending: Vec::new(),
            retained: RetainQueue::new(),
            submitted: false,
        }
    }

    /// Snapshot of everything logged so far.
    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.shared.journal).clone()
    }

    pub fn clear_journal(&self) {
        lock(&self.shared.journal).clear();
    }

    /// Buffers created and not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.shared.live.load(Ordering::Relaxed)
    }
}

/// Buffer on a [`SimDevice`].
pub struct SimBuffer {
    id: BufferId,
    shared: Arc<Shared>,
    metas: Vec<BufferMeta>,
    memory: vk::MemoryPropertyFlags,
    storage: Arc<Mutex<Vec<u8>>>,
}

impl SimBuffer {
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Reads the backing bytes directly, bypassing the host-visibility check.
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.storage).clone()
    }
}

impl std::fmt::Debug for SimBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBuffer")
            .field("id", &self.id)
            .field("metas", &self.metas)
            .field("memory", &self.memory)
            .finish()
    }
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::Relaxed);
        self.shared.log(JournalEntry::BufferDestroyed { buffer: self.id });
        trace!("sim: destroyed buffer {:?}", self.id);
    }
}

/// Scoped host mapping of a [`SimBuffer`].
pub struct SimMapping<'a> {
    buffer: &'a SimBuffer,
    bytes: MutexGuard<'a, Vec<u8>>,
}

impl Deref for SimMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for SimMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for SimMapping<'_> {
    fn drop(&mut self) {
        self.buffer.shared.log(JournalEntry::HostUnmapped { buffer: self.buffer.id });
    }
}

impl GpuBuffer for SimBuffer {
    type Mapping<'a> = SimMapping<'a>;

    fn metas(&self) -> &[BufferMeta] {
        &self.metas
    }

    fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory
    }

    fn map_memory(&self, access: MappingAccess) -> Result<SimMapping<'_>> {
        if !self.is_host_visible() {
            return Err(XferError::MappingUnavailable);
        }
        let bytes = lock(&self.storage);
        self.shared.log(JournalEntry::HostMapped { buffer: self.id, access });
        Ok(SimMapping { buffer: self, bytes })
    }

    fn create_staging_buffer(&self, size: vk::DeviceSize) -> Result<Self> {
        let device = SimDevice { shared: self.shared.clone() };
        Ok(device.create_buffer(vec![BufferMeta::from_size(size)], STAGING_MEMORY))
    }
}

struct PendingCopy {
    src: Arc<Mutex<Vec<u8>>>,
    dst: Arc<Mutex<Vec<u8>>>,
    region: CopyRegion,
}

/// Recording context on a [`SimDevice`].
///
/// Copies are queued while recording and executed in order by [`submit`](Self::submit).
/// The simulated device finishes work synchronously, so [`retire`](Self::retire) is
/// valid right after a submit.
pub struct SimCommandList {
    shared: Arc<Shared>,
    pending: Vec<PendingCopy>,
    retained: RetainQueue,
    submitted: bool,
}

impl SimCommandList {
    /// Number of objects waiting for retirement.
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Executes all recorded copies in recording order.
    pub fn submit(&mut self) -> Result<()> {
        if self.submitted {
            return Err(XferError::Retired);
        }
        let copies = self.pending.len();
        for copy in self.pending.drain(..) {
            let CopyRegion { src_offset, dst_offset, size } = copy.region;
            let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
            // source and destination may share storage
            let data = lock(&copy.src)[s..s + n].to_vec();
            lock(&copy.dst)[d..d + n].copy_from_slice(&data);
        }
        self.submitted = true;
        self.shared.log(JournalEntry::Submitted { copies });
        Ok(())
    }

    /// Releases retained objects once the list has been submitted.
    ///
    /// Returns how many objects were released; nothing is released before submission.
    pub fn retire(&mut self) -> usize {
        if !self.submitted {
            return 0;
        }
        self.retained.retire()
    }
}

impl CommandRecorder for SimCommandList {
    type Buffer = SimBuffer;

    fn copy_buffer(&mut self, src: &SimBuffer, dst: &SimBuffer, region: vk::BufferCopy) -> Result<()> {
        self.ensure_recording()?;
        let region = CopyRegion::from(region);
        self.shared.log(JournalEntry::CopyBuffer { src: src.id, dst: dst.id, region });
        self.pending.push(PendingCopy {
            src: src.storage.clone(),
            dst: dst.storage.clone(),
            region,
        });
        Ok(())
    }

    fn pipeline_barrier(&mut self, src: SyncDescriptor, dst: SyncDescriptor) -> Result<()> {
        self.ensure_recording()?;
        self.shared.log(JournalEntry::Barrier { src, dst });
        Ok(())
    }

    fn retain_until_retired(&mut self, object: Box<dyn Any + Send>) {
        self.retained.push(object);
    }

    fn ensure_recording(&self) -> Result<()> {
        if self.submitted { Err(XferError::Retired) } else { Ok(()) }
    }
}

impl Drop for SimCommandList {
    fn drop(&mut self) {
        if !self.submitted && !self.retained.is_empty() {
            warn!(
                "sim: command list dropped unsubmitted, releasing {} retained object(s)",
                self.retained.len()
            );
        }
    }
}
