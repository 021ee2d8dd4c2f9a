//! Copy planners
//!
//! [`copy_buffer_to_buffer`] plans a device-side copy between two buffers.
//! [`copy_host_to_buffer`] plans an upload of host bytes; whether the bytes go
//! through a mapping or through a staging buffer is decided when the command
//! is recorded, against the destination's memory properties at that point.
//!
//! Both declare `(TRANSFER, TRANSFER_READ)` before and `(TRANSFER, TRANSFER_WRITE)`
//! after themselves.

use ash::vk;
use log::{debug, trace};

use crate::buffer::{GpuBuffer, MappingAccess};
use crate::command::{Commands, RecordOnce};
use crate::error::Result;
use crate::recorder::CommandRecorder;
use crate::sync::SyncDescriptor;

#[cfg(feature = "memtrace")]
use crate::memtracer::{self, Dir};
#[cfg(feature = "metrics")]
use crate::metrics;

/// Optional byte ranges of a buffer→buffer copy.
///
/// | field        | when `None`                                   |
/// |--------------|-----------------------------------------------|
/// | `src_offset` | 0                                             |
/// | `dst_offset` | 0                                             |
/// | `size`       | total size of the source's primary metadata   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferCopyOptions {
    pub src_offset: Option<vk::DeviceSize>,
    pub dst_offset: Option<vk::DeviceSize>,
    pub size: Option<vk::DeviceSize>,
}

impl BufferCopyOptions {
    #[inline]
    pub fn src_offset(mut self, offset: vk::DeviceSize) -> Self {
        self.src_offset = Some(offset);
        self
    }

    #[inline]
    pub fn dst_offset(mut self, offset: vk::DeviceSize) -> Self {
        self.dst_offset = Some(offset);
        self
    }

    #[inline]
    pub fn size(mut self, size: vk::DeviceSize) -> Self {
        self.size = Some(size);
        self
    }
}

pub(crate) enum SourceBuffer<'a, B> {
    Borrowed(&'a B),
    /// Handed to the recorder's retain set once the copy is recorded.
    Owned(B),
}

impl<B> SourceBuffer<'_, B> {
    fn get(&self) -> &B {
        match self {
            Self::Borrowed(b) => b,
            Self::Owned(b) => b,
        }
    }
}

/// Device-side copy between two buffers.
pub(crate) struct CopyBufferOp<'a, B> {
    pub(crate) src: SourceBuffer<'a, B>,
    pub(crate) dst: &'a B,
    /// Metadata slot of `dst` the bounds are checked against.
    pub(crate) dst_meta: usize,
    pub(crate) options: BufferCopyOptions,
}

impl<'a, R: CommandRecorder> RecordOnce<R> for CopyBufferOp<'a, R::Buffer> {
    fn record_once(self: Box<Self>, recorder: &mut R) -> Result<()> {
        let CopyBufferOp { src, dst, dst_meta, options } = *self;
        recorder.ensure_recording()?;
        record_buffer_copy(recorder, src.get(), dst, dst_meta, options)?;
        if let SourceBuffer::Owned(buffer) = src {
            recorder.retain_until_retired(Box::new(buffer));
        }
        Ok(())
    }
}

/// `offset + size <= total`, without overflowing.
#[inline]
fn fits(offset: vk::DeviceSize, size: vk::DeviceSize, total: vk::DeviceSize) -> bool {
    offset.checked_add(size).is_some_and(|end| end <= total)
}

fn record_buffer_copy<R: CommandRecorder>(
    recorder: &mut R,
    src: &R::Buffer,
    dst: &R::Buffer,
    dst_meta: usize,
    options: BufferCopyOptions,
) -> Result<()> {
    let size = match options.size {
        Some(size) => size,
        None => src.total_size(),
    };
    let src_offset = options.src_offset.unwrap_or(0);
    let dst_offset = options.dst_offset.unwrap_or(0);
    let dst_total = dst.meta(dst_meta)?.total_size();

    #[cfg(debug_assertions)]
    {
        let src_total = src.total_size();
        debug_assert!(
            fits(src_offset, size, src_total),
            "copy reads past the source: {src_offset} + {size} > {src_total}"
        );
        debug_assert!(
            fits(dst_offset, size, dst_total),
            "copy writes past the destination: {dst_offset} + {size} > {dst_total}"
        );
        debug_assert!(
            fits(src_offset, size, dst_total),
            "source range {src_offset} + {size} does not fit the destination ({dst_total})"
        );
    }
    #[cfg(not(debug_assertions))]
    let _ = dst_total;

    let region = vk::BufferCopy { src_offset, dst_offset, size };
    trace!("record copy {src_offset}..+{size} -> {dst_offset}");

    #[cfg(feature = "memtrace")]
    let token = memtracer::start(Dir::D2D, usize::try_from(size).unwrap_or(usize::MAX));
    recorder.copy_buffer(src, dst, region)?;
    #[cfg(feature = "memtrace")]
    token.finish();

    Ok(())
}

/// Plans a device-side copy from `src` into `dst`.
///
/// Debug builds assert that the resolved range fits both buffers.
pub fn copy_buffer_to_buffer<'a, R: CommandRecorder>(
    src: &'a R::Buffer,
    dst: &'a R::Buffer,
    options: BufferCopyOptions,
) -> Commands<'a, R> {
    Commands::from_op(
        SyncDescriptor::TRANSFER_READ,
        CopyBufferOp {
            src: SourceBuffer::Borrowed(src),
            dst,
            dst_meta: 0,
            options,
        },
        SyncDescriptor::TRANSFER_WRITE,
    )
}

/// Like [`copy_buffer_to_buffer`], but takes ownership of `src` and keeps it
/// alive in the recorder until the recorded work retires.
pub fn copy_owned_buffer_to_buffer<'a, R: CommandRecorder>(
    src: R::Buffer,
    dst: &'a R::Buffer,
    options: BufferCopyOptions,
) -> Commands<'a, R> {
    Commands::from_op(
        SyncDescriptor::TRANSFER_READ,
        CopyBufferOp {
            src: SourceBuffer::Owned(src),
            dst,
            dst_meta: 0,
            options,
        },
        SyncDescriptor::TRANSFER_WRITE,
    )
}

/// How host bytes reach a destination buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPath {
    /// Host-visible destination: write through a mapping.
    Mapped,
    /// Device-local destination: fill a staging buffer, then copy on the device.
    Staged,
}

impl UploadPath {
    pub fn for_memory(memory: vk::MemoryPropertyFlags) -> Self {
        if memory.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Self::Mapped;
        }
        debug_assert!(
            memory.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            "memory is neither host-visible nor device-local: {memory:?}"
        );
        Self::Staged
    }
}

/// Upload of host bytes into a buffer.
pub(crate) struct HostToBufferOp<'a, B> {
    pub(crate) bytes: &'a [u8],
    pub(crate) dst: &'a B,
    pub(crate) meta_index: usize,
    pub(crate) offset: vk::DeviceSize,
    pub(crate) size: vk::DeviceSize,
}

impl<'a, R: CommandRecorder> RecordOnce<R> for HostToBufferOp<'a, R::Buffer> {
    fn record_once(self: Box<Self>, recorder: &mut R) -> Result<()> {
        let HostToBufferOp { bytes, dst, meta_index, offset, size } = *self;
        recorder.ensure_recording()?;

        let total = dst.meta(meta_index)?.total_size();
        debug_assert!(
            fits(offset, size, total),
            "fill would write beyond the buffer: {offset} + {size} > {total}"
        );
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        debug_assert!(len <= bytes.len(), "source holds {} bytes, {size} requested", bytes.len());
        let bytes = &bytes[..len];

        #[cfg(feature = "metrics")]
        let t0 = std::time::Instant::now();

        let path = UploadPath::for_memory(dst.memory_properties());
        debug!("upload of {size} bytes at {offset}: {path:?}");
        match path {
            UploadPath::Mapped => write_mapped(dst, offset, bytes)?,
            UploadPath::Staged => upload_staged(recorder, dst, offset, bytes)?,
        }

        #[cfg(feature = "metrics")]
        metrics::record("copy_host_to_buffer", t0);
        Ok(())
    }
}

/// Writes `bytes` at `offset` through a scoped mapping of `dst`.
fn write_mapped<B: GpuBuffer>(dst: &B, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
    #[cfg(feature = "memtrace")]
    let token = memtracer::start(Dir::H2D, bytes.len());

    let mut mapping = dst.map_memory(MappingAccess::Write)?;
    let mapped_len = mapping.len();
    let range = usize::try_from(offset)
        .ok()
        .and_then(|start| Some(start..start.checked_add(bytes.len())?));
    match range.and_then(|range| mapping.get_mut(range)) {
        Some(target) => target.copy_from_slice(bytes),
        None => panic!(
            "fill would write beyond the buffer: {offset} + {} > {}",
            bytes.len(),
            mapped_len
        ),
    }
    drop(mapping);

    #[cfg(feature = "memtrace")]
    token.finish();
    #[cfg(feature = "metrics")]
    metrics::count_mapped_write(bytes.len());
    Ok(())
}

/// Uploads `bytes` into device-local `dst` through a fresh staging buffer.
///
/// The staging buffer ends up in the recorder's retain set; it is never dropped here.
fn upload_staged<R: CommandRecorder>(
    recorder: &mut R,
    dst: &R::Buffer,
    offset: vk::DeviceSize,
    bytes: &[u8],
) -> Result<()> {
    let size = bytes.len() as vk::DeviceSize;
    if size == 0 {
        return Ok(());
    }

    #[cfg(feature = "memtrace")]
    let token = memtracer::start(Dir::H2DStaged, bytes.len());

    let staging = dst.create_staging_buffer(size)?;
    #[cfg(feature = "metrics")]
    metrics::count_staging_alloc(bytes.len());

    write_mapped(&staging, 0, bytes)?;
    let options = BufferCopyOptions::default().src_offset(0).dst_offset(offset).size(size);
    record_buffer_copy(recorder, &staging, dst, 0, options)?;
    recorder.retain_until_retired(Box::new(staging));

    #[cfg(feature = "memtrace")]
    token.finish();
    Ok(())
}

/// Plans an upload of the first `size` bytes of `bytes` into `dst` at `offset`.
///
/// `meta_index` selects the metadata slot the range is checked against. The
/// mapped/staged decision happens when the returned command is recorded.
///
/// # Panics
///
/// Debug builds panic when `offset + size` exceeds the slot's total size, or when
/// `bytes` is shorter than `size`.
pub fn copy_host_to_buffer<'a, R: CommandRecorder>(
    bytes: &'a [u8],
    dst: &'a R::Buffer,
    meta_index: usize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
) -> Commands<'a, R> {
    Commands::from_op(
        SyncDescriptor::TRANSFER_READ,
        HostToBufferOp { bytes, dst, meta_index, offset, size },
        SyncDescriptor::TRANSFER_WRITE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferMeta, MetaKind};
    use crate::error::XferError;
    use crate::sim::{CopyRegion, JournalEntry, SimCommandList, SimDevice};

    fn copies(journal: &[JournalEntry]) -> usize {
        journal.iter().filter(|e| matches!(e, JournalEntry::CopyBuffer { .. })).count()
    }

    #[test]
    fn mapped_upload_writes_in_place() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(16);
        let data = [1u8, 2, 3, 4, 5];
        let mut list = device.command_list();

        copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 8, 5)
            .record_into(&mut list)
            .unwrap();

        let mut expected = vec![0u8; 16];
        expected[8..13].copy_from_slice(&data);
        assert_eq!(dst.contents(), expected);
        assert_eq!(copies(&device.journal()), 0);
        assert_eq!(list.retained(), 0);
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn staged_upload_fills_then_copies() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(32);
        device.clear_journal();
        let data: Vec<u8> = (0..10).collect();
        let mut list = device.command_list();

        copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 4, 10)
            .record_into(&mut list)
            .unwrap();

        let journal = device.journal();
        let staging = match journal[0] {
            JournalEntry::BufferCreated { buffer, size, memory } => {
                assert_eq!(size, 10);
                assert!(memory.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
                buffer
            }
            ref other => panic!("expected staging allocation, got {other:?}"),
        };
        assert_eq!(
            journal[1..],
            [
                JournalEntry::HostMapped { buffer: staging, access: MappingAccess::Write },
                JournalEntry::HostUnmapped { buffer: staging },
                JournalEntry::CopyBuffer {
                    src: staging,
                    dst: dst.id(),
                    region: CopyRegion { src_offset: 0, dst_offset: 4, size: 10 },
                },
            ]
        );

        // nothing reaches the destination before the device runs the copy
        assert_eq!(dst.contents(), vec![0; 32]);
        list.submit().unwrap();
        assert_eq!(&dst.contents()[4..14], &data[..]);
    }

    #[test]
    fn staging_lives_until_retirement() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(8);
        let data = [7u8; 8];
        let mut list = device.command_list();

        copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 0, 8)
            .record_into(&mut list)
            .unwrap();
        assert_eq!(list.retained(), 1);
        assert_eq!(device.live_buffers(), 2);

        list.submit().unwrap();
        assert_eq!(device.live_buffers(), 2);

        drop(list);
        assert_eq!(device.live_buffers(), 1);
        let destroyed = device
            .journal()
            .iter()
            .filter(|e| matches!(e, JournalEntry::BufferDestroyed { .. }))
            .count();
        assert_eq!(destroyed, 1);
        assert_eq!(dst.contents(), vec![7; 8]);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(64);
        let data = [0xAB; 64];
        let mut list = device.command_list();
        copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 0, 64)
            .record_into(&mut list)
            .unwrap();
        list.submit().unwrap();
        assert_eq!(dst.contents(), vec![0xAB; 64]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "fill would write beyond the buffer")]
    fn overflowing_upload_panics() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(100);
        let data = [0u8; 20];
        let mut list = device.command_list();
        let _ = copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 90, 20).record_into(&mut list);
    }

    #[test]
    fn missing_meta_slot_is_reported() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(8);
        let mut list = device.command_list();
        let err = copy_host_to_buffer::<SimCommandList>(&[0; 4], &dst, 3, 0, 4)
            .record_into(&mut list)
            .unwrap_err();
        assert!(matches!(err, XferError::MetaIndexOutOfRange { index: 3, count: 1 }));
    }

    #[test]
    fn secondary_meta_slot_bounds() {
        let device = SimDevice::new();
        let dst = device.create_buffer(
            vec![BufferMeta::new(MetaKind::Vertex, 16, 4), BufferMeta::new(MetaKind::Index, 4, 6)],
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(dst.meta_count(), 2);
        let indices: Vec<u8> = (0..24).collect();
        let mut list = device.command_list();
        copy_host_to_buffer::<SimCommandList>(&indices, &dst, 1, 0, 24)
            .record_into(&mut list)
            .unwrap();
        assert_eq!(&dst.contents()[..24], &indices[..]);
    }

    #[test]
    fn decision_follows_live_memory_properties() {
        assert_eq!(UploadPath::for_memory(vk::MemoryPropertyFlags::HOST_VISIBLE), UploadPath::Mapped);
        assert_eq!(
            UploadPath::for_memory(vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE),
            UploadPath::Mapped
        );
        assert_eq!(UploadPath::for_memory(vk::MemoryPropertyFlags::DEVICE_LOCAL), UploadPath::Staged);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "neither host-visible nor device-local")]
    fn unaddressable_memory_panics() {
        UploadPath::for_memory(vk::MemoryPropertyFlags::LAZILY_ALLOCATED);
    }

    #[test]
    fn buffer_copy_defaults_to_source_size() {
        let device = SimDevice::new();
        let src = device.host_visible_buffer(12);
        let dst = device.device_local_buffer(32);
        src.map_memory(MappingAccess::Write).unwrap().copy_from_slice(&[5; 12]);
        device.clear_journal();

        let mut list = device.command_list();
        let cmds = copy_buffer_to_buffer::<SimCommandList>(&src, &dst, BufferCopyOptions::default().dst_offset(20));
        assert_eq!(cmds.pre_sync(), SyncDescriptor::TRANSFER_READ);
        assert_eq!(cmds.post_sync(), SyncDescriptor::TRANSFER_WRITE);
        cmds.record_into(&mut list).unwrap();

        assert_eq!(
            device.journal(),
            vec![JournalEntry::CopyBuffer {
                src: src.id(),
                dst: dst.id(),
                region: CopyRegion { src_offset: 0, dst_offset: 20, size: 12 },
            }]
        );
        list.submit().unwrap();
        assert_eq!(&dst.contents()[20..], &[5; 12]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "copy writes past the destination")]
    fn buffer_copy_checks_destination() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(16);
        let dst = device.device_local_buffer(16);
        let mut list = device.command_list();
        let _ = copy_buffer_to_buffer::<SimCommandList>(&src, &dst, BufferCopyOptions::default().dst_offset(8))
            .record_into(&mut list);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "copy reads past the source")]
    fn buffer_copy_checks_source_range() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(12);
        let dst = device.device_local_buffer(64);
        let mut list = device.command_list();
        let _ = copy_buffer_to_buffer::<SimCommandList>(&src, &dst, BufferCopyOptions::default().src_offset(8))
            .record_into(&mut list);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit the destination")]
    fn buffer_copy_checks_source_range_against_destination() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(32);
        let dst = device.device_local_buffer(16);
        let mut list = device.command_list();
        let options = BufferCopyOptions::default().src_offset(20).dst_offset(0).size(8);
        let _ = copy_buffer_to_buffer::<SimCommandList>(&src, &dst, options).record_into(&mut list);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "fill would write beyond the buffer")]
    fn huge_offset_reports_the_bounds_violation() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(16);
        let mut list = device.command_list();
        let _ = copy_host_to_buffer::<SimCommandList>(&[0; 4], &dst, 0, u64::MAX - 1, 4).record_into(&mut list);
    }

    #[test]
    fn mapped_upload_into_submitted_list_fails() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(4);
        let mut list = device.command_list();
        list.submit().unwrap();

        let err = copy_host_to_buffer::<SimCommandList>(&[1, 2, 3, 4], &dst, 0, 0, 4)
            .record_into(&mut list)
            .unwrap_err();
        assert!(matches!(err, XferError::Retired));
        assert_eq!(dst.contents(), vec![0; 4]);
    }

    #[test]
    fn staged_upload_into_submitted_list_allocates_nothing() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(4);
        let mut list = device.command_list();
        list.submit().unwrap();
        device.clear_journal();

        let err = copy_host_to_buffer::<SimCommandList>(&[1, 2, 3, 4], &dst, 0, 0, 4)
            .record_into(&mut list)
            .unwrap_err();
        assert!(matches!(err, XferError::Retired));
        assert!(device.journal().is_empty());
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn buffer_copy_into_submitted_list_fails() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(4);
        let dst = device.device_local_buffer(4);
        let mut list = device.command_list();
        list.submit().unwrap();

        let err = copy_owned_buffer_to_buffer::<SimCommandList>(src, &dst, BufferCopyOptions::default())
            .record_into(&mut list)
            .unwrap_err();
        assert!(matches!(err, XferError::Retired));
        assert_eq!(list.retained(), 0);
    }

    #[test]
    #[cfg(feature = "memtrace")]
    fn device_copy_span_is_logged_at_record_time() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(4099);
        let dst = device.device_local_buffer(4099);
        let mut list = device.command_list();
        let _scope = memtracer::TracingScope::enabled();

        copy_buffer_to_buffer::<SimCommandList>(&src, &dst, BufferCopyOptions::default())
            .record_into(&mut list)
            .unwrap();
        assert!(!list.is_submitted());
        assert!(memtracer::records().iter().any(|r| r.dir == Dir::D2D && r.bytes == 4099));
    }

    #[test]
    fn owned_source_is_retained() {
        let device = SimDevice::new();
        let src = device.host_visible_buffer(4);
        src.map_memory(MappingAccess::Write).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let dst = device.device_local_buffer(4);
        let mut list = device.command_list();

        copy_owned_buffer_to_buffer::<SimCommandList>(src, &dst, BufferCopyOptions::default())
            .record_into(&mut list)
            .unwrap();
        assert_eq!(list.retained(), 1);
        assert_eq!(device.live_buffers(), 2);

        list.submit().unwrap();
        assert_eq!(list.retire(), 1);
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(dst.contents(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn planner_reuse_yields_independent_commands() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(4);
        let data = [3u8; 4];
        let mut first = device.command_list();
        let mut second = device.command_list();

        for list in [&mut first, &mut second] {
            copy_host_to_buffer::<SimCommandList>(&data, &dst, 0, 0, 4)
                .record_into(list)
                .unwrap();
        }
        assert_eq!(copies(&device.journal()), 2);
        assert_eq!(first.retained(), 1);
        assert_eq!(second.retained(), 1);
    }
}
