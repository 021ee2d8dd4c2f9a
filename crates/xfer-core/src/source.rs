//! Copy-source front ends
//!
//! `copy_source*` wraps where the bytes come from; `copy_destination` then plans
//! the transfer into a buffer, filling in defaults from [`DestinationOptions`].
//!
//! ```
//! use xfer_core::sim::{SimCommandList, SimDevice};
//! use xfer_core::{copy_source, CopySource, DestinationOptions};
//!
//! let device = SimDevice::new();
//! let dst = device.device_local_buffer(4);
//! let data = [1u8, 2, 3, 4];
//!
//! let mut list = device.command_list();
//! copy_source(&data)
//!     .copy_destination::<SimCommandList>(&dst, DestinationOptions::default())
//!     .record_into(&mut list)
//!     .unwrap();
//! list.submit().unwrap();
//! assert_eq!(dst.contents(), data);
//! ```

use ash::vk;
use bytemuck::Pod;

use crate::buffer::GpuBuffer;
use crate::command::Commands;
use crate::copy::{BufferCopyOptions, CopyBufferOp, HostToBufferOp, SourceBuffer};
use crate::recorder::CommandRecorder;
use crate::sync::SyncDescriptor;

mod sealed {
    pub trait Sealed {}
}

/// Where the destination side of a copy lands.
///
/// | field        | when `None`                                        |
/// |--------------|----------------------------------------------------|
/// | `meta_index` | 0                                                  |
/// | `offset`     | 0                                                  |
/// | `size`       | total size of the destination's primary metadata   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DestinationOptions {
    pub meta_index: Option<usize>,
    pub offset: Option<vk::DeviceSize>,
    pub size: Option<vk::DeviceSize>,
}

impl DestinationOptions {
    #[inline]
    pub fn meta_index(mut self, index: usize) -> Self {
        self.meta_index = Some(index);
        self
    }

    #[inline]
    pub fn offset(mut self, offset: vk::DeviceSize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[inline]
    pub fn size(mut self, size: vk::DeviceSize) -> Self {
        self.size = Some(size);
        self
    }

    fn resolve<B: GpuBuffer>(self, dst: &B) -> (usize, vk::DeviceSize, vk::DeviceSize) {
        (
            self.meta_index.unwrap_or(0),
            self.offset.unwrap_or(0),
            self.size.unwrap_or_else(|| dst.total_size()),
        )
    }
}

/// Source of a copy into a buffer of type `B`.
pub trait CopySource<'a, B: GpuBuffer>: sealed::Sealed {
    fn copy_destination<R>(self, dst: &'a B, options: DestinationOptions) -> Commands<'a, R>
    where
        R: CommandRecorder<Buffer = B>;
}

/// Bytes in host memory.
#[derive(Debug, Clone, Copy)]
pub struct HostSource<'a> {
    bytes: &'a [u8],
}

/// Buffer the caller keeps owning.
#[derive(Debug, Clone, Copy)]
pub struct BufferSource<'a, B> {
    buffer: &'a B,
}

/// Buffer handed over to the copy; retained until the recorded work retires.
#[derive(Debug)]
pub struct OwnedBufferSource<B> {
    buffer: B,
}

impl sealed::Sealed for HostSource<'_> {}
impl<B> sealed::Sealed for BufferSource<'_, B> {}
impl<B> sealed::Sealed for OwnedBufferSource<B> {}

/// Host bytes as a copy source.
///
/// # Panics
///
/// The planned upload panics if the resolved size exceeds `bytes.len()`.
#[inline]
pub fn copy_source(bytes: &[u8]) -> HostSource<'_> {
    HostSource { bytes }
}

/// Any plain-old-data slice as a copy source.
#[inline]
pub fn copy_source_pod<T: Pod>(data: &[T]) -> HostSource<'_> {
    HostSource { bytes: bytemuck::cast_slice(data) }
}

#[inline]
pub fn copy_source_buffer<B: GpuBuffer>(buffer: &B) -> BufferSource<'_, B> {
    BufferSource { buffer }
}

#[inline]
pub fn copy_source_owned<B: GpuBuffer>(buffer: B) -> OwnedBufferSource<B> {
    OwnedBufferSource { buffer }
}

impl<'a, B: GpuBuffer> CopySource<'a, B> for HostSource<'a> {
    fn copy_destination<R>(self, dst: &'a B, options: DestinationOptions) -> Commands<'a, R>
    where
        R: CommandRecorder<Buffer = B>,
    {
        let (meta_index, offset, size) = options.resolve(dst);
        Commands::from_op(
            SyncDescriptor::TRANSFER_READ,
            HostToBufferOp { bytes: self.bytes, dst, meta_index, offset, size },
            SyncDescriptor::TRANSFER_WRITE,
        )
    }
}

impl<'a, B: GpuBuffer> CopySource<'a, B> for BufferSource<'a, B> {
    fn copy_destination<R>(self, dst: &'a B, options: DestinationOptions) -> Commands<'a, R>
    where
        R: CommandRecorder<Buffer = B>,
    {
        buffer_copy(SourceBuffer::Borrowed(self.buffer), dst, options)
    }
}

impl<'a, B: GpuBuffer> CopySource<'a, B> for OwnedBufferSource<B> {
    fn copy_destination<R>(self, dst: &'a B, options: DestinationOptions) -> Commands<'a, R>
    where
        R: CommandRecorder<Buffer = B>,
    {
        buffer_copy(SourceBuffer::Owned(self.buffer), dst, options)
    }
}

fn buffer_copy<'a, R: CommandRecorder>(
    src: SourceBuffer<'a, R::Buffer>,
    dst: &'a R::Buffer,
    options: DestinationOptions,
) -> Commands<'a, R> {
    let (dst_meta, offset, size) = options.resolve(dst);
    Commands::from_op(
        SyncDescriptor::TRANSFER_READ,
        CopyBufferOp {
            src,
            dst,
            dst_meta,
            options: BufferCopyOptions::default().src_offset(0).dst_offset(offset).size(size),
        },
        SyncDescriptor::TRANSFER_WRITE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MappingAccess;
    use crate::error::XferError;
    use crate::sim::{CopyRegion, JournalEntry, SimCommandList, SimDevice};

    #[test]
    fn pod_source_defaults_to_destination_size() {
        let device = SimDevice::new();
        let dst = device.host_visible_buffer(16);
        let floats = [1.0f32, 2.0, 3.0, 4.0];
        let mut list = device.command_list();

        copy_source_pod(&floats)
            .copy_destination::<SimCommandList>(&dst, DestinationOptions::default())
            .record_into(&mut list)
            .unwrap();
        assert_eq!(dst.contents(), bytemuck::cast_slice::<f32, u8>(&floats));
    }

    #[test]
    fn host_source_with_offset_and_size() {
        let device = SimDevice::new();
        let dst = device.device_local_buffer(8);
        let bytes = [9u8, 9, 9];
        let mut list = device.command_list();

        copy_source(&bytes)
            .copy_destination::<SimCommandList>(&dst, DestinationOptions::default().offset(5).size(3))
            .record_into(&mut list)
            .unwrap();
        list.submit().unwrap();
        assert_eq!(dst.contents(), vec![0, 0, 0, 0, 0, 9, 9, 9]);
    }

    #[test]
    fn borrowed_buffer_source_records_device_copy() {
        let device = SimDevice::new();
        let src = device.host_visible_buffer(8);
        src.map_memory(MappingAccess::Write).unwrap().copy_from_slice(&[4; 8]);
        let dst = device.device_local_buffer(8);
        device.clear_journal();
        let mut list = device.command_list();

        copy_source_buffer(&src)
            .copy_destination::<SimCommandList>(&dst, DestinationOptions::default())
            .record_into(&mut list)
            .unwrap();
        assert_eq!(
            device.journal(),
            vec![JournalEntry::CopyBuffer {
                src: src.id(),
                dst: dst.id(),
                region: CopyRegion { src_offset: 0, dst_offset: 0, size: 8 },
            }]
        );
        assert_eq!(list.retained(), 0);
        list.submit().unwrap();
        assert_eq!(dst.contents(), vec![4; 8]);
    }

    #[test]
    fn buffer_source_reports_missing_destination_slot() {
        let device = SimDevice::new();
        let src = device.device_local_buffer(8);
        let dst = device.device_local_buffer(8);
        device.clear_journal();
        let mut list = device.command_list();

        let err = copy_source_buffer(&src)
            .copy_destination::<SimCommandList>(&dst, DestinationOptions::default().meta_index(5).size(8))
            .record_into(&mut list)
            .unwrap_err();
        assert!(matches!(err, XferError::MetaIndexOutOfRange { index: 5, count: 1 }));
        assert!(device.journal().is_empty());
    }

    #[test]
    fn owned_buffer_source_extends_lifetime() {
        let device = SimDevice::new();
        let src = device.host_visible_buffer(4);
        src.map_memory(MappingAccess::Write).unwrap().copy_from_slice(&[6; 4]);
        let dst = device.device_local_buffer(8);
        let mut list = device.command_list();

        copy_source_owned(src)
            .copy_destination::<SimCommandList>(&dst, DestinationOptions::default().offset(4).size(4))
            .record_into(&mut list)
            .unwrap();
        assert_eq!(list.retained(), 1);
        assert_eq!(device.live_buffers(), 2);

        list.submit().unwrap();
        drop(list);
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(dst.contents(), vec![0, 0, 0, 0, 6, 6, 6, 6]);
    }
}
