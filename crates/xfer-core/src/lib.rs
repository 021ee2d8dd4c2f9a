//! Deferred, synchronisation-aware GPU transfer commands.
//!
//! A transfer is planned as a [`Commands`] value: an operation that records
//! itself into a [`CommandRecorder`] plus the `(stage, access)` pairs that must
//! hold right before and right after it. Whoever records the value (for
//! instance a [`Sequence`]) turns those declarations into pipeline barriers.
//!
//! Planners:
//! * [`copy_buffer_to_buffer`] / [`copy_owned_buffer_to_buffer`]: one device-side copy.
//! * [`copy_host_to_buffer`]: host bytes into a buffer, written through a
//!   mapping when the destination is host-visible, otherwise through a staging
//!   buffer that the recorder keeps alive until the work retires.
//! * [`copy_source`] and friends: front ends with defaulted offsets and sizes.
//!
//! Backends: [`sim`] (deterministic simulated device) and [`vulkan`] (`ash`).
//!
//! Features:
//! * `metrics`: latency and staging counters, see `summary()`.
//! * `memtrace`: transfer tracing with CSV export, see `flush_csv()`.

pub mod buffer;
pub mod command;
pub mod copy;
pub mod error;
pub mod recorder;
pub mod schedule;
pub mod sim;
pub mod source;
pub mod stage;
pub mod sync;
pub mod vulkan;

#[cfg(feature = "memtrace")]
pub mod memtracer;
#[cfg(feature = "metrics")]
pub mod metrics;

pub use buffer::{BufferMeta, GpuBuffer, MappingAccess, MetaKind};
pub use command::{Commands, RecordOnce};
pub use copy::{
    BufferCopyOptions, UploadPath, copy_buffer_to_buffer, copy_host_to_buffer, copy_owned_buffer_to_buffer,
};
pub use error::{Result, XferError};
pub use recorder::{CommandRecorder, RetainQueue};
pub use schedule::Sequence;
pub use source::{
    BufferSource, CopySource, DestinationOptions, HostSource, OwnedBufferSource, copy_source, copy_source_buffer,
    copy_source_owned, copy_source_pod,
};
pub use stage::{ExecutionDependency, StageFlags};
pub use sync::SyncDescriptor;

#[cfg(feature = "memtrace")]
pub use memtracer::{CopyToken, Dir, flush_csv, start};
#[cfg(feature = "metrics")]
pub use metrics::summary;
