//! Deferred commands
//!
//! A [`Commands`] value is one pending unit of GPU work: an operation that
//! records itself into a [`CommandRecorder`], plus the synchronisation it needs
//! right before and right after it runs. It never inserts barriers on its own;
//! whoever records it reads [`Commands::pre_sync`] and [`Commands::post_sync`].
//!
//! The value is move-only and recording consumes it:
//!
//! ```compile_fail
//! # use xfer_core::{Commands, sim::SimCommandList};
//! fn duplicate(cmds: Commands<'_, SimCommandList>) -> [Commands<'_, SimCommandList>; 2] {
//!     [cmds.clone(), cmds]
//! }
//! ```
//!
//! ```compile_fail
//! # use xfer_core::{Commands, sim::SimCommandList};
//! fn twice(cmds: Commands<'_, SimCommandList>, a: &mut SimCommandList, b: &mut SimCommandList) {
//!     let _ = cmds.record_into(a);
//!     let _ = cmds.record_into(b);
//! }
//! ```

use ash::vk;

use crate::error::Result;
use crate::recorder::CommandRecorder;
use crate::sync::SyncDescriptor;

/// An operation that can be recorded exactly once into `R`.
pub trait RecordOnce<R: CommandRecorder> {
    fn record_once(self: Box<Self>, recorder: &mut R) -> Result<()>;
}

impl<R, F> RecordOnce<R> for F
where
    R: CommandRecorder,
    F: FnOnce(&mut R) -> Result<()>,
{
    fn record_once(self: Box<Self>, recorder: &mut R) -> Result<()> {
        (*self)(recorder)
    }
}

/// One pending unit of GPU work with its pre/post synchronisation contract.
///
/// `'a` bounds everything the operation borrows (source bytes, destination
/// buffers); owned operands are moved in.
pub struct Commands<'a, R: CommandRecorder> {
    op: Box<dyn RecordOnce<R> + 'a>,
    pre_sync: SyncDescriptor,
    post_sync: SyncDescriptor,
}

impl<'a, R: CommandRecorder> Commands<'a, R> {
    /// Wraps a recording closure.
    ///
    /// `pre_*` is what must be visible before the closure's commands execute,
    /// `post_*` is what later work has to synchronise against.
    pub fn new<F>(
        pre_stage: vk::PipelineStageFlags2,
        pre_access: vk::AccessFlags2,
        record: F,
        post_stage: vk::PipelineStageFlags2,
        post_access: vk::AccessFlags2,
    ) -> Self
    where
        F: FnOnce(&mut R) -> Result<()> + 'a,
    {
        Self {
            op: Box::new(record),
            pre_sync: SyncDescriptor::new(pre_stage, pre_access),
            post_sync: SyncDescriptor::new(post_stage, post_access),
        }
    }

    /// Wraps a named operation.
    pub fn from_op<O>(pre_sync: SyncDescriptor, op: O, post_sync: SyncDescriptor) -> Self
    where
        O: RecordOnce<R> + 'a,
    {
        Self { op: Box::new(op), pre_sync, post_sync }
    }

    #[inline]
    pub fn pre_sync(&self) -> SyncDescriptor {
        self.pre_sync
    }

    #[inline]
    pub fn post_sync(&self) -> SyncDescriptor {
        self.post_sync
    }

    /// Runs the captured operation against `recorder`.
    pub fn record_into(self, recorder: &mut R) -> Result<()> {
        self.op.record_once(recorder)
    }

    /// Splits into `(pre_sync, operation, post_sync)`.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(self) -> (SyncDescriptor, Box<dyn RecordOnce<R> + 'a>, SyncDescriptor) {
        (self.pre_sync, self.op, self.post_sync)
    }
}

impl<R: CommandRecorder> std::fmt::Debug for Commands<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands")
            .field("pre_sync", &self.pre_sync)
            .field("post_sync", &self.post_sync)
            .finish_non_exhaustive()
    }
}
