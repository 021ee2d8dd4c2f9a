//! Records several deferred commands into one context, with barriers in between

use log::trace;

use crate::command::Commands;
use crate::error::Result;
use crate::recorder::CommandRecorder;
use crate::sync::SyncDescriptor;

/// Ordered list of deferred commands.
///
/// When recorded, a barrier from each command's post-sync to the next
/// command's pre-sync is emitted between every two neighbours.
pub struct Sequence<'a, R: CommandRecorder> {
    leading: Option<SyncDescriptor>,
    commands: Vec<Commands<'a, R>>,
}

impl<'a, R: CommandRecorder> Sequence<'a, R> {
    pub fn new() -> Self {
        Self { leading: None, commands: Vec::new() }
    }

    /// Also synchronise the first command against `previous`, the post-sync of
    /// whatever was recorded into the context before this sequence.
    pub fn after(previous: SyncDescriptor) -> Self {
        Self { leading: Some(previous), commands: Vec::new() }
    }

    pub fn push(&mut self, commands: Commands<'a, R>) -> &mut Self {
        self.commands.push(commands);
        self
    }

    pub fn then(mut self, commands: Commands<'a, R>) -> Self {
        self.commands.push(commands);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn record_into(self, recorder: &mut R) -> Result<()> {
        let mut previous = self.leading;
        for commands in self.commands {
            let (pre, op, post) = commands.into_parts();
            if let Some(src) = previous {
                trace!("barrier {src:?} -> {pre:?}");
                recorder.pipeline_barrier(src, pre)?;
            }
            op.record_once(recorder)?;
            previous = Some(post);
        }
        Ok(())
    }

    /// Folds the sequence into a single deferred command taking the first
    /// command's pre-sync and the last command's post-sync.
    ///
    /// Returns `None` for an empty sequence.
    pub fn into_commands(self) -> Option<Commands<'a, R>>
    where
        R: 'a,
    {
        let pre = self.commands.first()?.pre_sync();
        let post = self.commands.last()?.post_sync();
        Some(Commands::from_op(
            pre,
            move |recorder: &mut R| self.record_into(recorder),
            post,
        ))
    }
}

impl<R: CommandRecorder> Default for Sequence<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}
