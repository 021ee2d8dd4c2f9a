//! One side of a dependency: the stage and access a command needs synchronised

use ash::vk;

/// `(stage, access)` pair declared before or after a deferred command.
///
/// Pure metadata. A descriptor never issues a barrier by itself; the scheduler
/// that records the owning command reads it and decides what to insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncDescriptor {
    stage: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
}

impl SyncDescriptor {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    /// Copy reading its source.
    pub const TRANSFER_READ: Self =
        Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

    /// Copy writing its destination.
    pub const TRANSFER_WRITE: Self =
        Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    #[inline]
    pub const fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    #[inline]
    pub const fn access(&self) -> vk::AccessFlags2 {
        self.access
    }

    /// True when neither stage nor access carry any bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stage.is_empty() && self.access.is_empty()
    }
}

impl From<(vk::PipelineStageFlags2, vk::AccessFlags2)> for SyncDescriptor {
    fn from((stage, access): (vk::PipelineStageFlags2, vk::AccessFlags2)) -> Self {
        Self::new(stage, access)
    }
}
