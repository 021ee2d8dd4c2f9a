//! Checked stage algebra
//!
//! Stage masks come straight from the binding (`vk::PipelineStageFlags2`). Next to
//! concrete masks a dependency may carry an *automatic* placeholder, which asks the
//! scheduler to work out the neighbouring stage itself. Placeholders have no bit
//! representation, so every bitwise helper here rejects them with
//! [`XferError::StageAlgebra`].
//!
//! ```
//! use ash::vk;
//! use xfer_core::stage::StageFlags;
//!
//! let copy = StageFlags::from(vk::PipelineStageFlags2::COPY);
//! let frag = StageFlags::from(vk::PipelineStageFlags2::FRAGMENT_SHADER);
//! let dep = copy >> frag;
//! assert_eq!(dep.src, copy);
//!
//! assert!(StageFlags::AUTO.union(copy).is_err());
//! ```

use std::ops::Shr;

use ash::vk;

use crate::error::{Result, XferError};

const PLACEHOLDER: &str =
    "only concrete pipeline stages can be combined, not auto_stage or unset values";

/// Stage mask, automatic placeholder or nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageFlags {
    #[default]
    Unset,
    Concrete(vk::PipelineStageFlags2),
    /// Look back/ahead at most this many commands to determine the stage.
    Auto(u8),
}

impl StageFlags {
    pub const NONE: Self = Self::Concrete(vk::PipelineStageFlags2::NONE);

    /// Let the scheduler determine the neighbouring stage. If it cannot, it
    /// falls back to a full dependency.
    pub const AUTO: Self = Self::Auto(0);

    /// Automatic dependency considering up to `max_commands` neighbours.
    #[inline]
    pub const fn auto_stages(max_commands: u8) -> Self {
        Self::Auto(max_commands)
    }

    /// [`Self::auto_stages`] with the default window of 100 commands.
    #[inline]
    pub const fn auto_stages_default() -> Self {
        Self::Auto(100)
    }

    #[inline]
    pub fn concrete(self) -> Option<vk::PipelineStageFlags2> {
        match self {
            Self::Concrete(flags) => Some(flags),
            _ => None,
        }
    }

    #[inline]
    pub fn is_auto(self) -> bool {
        matches!(self, Self::Auto(_))
    }

    pub fn union(self, other: Self) -> Result<Self> {
        let (a, b) = both_concrete(self, other)?;
        Ok(Self::Concrete(a | b))
    }

    pub fn intersection(self, other: Self) -> Result<Self> {
        let (a, b) = both_concrete(self, other)?;
        Ok(Self::Concrete(a & b))
    }

    /// `self` without the bits of `to_exclude`.
    pub fn exclude(self, to_exclude: Self) -> Result<Self> {
        let (a, b) = both_concrete(self, to_exclude)?;
        Ok(Self::Concrete(a & !b))
    }

    /// Whether every bit of `includee` is set in `self`.
    pub fn is_included(self, includee: Self) -> Result<bool> {
        let (a, b) = both_concrete(self, includee)?;
        Ok(a.contains(b))
    }
}

impl From<vk::PipelineStageFlags2> for StageFlags {
    fn from(flags: vk::PipelineStageFlags2) -> Self {
        Self::Concrete(flags)
    }
}

fn both_concrete(
    a: StageFlags,
    b: StageFlags,
) -> Result<(vk::PipelineStageFlags2, vk::PipelineStageFlags2)> {
    match (a, b) {
        (StageFlags::Concrete(a), StageFlags::Concrete(b)) => Ok((a, b)),
        _ => Err(XferError::StageAlgebra(PLACEHOLDER)),
    }
}

/// Execution dependency `src >> dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExecutionDependency {
    pub src: StageFlags,
    pub dst: StageFlags,
}

impl ExecutionDependency {
    /// Adds `stages` to the destination side.
    pub fn widen_dst(self, stages: StageFlags) -> Result<Self> {
        Ok(Self { src: self.src, dst: self.dst.union(stages)? })
    }

    /// Restricts the destination side to `stages`.
    pub fn narrow_dst(self, stages: StageFlags) -> Result<Self> {
        Ok(Self { src: self.src, dst: self.dst.intersection(stages)? })
    }

    /// Adds `stages` to the source side.
    pub fn widen_src(self, stages: StageFlags) -> Result<Self> {
        Ok(Self { src: self.src.union(stages)?, dst: self.dst })
    }

    /// Restricts the source side to `stages`.
    pub fn narrow_src(self, stages: StageFlags) -> Result<Self> {
        Ok(Self { src: self.src.intersection(stages)?, dst: self.dst })
    }
}

impl Shr for StageFlags {
    type Output = ExecutionDependency;

    fn shr(self, rhs: Self) -> ExecutionDependency {
        ExecutionDependency { src: self, dst: rhs }
    }
}
