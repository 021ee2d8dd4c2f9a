//! Error type shared by planners, recorders and backends

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XferError {
    /// A driver call returned a failure code.
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    /// Loading the Vulkan entry points failed.
    #[error("Vulkan loader unavailable: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no memory type matches {0:?}")]
    NoSuitableMemoryType(vk::MemoryPropertyFlags),

    #[error("metadata index {index} out of range ({count} slots)")]
    MetaIndexOutOfRange { index: usize, count: usize },

    /// Mapping requested on memory the host cannot address.
    #[error("buffer memory is not host-visible")]
    MappingUnavailable,

    /// Placeholder stages cannot take part in bitwise stage combination.
    #[error("stage algebra: {0}")]
    StageAlgebra(&'static str),

    /// The recording context already left the recording state.
    #[error("recording context is no longer recording")]
    Retired,
}

pub type Result<T> = std::result::Result<T, XferError>;
