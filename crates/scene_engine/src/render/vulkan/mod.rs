//! Vulkan backend
//!
//! Wraps a device, queues, swapchain, render pass and framebuffers created by
//! the host application. The backend owns only what it creates itself: the
//! command pool, per-slot synchronization objects and the buffers layers
//! allocate through [`crate::render::GpuDevice`].

pub mod backend;
pub mod buffer;
pub mod commands;
pub mod sync;

pub use sync::{Fence, FrameSync, Semaphore};
pub use buffer::{find_memory_type, usage_flags, Buffer};
pub use commands::{CommandPool, CommandRecorder, HandleTable};
pub use backend::{VulkanBackend, VulkanBackendInfo};

use ash::vk;
use thiserror::Error;

/// Failures surfaced by the Vulkan backend
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan call returned a non-success code
    #[error("vkResult {0:?}")]
    Api(vk::Result),

    /// A buffer id that this backend never handed out, or already freed
    #[error("unknown buffer id {id}")]
    ResourceNotFound {
        /// Id as passed by the caller
        id: u64,
    },

    /// Call not valid in the backend's current state
    #[error("{reason}")]
    InvalidOperation {
        /// What was wrong
        reason: String,
    },

    /// Device or host memory exhausted
    #[error("allocation of {requested} bytes failed")]
    OutOfMemory {
        /// Size asked for, zero when the driver did not say
        requested: u64,
    },

    /// No memory type satisfies both the buffer and the requested properties
    #[error("no compatible memory type")]
    NoSuitableMemoryType,

    /// A slot's fence did not signal in time
    #[error("frame slot {slot} still busy after {timeout_ns} ns")]
    FenceTimeout {
        /// Slot waited on
        slot: usize,
        /// Timeout that expired
        timeout_ns: u64,
    },
}

/// Shorthand for backend results
pub type VulkanResult<T> = Result<T, VulkanError>;

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                VulkanError::OutOfMemory { requested: 0 }
            }
            other => VulkanError::Api(other),
        }
    }
}
