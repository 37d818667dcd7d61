//! Rendering: GPU service boundary, render layers and the frame driver
//!
//! The core never talks to the graphics API directly. Layers allocate through
//! [`GpuDevice`], record through [`CommandSink`], and the [`FrameDriver`]
//! sequences acquire/record/submit/present through [`FrameBackend`]. Two
//! backends implement those traits: [`vulkan::VulkanBackend`] on top of `ash`,
//! and [`HeadlessBackend`], which records everything in memory.

pub mod gpu;
pub mod layer;
pub mod frame;
pub mod camera;
pub mod headless;
pub mod layers;
#[allow(unsafe_code)]
pub mod vulkan;

pub use gpu::{
    BufferDesc, BufferHandle, BufferUsage, CommandSink, DescriptorSetHandle,
    DrawIndexedIndirectCommand, GpuDevice, HostBuffer, IndexType, PerFrame, PipelineHandle,
    RenderPassDesc, ShaderStages, MAX_UPDATE_BUFFER_BYTES,
};
pub use layer::{DebugUi, FrameInfo, LayerId, LayerStack, LayerState, RenderLayer, TextDebugUi};
pub use frame::{FrameBackend, FrameDriver, FrameState, FrameStats};
pub use camera::{Camera, CameraController, FirstPersonController};
pub use headless::{BackendCall, HeadlessBackend, HeadlessCommands, RecordedCommand, Submission};
pub use layers::{GridLayer, LineCanvasLayer, LineVertex, MultiMeshLayer, OverlayLayer, Panel, SelectionInfo};

use thiserror::Error;

use crate::scene::SceneError;
use vulkan::VulkanError;

/// Render errors
///
/// Backend failures end the frame loop; nothing here is retried.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Error reported by the Vulkan backend
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// A GPU resource could not be created
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A buffer handle that the device never issued or already destroyed
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    /// A write would run past the end of a buffer
    #[error("Write of {size} bytes at offset {offset} exceeds buffer capacity {capacity}")]
    BufferOverflow {
        /// Byte offset of the write
        offset: u64,
        /// Number of bytes written
        size: u64,
        /// Buffer size in bytes
        capacity: u64,
    },

    /// A frame step was requested out of order
    #[error("Frame step '{step}' is invalid in state {state:?}")]
    InvalidFrameState {
        /// Step that was attempted
        step: &'static str,
        /// State the driver or backend was in
        state: FrameState,
    },

    /// A layer touched the scene in an invalid way
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Any other rendering failure
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
