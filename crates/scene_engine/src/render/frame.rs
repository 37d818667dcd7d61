//! Frame driver
//!
//! Sequences one frame: wait for the slot's fence, acquire an image, update
//! layers, propagate transforms, record, submit and present. Slots rotate so
//! the CPU fills slot `n + 1` while the GPU still executes slot `n`.

use std::any::Any;

use super::{CommandSink, FrameInfo, GpuDevice, LayerStack, RenderPassDesc, RenderResult};
use super::RenderError;
use crate::config::RendererConfig;
use crate::foundation::math::Mat4;
use crate::scene::Scene;

/// Where the driver is inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Waiting on the slot fence and the swapchain
    Acquiring,
    /// Command buffer open
    Recording,
    /// Command buffer handed to the queue
    Submitted,
    /// Image queued for presentation
    Presented,
}

/// Acquire/record/submit/present service implemented by each backend
pub trait FrameBackend {
    /// Number of frame slots; fixed for the backend's lifetime
    fn frames_in_flight(&self) -> usize;

    /// Render target size in pixels
    fn extent(&self) -> (u32, u32);

    /// Block until the GPU has finished the last submission from `slot`
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> RenderResult<()>;

    /// Acquire the next swapchain image, signalling `slot`'s image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32>;

    /// Reset and open `slot`'s command buffer
    fn begin_recording(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Recording surface of the open command buffer
    fn commands(&mut self) -> &mut dyn CommandSink;

    /// Close `slot`'s command buffer
    fn end_recording(&mut self, slot: usize) -> RenderResult<()>;

    /// Submit `slot`'s commands and arm its fence
    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Queue `image_index` for presentation
    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Block until every submission has finished
    fn wait_idle(&mut self) -> RenderResult<()>;

    /// Resource service sharing this backend's device
    fn device(&mut self) -> &mut dyn GpuDevice;

    /// Downcast to the concrete backend
    fn as_any(&self) -> &dyn Any;

    /// Downcast to the concrete backend
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Summary of one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame counter value used for this frame
    pub frame_index: u64,
    /// Slot that was filled
    pub slot: usize,
    /// Image that was presented
    pub image_index: u32,
    /// World transforms recomputed during propagation
    pub transforms_propagated: usize,
}

/// Drives layers and the backend through one frame at a time
#[derive(Debug, Clone)]
pub struct FrameDriver {
    frames_in_flight: usize,
    fence_timeout: u64,
    clear_color: [f32; 4],
    slot: usize,
    frame_index: u64,
    state: FrameState,
}

impl FrameDriver {
    /// Create a driver rotating through `frames_in_flight` slots
    pub fn new(frames_in_flight: usize, config: &RendererConfig) -> Self {
        assert!(frames_in_flight > 0, "frame driver needs at least one slot");
        Self {
            frames_in_flight,
            fence_timeout: config.fence_timeout(),
            clear_color: config.clear_color,
            slot: 0,
            frame_index: 0,
            state: FrameState::Idle,
        }
    }

    /// Slot the next frame will fill
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    /// Number of frames started so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Render one frame
    ///
    /// Any error leaves the driver mid-frame; callers are expected to stop.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn FrameBackend,
        layers: &mut LayerStack,
        scene: &mut Scene,
        delta_time: f32,
        view_projection: Mat4,
    ) -> RenderResult<FrameStats> {
        if self.state != FrameState::Idle && self.state != FrameState::Presented {
            return Err(RenderError::InvalidFrameState {
                step: "render_frame",
                state: self.state,
            });
        }
        let slot = self.slot;

        self.state = FrameState::Acquiring;
        backend.wait_for_slot(slot, self.fence_timeout)?;
        let image_index = backend.acquire_image(slot)?;

        let frame = FrameInfo {
            frame_index: self.frame_index,
            slot,
            frames_in_flight: self.frames_in_flight,
            image_index,
            delta_time,
            extent: backend.extent(),
            view_projection,
        };

        layers.update_all(&frame, scene, backend.device())?;
        let transforms_propagated = scene.propagate_transforms();

        self.state = FrameState::Recording;
        backend.begin_recording(slot, image_index)?;
        {
            let cmd = backend.commands();
            layers.record_transfers(&frame, scene, cmd);
            cmd.begin_rendering(&RenderPassDesc::clear(self.clear_color));
            layers.record_all(&frame, scene, cmd);
            cmd.end_rendering();
        }
        backend.end_recording(slot)?;

        backend.submit(slot, image_index)?;
        self.state = FrameState::Submitted;

        backend.present(slot, image_index)?;
        self.state = FrameState::Presented;

        log::trace!(
            "Frame {} done: slot {}, image {}, {} transforms",
            self.frame_index,
            slot,
            image_index,
            transforms_propagated
        );

        self.slot = (slot + 1) % self.frames_in_flight;
        self.frame_index += 1;

        Ok(FrameStats {
            frame_index: frame.frame_index,
            slot,
            image_index,
            transforms_propagated,
        })
    }
}
