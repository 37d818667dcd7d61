//! In-memory backend
//!
//! Records commands per slot instead of executing them and simulates fences:
//! a submitted slot stays pending until someone waits on it. Buffer updates
//! recorded with [`CommandSink::update_buffer`] are applied at submit so the
//! buffer contents reflect what the GPU would have seen.

use std::any::Any;
use std::collections::HashMap;

use super::{
    BufferDesc, BufferHandle, CommandSink, DescriptorSetHandle, FrameBackend, FrameState,
    GpuDevice, IndexType, PerFrame, PipelineHandle, RenderError, RenderPassDesc, RenderResult,
    ShaderStages,
};

/// One recorded command
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Render pass opened
    BeginRendering {
        /// Clear colour, if the pass clears
        clear_color: Option<[f32; 4]>,
    },
    /// Render pass closed
    EndRendering,
    /// Pipeline bound
    BindPipeline(PipelineHandle),
    /// Descriptor set bound
    BindDescriptorSet {
        /// Pipeline whose layout is used
        pipeline: PipelineHandle,
        /// Set number
        set_index: u32,
        /// Bound set
        set: DescriptorSetHandle,
    },
    /// Vertex buffer bound
    BindVertexBuffer {
        /// Binding slot
        binding: u32,
        /// Bound buffer
        buffer: BufferHandle,
        /// Byte offset
        offset: u64,
    },
    /// Index buffer bound
    BindIndexBuffer {
        /// Bound buffer
        buffer: BufferHandle,
        /// Byte offset
        offset: u64,
        /// Element width
        index_type: IndexType,
    },
    /// Push constants written
    PushConstants {
        /// Pipeline whose layout is used
        pipeline: PipelineHandle,
        /// Visible stages
        stages: ShaderStages,
        /// Byte offset
        offset: u32,
        /// Payload
        data: Vec<u8>,
    },
    /// Inline buffer update
    UpdateBuffer {
        /// Target buffer
        buffer: BufferHandle,
        /// Byte offset
        offset: u64,
        /// Payload
        data: Vec<u8>,
    },
    /// Non-indexed draw
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex
        first_vertex: u32,
        /// First instance
        first_instance: u32,
    },
    /// Indexed draw
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index
        first_index: u32,
        /// Base vertex
        vertex_offset: i32,
        /// First instance
        first_instance: u32,
    },
    /// Indirect indexed draws
    DrawIndexedIndirect {
        /// Argument buffer
        buffer: BufferHandle,
        /// Byte offset of the first argument block
        offset: u64,
        /// Number of draws
        draw_count: u32,
        /// Bytes between argument blocks
        stride: u32,
    },
}

/// Backend entry point invocation, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    /// `wait_for_slot`
    WaitForSlot {
        /// Slot waited on
        slot: usize,
    },
    /// `acquire_image`
    Acquire {
        /// Slot acquiring
        slot: usize,
        /// Image handed out
        image_index: u32,
    },
    /// `begin_recording`
    BeginRecording {
        /// Slot recorded
        slot: usize,
    },
    /// `end_recording`
    EndRecording {
        /// Slot recorded
        slot: usize,
    },
    /// `submit`
    Submit {
        /// Slot submitted
        slot: usize,
    },
    /// `present`
    Present {
        /// Image presented
        image_index: u32,
    },
    /// `wait_idle`
    WaitIdle,
}

/// Command list of one slot
#[derive(Debug, Default)]
pub struct HeadlessCommands {
    commands: Vec<RecordedCommand>,
    recording: bool,
}

impl HeadlessCommands {
    /// Commands recorded since the last reset
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    fn push(&mut self, command: RecordedCommand) {
        if self.recording {
            self.commands.push(command);
        } else {
            log::warn!("Dropping {:?}: command buffer is not recording", command);
        }
    }
}

impl CommandSink for HeadlessCommands {
    fn begin_rendering(&mut self, pass: &RenderPassDesc) {
        self.push(RecordedCommand::BeginRendering {
            clear_color: pass.clear_color,
        });
    }

    fn end_rendering(&mut self) {
        self.push(RecordedCommand::EndRendering);
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_set(&mut self, pipeline: PipelineHandle, set_index: u32, set: DescriptorSetHandle) {
        self.push(RecordedCommand::BindDescriptorSet { pipeline, set_index, set });
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) {
        self.push(RecordedCommand::BindVertexBuffer { binding, buffer, offset });
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        self.push(RecordedCommand::BindIndexBuffer { buffer, offset, index_type });
    }

    fn push_constants(&mut self, pipeline: PipelineHandle, stages: ShaderStages, offset: u32, data: &[u8]) {
        self.push(RecordedCommand::PushConstants {
            pipeline,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.push(RecordedCommand::UpdateBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32) {
        self.push(RecordedCommand::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }
}

/// Commands of one submitted frame
#[derive(Debug, Clone)]
pub struct Submission {
    /// Slot the commands were recorded into
    pub slot: usize,
    /// Image they rendered to
    pub image_index: u32,
    /// Recorded commands
    pub commands: Vec<RecordedCommand>,
}

#[derive(Debug)]
struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

/// Backend that records instead of rendering
#[derive(Debug)]
pub struct HeadlessBackend {
    extent: (u32, u32),
    image_count: u32,
    next_image: u32,
    command_buffers: PerFrame<HeadlessCommands>,
    fence_pending: PerFrame<bool>,
    recording_slot: Option<usize>,
    buffers: HashMap<BufferHandle, HeadlessBuffer>,
    next_handle: u64,
    calls: Vec<BackendCall>,
    submissions: Vec<Submission>,
    history_limit: usize,
    pending_waits: usize,
}

impl HeadlessBackend {
    /// Backend with `frames_in_flight` slots, an 800x600 target and one more image than slots
    pub fn new(frames_in_flight: usize) -> Self {
        Self::with_extent(frames_in_flight, (800, 600))
    }

    /// Backend with an explicit target size
    pub fn with_extent(frames_in_flight: usize, extent: (u32, u32)) -> Self {
        log::debug!(
            "Creating headless backend: {} frames in flight, {}x{}",
            frames_in_flight,
            extent.0,
            extent.1
        );
        Self {
            extent,
            image_count: frames_in_flight as u32 + 1,
            next_image: 0,
            command_buffers: PerFrame::new(frames_in_flight, |_| HeadlessCommands::default()),
            fence_pending: PerFrame::new(frames_in_flight, |_| false),
            recording_slot: None,
            buffers: HashMap::new(),
            next_handle: 1,
            calls: Vec::new(),
            submissions: Vec::new(),
            history_limit: 256,
            pending_waits: 0,
        }
    }

    /// Keep at most `limit` submissions and calls
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
    }

    /// Change the reported target size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = (width, height);
    }

    /// Register an externally built pipeline
    pub fn register_pipeline(&mut self, name: &str) -> PipelineHandle {
        let handle = PipelineHandle(self.allocate_handle());
        log::debug!("Registered pipeline '{}' as {:?}", name, handle);
        handle
    }

    /// Register an externally built descriptor set
    pub fn register_descriptor_set(&mut self, name: &str) -> DescriptorSetHandle {
        let handle = DescriptorSetHandle(self.allocate_handle());
        log::debug!("Registered descriptor set '{}' as {:?}", name, handle);
        handle
    }

    /// Entry point calls, oldest first
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Submitted frames, oldest first
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Number of fence waits that found the slot still executing
    pub fn fences_waited_while_pending(&self) -> usize {
        self.pending_waits
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// Creation parameters of a live buffer
    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(&buffer).map(|b| &b.desc)
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Command list of `slot`, for recording outside the frame driver
    pub fn command_sink(&mut self, slot: usize) -> &mut HeadlessCommands {
        &mut self.command_buffers[slot]
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn record_call(&mut self, call: BackendCall) {
        self.calls.push(call);
        if self.calls.len() > self.history_limit {
            let excess = self.calls.len() - self.history_limit;
            self.calls.drain(..excess);
        }
    }

    fn check_slot(&self, slot: usize) -> RenderResult<()> {
        if slot >= self.command_buffers.len() {
            return Err(RenderError::RenderingFailed(format!(
                "slot {} out of range for {} frames in flight",
                slot,
                self.command_buffers.len()
            )));
        }
        Ok(())
    }

    fn write(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer)
            .ok_or(RenderError::UnknownBuffer(buffer))?;
        let capacity = target.data.len() as u64;
        let end = offset + data.len() as u64;
        if end > capacity {
            return Err(RenderError::BufferOverflow {
                offset,
                size: data.len() as u64,
                capacity,
            });
        }
        target.data[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }
}

impl GpuDevice for HeadlessBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        if desc.size == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        let handle = BufferHandle(self.allocate_handle());
        self.buffers.insert(
            handle,
            HeadlessBuffer {
                desc: desc.clone(),
                data: vec![0; desc.size as usize],
            },
        );
        log::trace!("Created buffer '{}' ({} bytes) as {:?}", desc.label, desc.size, handle);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.write(buffer, offset, data)
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer).map(|b| b.desc.size)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Destroying unknown buffer {:?}", buffer);
        }
    }
}

impl FrameBackend for HeadlessBackend {
    fn frames_in_flight(&self) -> usize {
        self.command_buffers.len()
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn wait_for_slot(&mut self, slot: usize, _timeout_ns: u64) -> RenderResult<()> {
        self.check_slot(slot)?;
        self.record_call(BackendCall::WaitForSlot { slot });
        if self.fence_pending[slot] {
            self.fence_pending[slot] = false;
            self.pending_waits += 1;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
        self.check_slot(slot)?;
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        self.record_call(BackendCall::Acquire { slot, image_index });
        Ok(image_index)
    }

    fn begin_recording(&mut self, slot: usize, _image_index: u32) -> RenderResult<()> {
        self.check_slot(slot)?;
        if self.fence_pending[slot] {
            return Err(RenderError::RenderingFailed(format!(
                "slot {slot} command buffer reset while the GPU may still be executing it"
            )));
        }
        if self.recording_slot.is_some() {
            return Err(RenderError::InvalidFrameState {
                step: "begin_recording",
                state: FrameState::Recording,
            });
        }
        self.record_call(BackendCall::BeginRecording { slot });
        let buffer = &mut self.command_buffers[slot];
        buffer.commands.clear();
        buffer.recording = true;
        self.recording_slot = Some(slot);
        Ok(())
    }

    fn commands(&mut self) -> &mut dyn CommandSink {
        let slot = self.recording_slot.unwrap_or(0);
        &mut self.command_buffers[slot]
    }

    fn end_recording(&mut self, slot: usize) -> RenderResult<()> {
        if self.recording_slot != Some(slot) {
            return Err(RenderError::InvalidFrameState {
                step: "end_recording",
                state: FrameState::Idle,
            });
        }
        self.record_call(BackendCall::EndRecording { slot });
        self.command_buffers[slot].recording = false;
        self.recording_slot = None;
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        self.check_slot(slot)?;
        if self.command_buffers[slot].recording {
            return Err(RenderError::InvalidFrameState {
                step: "submit",
                state: FrameState::Recording,
            });
        }
        self.record_call(BackendCall::Submit { slot });

        let commands = self.command_buffers[slot].commands.clone();
        for command in &commands {
            if let RecordedCommand::UpdateBuffer { buffer, offset, data } = command {
                self.write(*buffer, *offset, data)?;
            }
        }

        self.fence_pending[slot] = true;
        self.submissions.push(Submission {
            slot,
            image_index,
            commands,
        });
        if self.submissions.len() > self.history_limit {
            let excess = self.submissions.len() - self.history_limit;
            self.submissions.drain(..excess);
        }
        Ok(())
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> RenderResult<()> {
        self.record_call(BackendCall::Present { image_index });
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.record_call(BackendCall::WaitIdle);
        for pending in self.fence_pending.iter_mut() {
            *pending = false;
        }
        Ok(())
    }

    fn device(&mut self) -> &mut dyn GpuDevice {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::BufferUsage;

    #[test]
    fn test_recording_reset_on_pending_fence_fails() {
        let mut backend = HeadlessBackend::new(1);
        backend.begin_recording(0, 0).unwrap();
        backend.end_recording(0).unwrap();
        backend.submit(0, 0).unwrap();

        assert!(backend.begin_recording(0, 1).is_err());

        backend.wait_for_slot(0, u64::MAX).unwrap();
        assert!(backend.begin_recording(0, 1).is_ok());
    }

    #[test]
    fn test_update_buffer_applied_at_submit() {
        let mut backend = HeadlessBackend::new(1);
        let buffer = backend
            .create_buffer(&BufferDesc::host("target", 8, BufferUsage::STORAGE | BufferUsage::TRANSFER_DST))
            .unwrap();

        backend.begin_recording(0, 0).unwrap();
        backend.commands().update_buffer(buffer, 4, &[9, 9, 9, 9]);
        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[0; 8]);
        backend.end_recording(0).unwrap();
        backend.submit(0, 0).unwrap();

        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn test_commands_outside_recording_dropped() {
        let mut backend = HeadlessBackend::new(2);
        backend.command_sink(1).draw(3, 1, 0, 0);
        assert!(backend.command_sink(1).commands().is_empty());
    }

    #[test]
    fn test_write_bounds_checked() {
        let mut backend = HeadlessBackend::new(1);
        let buffer = backend
            .create_buffer(&BufferDesc::host("small", 4, BufferUsage::UNIFORM))
            .unwrap();

        assert!(matches!(
            backend.write_buffer(buffer, 2, &[0; 4]),
            Err(RenderError::BufferOverflow { capacity: 4, .. })
        ));
        assert!(matches!(
            backend.write_buffer(BufferHandle(999), 0, &[0]),
            Err(RenderError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_images_cycle() {
        let mut backend = HeadlessBackend::new(2);
        let images: Vec<u32> = (0..4).map(|_| backend.acquire_image(0).unwrap()).collect();
        assert_eq!(images, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_wait_idle_clears_fences() {
        let mut backend = HeadlessBackend::new(2);
        for slot in 0..2 {
            backend.begin_recording(slot, 0).unwrap();
            backend.end_recording(slot).unwrap();
            backend.submit(slot, 0).unwrap();
        }
        backend.wait_idle().unwrap();

        assert!(backend.begin_recording(0, 0).is_ok());
        assert_eq!(backend.calls().last(), Some(&BackendCall::BeginRecording { slot: 0 }));
    }
}
