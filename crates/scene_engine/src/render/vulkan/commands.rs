//! Command pool and the Vulkan implementation of [`CommandSink`]

use std::collections::HashMap;

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};
use crate::render::{
    BufferHandle, CommandSink, DescriptorSetHandle, IndexType, PipelineHandle, RenderPassDesc,
    ShaderStages,
};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // Frees every buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Engine handle to Vulkan object lookup
#[derive(Debug, Default)]
pub struct HandleTable {
    /// Live buffers
    pub buffers: HashMap<BufferHandle, vk::Buffer>,
    /// Registered pipelines with their layouts
    pub pipelines: HashMap<PipelineHandle, (vk::Pipeline, vk::PipelineLayout)>,
    /// Registered descriptor sets
    pub descriptor_sets: HashMap<DescriptorSetHandle, vk::DescriptorSet>,
}

/// Records engine commands into the open command buffer
///
/// Unknown handles are logged and the command skipped; recording itself never
/// fails.
pub struct CommandRecorder {
    device: Device,
    command_buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    recording: bool,
    in_pass: bool,
    /// Handle lookup shared with the owning backend
    pub handles: HandleTable,
}

impl CommandRecorder {
    /// Recorder targeting `render_pass`
    pub fn new(device: Device, render_pass: vk::RenderPass, extent: vk::Extent2D) -> Self {
        Self {
            device,
            command_buffer: vk::CommandBuffer::null(),
            render_pass,
            framebuffer: vk::Framebuffer::null(),
            extent,
            recording: false,
            in_pass: false,
            handles: HandleTable::default(),
        }
    }

    /// Reset and open `command_buffer`, drawing into `framebuffer`
    pub fn begin(&mut self, command_buffer: vk::CommandBuffer, framebuffer: vk::Framebuffer) -> VulkanResult<()> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.command_buffer = command_buffer;
        self.framebuffer = framebuffer;
        self.recording = true;
        self.in_pass = false;
        Ok(())
    }

    /// Close the command buffer
    pub fn end(&mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }
        if self.in_pass {
            log::warn!("Closing command buffer with an open render pass");
            unsafe { self.device.cmd_end_render_pass(self.command_buffer) };
            self.in_pass = false;
        }

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }

    /// Whether a command buffer is open
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Change the render area after a swapchain resize
    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
    }

    fn buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        let buffer = self.handles.buffers.get(&handle).copied();
        if buffer.is_none() {
            log::warn!("Skipping command on unknown buffer {:?}", handle);
        }
        buffer
    }

    fn pipeline(&self, handle: PipelineHandle) -> Option<(vk::Pipeline, vk::PipelineLayout)> {
        let pipeline = self.handles.pipelines.get(&handle).copied();
        if pipeline.is_none() {
            log::warn!("Skipping command on unregistered pipeline {:?}", handle);
        }
        pipeline
    }

    fn active(&self) -> bool {
        if !self.recording {
            log::warn!("Dropping command: command buffer is not recording");
        }
        self.recording
    }
}

fn stage_flags(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

impl CommandSink for CommandRecorder {
    fn begin_rendering(&mut self, pass: &RenderPassDesc) {
        if !self.active() {
            return;
        }
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: pass.clear_color.unwrap_or([0.0, 0.0, 0.0, 1.0]),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: pass.clear_depth.unwrap_or(1.0),
                    stencil: 0,
                },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }
        self.in_pass = true;
    }

    fn end_rendering(&mut self) {
        if !self.active() || !self.in_pass {
            return;
        }
        unsafe { self.device.cmd_end_render_pass(self.command_buffer) };
        self.in_pass = false;
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        if !self.active() {
            return;
        }
        if let Some((pipeline, _)) = self.pipeline(pipeline) {
            unsafe {
                self.device
                    .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            }
        }
    }

    fn bind_descriptor_set(&mut self, pipeline: PipelineHandle, set_index: u32, set: DescriptorSetHandle) {
        if !self.active() {
            return;
        }
        let Some((_, layout)) = self.pipeline(pipeline) else {
            return;
        };
        let Some(&descriptor_set) = self.handles.descriptor_sets.get(&set) else {
            log::warn!("Skipping bind of unregistered descriptor set {:?}", set);
            return;
        };
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[descriptor_set],
                &[],
            );
        }
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) {
        if !self.active() {
            return;
        }
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device
                    .cmd_bind_vertex_buffers(self.command_buffer, binding, &[buffer], &[offset]);
            }
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        if !self.active() {
            return;
        }
        let index_type = match index_type {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        };
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device
                    .cmd_bind_index_buffer(self.command_buffer, buffer, offset, index_type);
            }
        }
    }

    fn push_constants(&mut self, pipeline: PipelineHandle, stages: ShaderStages, offset: u32, data: &[u8]) {
        if !self.active() {
            return;
        }
        if let Some((_, layout)) = self.pipeline(pipeline) {
            unsafe {
                self.device
                    .cmd_push_constants(self.command_buffer, layout, stage_flags(stages), offset, data);
            }
        }
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if !self.active() {
            return;
        }
        if self.in_pass {
            log::warn!("Skipping update of {:?}: not allowed inside a render pass", buffer);
            return;
        }
        let Some(vk_buffer) = self.buffer(buffer) else {
            return;
        };

        // Make the write visible to vertex shading and indirect argument reads
        let barrier = vk::BufferMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::INDIRECT_COMMAND_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(vk_buffer)
            .offset(offset)
            .size(data.len() as u64)
            .build();

        unsafe {
            self.device
                .cmd_update_buffer(self.command_buffer, vk_buffer, offset, data);
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::DRAW_INDIRECT,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        if !self.active() {
            return;
        }
        unsafe {
            self.device
                .cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if !self.active() {
            return;
        }
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32) {
        if !self.active() {
            return;
        }
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device
                    .cmd_draw_indexed_indirect(self.command_buffer, buffer, offset, draw_count, stride);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(stage_flags(ShaderStages::VERTEX), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            stage_flags(ShaderStages::VERTEX | ShaderStages::FRAGMENT),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }
}
