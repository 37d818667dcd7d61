//! [`FrameBackend`] and [`GpuDevice`] on top of an externally created device

use std::any::Any;
use std::collections::HashMap;

use ash::extensions::khr;
use ash::{vk, Device};

use super::buffer::usage_flags;
use super::{Buffer, CommandPool, CommandRecorder, FrameSync, VulkanError, VulkanResult};
use crate::render::{
    BufferDesc, BufferHandle, CommandSink, DescriptorSetHandle, FrameBackend, GpuDevice, PerFrame,
    PipelineHandle, RenderError, RenderResult,
};

/// Objects the host application created and hands to the backend
///
/// The backend borrows these; the application destroys them after dropping
/// the backend.
pub struct VulkanBackendInfo {
    /// Logical device
    pub device: Device,
    /// Memory properties of the physical device behind `device`
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Family of `graphics_queue`
    pub queue_family_index: u32,
    /// Queue receiving frame submissions
    pub graphics_queue: vk::Queue,
    /// Queue used for presentation
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: khr::Swapchain,
    /// Swapchain to acquire from
    pub swapchain: vk::SwapchainKHR,
    /// Render pass with one colour and one depth attachment
    pub render_pass: vk::RenderPass,
    /// One framebuffer per swapchain image
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Swapchain extent
    pub extent: vk::Extent2D,
    /// Number of frame slots
    pub frames_in_flight: usize,
}

/// Vulkan frame backend
pub struct VulkanBackend {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    recorder: CommandRecorder,
    command_buffers: PerFrame<vk::CommandBuffer>,
    sync: PerFrame<FrameSync>,
    buffers: HashMap<BufferHandle, Buffer>,
    next_handle: u64,
    // Declared last so it drops after everything recorded from it
    command_pool: CommandPool,
}

impl VulkanBackend {
    /// Create the command pool, per-slot command buffers and sync objects
    pub fn new(info: VulkanBackendInfo) -> VulkanResult<Self> {
        if info.frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "frames_in_flight must be at least 1".to_string(),
            });
        }
        if info.framebuffers.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "no swapchain framebuffers".to_string(),
            });
        }

        let command_pool = CommandPool::new(info.device.clone(), info.queue_family_index)?;
        let allocated = command_pool.allocate_command_buffers(info.frames_in_flight as u32)?;
        let command_buffers = PerFrame::new(allocated.len(), |slot| allocated[slot]);
        let sync = PerFrame::try_new(info.frames_in_flight, |slot| FrameSync::new(info.device.clone(), slot))?;
        let recorder = CommandRecorder::new(info.device.clone(), info.render_pass, info.extent);

        log::info!(
            "Vulkan backend ready: {} frames in flight, {} swapchain images, {}x{}",
            info.frames_in_flight,
            info.framebuffers.len(),
            info.extent.width,
            info.extent.height
        );

        Ok(Self {
            device: info.device,
            memory_properties: info.memory_properties,
            graphics_queue: info.graphics_queue,
            present_queue: info.present_queue,
            swapchain_loader: info.swapchain_loader,
            swapchain: info.swapchain,
            framebuffers: info.framebuffers,
            extent: info.extent,
            recorder,
            command_buffers,
            sync,
            buffers: HashMap::new(),
            next_handle: 1,
            command_pool,
        })
    }

    /// Make an externally built pipeline addressable by layers
    pub fn register_pipeline(&mut self, pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> PipelineHandle {
        let handle = PipelineHandle(self.allocate_handle());
        self.recorder.handles.pipelines.insert(handle, (pipeline, layout));
        handle
    }

    /// Make an externally built descriptor set addressable by layers
    pub fn register_descriptor_set(&mut self, set: vk::DescriptorSet) -> DescriptorSetHandle {
        let handle = DescriptorSetHandle(self.allocate_handle());
        self.recorder.handles.descriptor_sets.insert(handle, set);
        handle
    }

    /// Swap in a recreated swapchain; the device must be idle
    pub fn replace_swapchain(
        &mut self,
        swapchain: vk::SwapchainKHR,
        framebuffers: Vec<vk::Framebuffer>,
        extent: vk::Extent2D,
    ) {
        log::info!("Swapchain replaced: {}x{}", extent.width, extent.height);
        self.swapchain = swapchain;
        self.framebuffers = framebuffers;
        self.extent = extent;
        self.recorder.set_extent(extent);
    }

    /// Underlying command pool
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn framebuffer(&self, image_index: u32) -> RenderResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                VulkanError::ResourceNotFound {
                    id: u64::from(image_index),
                }
                .into()
            })
    }
}

impl GpuDevice for VulkanBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        if desc.size == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        let properties = if desc.host_visible {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let buffer = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            desc.size,
            usage_flags(desc.usage),
            properties,
        )?;

        let handle = BufferHandle(self.allocate_handle());
        log::trace!("Created buffer '{}' ({} bytes) as {:?}", desc.label, desc.size, handle);
        self.recorder.handles.buffers.insert(handle, buffer.handle());
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let target = self.buffers.get(&buffer).ok_or(RenderError::UnknownBuffer(buffer))?;
        let capacity = target.size();
        if offset + data.len() as u64 > capacity {
            return Err(RenderError::BufferOverflow {
                offset,
                size: data.len() as u64,
                capacity,
            });
        }
        target.write(offset, data)?;
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer).map(Buffer::size)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.recorder.handles.buffers.remove(&buffer);
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Destroying unknown buffer {:?}", buffer);
        }
    }
}

impl FrameBackend for VulkanBackend {
    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> RenderResult<()> {
        self.sync[slot].wait_for_reuse(timeout_ns)?;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
        let (image_index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(
                    self.swapchain,
                    u64::MAX,
                    self.sync[slot].image_available.handle(),
                    vk::Fence::null(),
                )
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(image_index)
    }

    fn begin_recording(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let framebuffer = self.framebuffer(image_index)?;
        self.recorder.begin(self.command_buffers[slot], framebuffer)?;
        Ok(())
    }

    fn commands(&mut self) -> &mut dyn CommandSink {
        &mut self.recorder
    }

    fn end_recording(&mut self, _slot: usize) -> RenderResult<()> {
        self.recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize, _image_index: u32) -> RenderResult<()> {
        let sync = &self.sync[slot];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [self.command_buffers[slot]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        // An error before this point leaves the fence signalled
        let fence = sync.arm()?;
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
                .map_err(VulkanError::Api)?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let wait_semaphores = [self.sync[slot].render_finished.handle()];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Presented to a suboptimal swapchain");
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        unsafe {
            self.device.device_wait_idle().map_err(VulkanError::Api)?;
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

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        if !self.buffers.is_empty() {
            log::warn!("Dropping Vulkan backend with {} live buffers", self.buffers.len());
        }
    }
}
