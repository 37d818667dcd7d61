//! GPU service boundary
//!
//! Opaque handles plus the two traits layers talk to: [`GpuDevice`] for
//! resources and [`CommandSink`] for recording. Backends map the handles to
//! their own objects.

use std::ops::{Index, IndexMut};

use super::RenderResult;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Handle to a graphics pipeline built outside the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHandle(pub u64);

/// Handle to a descriptor set built outside the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetHandle(pub u64);

/// Largest payload a single [`CommandSink::update_buffer`] call may carry
pub const MAX_UPDATE_BUFFER_BYTES: usize = 65536;

bitflags::bitflags! {
    /// How a buffer will be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex input
        const VERTEX = 1 << 0;
        /// Index input
        const INDEX = 1 << 1;
        /// Uniform block
        const UNIFORM = 1 << 2;
        /// Shader storage
        const STORAGE = 1 << 3;
        /// Indirect draw arguments
        const INDIRECT = 1 << 4;
        /// Target of recorded buffer updates
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Shader stages that see a push-constant range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
    }
}

/// Buffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug name
    pub label: String,
    /// Size in bytes
    pub size: u64,
    /// Binding usage
    pub usage: BufferUsage,
    /// Whether the CPU writes the buffer directly
    pub host_visible: bool,
}

impl BufferDesc {
    /// Host-visible buffer of `size` bytes
    pub fn host(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            size,
            usage,
            host_visible: true,
        }
    }
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

/// Render pass begin parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDesc {
    /// Clear colour; `None` keeps the previous contents
    pub clear_color: Option<[f32; 4]>,
    /// Depth clear value; `None` keeps the previous contents
    pub clear_depth: Option<f32>,
}

impl RenderPassDesc {
    /// Clear colour and depth
    pub fn clear(color: [f32; 4]) -> Self {
        Self {
            clear_color: Some(color),
            clear_depth: Some(1.0),
        }
    }
}

/// GPU resource service
pub trait GpuDevice {
    /// Allocate a buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<BufferHandle>;

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Size of a live buffer
    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    /// Release a buffer; the GPU must no longer be using it
    fn destroy_buffer(&mut self, buffer: BufferHandle);
}

/// Command recording service for one frame slot
///
/// Recording never blocks and never fails; backends validate at submit.
pub trait CommandSink {
    /// Begin a render pass on the acquired image
    fn begin_rendering(&mut self, pass: &RenderPassDesc);

    /// End the current render pass
    fn end_rendering(&mut self);

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind a descriptor set at `set_index` of the pipeline's layout
    fn bind_descriptor_set(&mut self, pipeline: PipelineHandle, set_index: u32, set: DescriptorSetHandle);

    /// Bind a vertex buffer
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64);

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType);

    /// Update push constants of the pipeline's layout
    fn push_constants(&mut self, pipeline: PipelineHandle, stages: ShaderStages, offset: u32, data: &[u8]);

    /// Record an inline buffer update, executed in submission order
    ///
    /// Must be recorded outside a render pass. `data` is at most
    /// [`MAX_UPDATE_BUFFER_BYTES`] long and a multiple of 4 bytes.
    fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Indexed draw
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Indexed draws with arguments read from `buffer`
    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, draw_count: u32, stride: u32);
}

/// Argument layout of one indexed indirect draw
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawIndexedIndirectCommand {
    /// Number of indices
    pub index_count: u32,
    /// Number of instances
    pub instance_count: u32,
    /// First index
    pub first_index: u32,
    /// Added to each index
    pub vertex_offset: i32,
    /// First instance id
    pub first_instance: u32,
}

// Safe: five 32-bit fields, no padding
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for DrawIndexedIndirectCommand {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for DrawIndexedIndirectCommand {}

/// One value per frame slot
#[derive(Debug, Clone)]
pub struct PerFrame<T> {
    slots: Vec<T>,
}

impl<T> PerFrame<T> {
    /// Build `count` slots
    pub fn new(count: usize, f: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: (0..count).map(f).collect(),
        }
    }

    /// Build `count` slots, stopping at the first error
    pub fn try_new<E>(count: usize, f: impl FnMut(usize) -> Result<T, E>) -> Result<Self, E> {
        let slots = (0..count).map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { slots })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over the slots in order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    /// Iterate mutably over the slots in order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }
}

impl<T> Default for PerFrame<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Index<usize> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: usize) -> &T {
        &self.slots[slot]
    }
}

impl<T> IndexMut<usize> for PerFrame<T> {
    fn index_mut(&mut self, slot: usize) -> &mut T {
        &mut self.slots[slot]
    }
}

impl<T> IntoIterator for PerFrame<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// Fixed-capacity host-visible buffer
#[derive(Debug)]
pub struct HostBuffer {
    handle: BufferHandle,
    capacity: u64,
    len: u64,
}

impl HostBuffer {
    /// Allocate `capacity` bytes
    pub fn new(device: &mut dyn GpuDevice, label: impl Into<String>, usage: BufferUsage, capacity: u64) -> RenderResult<Self> {
        let handle = device.create_buffer(&BufferDesc::host(label, capacity, usage))?;
        Ok(Self {
            handle,
            capacity,
            len: 0,
        })
    }

    /// Replace the contents with `data`
    ///
    /// Returns `false` and leaves the buffer untouched when `data` does not fit
    /// or the device rejects the write.
    pub fn set_data(&mut self, device: &mut dyn GpuDevice, data: &[u8]) -> bool {
        let size = data.len() as u64;
        if size > self.capacity {
            log::warn!(
                "Skipping {} byte write into {:?}: capacity is {} bytes",
                size,
                self.handle,
                self.capacity
            );
            return false;
        }
        match device.write_buffer(self.handle, 0, data) {
            Ok(()) => {
                self.len = size;
                true
            }
            Err(e) => {
                log::warn!("Write into {:?} failed: {}", self.handle, e);
                false
            }
        }
    }

    /// Backing buffer
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes written by the last successful [`HostBuffer::set_data`]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Release the backing buffer
    pub fn destroy(self, device: &mut dyn GpuDevice) {
        device.destroy_buffer(self.handle);
    }
}
