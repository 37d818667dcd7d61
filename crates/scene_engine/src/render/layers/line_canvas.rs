//! Immediate-mode debug lines
//!
//! Lines accumulate on the CPU until [`LineCanvasLayer::clear`]. Every frame
//! the current list is copied into the slot's vertex buffer; a list larger
//! than the buffer is skipped for that frame rather than truncated.

use std::any::Any;
use std::mem;

use crate::foundation::math::{to_gpu_matrix, Vec3};
use crate::render::{
    BufferUsage, CommandSink, DebugUi, FrameInfo, GpuDevice, HostBuffer, PerFrame, PipelineHandle,
    RenderLayer, RenderResult, ShaderStages,
};
use crate::scene::Scene;

/// Vertex of a debug line
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineVertex {
    /// World-space position
    pub position: [f32; 3],
    /// Linear RGBA colour
    pub color: [f32; 4],
}

// Safe: only f32 arrays, no padding
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for LineVertex {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for LineVertex {}

/// Draws a list of coloured line segments
#[derive(Debug)]
pub struct LineCanvasLayer {
    pipeline: PipelineHandle,
    vertices: Vec<LineVertex>,
    buffers: PerFrame<HostBuffer>,
    uploaded: PerFrame<u32>,
    max_lines: usize,
}

impl LineCanvasLayer {
    /// Allocate per-slot vertex buffers for up to `max_lines` segments
    pub fn new(
        device: &mut dyn GpuDevice,
        pipeline: PipelineHandle,
        frames_in_flight: usize,
        max_lines: usize,
    ) -> RenderResult<Self> {
        let capacity = (max_lines.max(1) * 2 * mem::size_of::<LineVertex>()) as u64;
        let buffers = PerFrame::try_new(frames_in_flight, |slot| {
            HostBuffer::new(device, format!("debug lines {slot}"), BufferUsage::VERTEX, capacity)
        })?;

        Ok(Self {
            pipeline,
            vertices: Vec::new(),
            buffers,
            uploaded: PerFrame::new(frames_in_flight, |_| 0),
            max_lines,
        })
    }

    /// Add a segment
    pub fn line(&mut self, from: Vec3, to: Vec3, color: [f32; 4]) {
        self.vertices.push(LineVertex {
            position: from.into(),
            color,
        });
        self.vertices.push(LineVertex {
            position: to.into(),
            color,
        });
    }

    /// Add the twelve edges of an axis-aligned box
    pub fn aabb(&mut self, min: Vec3, max: Vec3, color: [f32; 4]) {
        let corner = |i: usize| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        for i in 0..8 {
            for axis in [1, 2, 4] {
                if i & axis == 0 {
                    self.line(corner(i), corner(i | axis), color);
                }
            }
        }
    }

    /// Add red/green/blue X/Y/Z axes at `origin`
    pub fn axes(&mut self, origin: Vec3, length: f32) {
        self.line(origin, origin + Vec3::x() * length, [1.0, 0.0, 0.0, 1.0]);
        self.line(origin, origin + Vec3::y() * length, [0.0, 1.0, 0.0, 1.0]);
        self.line(origin, origin + Vec3::z() * length, [0.0, 0.0, 1.0, 1.0]);
    }

    /// Remove every segment
    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Number of segments currently held
    pub fn line_count(&self) -> usize {
        self.vertices.len() / 2
    }

    /// Vertices uploaded for `slot`
    pub fn uploaded_vertices(&self, slot: usize) -> u32 {
        self.uploaded[slot]
    }
}

impl RenderLayer for LineCanvasLayer {
    fn name(&self) -> &str {
        "line-canvas"
    }

    fn update(&mut self, frame: &FrameInfo, _scene: &mut Scene, device: &mut dyn GpuDevice) -> RenderResult<()> {
        let uploaded = if self.buffers[frame.slot].set_data(device, bytemuck::cast_slice(&self.vertices)) {
            self.vertices.len() as u32
        } else {
            0
        };
        self.uploaded[frame.slot] = uploaded;
        Ok(())
    }

    fn record_draw_commands(&mut self, frame: &FrameInfo, _scene: &Scene, cmd: &mut dyn CommandSink) {
        let vertex_count = self.uploaded[frame.slot];
        if vertex_count == 0 {
            return;
        }
        let view_projection = to_gpu_matrix(&frame.view_projection);
        cmd.bind_pipeline(self.pipeline);
        cmd.push_constants(self.pipeline, ShaderStages::VERTEX, 0, bytemuck::bytes_of(&view_projection));
        cmd.bind_vertex_buffer(0, self.buffers[frame.slot].handle(), 0);
        cmd.draw(vertex_count, 1, 0, 0);
    }

    fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        ui.value("lines", &self.line_count());
        ui.value("capacity", &self.max_lines);
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for buffer in mem::take(&mut self.buffers) {
            buffer.destroy(device);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
