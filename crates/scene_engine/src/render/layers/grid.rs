//! Ground-plane reference grid
//!
//! Drawn as one full-size quad; the fragment stage derives grid lines from
//! world position, so the layer owns no buffers.

use std::any::Any;

use crate::foundation::math::to_gpu_matrix;
use crate::render::{
    CommandSink, DebugUi, FrameInfo, GpuDevice, PipelineHandle, RenderLayer, ShaderStages,
};
use crate::scene::Scene;

/// Push-constant block of the grid pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    /// Column-major view-projection
    pub view_projection: [[f32; 4]; 4],
    /// Line colour
    pub color: [f32; 4],
    /// Distance between lines
    pub cell_size: f32,
    /// Half-width of the drawn plane
    pub extent: f32,
    _pad: [f32; 2],
}

// Safe: f32 fields padded to a 16-byte multiple
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for GridParams {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for GridParams {}

/// XZ-plane grid
#[derive(Debug)]
pub struct GridLayer {
    pipeline: PipelineHandle,
    /// Whether the grid is drawn
    pub visible: bool,
    /// Distance between lines
    pub cell_size: f32,
    /// Half-width of the drawn plane
    pub extent: f32,
    /// Line colour
    pub color: [f32; 4],
}

impl GridLayer {
    /// Grid with 1 unit cells over a 100 unit half-width
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self {
            pipeline,
            visible: true,
            cell_size: 1.0,
            extent: 100.0,
            color: [0.5, 0.5, 0.5, 1.0],
        }
    }

    fn params(&self, frame: &FrameInfo) -> GridParams {
        GridParams {
            view_projection: to_gpu_matrix(&frame.view_projection),
            color: self.color,
            cell_size: self.cell_size,
            extent: self.extent,
            _pad: [0.0; 2],
        }
    }
}

impl RenderLayer for GridLayer {
    fn name(&self) -> &str {
        "grid"
    }

    fn record_draw_commands(&mut self, frame: &FrameInfo, _scene: &Scene, cmd: &mut dyn CommandSink) {
        if !self.visible || self.cell_size <= 0.0 {
            return;
        }
        let params = self.params(frame);
        cmd.bind_pipeline(self.pipeline);
        cmd.push_constants(
            self.pipeline,
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            0,
            bytemuck::bytes_of(&params),
        );
        cmd.draw(6, 1, 0, 0);
    }

    fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        ui.checkbox("visible", &mut self.visible);
        ui.slider("cell size", &mut self.cell_size, 0.1, 10.0);
    }

    fn destroy(&mut self, _device: &mut dyn GpuDevice) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
