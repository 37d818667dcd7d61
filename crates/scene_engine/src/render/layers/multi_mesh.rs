//! Draws every scene mesh with one indirect call
//!
//! Geometry is uploaded once into shared vertex/index buffers. Each frame slot
//! owns a transform buffer (one matrix per `mesh_index`) and an indirect
//! argument buffer whose `first_instance` carries the mesh index, so the
//! vertex shader can fetch its model matrix.

use std::any::Any;
use std::mem;

use crate::foundation::math::to_gpu_matrix;
use crate::render::gpu::MAX_UPDATE_BUFFER_BYTES;
use crate::render::{
    BufferUsage, CommandSink, DebugUi, DescriptorSetHandle, DrawIndexedIndirectCommand, FrameInfo,
    GpuDevice, HostBuffer, IndexType, PerFrame, PipelineHandle, RenderLayer, RenderResult,
    ShaderStages,
};
use crate::scene::Scene;

const MATRIX_BYTES: u64 = mem::size_of::<[[f32; 4]; 4]>() as u64;
const INDIRECT_STRIDE: u32 = mem::size_of::<DrawIndexedIndirectCommand>() as u32;

#[derive(Debug)]
struct GeometryBuffers {
    vertex: HostBuffer,
    index: HostBuffer,
    vertex_count: usize,
    index_count: usize,
}

impl GeometryBuffers {
    fn destroy(self, device: &mut dyn GpuDevice) {
        self.vertex.destroy(device);
        self.index.destroy(device);
    }
}

/// Renders all meshes of the scene
#[derive(Debug)]
pub struct MultiMeshLayer {
    pipeline: PipelineHandle,
    descriptor_sets: Option<PerFrame<DescriptorSetHandle>>,
    transforms: PerFrame<HostBuffer>,
    indirect: PerFrame<HostBuffer>,
    indirect_draws: PerFrame<u32>,
    geometry: Option<GeometryBuffers>,
    retired: Vec<(u64, GeometryBuffers)>,
    max_meshes: usize,
    staging: Vec<[[f32; 4]; 4]>,
    enabled: bool,
    warned_capacity: bool,
}

impl MultiMeshLayer {
    /// Allocate per-slot transform and indirect buffers for up to `max_meshes` meshes
    pub fn new(
        device: &mut dyn GpuDevice,
        pipeline: PipelineHandle,
        frames_in_flight: usize,
        max_meshes: usize,
    ) -> RenderResult<Self> {
        let max = max_meshes.max(1) as u64;
        let transforms = PerFrame::try_new(frames_in_flight, |slot| {
            HostBuffer::new(
                device,
                format!("mesh transforms {slot}"),
                BufferUsage::STORAGE | BufferUsage::TRANSFER_DST,
                max * MATRIX_BYTES,
            )
        })?;
        let indirect = PerFrame::try_new(frames_in_flight, |slot| {
            HostBuffer::new(
                device,
                format!("mesh draws {slot}"),
                BufferUsage::INDIRECT,
                max * u64::from(INDIRECT_STRIDE),
            )
        })?;

        log::info!(
            "Created multi-mesh layer: {} slots, up to {} meshes",
            frames_in_flight,
            max_meshes
        );
        Ok(Self {
            pipeline,
            descriptor_sets: None,
            transforms,
            indirect,
            indirect_draws: PerFrame::new(frames_in_flight, |_| 0),
            geometry: None,
            retired: Vec::new(),
            max_meshes: max as usize,
            staging: Vec::with_capacity(max as usize),
            enabled: true,
            warned_capacity: false,
        })
    }

    /// Bind one descriptor set per slot at set 0
    ///
    /// Each set is expected to expose [`MultiMeshLayer::transform_buffer`] of the
    /// same slot.
    #[must_use]
    pub fn with_descriptor_sets(mut self, sets: PerFrame<DescriptorSetHandle>) -> Self {
        self.descriptor_sets = Some(sets);
        self
    }

    /// Transform buffer of `slot`
    pub fn transform_buffer(&self, slot: usize) -> crate::render::BufferHandle {
        self.transforms[slot].handle()
    }

    /// Indirect draws recorded for `slot`
    pub fn draw_count(&self, slot: usize) -> u32 {
        self.indirect_draws[slot]
    }

    /// Enable or disable drawing
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn upload_geometry(&mut self, frame: &FrameInfo, scene: &Scene, device: &mut dyn GpuDevice) -> RenderResult<()> {
        let geometry = scene.geometry();
        let current = self.geometry.as_ref().map(|g| (g.vertex_count, g.index_count));
        if current == Some((geometry.vertices.len(), geometry.indices.len())) {
            return Ok(());
        }
        if geometry.vertices.is_empty() || geometry.indices.is_empty() {
            return Ok(());
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&geometry.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&geometry.indices);
        let mut vertex = HostBuffer::new(device, "scene vertices", BufferUsage::VERTEX, vertex_bytes.len() as u64)?;
        let mut index = HostBuffer::new(device, "scene indices", BufferUsage::INDEX, index_bytes.len() as u64)?;
        let vertex_ok = vertex.set_data(device, vertex_bytes);
        let index_ok = index.set_data(device, index_bytes);
        if !(vertex_ok && index_ok) {
            // Keep the previous geometry; the next update retries
            log::warn!("Scene geometry upload failed, keeping previous buffers");
            vertex.destroy(device);
            index.destroy(device);
            return Ok(());
        }

        log::debug!(
            "Uploaded scene geometry: {} vertices, {} indices",
            geometry.vertices.len(),
            geometry.indices.len()
        );

        // Older slots may still draw from the previous buffers
        if let Some(old) = self.geometry.replace(GeometryBuffers {
            vertex,
            index,
            vertex_count: geometry.vertices.len(),
            index_count: geometry.indices.len(),
        }) {
            self.retired.push((frame.frame_index, old));
        }
        Ok(())
    }

    fn release_retired(&mut self, frame: &FrameInfo, device: &mut dyn GpuDevice) {
        // Buffers retired at frame F were last drawn by F - 1, which has
        // completed once the slot fence of F - 1 + frames_in_flight was waited on
        let slots = frame.frames_in_flight as u64;
        let (done, keep): (Vec<_>, Vec<_>) = mem::take(&mut self.retired)
            .into_iter()
            .partition(|(retired_at, _)| frame.frame_index + 1 >= retired_at + slots);
        self.retired = keep;
        for (_, buffers) in done {
            buffers.destroy(device);
        }
    }

    fn drawn_mesh_count(&mut self, scene: &Scene) -> usize {
        let count = scene.meshes().len();
        if count > self.max_meshes && !self.warned_capacity {
            log::warn!(
                "Scene has {} meshes but the layer holds {}; the rest are not drawn",
                count,
                self.max_meshes
            );
            self.warned_capacity = true;
        }
        count.min(self.max_meshes)
    }
}

impl RenderLayer for MultiMeshLayer {
    fn name(&self) -> &str {
        "multi-mesh"
    }

    fn update(&mut self, frame: &FrameInfo, scene: &mut Scene, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.release_retired(frame, device);
        self.upload_geometry(frame, scene, device)?;

        let count = self.drawn_mesh_count(scene);
        if self.indirect_draws[frame.slot] as usize == count {
            return Ok(());
        }

        // Mesh ranges never change once attached, so only growth needs a rebuild
        let draws: Vec<DrawIndexedIndirectCommand> = scene.meshes().meshes()[..count]
            .iter()
            .map(|mesh| DrawIndexedIndirectCommand {
                index_count: mesh.index_count,
                instance_count: 1,
                first_index: mesh.first_index,
                vertex_offset: mesh.vertex_offset,
                first_instance: mesh.mesh_index,
            })
            .collect();
        if self.indirect[frame.slot].set_data(device, bytemuck::cast_slice(&draws)) {
            self.indirect_draws[frame.slot] = count as u32;
        }
        Ok(())
    }

    fn record_transfers(&mut self, frame: &FrameInfo, scene: &Scene, cmd: &mut dyn CommandSink) {
        let count = (self.indirect_draws[frame.slot] as usize).min(scene.mesh_transforms().len());
        if !self.enabled || count == 0 {
            return;
        }

        self.staging.clear();
        self.staging.extend(scene.mesh_transforms()[..count].iter().map(to_gpu_matrix));
        let bytes: &[u8] = bytemuck::cast_slice(&self.staging);
        let buffer = self.transforms[frame.slot].handle();
        for (i, chunk) in bytes.chunks(MAX_UPDATE_BUFFER_BYTES).enumerate() {
            cmd.update_buffer(buffer, (i * MAX_UPDATE_BUFFER_BYTES) as u64, chunk);
        }
    }

    fn record_draw_commands(&mut self, frame: &FrameInfo, _scene: &Scene, cmd: &mut dyn CommandSink) {
        let draws = self.indirect_draws[frame.slot];
        let Some(geometry) = &self.geometry else {
            return;
        };
        if !self.enabled || draws == 0 {
            return;
        }

        cmd.bind_pipeline(self.pipeline);
        if let Some(sets) = &self.descriptor_sets {
            cmd.bind_descriptor_set(self.pipeline, 0, sets[frame.slot]);
        }
        let view_projection = to_gpu_matrix(&frame.view_projection);
        cmd.push_constants(self.pipeline, ShaderStages::VERTEX, 0, bytemuck::bytes_of(&view_projection));
        cmd.bind_vertex_buffer(0, geometry.vertex.handle(), 0);
        cmd.bind_index_buffer(geometry.index.handle(), 0, IndexType::U32);
        cmd.draw_indexed_indirect(self.indirect[frame.slot].handle(), 0, draws, INDIRECT_STRIDE);
    }

    fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        ui.checkbox("enabled", &mut self.enabled);
        ui.value("mesh capacity", &self.max_meshes);
        ui.value("pending geometry releases", &self.retired.len());
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for buffer in mem::take(&mut self.transforms) {
            buffer.destroy(device);
        }
        for buffer in mem::take(&mut self.indirect) {
            buffer.destroy(device);
        }
        if let Some(geometry) = self.geometry.take() {
            geometry.destroy(device);
        }
        for (_, geometry) in mem::take(&mut self.retired) {
            geometry.destroy(device);
        }
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
    use crate::assets::Vertex;
    use crate::config::RendererConfig;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::{FrameDriver, HeadlessBackend, LayerStack, RecordedCommand};

    fn quad_scene() -> Scene {
        let mut scene = Scene::new("meshes");
        let (vertex_offset, first_index) = scene.append_geometry(&[Vertex::default(); 4], &[0, 1, 2, 2, 3, 0]);
        for x in 0..2 {
            let node = scene.add_node(None, 1, format!("quad{x}")).unwrap();
            scene
                .set_transform(node, Mat4::new_translation(&Vec3::new(x as f32, 0.0, 0.0)))
                .unwrap();
            scene.attach_mesh(node, first_index, 6, vertex_offset).unwrap();
        }
        scene
    }

    fn setup(frames: usize, max_meshes: usize) -> (HeadlessBackend, FrameDriver, LayerStack, crate::render::LayerId) {
        let mut backend = HeadlessBackend::new(frames);
        let pipeline = backend.register_pipeline("mesh");
        let layer = MultiMeshLayer::new(&mut backend, pipeline, frames, max_meshes).unwrap();
        let mut layers = LayerStack::new();
        let id = layers.push(layer);
        let driver = FrameDriver::new(frames, &RendererConfig::default().with_frames_in_flight(frames));
        (backend, driver, layers, id)
    }

    #[test]
    fn test_draws_all_meshes_indirectly() {
        let (mut backend, mut driver, mut layers, id) = setup(2, 16);
        let mut scene = quad_scene();

        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();

        let commands = &backend.submissions()[0].commands;
        let update_at = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::UpdateBuffer { .. }))
            .unwrap();
        let pass_at = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::BeginRendering { .. }))
            .unwrap();
        assert!(update_at < pass_at);
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::DrawIndexedIndirect { draw_count: 2, stride: 20, .. }
        )));
        assert_eq!(layers.get::<MultiMeshLayer>(id).unwrap().draw_count(0), 2);
    }

    #[test]
    fn test_transform_buffer_holds_world_matrices() {
        let (mut backend, mut driver, mut layers, id) = setup(2, 16);
        let mut scene = quad_scene();

        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();

        let buffer = layers.get::<MultiMeshLayer>(id).unwrap().transform_buffer(0);
        let contents = backend.buffer_contents(buffer).unwrap();
        let matrices: &[[[f32; 4]; 4]] = bytemuck::cast_slice(&contents[..2 * 64]);
        assert_eq!(matrices[1], to_gpu_matrix(&Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0))));
    }

    #[test]
    fn test_capacity_limits_draws() {
        let (mut backend, mut driver, mut layers, id) = setup(1, 1);
        let mut scene = quad_scene();

        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();

        assert_eq!(layers.get::<MultiMeshLayer>(id).unwrap().draw_count(0), 1);
    }

    #[test]
    fn test_empty_scene_records_nothing() {
        let (mut backend, mut driver, mut layers, _) = setup(2, 4);
        let mut scene = Scene::new("empty");

        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();

        assert_eq!(
            backend.submissions()[0].commands,
            vec![
                RecordedCommand::BeginRendering {
                    clear_color: Some(RendererConfig::default().clear_color)
                },
                RecordedCommand::EndRendering
            ]
        );
    }

    #[test]
    fn test_geometry_growth_retires_old_buffers() {
        let (mut backend, mut driver, mut layers, _) = setup(2, 16);
        let mut scene = quad_scene();
        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();
        let after_first = backend.live_buffers();

        scene.append_geometry(&[Vertex::default(); 3], &[0, 1, 2]);
        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();
        // Replacement uploaded while the old pair is still referenced
        assert_eq!(backend.live_buffers(), after_first + 2);

        for _ in 0..3 {
            driver
                .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
                .unwrap();
        }
        assert_eq!(backend.live_buffers(), after_first);
    }

    /// Headless device whose writes can be switched off
    struct FlakyDevice {
        inner: HeadlessBackend,
        fail_writes: bool,
    }

    impl GpuDevice for FlakyDevice {
        fn create_buffer(&mut self, desc: &crate::render::BufferDesc) -> RenderResult<crate::render::BufferHandle> {
            self.inner.create_buffer(desc)
        }

        fn write_buffer(&mut self, buffer: crate::render::BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
            if self.fail_writes {
                return Err(crate::render::RenderError::UnknownBuffer(buffer));
            }
            self.inner.write_buffer(buffer, offset, data)
        }

        fn buffer_size(&self, buffer: crate::render::BufferHandle) -> Option<u64> {
            self.inner.buffer_size(buffer)
        }

        fn destroy_buffer(&mut self, buffer: crate::render::BufferHandle) {
            self.inner.destroy_buffer(buffer);
        }
    }

    fn frame_info(frame_index: u64) -> FrameInfo {
        FrameInfo {
            frame_index,
            slot: 0,
            frames_in_flight: 1,
            image_index: 0,
            delta_time: 0.016,
            extent: (800, 600),
            view_projection: Mat4::identity(),
        }
    }

    #[test]
    fn test_failed_geometry_upload_is_retried() {
        let mut inner = HeadlessBackend::new(1);
        let pipeline = inner.register_pipeline("mesh");
        let mut device = FlakyDevice { inner, fail_writes: true };
        let mut layer = MultiMeshLayer::new(&mut device, pipeline, 1, 4).unwrap();
        let mut scene = quad_scene();
        let baseline = device.inner.live_buffers();

        layer.update(&frame_info(0), &mut scene, &mut device).unwrap();
        assert!(layer.geometry.is_none());
        assert_eq!(device.inner.live_buffers(), baseline);

        device.fail_writes = false;
        layer.update(&frame_info(1), &mut scene, &mut device).unwrap();
        let geometry = layer.geometry.as_ref().unwrap();
        assert_eq!(geometry.vertex_count, 4);
        assert_eq!(geometry.index_count, 6);
        assert_eq!(device.inner.live_buffers(), baseline + 2);
        assert_eq!(layer.draw_count(0), 2);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (mut backend, mut driver, mut layers, _) = setup(2, 16);
        let mut scene = quad_scene();
        driver
            .render_frame(&mut backend, &mut layers, &mut scene, 0.016, Mat4::identity())
            .unwrap();

        crate::render::FrameBackend::wait_idle(&mut backend).unwrap();
        layers.destroy_all(&mut backend);

        assert_eq!(backend.live_buffers(), 0);
    }
}
