//! Scene viewer demo
//!
//! Builds a small fleet of boxes orbiting a pivot, optionally grafts an OBJ
//! model under it, and renders a fixed number of frames through the
//! in-memory backend.
//!
//! Usage: `scene_viewer [config.toml|config.ron] [model.obj] [--frames N]`

use rand::Rng;
use scene_engine::assets::ObjImporter;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::{Panel, TextDebugUi};
use scene_engine::scene::Material;

const SHIP_COUNT: usize = 24;
const DEFAULT_FRAMES: u32 = 120;

struct ViewerArgs {
    config_path: Option<String>,
    model_path: Option<String>,
    frames: u32,
}

impl ViewerArgs {
    fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        let mut args = Self {
            config_path: None,
            model_path: None,
            frames: DEFAULT_FRAMES,
        };
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            if arg == "--frames" {
                let value = iter.next().ok_or("--frames needs a value")?;
                args.frames = value.parse()?;
            } else if arg.ends_with(".obj") {
                args.model_path = Some(arg);
            } else {
                args.config_path = Some(arg);
            }
        }
        Ok(args)
    }
}

/// Closes after a fixed number of polls, nudging the camera on the way
struct ScriptedEvents {
    remaining: u32,
    polled: u32,
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self, events: &mut Vec<InputEvent>) -> bool {
        if self.remaining == 0 {
            return false;
        }
        match self.polled {
            0 => events.push(InputEvent::KeyPressed { key: KeyCode::W, repeat: 0 }),
            30 => events.push(InputEvent::KeyReleased(KeyCode::W)),
            40 => events.push(InputEvent::MouseMoved { x: 20.0, y: 20.0 }),
            41 => events.push(InputEvent::MouseButton {
                button: MouseButton::Left,
                pressed: true,
            }),
            _ => {}
        }
        self.remaining -= 1;
        self.polled += 1;
        true
    }
}

struct ViewerApp {
    model_path: Option<String>,
    pivot: Option<Entity>,
    overlay: Option<LayerId>,
    lines: Option<LayerId>,
    angle: f32,
}

impl ViewerApp {
    fn new(model_path: Option<String>) -> Self {
        Self {
            model_path,
            pivot: None,
            overlay: None,
            lines: None,
            angle: 0.0,
        }
    }

    fn build_fleet(&mut self, scene: &mut Scene) -> Result<Entity, AppError> {
        let (vertices, indices) = unit_cube();
        let (vertex_offset, first_index) = scene.append_geometry(&vertices, &indices);
        let hull = scene.add_material(Material::new("hull", [0.7, 0.7, 0.75, 1.0]));

        let pivot = scene.add_node(None, 1, "fleet")?;
        let mut rng = rand::thread_rng();
        let mut first = None;
        for i in 0..SHIP_COUNT {
            let ship = scene.add_node(Some(pivot), 2, format!("ship-{i}"))?;
            let offset = Vec3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-20.0..20.0),
            );
            scene.set_transform(ship, Mat4::new_translation(&offset))?;
            scene.attach_mesh(ship, first_index, indices.len() as u32, vertex_offset)?;
            scene.set_material(ship, hull)?;
            first.get_or_insert(ship);
        }

        if let Some(path) = &self.model_path {
            let model = ObjImporter::new().import(std::path::Path::new(path))?;
            let nodes = scene.add_imported_model(Some(pivot), &model)?;
            log::info!("Imported {} nodes from {}", nodes.len(), path);
        }

        self.pivot = Some(pivot);
        first.ok_or_else(|| AppError::Custom("fleet is empty".to_string()))
    }
}

impl Application for ViewerApp {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        let first_ship = self.build_fleet(engine.scene_mut())?;
        let frames = engine.config().renderer.frames_in_flight;
        let max_meshes = engine.scene().meshes().len().max(1);

        let backend = engine
            .backend_mut()
            .as_any_mut()
            .downcast_mut::<HeadlessBackend>()
            .ok_or_else(|| AppError::Custom("viewer needs the headless backend".to_string()))?;
        let mesh_pipeline = backend.register_pipeline("mesh");
        let grid_pipeline = backend.register_pipeline("grid");
        let line_pipeline = backend.register_pipeline("lines");
        let overlay_pipeline = backend.register_pipeline("overlay");

        let meshes = MultiMeshLayer::new(engine.device(), mesh_pipeline, frames, max_meshes)?;
        let mut lines = LineCanvasLayer::new(engine.device(), line_pipeline, frames, 64)?;
        lines.axes(Vec3::zeros(), 2.0);

        let mut overlay = OverlayLayer::new(overlay_pipeline);
        overlay.add_panel(Panel::new("Inspector", 0.0, 0.0, 260.0, 180.0));
        overlay.select(Some(first_ship));

        engine.add_layer(GridLayer::new(grid_pipeline));
        engine.add_layer(meshes);
        self.lines = Some(engine.add_layer(lines));
        self.overlay = Some(engine.add_layer(overlay));
        Ok(())
    }

    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError> {
        self.angle += delta_time * 0.5;
        if let Some(pivot) = self.pivot {
            let rotation = Mat4::from_axis_angle(&Vec3::y_axis(), self.angle);
            engine.scene_mut().set_transform(pivot, rotation)?;
        }

        // Box the selected ship using last frame's world position
        let selected = self
            .overlay
            .and_then(|id| engine.layer::<OverlayLayer>(id))
            .and_then(|overlay| overlay.selection_info())
            .map(|info| info.world_position);
        if let (Some(center), Some(id)) = (selected, self.lines) {
            if let Some(lines) = engine.layer_mut::<LineCanvasLayer>(id) {
                lines.clear();
                lines.axes(Vec3::zeros(), 2.0);
                let half = Vec3::new(0.6, 0.6, 0.6);
                lines.aabb(center - half, center + half, [1.0, 0.8, 0.0, 1.0]);
            }
        }
        Ok(())
    }

    fn cleanup(&mut self, engine: &mut Engine) {
        let mut ui = TextDebugUi::new();
        engine.render_debug_ui(&mut ui);
        log::info!("Layer state at exit:\n{}", ui.text());
        engine.scene().log_transforms();
    }
}

fn unit_cube() -> (Vec<Vertex>, Vec<u32>) {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = [
                normal[0] * 0.5 + u[0] * su + v[0] * sv,
                normal[1] * 0.5 + u[1] * su + v[1] * sv,
                normal[2] * 0.5 + u[2] * su + v[2] * sv,
            ];
            vertices.push(Vertex::new(position, normal, [su + 0.5, sv + 0.5]));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ViewerArgs::parse()?;
    let config = match &args.config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    logging::init(&config.log_level);
    log::info!("Starting scene viewer for {} frames", args.frames);

    let backend = HeadlessBackend::new(config.renderer.frames_in_flight);
    let mut engine = Engine::new(config, Box::new(backend))?;
    let mut app = ViewerApp::new(args.model_path);
    let mut events = ScriptedEvents {
        remaining: args.frames,
        polled: 0,
    };

    engine.run(&mut app, &mut events)?;

    if let Some(backend) = engine.backend().as_any().downcast_ref::<HeadlessBackend>() {
        log::info!(
            "Submitted {} frames, {} buffers still live",
            engine.driver().frame_index(),
            backend.live_buffers()
        );
    }
    Ok(())
}
