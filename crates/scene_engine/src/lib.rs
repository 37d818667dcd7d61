//! # Scene Engine
//!
//! A scene graph with level-ordered transform propagation, driven by a layered
//! frame loop that renders through Vulkan.
//!
//! ## Features
//!
//! - **Scene graph**: flat component arrays, linked child lists, per-level
//!   dirty sets resolved top-down once per frame
//! - **Render layers**: independent layers updated and recorded in
//!   registration order, input offered topmost first
//! - **Frame driver**: frames in flight with per-slot fences, command buffers
//!   and buffers
//! - **Backends**: Vulkan via `ash`, and an in-memory backend for tests and
//!   headless runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
//!         let node = engine.scene_mut().add_node(None, 1, "box")?;
//!         engine.scene_mut().set_transform(node, Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)))?;
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
//!         Ok(())
//!     }
//!
//!     fn cleanup(&mut self, _engine: &mut Engine) {}
//! }
//!
//! struct NoEvents;
//!
//! impl EventSource for NoEvents {
//!     fn poll(&mut self, _events: &mut Vec<InputEvent>) -> bool {
//!         false
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let backend = HeadlessBackend::new(config.renderer.frames_in_flight);
//!     let mut engine = Engine::new(config, Box::new(backend))?;
//!     engine.run(&mut MyApp, &mut NoEvents)?;
//!     Ok(())
//! }
//! ```

pub mod foundation;
pub mod config;
pub mod input;
pub mod scene;
pub mod assets;
pub mod render;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        AppError, Application, Engine, EngineError,
        assets::{AssetImporter, ImportedModel, Vertex},
        config::{Config, EngineConfig},
        foundation::{
            math::{Mat4, Quat, Vec3},
            time::Timer,
        },
        input::{EventResponse, EventSource, InputEvent, KeyCode, MouseButton},
        render::{
            Camera, CameraController, FrameBackend, GridLayer, HeadlessBackend, LayerId,
            LineCanvasLayer, MultiMeshLayer, OverlayLayer, RenderLayer,
        },
        scene::{Entity, Scene},
    };
}
