//! The hook points a program plugs into [`Engine::run`]

use crate::assets::ImportError;
use crate::config::ConfigError;
use crate::engine::{Engine, EngineError};
use crate::render::RenderError;
use crate::scene::SceneError;
use thiserror::Error;

/// Program driven by the engine's frame loop
///
/// `initialize` runs once before the first poll, `update` once per frame
/// between input dispatch and rendering, and `cleanup` once after the loop
/// stops for any reason, while layers and the scene are still alive.
pub trait Application {
    /// Build the scene and register layers
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Advance program state by `delta_time` seconds
    ///
    /// Scene edits made here are propagated before the frame is recorded.
    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Release program-owned resources
    fn cleanup(&mut self, engine: &mut Engine);
}

/// Errors an [`Application`] hook may return
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine call failed
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    /// Scene edit rejected
    #[error("scene: {0}")]
    Scene(#[from] SceneError),

    /// Layer or backend failure
    #[error("render: {0}")]
    Render(#[from] RenderError),

    /// Model import failed
    #[error("import: {0}")]
    Asset(#[from] ImportError),

    /// Settings could not be loaded
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Anything else the program wants to report
    #[error("{0}")]
    Custom(String),
}
