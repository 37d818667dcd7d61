//! Core engine implementation

use crate::{
    application::Application,
    config::{ConfigError, EngineConfig},
    foundation::{math::Vec3, time::Timer},
    input::{EventResponse, EventSource, InputEvent, InputState},
    render::{
        Camera, CameraController, DebugUi, FirstPersonController, FrameBackend, FrameDriver,
        FrameStats, GpuDevice, LayerId, LayerStack, RenderError, RenderLayer,
    },
    scene::{Scene, SceneError},
};
use thiserror::Error;

/// Main engine struct
///
/// Owns the scene, the layer stack, the camera and the frame driver, and
/// passes them explicitly into every frame. There is no global instance.
pub struct Engine {
    config: EngineConfig,
    scene: Scene,
    layers: LayerStack,
    camera: Box<dyn CameraController>,
    driver: FrameDriver,
    backend: Box<dyn FrameBackend>,
    input: InputState,
    timer: Timer,
    running: bool,
    shut_down: bool,
}

impl Engine {
    /// Create an engine rendering through `backend`
    pub fn new(config: EngineConfig, backend: Box<dyn FrameBackend>) -> Result<Self, EngineError> {
        log::info!("Initializing engine...");
        config.validate()?;

        let frames = backend.frames_in_flight();
        if frames != config.renderer.frames_in_flight {
            return Err(EngineError::InitializationFailed(format!(
                "backend has {} frames in flight, configuration asks for {}",
                frames, config.renderer.frames_in_flight
            )));
        }

        let (width, height) = backend.extent();
        let aspect = width as f32 / height.max(1) as f32;
        let camera = Camera::from_config(Vec3::new(0.0, 2.0, 10.0), aspect, &config.camera);
        let camera = FirstPersonController::new(camera, &config.camera);
        let driver = FrameDriver::new(frames, &config.renderer);

        log::info!("Engine ready: {} frames in flight, {}x{}", frames, width, height);

        Ok(Self {
            config,
            scene: Scene::new("scene"),
            layers: LayerStack::new(),
            camera: Box::new(camera),
            driver,
            backend,
            input: InputState::new(),
            timer: Timer::new(),
            running: true,
            shut_down: false,
        })
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The scene graph
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable scene graph
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Register a layer on top of the stack
    pub fn add_layer<L: RenderLayer>(&mut self, layer: L) -> LayerId {
        self.layers.push(layer)
    }

    /// Typed access to a registered layer
    pub fn layer<T: RenderLayer>(&self, id: LayerId) -> Option<&T> {
        self.layers.get(id)
    }

    /// Typed mutable access to a registered layer
    pub fn layer_mut<T: RenderLayer>(&mut self, id: LayerId) -> Option<&mut T> {
        self.layers.get_mut(id)
    }

    /// All registered layers
    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// Destroy and unregister a layer once the GPU is idle
    pub fn remove_layer(&mut self, id: LayerId) -> Result<bool, EngineError> {
        self.backend.wait_idle()?;
        Ok(self.layers.remove(id, self.backend.device()))
    }

    /// Active camera
    pub fn camera(&self) -> &dyn CameraController {
        self.camera.as_ref()
    }

    /// Replace the camera
    pub fn set_camera(&mut self, camera: Box<dyn CameraController>) {
        self.camera = camera;
    }

    /// Frame backend
    pub fn backend(&self) -> &dyn FrameBackend {
        self.backend.as_ref()
    }

    /// Mutable frame backend
    pub fn backend_mut(&mut self) -> &mut dyn FrameBackend {
        self.backend.as_mut()
    }

    /// Resource service, for layers created after the engine
    pub fn device(&mut self) -> &mut dyn GpuDevice {
        self.backend.device()
    }

    /// Keys and buttons currently held
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Frame timing
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Frame driver state
    pub fn driver(&self) -> &FrameDriver {
        &self.driver
    }

    /// Offer an event to layers (topmost first), then to the camera
    pub fn dispatch_event(&mut self, event: &InputEvent) -> EventResponse {
        self.input.apply(event);
        if self.layers.dispatch_input(event).is_handled() {
            return EventResponse::Handled;
        }
        self.camera.handle_input(event)
    }

    /// Advance the camera and render one frame
    ///
    /// Fails with [`EngineError::ShutDown`] once [`Engine::shutdown`] has run.
    pub fn frame(&mut self, delta_time: f32) -> Result<FrameStats, EngineError> {
        if self.shut_down {
            return Err(EngineError::ShutDown);
        }
        self.camera.update(delta_time);
        let view_projection = self.camera.view_projection();
        let stats = self.driver.render_frame(
            self.backend.as_mut(),
            &mut self.layers,
            &mut self.scene,
            delta_time,
            view_projection,
        )?;
        Ok(stats)
    }

    /// Run the main loop until the event source closes or exit is requested
    ///
    /// The application is cleaned up and the engine shut down whether the
    /// loop ends normally or with an error.
    pub fn run<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        events: &mut dyn EventSource,
    ) -> Result<(), EngineError> {
        app.initialize(self)
            .map_err(|e| EngineError::ApplicationError(format!("App initialization: {}", e)))?;

        log::info!("Starting main loop...");
        let result = self.main_loop(app, events);
        if let Err(e) = &result {
            log::error!("Main loop stopped: {}", e);
        }

        app.cleanup(self);
        self.shutdown();
        log::info!(
            "Engine shutdown complete after {} frames ({:.1} fps average)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
        result
    }

    fn main_loop<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        events: &mut dyn EventSource,
    ) -> Result<(), EngineError> {
        let mut pending = Vec::new();
        self.timer = Timer::new();

        while self.running {
            pending.clear();
            if !events.poll(&mut pending) {
                log::info!("Event source closed");
                break;
            }
            for event in &pending {
                self.dispatch_event(event);
            }

            let delta_time = self.timer.tick();

            app.update(self, delta_time)
                .map_err(|e| EngineError::ApplicationError(format!("App update: {}", e)))?;
            self.frame(delta_time)?;
        }
        Ok(())
    }

    /// Ask the main loop to stop after the current frame
    pub fn request_exit(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Whether the main loop keeps going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Describe every layer
    pub fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        self.layers.render_debug_ui(ui);
    }

    /// Wait for the GPU and destroy every layer; later calls do nothing
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.backend.wait_idle() {
            log::error!("wait_idle failed during shutdown: {}", e);
        }
        self.layers.destroy_all(self.backend.device());
        self.running = false;
        self.shut_down = true;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Initialization error
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Rendering error
    #[error("Rendering error: {0}")]
    RenderError(#[from] RenderError),

    /// Scene graph error
    #[error("Scene error: {0}")]
    SceneError(#[from] SceneError),

    /// Application error
    #[error("Application error: {0}")]
    ApplicationError(String),

    /// Frame requested after shutdown destroyed the layers
    #[error("Engine has been shut down")]
    ShutDown,
}
