//! Render layer protocol and the layer stack
//!
//! A layer is one rendering pass that owns its GPU resources. The stack runs
//! layers in registration order for update and recording, and offers input to
//! them in reverse order so the most recently added layer sees it first.

use std::any::Any;
use std::fmt;

use slotmap::{new_key_type, SlotMap};

use super::{CommandSink, GpuDevice, RenderResult};
use crate::foundation::math::Mat4;
use crate::input::{EventResponse, InputEvent};
use crate::scene::Scene;

/// Per-frame context handed to every layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Monotonic frame counter
    pub frame_index: u64,
    /// Frame slot being filled; per-slot resources are indexed with this
    pub slot: usize,
    /// Number of frame slots
    pub frames_in_flight: usize,
    /// Swapchain image acquired for this frame
    pub image_index: u32,
    /// Seconds since the previous frame
    pub delta_time: f32,
    /// Render target size in pixels
    pub extent: (u32, u32),
    /// Camera projection * view
    pub view_projection: Mat4,
}

/// A pluggable rendering pass
pub trait RenderLayer: Any {
    /// Name used in logs and debug UI
    fn name(&self) -> &str;

    /// Prepare this frame's data
    ///
    /// Runs before transform propagation. Only resources of `frame.slot` may be
    /// written: the other slots can still be in use by the GPU.
    fn update(&mut self, frame: &FrameInfo, scene: &mut Scene, device: &mut dyn GpuDevice) -> RenderResult<()> {
        let _ = (frame, scene, device);
        Ok(())
    }

    /// Record buffer updates that must land before any render pass begins
    fn record_transfers(&mut self, frame: &FrameInfo, scene: &Scene, cmd: &mut dyn CommandSink) {
        let _ = (frame, scene, cmd);
    }

    /// Record draw commands into the open render pass
    fn record_draw_commands(&mut self, frame: &FrameInfo, scene: &Scene, cmd: &mut dyn CommandSink);

    /// React to input; `Handled` hides the event from lower layers and the camera
    fn handle_input(&mut self, event: &InputEvent) -> EventResponse {
        let _ = event;
        EventResponse::Unhandled
    }

    /// Describe tunables and stats
    fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        let _ = ui;
    }

    /// Release GPU resources; the device is idle when this runs
    fn destroy(&mut self, device: &mut dyn GpuDevice);

    /// Upcast for typed access
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed access
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Immediate-mode debug UI surface
pub trait DebugUi {
    /// Start a titled section
    fn section(&mut self, title: &str);

    /// Plain text line
    fn label(&mut self, text: &str);

    /// Named read-only value
    fn value(&mut self, name: &str, value: &dyn fmt::Display);

    /// Boolean toggle; returns whether the value changed
    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool;

    /// Ranged float; returns whether the value changed
    fn slider(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool;
}

/// [`DebugUi`] that renders to text lines
///
/// Controls are displayed but never changed.
#[derive(Debug, Default)]
pub struct TextDebugUi {
    lines: Vec<String>,
}

impl TextDebugUi {
    /// Empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines produced so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whole output joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl DebugUi for TextDebugUi {
    fn section(&mut self, title: &str) {
        self.lines.push(format!("[{title}]"));
    }

    fn label(&mut self, text: &str) {
        self.lines.push(format!("  {text}"));
    }

    fn value(&mut self, name: &str, value: &dyn fmt::Display) {
        self.lines.push(format!("  {name}: {value}"));
    }

    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
        let mark = if *value { 'x' } else { ' ' };
        self.lines.push(format!("  [{mark}] {label}"));
        false
    }

    fn slider(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool {
        self.lines.push(format!("  {label}: {value:.3} ({min}..{max})"));
        false
    }
}

new_key_type! {
    /// Generation-checked identifier of a registered layer
    pub struct LayerId;
}

/// Lifecycle of a layer inside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Registered, not yet updated
    Constructed,
    /// Updated at least once
    Active,
    /// GPU resources released
    Destroyed,
}

struct LayerEntry {
    layer: Box<dyn RenderLayer>,
    state: LayerState,
}

/// Ordered collection of render layers
#[derive(Default)]
pub struct LayerStack {
    layers: SlotMap<LayerId, LayerEntry>,
    order: Vec<LayerId>,
}

impl LayerStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer on top of the stack
    pub fn push<L: RenderLayer>(&mut self, layer: L) -> LayerId {
        self.push_boxed(Box::new(layer))
    }

    /// Register an already boxed layer on top of the stack
    pub fn push_boxed(&mut self, layer: Box<dyn RenderLayer>) -> LayerId {
        log::info!("Registering render layer '{}'", layer.name());
        let id = self.layers.insert(LayerEntry {
            layer,
            state: LayerState::Constructed,
        });
        self.order.push(id);
        id
    }

    /// Destroy and unregister one layer
    ///
    /// The caller must have waited for the device to go idle.
    pub fn remove(&mut self, id: LayerId, device: &mut dyn GpuDevice) -> bool {
        let Some(mut entry) = self.layers.remove(id) else {
            return false;
        };
        self.order.retain(|&other| other != id);
        if entry.state != LayerState::Destroyed {
            entry.layer.destroy(device);
        }
        log::info!("Removed render layer '{}'", entry.layer.name());
        true
    }

    /// Number of registered layers
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no layer is registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Layer ids in registration order
    pub fn ids(&self) -> &[LayerId] {
        &self.order
    }

    /// Layer names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|&id| self.layers[id].layer.name()).collect()
    }

    /// Lifecycle state of a layer
    pub fn state(&self, id: LayerId) -> Option<LayerState> {
        self.layers.get(id).map(|entry| entry.state)
    }

    /// Typed access to a layer
    pub fn get<T: RenderLayer>(&self, id: LayerId) -> Option<&T> {
        self.layers.get(id)?.layer.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access to a layer
    pub fn get_mut<T: RenderLayer>(&mut self, id: LayerId) -> Option<&mut T> {
        self.layers.get_mut(id)?.layer.as_any_mut().downcast_mut::<T>()
    }

    /// Run every live layer's update in registration order
    pub fn update_all(&mut self, frame: &FrameInfo, scene: &mut Scene, device: &mut dyn GpuDevice) -> RenderResult<()> {
        for &id in &self.order {
            let entry = &mut self.layers[id];
            if entry.state == LayerState::Destroyed {
                continue;
            }
            entry.layer.update(frame, scene, device)?;
            entry.state = LayerState::Active;
        }
        Ok(())
    }

    /// Record every active layer's transfers in registration order
    pub fn record_transfers(&mut self, frame: &FrameInfo, scene: &Scene, cmd: &mut dyn CommandSink) {
        for &id in &self.order {
            let entry = &mut self.layers[id];
            if entry.state == LayerState::Active {
                entry.layer.record_transfers(frame, scene, cmd);
            }
        }
    }

    /// Record every active layer's draws in registration order
    pub fn record_all(&mut self, frame: &FrameInfo, scene: &Scene, cmd: &mut dyn CommandSink) {
        for &id in &self.order {
            let entry = &mut self.layers[id];
            if entry.state == LayerState::Active {
                entry.layer.record_draw_commands(frame, scene, cmd);
            }
        }
    }

    /// Offer an event to layers, topmost first, until one handles it
    pub fn dispatch_input(&mut self, event: &InputEvent) -> EventResponse {
        for &id in self.order.iter().rev() {
            let entry = &mut self.layers[id];
            if entry.state == LayerState::Destroyed {
                continue;
            }
            if entry.layer.handle_input(event).is_handled() {
                log::trace!("Input {:?} handled by '{}'", event, entry.layer.name());
                return EventResponse::Handled;
            }
        }
        EventResponse::Unhandled
    }

    /// Let every live layer describe itself
    pub fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        for &id in &self.order {
            let entry = &mut self.layers[id];
            if entry.state != LayerState::Destroyed {
                ui.section(entry.layer.name());
                entry.layer.render_debug_ui(ui);
            }
        }
    }

    /// Destroy every live layer, topmost first
    ///
    /// The caller must have waited for the device to go idle. Calling this
    /// again is a no-op.
    pub fn destroy_all(&mut self, device: &mut dyn GpuDevice) {
        for &id in self.order.iter().rev() {
            let entry = &mut self.layers[id];
            if entry.state != LayerState::Destroyed {
                log::debug!("Destroying render layer '{}'", entry.layer.name());
                entry.layer.destroy(device);
                entry.state = LayerState::Destroyed;
            }
        }
    }
}

impl fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::render::HeadlessBackend;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Layer that logs every call into a shared journal
    pub(crate) struct JournalLayer {
        pub name: String,
        pub journal: Rc<RefCell<Vec<String>>>,
        pub consume: bool,
        pub fail_update: bool,
    }

    impl JournalLayer {
        pub fn new(name: &str, journal: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                journal: Rc::clone(journal),
                consume: false,
                fail_update: false,
            }
        }

        fn log(&self, what: &str) {
            self.journal.borrow_mut().push(format!("{}:{}", self.name, what));
        }
    }

    impl RenderLayer for JournalLayer {
        fn name(&self) -> &str {
            &self.name
        }

        fn update(&mut self, _frame: &FrameInfo, _scene: &mut Scene, _device: &mut dyn GpuDevice) -> RenderResult<()> {
            self.log("update");
            if self.fail_update {
                return Err(crate::render::RenderError::RenderingFailed("journal".to_string()));
            }
            Ok(())
        }

        fn record_draw_commands(&mut self, _frame: &FrameInfo, _scene: &Scene, cmd: &mut dyn CommandSink) {
            self.log("record");
            cmd.draw(3, 1, 0, 0);
        }

        fn handle_input(&mut self, _event: &InputEvent) -> EventResponse {
            self.log("input");
            if self.consume {
                EventResponse::Handled
            } else {
                EventResponse::Unhandled
            }
        }

        fn destroy(&mut self, _device: &mut dyn GpuDevice) {
            self.log("destroy");
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    pub(crate) fn frame_info(slot: usize) -> FrameInfo {
        FrameInfo {
            frame_index: 0,
            slot,
            frames_in_flight: 2,
            image_index: 0,
            delta_time: 1.0 / 60.0,
            extent: (800, 600),
            view_projection: Mat4::identity(),
        }
    }

    #[test]
    fn test_update_runs_in_registration_order() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        stack.push(JournalLayer::new("a", &journal));
        stack.push(JournalLayer::new("b", &journal));
        let mut scene = Scene::new("test");
        let mut backend = HeadlessBackend::new(2);

        stack.update_all(&frame_info(0), &mut scene, &mut backend).unwrap();

        assert_eq!(*journal.borrow(), vec!["a:update", "b:update"]);
        assert_eq!(stack.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_input_reaches_topmost_first_and_stops() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        stack.push(JournalLayer::new("bottom", &journal));
        let mut middle = JournalLayer::new("middle", &journal);
        middle.consume = true;
        stack.push(middle);
        stack.push(JournalLayer::new("top", &journal));

        let response = stack.dispatch_input(&InputEvent::Scroll { dx: 0.0, dy: 1.0 });

        assert_eq!(response, EventResponse::Handled);
        assert_eq!(*journal.borrow(), vec!["top:input", "middle:input"]);
    }

    #[test]
    fn test_typed_access_and_states() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        let id = stack.push(JournalLayer::new("journal", &journal));
        assert_eq!(stack.state(id), Some(LayerState::Constructed));

        let mut scene = Scene::new("test");
        let mut backend = HeadlessBackend::new(2);
        stack.update_all(&frame_info(0), &mut scene, &mut backend).unwrap();
        assert_eq!(stack.state(id), Some(LayerState::Active));

        stack.get_mut::<JournalLayer>(id).unwrap().consume = true;
        assert!(stack.get::<JournalLayer>(id).unwrap().consume);
        assert!(stack.get::<crate::render::GridLayer>(id).is_none());

        stack.destroy_all(&mut backend);
        stack.destroy_all(&mut backend);
        assert_eq!(stack.state(id), Some(LayerState::Destroyed));
        assert_eq!(journal.borrow().iter().filter(|e| e.ends_with("destroy")).count(), 1);
    }

    #[test]
    fn test_removed_id_is_stale() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        let mut backend = HeadlessBackend::new(2);
        let old = stack.push(JournalLayer::new("old", &journal));

        assert!(stack.remove(old, &mut backend));
        let new = stack.push(JournalLayer::new("new", &journal));

        assert!(stack.get::<JournalLayer>(old).is_none());
        assert!(!stack.remove(old, &mut backend));
        assert_eq!(stack.get::<JournalLayer>(new).map(|l| l.name.as_str()), Some("new"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_constructed_layers_are_not_recorded() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        stack.push(JournalLayer::new("idle", &journal));
        let scene = Scene::new("test");
        let mut backend = HeadlessBackend::new(2);

        stack.record_all(&frame_info(0), &scene, backend.command_sink(0));
        assert!(journal.borrow().is_empty());
    }

    #[test]
    fn test_text_debug_ui() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let mut stack = LayerStack::new();
        stack.push(JournalLayer::new("journal", &journal));
        let mut ui = TextDebugUi::new();
        let mut enabled = true;

        stack.render_debug_ui(&mut ui);
        ui.checkbox("enabled", &mut enabled);

        assert_eq!(ui.lines()[0], "[journal]");
        assert!(ui.text().contains("[x] enabled"));
    }
}
