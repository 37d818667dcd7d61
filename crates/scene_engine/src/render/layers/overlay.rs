//! Screen-space editor overlay
//!
//! Holds a set of rectangular panels and the current editor selection.
//! Pointer buttons and scrolling over a visible panel are consumed so the
//! camera underneath does not react to them.

use std::any::Any;

use crate::foundation::math::Vec3;
use crate::input::{EventResponse, InputEvent};
use crate::render::{
    CommandSink, DebugUi, FrameInfo, GpuDevice, PipelineHandle, RenderLayer, RenderResult,
    ShaderStages,
};
use crate::scene::{Entity, Scene};

/// A rectangle in window pixels, origin top-left
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    /// Heading drawn by the UI backend
    pub title: String,
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Hidden panels neither draw nor capture input
    pub visible: bool,
}

impl Panel {
    /// Visible panel
    pub fn new(title: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            title: title.into(),
            x,
            y,
            width,
            height,
            visible: true,
        }
    }

    /// Whether a window-space point falls inside the panel
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Resolved details of the selected node
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionInfo {
    /// Selected node
    pub entity: Entity,
    /// Its name
    pub name: String,
    /// World-space translation after the last update
    pub world_position: Vec3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct PanelRect {
    // NDC min/max
    rect: [f32; 4],
    color: [f32; 4],
}

#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for PanelRect {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for PanelRect {}

/// Panels and selection state
#[derive(Debug)]
pub struct OverlayLayer {
    pipeline: PipelineHandle,
    panels: Vec<Panel>,
    cursor: (f32, f32),
    extent: (u32, u32),
    hovered: Option<usize>,
    selection: Option<Entity>,
    selection_info: Option<SelectionInfo>,
    /// Panel fill colour
    pub panel_color: [f32; 4],
}

impl OverlayLayer {
    /// Overlay without panels
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self {
            pipeline,
            panels: Vec::new(),
            cursor: (0.0, 0.0),
            extent: (1, 1),
            hovered: None,
            selection: None,
            selection_info: None,
            panel_color: [0.1, 0.1, 0.12, 0.85],
        }
    }

    /// Add a panel; returns its index
    pub fn add_panel(&mut self, panel: Panel) -> usize {
        self.panels.push(panel);
        self.refresh_hover();
        self.panels.len() - 1
    }

    /// All panels
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Panel by index
    pub fn panel_mut(&mut self, index: usize) -> Option<&mut Panel> {
        self.panels.get_mut(index)
    }

    /// Index of the topmost visible panel under the cursor
    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    /// Select a node, or clear the selection
    pub fn select(&mut self, entity: Option<Entity>) {
        if self.selection != entity {
            log::debug!("Overlay selection: {:?}", entity);
        }
        self.selection = entity;
        if entity.is_none() {
            self.selection_info = None;
        }
    }

    /// Selected node
    pub fn selection(&self) -> Option<Entity> {
        self.selection
    }

    /// Details of the selected node, refreshed on every update
    pub fn selection_info(&self) -> Option<&SelectionInfo> {
        self.selection_info.as_ref()
    }

    fn refresh_hover(&mut self) {
        let (x, y) = self.cursor;
        self.hovered = self
            .panels
            .iter()
            .rposition(|panel| panel.visible && panel.contains(x, y));
    }

    fn to_ndc(&self, panel: &Panel) -> [f32; 4] {
        let width = self.extent.0.max(1) as f32;
        let height = self.extent.1.max(1) as f32;
        [
            panel.x / width * 2.0 - 1.0,
            panel.y / height * 2.0 - 1.0,
            (panel.x + panel.width) / width * 2.0 - 1.0,
            (panel.y + panel.height) / height * 2.0 - 1.0,
        ]
    }
}

impl RenderLayer for OverlayLayer {
    fn name(&self) -> &str {
        "overlay"
    }

    fn update(&mut self, frame: &FrameInfo, scene: &mut Scene, _device: &mut dyn GpuDevice) -> RenderResult<()> {
        if self.extent != frame.extent {
            self.extent = frame.extent;
            self.refresh_hover();
        }

        self.selection_info = match self.selection {
            Some(entity) if scene.contains(entity) => {
                let world = scene.transform(entity).world_transform();
                Some(SelectionInfo {
                    entity,
                    name: scene.node_name(entity).to_string(),
                    world_position: Vec3::new(world.m14, world.m24, world.m34),
                })
            }
            Some(entity) => {
                log::warn!("Dropping selection of unknown node {}", entity);
                self.selection = None;
                None
            }
            None => None,
        };
        Ok(())
    }

    fn record_draw_commands(&mut self, _frame: &FrameInfo, _scene: &Scene, cmd: &mut dyn CommandSink) {
        let mut bound = false;
        for panel in self.panels.iter().filter(|p| p.visible) {
            if !bound {
                cmd.bind_pipeline(self.pipeline);
                bound = true;
            }
            let rect = PanelRect {
                rect: self.to_ndc(panel),
                color: self.panel_color,
            };
            cmd.push_constants(
                self.pipeline,
                ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                0,
                bytemuck::bytes_of(&rect),
            );
            cmd.draw(6, 1, 0, 0);
        }
    }

    fn handle_input(&mut self, event: &InputEvent) -> EventResponse {
        match *event {
            InputEvent::MouseMoved { x, y } => {
                self.cursor = (x as f32, y as f32);
                self.refresh_hover();
                EventResponse::Unhandled
            }
            InputEvent::MouseButton { .. } | InputEvent::Scroll { .. } if self.hovered.is_some() => {
                EventResponse::Handled
            }
            InputEvent::WindowResized { width, height } => {
                self.extent = (width, height);
                self.refresh_hover();
                EventResponse::Unhandled
            }
            _ => EventResponse::Unhandled,
        }
    }

    fn render_debug_ui(&mut self, ui: &mut dyn DebugUi) {
        for panel in &mut self.panels {
            ui.checkbox(&panel.title, &mut panel.visible);
        }
        match &self.selection_info {
            Some(info) => {
                ui.value("selected", &info.name);
                let p = info.world_position;
                ui.label(&format!("at ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z));
            }
            None => ui.label("nothing selected"),
        }
    }

    fn destroy(&mut self, _device: &mut dyn GpuDevice) {
        self.selection = None;
        self.selection_info = None;
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
    use crate::foundation::math::Mat4;
    use crate::input::MouseButton;
    use crate::render::layer::tests::frame_info;
    use crate::render::{HeadlessBackend, TextDebugUi};
    use approx::assert_relative_eq;

    fn overlay_with_panel() -> OverlayLayer {
        let mut overlay = OverlayLayer::new(PipelineHandle(7));
        overlay.add_panel(Panel::new("Inspector", 10.0, 10.0, 200.0, 100.0));
        overlay
    }

    #[test]
    fn test_panel_contains() {
        let panel = Panel::new("p", 0.0, 0.0, 10.0, 10.0);
        assert!(panel.contains(0.0, 9.5));
        assert!(!panel.contains(10.0, 5.0));
    }

    #[test]
    fn test_hovered_panel_consumes_clicks() {
        let mut overlay = overlay_with_panel();
        let click = InputEvent::MouseButton {
            button: MouseButton::Left,
            pressed: true,
        };

        assert_eq!(overlay.handle_input(&InputEvent::MouseMoved { x: 50.0, y: 50.0 }), EventResponse::Unhandled);
        assert_eq!(overlay.hovered(), Some(0));
        assert_eq!(overlay.handle_input(&click), EventResponse::Handled);
        assert_eq!(overlay.handle_input(&InputEvent::Scroll { dx: 0.0, dy: 1.0 }), EventResponse::Handled);

        overlay.handle_input(&InputEvent::MouseMoved { x: 500.0, y: 500.0 });
        assert_eq!(overlay.handle_input(&click), EventResponse::Unhandled);
    }

    #[test]
    fn test_hidden_panel_passes_input() {
        let mut overlay = overlay_with_panel();
        if let Some(panel) = overlay.panel_mut(0) {
            panel.visible = false;
        }
        overlay.handle_input(&InputEvent::MouseMoved { x: 50.0, y: 50.0 });

        assert_eq!(overlay.hovered(), None);
        assert_eq!(
            overlay.handle_input(&InputEvent::Scroll { dx: 0.0, dy: 1.0 }),
            EventResponse::Unhandled
        );
    }

    #[test]
    fn test_selection_tracks_world_position() {
        let mut backend = HeadlessBackend::new(2);
        let mut scene = Scene::new("overlay");
        let node = scene.add_node(None, 1, "crate").unwrap();
        scene
            .set_transform(node, Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        scene.propagate_transforms();

        let mut overlay = overlay_with_panel();
        overlay.select(Some(node));
        overlay.update(&frame_info(0), &mut scene, &mut backend).unwrap();

        let info = overlay.selection_info().unwrap();
        assert_eq!(info.name, "crate");
        assert_relative_eq!(info.world_position, Vec3::new(1.0, 2.0, 3.0));

        let mut ui = TextDebugUi::new();
        overlay.render_debug_ui(&mut ui);
        assert!(ui.text().contains("selected: crate"));
    }

    #[test]
    fn test_unknown_selection_dropped() {
        let mut backend = HeadlessBackend::new(2);
        let mut scene = Scene::new("overlay");
        let mut overlay = overlay_with_panel();
        overlay.select(Some(Entity::from_index(42)));

        overlay.update(&frame_info(0), &mut scene, &mut backend).unwrap();

        assert_eq!(overlay.selection(), None);
        assert!(overlay.selection_info().is_none());
    }
}
