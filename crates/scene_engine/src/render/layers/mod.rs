//! Built-in render layers

pub mod multi_mesh;
pub mod line_canvas;
pub mod grid;
pub mod overlay;

pub use multi_mesh::MultiMeshLayer;
pub use line_canvas::{LineCanvasLayer, LineVertex};
pub use grid::GridLayer;
pub use overlay::{OverlayLayer, Panel, SelectionInfo};
