//! Scene graph
//!
//! Entities are plain indices into parallel component arrays. Index 0 is the
//! root, created with the scene and never removed; every other entity is
//! appended and lives for the lifetime of the scene.
//!
//! World transforms are resolved lazily: edits drop the edited entity and its
//! whole subtree into per-level dirty sets, and [`Scene::propagate_transforms`]
//! drains those sets top-down once per frame.

pub mod hierarchy;
pub mod transform;
pub mod propagation;
pub mod mesh;
pub mod graph;

pub use hierarchy::{HierarchyComponent, HierarchyStore, Children, Subtree};
pub use transform::TransformComponent;
pub use propagation::DirtySets;
pub use mesh::{MeshComponent, MeshTable, Material, MaterialId};
pub use graph::Scene;

use thiserror::Error;

/// Number of hierarchy levels the scene supports (root is level 0)
pub const MAX_LEVELS: usize = 16;

/// Scene entity identifier
///
/// An index into the scene's component arrays. Entities are never removed,
/// so an index stays valid for the lifetime of the scene that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    /// The implicit root every scene starts with
    pub const ROOT: Entity = Entity(0);

    /// Wrap a raw entity id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the entity ID
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Position in the component arrays
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Scene graph errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// A node would sit deeper than [`MAX_LEVELS`] allows
    #[error("Node level {level} exceeds the maximum hierarchy depth of {max}")]
    HierarchyTooDeep {
        /// Level the node would have had
        level: usize,
        /// Maximum number of levels
        max: usize,
    },

    /// An entity id that this scene never issued
    #[error("Unknown entity {0}")]
    UnknownEntity(Entity),

    /// Entity already carries a mesh
    #[error("Entity {0} already has a mesh attached")]
    MeshAlreadyAttached(Entity),

    /// Material id that this scene never issued
    #[error("Unknown material {0:?}")]
    UnknownMaterial(MaterialId),

    /// Imported data could not be placed in the scene
    #[error("Import error: {0}")]
    Import(#[from] crate::assets::ImportError),
}
