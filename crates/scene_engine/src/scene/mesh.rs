//! Mesh and material association tables
//!
//! Only some entities draw anything, so both tables are sparse maps from
//! entity to a dense slot. Each mesh slot also owns one entry of the
//! mesh-transform staging array that renderers upload to the GPU.

use std::collections::HashMap;

use super::Entity;
use crate::foundation::math::Mat4;

/// Draw range of one mesh inside the scene's flattened geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshComponent {
    /// Offset into the flattened index buffer
    pub first_index: u32,
    /// Number of indices to draw
    pub index_count: u32,
    /// Added to every index to reach the mesh's vertices
    pub vertex_offset: i32,
    /// Slot in the mesh-transform buffer
    pub mesh_index: u32,
}

/// Entity → mesh slot map plus the world matrices staged for upload
#[derive(Debug, Default, Clone)]
pub struct MeshTable {
    meshes: Vec<MeshComponent>,
    mesh_for_node: HashMap<Entity, usize>,
    owners: Vec<Entity>,
    transforms: Vec<Mat4>,
}

impl MeshTable {
    /// Register a mesh for `entity`, returning its slot
    pub(crate) fn insert(
        &mut self,
        entity: Entity,
        first_index: u32,
        index_count: u32,
        vertex_offset: i32,
        world: Mat4,
    ) -> u32 {
        let mesh_index = self.meshes.len() as u32;
        self.meshes.push(MeshComponent {
            first_index,
            index_count,
            vertex_offset,
            mesh_index,
        });
        self.mesh_for_node.insert(entity, mesh_index as usize);
        self.owners.push(entity);
        self.transforms.push(world);
        mesh_index
    }

    /// Mesh attached to `entity`
    pub fn get(&self, entity: Entity) -> Option<&MeshComponent> {
        self.mesh_for_node.get(&entity).map(|&slot| &self.meshes[slot])
    }

    /// Whether `entity` has a mesh
    pub fn contains(&self, entity: Entity) -> bool {
        self.mesh_for_node.contains_key(&entity)
    }

    /// All meshes in slot order
    pub fn meshes(&self) -> &[MeshComponent] {
        &self.meshes
    }

    /// Entity owning each mesh slot
    pub fn owners(&self) -> &[Entity] {
        &self.owners
    }

    /// World matrices indexed by `mesh_index`
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    /// Number of meshes
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether no mesh is registered
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub(crate) fn stage_transform(&mut self, entity: Entity, world: &Mat4) {
        if let Some(&slot) = self.mesh_for_node.get(&entity) {
            self.transforms[slot] = *world;
        }
    }
}

/// Identifier of a material registered with a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Surface description shared by every node that references it
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Display name
    pub name: String,
    /// Linear RGBA base colour
    pub base_color: [f32; 4],
}

impl Material {
    /// Create a material
    pub fn new(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            base_color,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", [0.8, 0.8, 0.8, 1.0])
    }
}
