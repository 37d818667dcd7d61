//! Asset import boundary
//!
//! Importers turn a file into an [`ImportedModel`]: one flattened vertex list,
//! one flattened index list and a parent-indexed node tree. The scene copies
//! that into its own stores with [`Scene::add_imported_model`](crate::scene::Scene::add_imported_model).

#[cfg(feature = "obj")]
pub mod obj;

#[cfg(feature = "obj")]
pub use obj::ObjImporter;

use std::path::Path;

use thiserror::Error;

use crate::foundation::math::Mat4;
use crate::scene::Material;

/// Vertex layout shared by imported geometry and the mesh layer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

// Safe: only f32 arrays, no padding
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for Vertex {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Create a vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Flattened vertex and index storage
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// All vertices
    pub vertices: Vec<Vertex>,
    /// All indices, relative to each mesh's vertex offset
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Append another geometry block, returning its `(vertex_offset, first_index)`
    pub fn append(&mut self, vertices: &[Vertex], indices: &[u32]) -> (i32, u32) {
        let vertex_offset = self.vertices.len() as i32;
        let first_index = self.indices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        (vertex_offset, first_index)
    }
}

/// Index range of an imported mesh, relative to the model's own geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedMesh {
    /// Offset into the model's index list
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Base vertex within the model's vertex list
    pub vertex_offset: i32,
}

/// One node of an imported tree
#[derive(Debug, Clone)]
pub struct ImportedNode {
    /// Node name
    pub name: String,
    /// Index of the parent node; `None` attaches to the import target
    pub parent: Option<usize>,
    /// Local transform relative to the parent
    pub transform: Mat4,
    /// Mesh drawn at this node
    pub mesh: Option<ImportedMesh>,
    /// Index into the model's material list
    pub material: Option<usize>,
}

/// Everything an importer produced for one file
#[derive(Debug, Clone, Default)]
pub struct ImportedModel {
    /// Flattened geometry
    pub geometry: Geometry,
    /// Nodes; a parent always precedes its children
    pub nodes: Vec<ImportedNode>,
    /// Materials referenced by nodes
    pub materials: Vec<Material>,
}

impl ImportedModel {
    /// Check that parents precede children and every reference is in range
    pub fn validate(&self) -> Result<(), ImportError> {
        let index_count = self.geometry.indices.len();
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent >= index {
                    return Err(ImportError::MalformedTree(format!(
                        "node {} ('{}') references parent {} which does not precede it",
                        index, node.name, parent
                    )));
                }
            }
            if let Some(mesh) = node.mesh {
                let end = mesh.first_index as usize + mesh.index_count as usize;
                if end > index_count {
                    return Err(ImportError::MalformedTree(format!(
                        "node '{}' draws indices up to {} but only {} exist",
                        node.name, end, index_count
                    )));
                }
            }
            if let Some(material) = node.material {
                if material >= self.materials.len() {
                    return Err(ImportError::MalformedTree(format!(
                        "node '{}' references missing material {}",
                        node.name, material
                    )));
                }
            }
        }
        Ok(())
    }

    /// Depth of every node inside the imported tree (top-level nodes are 0)
    pub fn node_depths(&self) -> Vec<usize> {
        let mut depths = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let depth = node.parent.map_or(0, |parent| depths[parent] + 1);
            depths.push(depth);
        }
        depths
    }
}

/// Asset import errors
#[derive(Error, Debug)]
pub enum ImportError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file could not be parsed
    #[error("Parse error in {path}: {reason}")]
    Parse {
        /// File being imported
        path: String,
        /// Parser message
        reason: String,
    },

    /// The node tree is inconsistent
    #[error("Malformed node tree: {0}")]
    MalformedTree(String),
}

/// Turns files into [`ImportedModel`]s
pub trait AssetImporter {
    /// Import the file at `path`
    fn import(&self, path: &Path) -> Result<ImportedModel, ImportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, parent: Option<usize>) -> ImportedNode {
        ImportedNode {
            name: name.to_string(),
            parent,
            transform: Mat4::identity(),
            mesh: None,
            material: None,
        }
    }

    #[test]
    fn test_node_depths() {
        let model = ImportedModel {
            nodes: vec![node("a", None), node("b", Some(0)), node("c", Some(1)), node("d", None)],
            ..Default::default()
        };

        assert_eq!(model.node_depths(), vec![0, 1, 2, 0]);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_forward_parent_rejected() {
        let model = ImportedModel {
            nodes: vec![node("a", Some(1)), node("b", None)],
            ..Default::default()
        };

        assert!(matches!(model.validate(), Err(ImportError::MalformedTree(_))));
    }

    #[test]
    fn test_mesh_range_checked() {
        let mut model = ImportedModel::default();
        model.geometry.append(&[Vertex::default(); 3], &[0, 1, 2]);
        let mut drawn = node("tri", None);
        drawn.mesh = Some(ImportedMesh { first_index: 0, index_count: 6, vertex_offset: 0 });
        model.nodes.push(drawn);

        assert!(model.validate().is_err());
    }

    #[test]
    fn test_geometry_append_offsets() {
        let mut geometry = Geometry::default();
        assert_eq!(geometry.append(&[Vertex::default(); 4], &[0, 1, 2, 2, 3, 0]), (0, 0));
        assert_eq!(geometry.append(&[Vertex::default(); 3], &[0, 1, 2]), (4, 6));
    }
}
