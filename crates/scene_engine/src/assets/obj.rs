//! Wavefront OBJ importer
//!
//! OBJ has no node hierarchy, so the file becomes one group node named after
//! the file with one child per object/group in the file.

use std::path::Path;

use super::{AssetImporter, Geometry, ImportError, ImportedMesh, ImportedModel, ImportedNode, Vertex};
use crate::foundation::math::Mat4;
use crate::scene::Material;

/// Imports `.obj` files (and their `.mtl` libraries) through `tobj`
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjImporter;

impl ObjImporter {
    /// Create an importer
    pub fn new() -> Self {
        Self
    }

    fn convert(name: &str, models: &[tobj::Model], materials: Vec<tobj::Material>) -> ImportedModel {
        let mut geometry = Geometry::default();
        let mut nodes = vec![ImportedNode {
            name: name.to_string(),
            parent: None,
            transform: Mat4::identity(),
            mesh: None,
            material: None,
        }];

        for model in models {
            let mesh = &model.mesh;
            let vertex_count = mesh.positions.len() / 3;
            let vertices: Vec<Vertex> = (0..vertex_count)
                .map(|i| {
                    let position = [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]];
                    let normal = if mesh.normals.len() >= 3 * (i + 1) {
                        [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
                    } else {
                        [0.0, 1.0, 0.0]
                    };
                    let tex_coord = if mesh.texcoords.len() >= 2 * (i + 1) {
                        [mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1]]
                    } else {
                        [0.0, 0.0]
                    };
                    Vertex::new(position, normal, tex_coord)
                })
                .collect();

            let (vertex_offset, first_index) = geometry.append(&vertices, &mesh.indices);
            nodes.push(ImportedNode {
                name: model.name.clone(),
                parent: Some(0),
                transform: Mat4::identity(),
                mesh: Some(ImportedMesh {
                    first_index,
                    index_count: mesh.indices.len() as u32,
                    vertex_offset,
                }),
                material: mesh.material_id.filter(|&id| id < materials.len()),
            });
        }

        let materials = materials
            .into_iter()
            .map(|m| {
                let [r, g, b] = m.diffuse.unwrap_or([0.8, 0.8, 0.8]);
                let alpha = m.dissolve.unwrap_or(1.0);
                Material::new(m.name, [r, g, b, alpha])
            })
            .collect();

        ImportedModel {
            geometry,
            nodes,
            materials,
        }
    }
}

impl AssetImporter for ObjImporter {
    fn import(&self, path: &Path) -> Result<ImportedModel, ImportError> {
        let display = path.display().to_string();
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };

        let (models, materials) = tobj::load_obj(path, &options).map_err(|e| ImportError::Parse {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!("Ignoring material library for {}: {}", display, e);
            Vec::new()
        });

        let name = path
            .file_stem()
            .map_or_else(|| display.clone(), |stem| stem.to_string_lossy().into_owned());

        let model = Self::convert(&name, &models, materials);
        model.validate()?;

        log::info!(
            "Imported {}: {} nodes, {} vertices, {} indices",
            display,
            model.nodes.len(),
            model.geometry.vertices.len(),
            model.geometry.indices.len()
        );
        Ok(model)
    }
}
