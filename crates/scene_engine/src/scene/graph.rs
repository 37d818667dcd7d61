//! Scene facade
//!
//! Owns the hierarchy, transforms, names, mesh and material tables and the
//! flattened geometry, and keeps them in lockstep as entities are appended.

use std::collections::HashMap;

use super::{
    Children, DirtySets, Entity, HierarchyComponent, HierarchyStore, Material, MaterialId,
    MeshComponent, MeshTable, SceneError, SceneResult, Subtree, TransformComponent, MAX_LEVELS,
};
use crate::assets::{Geometry, ImportedModel, Vertex};
use crate::foundation::math::Mat4;

/// A scene graph with lazily propagated world transforms
#[derive(Debug, Clone)]
pub struct Scene {
    name: String,
    hierarchy: HierarchyStore,
    transforms: Vec<TransformComponent>,
    names: Vec<String>,
    dirty: DirtySets,
    meshes: MeshTable,
    materials: Vec<Material>,
    material_for_node: HashMap<Entity, MaterialId>,
    geometry: Geometry,
}

impl Scene {
    /// Create a scene holding only its root
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        log::debug!("Creating scene '{}'", name);
        Self {
            name,
            hierarchy: HierarchyStore::new(),
            transforms: vec![TransformComponent::identity()],
            names: vec!["root".to_string()],
            dirty: DirtySets::new(),
            meshes: MeshTable::default(),
            materials: Vec::new(),
            material_for_node: HashMap::new(),
            geometry: Geometry::default(),
        }
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a named node under `parent` (the root when `None`)
    ///
    /// `level` is a hint and is corrected to `parent.level + 1`.
    pub fn add_node(&mut self, parent: Option<Entity>, level: usize, name: impl Into<String>) -> SceneResult<Entity> {
        let entity = self.hierarchy.add_node(parent, level)?;
        self.transforms.push(TransformComponent::identity());
        self.names.push(name.into());
        Ok(entity)
    }

    /// Number of entities, root included
    pub fn len(&self) -> usize {
        self.hierarchy.len()
    }

    /// Always false: every scene has a root
    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty()
    }

    /// Whether `entity` belongs to this scene
    pub fn contains(&self, entity: Entity) -> bool {
        self.hierarchy.contains(entity)
    }

    /// Tree links of `entity`
    pub fn hierarchy(&self, entity: Entity) -> &HierarchyComponent {
        self.hierarchy.get(entity)
    }

    /// Whole hierarchy store
    pub fn hierarchy_store(&self) -> &HierarchyStore {
        &self.hierarchy
    }

    /// Direct children of `entity`
    pub fn children(&self, entity: Entity) -> Children<'_> {
        self.hierarchy.children(entity)
    }

    /// `entity` and its descendants, pre-order
    pub fn subtree(&self, entity: Entity) -> Subtree<'_> {
        self.hierarchy.subtree(entity)
    }

    /// Transform of `entity`
    ///
    /// # Panics
    /// If `entity` does not belong to this scene.
    pub fn transform(&self, entity: Entity) -> &TransformComponent {
        &self.transforms[entity.index()]
    }

    /// Mutable transform of `entity`
    ///
    /// Edits through the setters only flag the local matrix as stale; call
    /// [`Scene::set_dirty_transform`] afterwards so the subtree is re-resolved.
    pub fn transform_mut(&mut self, entity: Entity) -> &mut TransformComponent {
        &mut self.transforms[entity.index()]
    }

    /// Overwrite the local matrix of `entity` and mark its subtree dirty
    pub fn set_transform(&mut self, entity: Entity, matrix: Mat4) -> SceneResult<()> {
        self.hierarchy.try_get(entity)?;
        self.transforms[entity.index()].set_local_matrix(matrix);
        self.dirty.mark_subtree(&self.hierarchy, entity);
        Ok(())
    }

    /// Mark `entity` and its subtree dirty without touching the local matrix
    pub fn set_dirty_transform(&mut self, entity: Entity) -> SceneResult<()> {
        self.hierarchy.try_get(entity)?;
        self.dirty.mark_subtree(&self.hierarchy, entity);
        Ok(())
    }

    /// Resolve every pending world transform; returns how many were recomputed
    pub fn propagate_transforms(&mut self) -> usize {
        self.dirty
            .propagate(&self.hierarchy, &mut self.transforms, &mut self.meshes)
    }

    /// Pending dirty sets
    pub fn dirty_sets(&self) -> &DirtySets {
        &self.dirty
    }

    /// Whether any world transform is stale
    pub fn has_pending_transforms(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Node name
    pub fn node_name(&self, entity: Entity) -> &str {
        &self.names[entity.index()]
    }

    /// First entity (in creation order) with the given name
    pub fn find_node_by_name(&self, name: &str) -> Option<Entity> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(Entity::from_index)
    }

    /// Append geometry to the scene's flattened buffers
    ///
    /// Returns `(vertex_offset, first_index)` for building mesh draw ranges.
    pub fn append_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> (i32, u32) {
        self.geometry.append(vertices, indices)
    }

    /// Flattened geometry of every mesh in the scene
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Attach a draw range to `entity`, returning its mesh-transform slot
    pub fn attach_mesh(&mut self, entity: Entity, first_index: u32, index_count: u32, vertex_offset: i32) -> SceneResult<u32> {
        self.hierarchy.try_get(entity)?;
        if self.meshes.contains(entity) {
            return Err(SceneError::MeshAlreadyAttached(entity));
        }
        let world = *self.transforms[entity.index()].world_transform();
        let slot = self.meshes.insert(entity, first_index, index_count, vertex_offset, world);
        // Stage the freshest world matrix on the next propagation
        self.dirty.mark_subtree(&self.hierarchy, entity);
        Ok(slot)
    }

    /// Mesh attached to `entity`
    pub fn mesh_for(&self, entity: Entity) -> Option<&MeshComponent> {
        self.meshes.get(entity)
    }

    /// Mesh table including the staged world matrices
    pub fn meshes(&self) -> &MeshTable {
        &self.meshes
    }

    /// World matrices staged for upload, indexed by `mesh_index`
    pub fn mesh_transforms(&self) -> &[Mat4] {
        self.meshes.transforms()
    }

    /// Register a material
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    /// Associate a material with `entity`
    pub fn set_material(&mut self, entity: Entity, material: MaterialId) -> SceneResult<()> {
        self.hierarchy.try_get(entity)?;
        if material.0 as usize >= self.materials.len() {
            return Err(SceneError::UnknownMaterial(material));
        }
        self.material_for_node.insert(entity, material);
        Ok(())
    }

    /// Material associated with `entity`
    pub fn material_for(&self, entity: Entity) -> Option<&Material> {
        self.material_for_node
            .get(&entity)
            .map(|id| &self.materials[id.0 as usize])
    }

    /// All registered materials
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Copy an imported model under `parent`, returning the entity of each imported node
    pub fn add_imported_model(&mut self, parent: Option<Entity>, model: &ImportedModel) -> SceneResult<Vec<Entity>> {
        model.validate()?;
        let parent = parent.unwrap_or(Entity::ROOT);
        let parent_level = self.hierarchy.try_get(parent)?.level;

        // Reject before touching anything: the scene is append-only
        let depths = model.node_depths();
        let deepest = parent_level + 1 + depths.iter().copied().max().unwrap_or(0);
        if !model.nodes.is_empty() && deepest >= MAX_LEVELS {
            return Err(SceneError::HierarchyTooDeep { level: deepest, max: MAX_LEVELS });
        }

        let (vertex_base, index_base) = self.geometry.append(&model.geometry.vertices, &model.geometry.indices);
        let material_ids: Vec<MaterialId> = model
            .materials
            .iter()
            .cloned()
            .map(|material| self.add_material(material))
            .collect();

        // Depth within the import tree is only a hint once grafted below `parent`
        let mut entities = Vec::with_capacity(model.nodes.len());
        for (node, depth) in model.nodes.iter().zip(depths) {
            let node_parent = node.parent.map_or(parent, |p| entities[p]);
            let entity = self.add_node(Some(node_parent), depth + 1, node.name.clone())?;
            self.set_transform(entity, node.transform)?;

            if let Some(mesh) = node.mesh {
                self.attach_mesh(
                    entity,
                    index_base + mesh.first_index,
                    mesh.index_count,
                    vertex_base + mesh.vertex_offset,
                )?;
            }
            if let Some(material) = node.material {
                self.set_material(entity, material_ids[material])?;
            }
            entities.push(entity);
        }

        log::info!(
            "Added {} imported nodes ({} meshes) to scene '{}'",
            entities.len(),
            model.nodes.iter().filter(|n| n.mesh.is_some()).count(),
            self.name
        );
        Ok(entities)
    }

    /// Log every entity's world translation at debug level
    pub fn log_transforms(&self) {
        for entity in self.subtree(Entity::ROOT) {
            let world = self.transform(entity).world_transform();
            log::debug!(
                "{:indent$}{} '{}' world=({:.3}, {:.3}, {:.3})",
                "",
                entity,
                self.node_name(entity),
                world.m14,
                world.m24,
                world.m34,
                indent = self.hierarchy(entity).level * 2
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ImportedMesh, ImportedNode};
    use crate::foundation::math::{Quat, Trs, Vec3};
    use approx::assert_relative_eq;

    /// root -> First, Second -> Grandchild
    fn sample_scene() -> (Scene, Entity, Entity, Entity) {
        let mut scene = Scene::new("test");
        let first = scene.add_node(Some(Entity::ROOT), 0, "First").unwrap();
        let second = scene.add_node(Some(Entity::ROOT), 1, "Second").unwrap();
        let grandchild = scene.add_node(Some(second), 2, "Grandchild").unwrap();
        (scene, first, second, grandchild)
    }

    fn world_snapshot(scene: &Scene) -> Vec<Mat4> {
        scene
            .subtree(Entity::ROOT)
            .map(|e| *scene.transform(e).world_transform())
            .collect()
    }

    #[test]
    fn test_new_scene_has_named_root() {
        let scene = Scene::new("test");

        assert_eq!(scene.len(), 1);
        assert!(!scene.node_name(Entity::ROOT).is_empty());
        assert_eq!(scene.hierarchy(Entity::ROOT).level, 0);
        assert_eq!(scene.hierarchy(Entity::ROOT).parent, None);
    }

    #[test]
    fn test_first_child_links() {
        let mut scene = Scene::new("test");
        let first = scene.add_node(Some(Entity::ROOT), 0, "First").unwrap();

        assert_eq!(first.id(), 1);
        assert_eq!(scene.hierarchy(first).parent, Some(Entity::ROOT));
        assert_eq!(scene.hierarchy(Entity::ROOT).first_child, Some(first));
        assert_eq!(scene.hierarchy(first).level, 1);
    }

    #[test]
    fn test_second_child_appended_as_sibling() {
        let (scene, first, second, _) = sample_scene();

        assert_eq!(second.id(), 2);
        assert_eq!(scene.hierarchy(first).next_sibling, Some(second));
        assert_eq!(scene.hierarchy(Entity::ROOT).first_child, Some(first));
    }

    #[test]
    fn test_grandchild_links() {
        let (scene, _, second, grandchild) = sample_scene();

        assert_eq!(grandchild.id(), 3);
        assert_eq!(scene.hierarchy(grandchild).parent, Some(second));
        assert_eq!(scene.hierarchy(second).first_child, Some(grandchild));
        assert_eq!(scene.hierarchy(grandchild).level, 2);
    }

    #[test]
    fn test_translation_reaches_grandchild() {
        let (mut scene, _, second, grandchild) = sample_scene();
        let translation = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));

        scene.set_transform(second, translation).unwrap();
        scene.propagate_transforms();

        let expected = scene.transform(second).world_transform() * scene.transform(grandchild).local_transform();
        assert_relative_eq!(*scene.transform(grandchild).world_transform(), expected);
        assert_relative_eq!(*scene.transform(grandchild).world_transform(), translation);
    }

    #[test]
    fn test_second_propagation_changes_nothing() {
        let (mut scene, _, second, _) = sample_scene();
        scene
            .set_transform(second, Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        assert!(scene.propagate_transforms() > 0);
        let before = world_snapshot(&scene);

        assert_eq!(scene.propagate_transforms(), 0);

        assert_eq!(world_snapshot(&scene), before);
        assert!(scene.dirty_sets().is_empty());
        for level in 0..MAX_LEVELS {
            assert!(scene.dirty_sets().level(level).is_empty());
        }
    }

    #[test]
    fn test_wrong_level_hints_are_corrected() {
        let mut scene = Scene::new("levels");
        let mut parent = Entity::ROOT;
        for hint in [5, 0, 9, 1] {
            let child = scene.add_node(Some(parent), hint, "n").unwrap();
            assert_eq!(
                scene.hierarchy(child).level,
                scene.hierarchy(parent).level + 1
            );
            parent = child;
        }
    }

    #[test]
    fn test_none_parent_attaches_to_root() {
        let mut scene = Scene::new("test");
        let node = scene.add_node(None, 1, "orphan").unwrap();
        assert_eq!(scene.hierarchy(node).parent, Some(Entity::ROOT));
    }

    #[test]
    fn test_dirty_marks_entire_subtree() {
        let (mut scene, first, second, grandchild) = sample_scene();
        scene.set_dirty_transform(second).unwrap();

        let dirty = scene.dirty_sets();
        assert!(dirty.level(1).contains(&second));
        assert!(!dirty.level(1).contains(&first));
        assert!(dirty.level(2).contains(&grandchild));
        assert!(dirty.level(0).is_empty());
    }

    #[test]
    fn test_field_edits_need_dirty_mark() {
        let (mut scene, _, second, grandchild) = sample_scene();
        scene.transform_mut(second).set_position(Vec3::new(0.0, 3.0, 0.0));
        scene.transform_mut(grandchild).set_scale(Vec3::new(2.0, 2.0, 2.0));
        scene.set_dirty_transform(second).unwrap();
        scene.propagate_transforms();

        let expected = Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0))
            * Mat4::new_scaling(2.0);
        assert_relative_eq!(*scene.transform(grandchild).world_transform(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_propagation_matches_recursive_definition() {
        let mut scene = Scene::new("deep");
        let mut frontier = vec![Entity::ROOT];
        for depth in 1..5 {
            let mut next = Vec::new();
            for (i, parent) in frontier.iter().enumerate() {
                for k in 0..2 {
                    let child = scene.add_node(Some(*parent), depth, format!("n{depth}_{i}_{k}")).unwrap();
                    let trs = Trs {
                        position: Vec3::new(k as f32, depth as f32 * 0.5, -(i as f32)),
                        rotation: Quat::from_euler_angles(0.1 * depth as f32, 0.2 * k as f32, 0.0),
                        scale: Vec3::new(1.0, 1.0 + 0.1 * k as f32, 1.0),
                    };
                    scene.transform_mut(child).set_trs(trs);
                    next.push(child);
                }
            }
            frontier = next;
        }
        scene.set_dirty_transform(Entity::ROOT).unwrap();
        scene.propagate_transforms();

        for entity in scene.subtree(Entity::ROOT).skip(1) {
            let parent = scene.hierarchy(entity).parent.unwrap();
            let expected = scene.transform(parent).world_transform() * scene.transform(entity).local_transform();
            assert_relative_eq!(*scene.transform(entity).world_transform(), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_set_transform_round_trip() {
        let (mut scene, first, _, _) = sample_scene();
        let matrix = Mat4::new_translation(&Vec3::new(2.0, -1.0, 0.5))
            * Quat::from_euler_angles(0.4, 0.2, -0.3).to_homogeneous()
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.5, 2.0, 0.5));

        scene.set_transform(first, matrix).unwrap();
        assert_eq!(*scene.transform(first).local_transform(), matrix);

        // Rebuilding from the decomposed fields is only approximately equal
        let rebuilt = scene.transform(first).trs().to_matrix();
        assert_relative_eq!(rebuilt, matrix, epsilon = 1e-5);
    }

    #[test]
    fn test_root_transform_moves_everything() {
        let (mut scene, first, _, grandchild) = sample_scene();
        let lift = Mat4::new_translation(&Vec3::new(0.0, 10.0, 0.0));
        scene.set_transform(Entity::ROOT, lift).unwrap();
        scene.propagate_transforms();

        assert_relative_eq!(*scene.transform(Entity::ROOT).world_transform(), lift);
        assert_relative_eq!(*scene.transform(first).world_transform(), lift);
        assert_relative_eq!(*scene.transform(grandchild).world_transform(), lift);
    }

    #[test]
    fn test_mesh_transforms_follow_propagation() {
        let (mut scene, _, second, grandchild) = sample_scene();
        let slot = scene.attach_mesh(grandchild, 0, 36, 0).unwrap();
        assert!(matches!(
            scene.attach_mesh(grandchild, 0, 36, 0),
            Err(SceneError::MeshAlreadyAttached(_))
        ));

        scene
            .set_transform(second, Mat4::new_translation(&Vec3::new(0.0, 0.0, 4.0)))
            .unwrap();
        scene.propagate_transforms();

        assert_eq!(scene.mesh_for(grandchild).map(|m| m.mesh_index), Some(slot));
        assert!(scene.mesh_for(second).is_none());
        assert_relative_eq!(
            scene.mesh_transforms()[slot as usize],
            Mat4::new_translation(&Vec3::new(0.0, 0.0, 4.0))
        );
    }

    #[test]
    fn test_materials_and_names() {
        let (mut scene, first, second, _) = sample_scene();
        let red = scene.add_material(Material::new("red", [1.0, 0.0, 0.0, 1.0]));
        scene.set_material(first, red).unwrap();

        assert_eq!(scene.material_for(first).map(|m| m.name.as_str()), Some("red"));
        assert!(scene.material_for(second).is_none());
        assert!(scene.set_material(first, MaterialId(9)).is_err());
        assert_eq!(scene.find_node_by_name("Grandchild"), Some(Entity::new(3)));
        assert_eq!(scene.find_node_by_name("missing"), None);
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let mut scene = Scene::new("test");
        assert!(matches!(
            scene.set_dirty_transform(Entity::new(5)),
            Err(SceneError::UnknownEntity(_))
        ));
        assert!(scene.add_node(Some(Entity::new(5)), 1, "x").is_err());
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_imported_model_grafted_below_parent() {
        let (mut scene, first, _, _) = sample_scene();
        scene.append_geometry(&[Vertex::default(); 4], &[0, 1, 2, 2, 3, 0]);

        let mut model = ImportedModel::default();
        model.geometry.append(&[Vertex::default(); 3], &[0, 1, 2]);
        model.materials.push(Material::new("blue", [0.0, 0.0, 1.0, 1.0]));
        model.nodes.push(ImportedNode {
            name: "group".to_string(),
            parent: None,
            transform: Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)),
            mesh: None,
            material: None,
        });
        model.nodes.push(ImportedNode {
            name: "tri".to_string(),
            parent: Some(0),
            transform: Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)),
            mesh: Some(ImportedMesh { first_index: 0, index_count: 3, vertex_offset: 0 }),
            material: Some(0),
        });

        let entities = scene.add_imported_model(Some(first), &model).unwrap();
        scene.propagate_transforms();

        let (group, tri) = (entities[0], entities[1]);
        assert_eq!(scene.hierarchy(group).parent, Some(first));
        assert_eq!(scene.hierarchy(tri).level, 3);
        assert_eq!(scene.node_name(tri), "tri");
        assert_eq!(scene.material_for(tri).map(|m| m.name.as_str()), Some("blue"));

        let mesh = *scene.mesh_for(tri).unwrap();
        assert_eq!(mesh.first_index, 6);
        assert_eq!(mesh.vertex_offset, 4);
        assert_eq!(scene.geometry().indices.len(), 9);
        assert_relative_eq!(
            scene.mesh_transforms()[mesh.mesh_index as usize],
            Mat4::new_translation(&Vec3::new(1.0, 1.0, 0.0))
        );
    }

    #[test]
    fn test_too_deep_import_leaves_scene_untouched() {
        let mut scene = Scene::new("deep");
        let mut tip = Entity::ROOT;
        for level in 1..MAX_LEVELS - 1 {
            tip = scene.add_node(Some(tip), level, format!("link{level}")).unwrap();
        }
        let nodes = scene.len();

        let mut model = ImportedModel::default();
        model.geometry.append(&[Vertex::default(); 3], &[0, 1, 2]);
        model.materials.push(Material::new("red", [1.0, 0.0, 0.0, 1.0]));
        model.nodes.push(ImportedNode {
            name: "group".to_string(),
            parent: None,
            transform: Mat4::identity(),
            mesh: None,
            material: None,
        });
        model.nodes.push(ImportedNode {
            name: "tri".to_string(),
            parent: Some(0),
            transform: Mat4::identity(),
            mesh: Some(ImportedMesh { first_index: 0, index_count: 3, vertex_offset: 0 }),
            material: Some(0),
        });

        let result = scene.add_imported_model(Some(tip), &model);

        assert!(matches!(
            result,
            Err(SceneError::HierarchyTooDeep { level, max }) if level == MAX_LEVELS && max == MAX_LEVELS
        ));
        assert_eq!(scene.len(), nodes);
        assert!(scene.geometry().vertices.is_empty());
        assert!(scene.materials().is_empty());
        assert_eq!(scene.meshes().len(), 0);
    }
}
