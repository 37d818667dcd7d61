//! Level-ordered world transform propagation
//!
//! Marking an entity dirty inserts it and every descendant into the bucket of
//! its own level. Draining buckets from level 0 upwards guarantees a parent is
//! resolved before any of its children, so each entity costs one multiply.

use std::collections::BTreeSet;

use super::{Entity, HierarchyStore, MeshTable, TransformComponent, MAX_LEVELS};

/// One set of stale entities per hierarchy level
///
/// Sets are ordered, so entities within a level resolve in ascending id order.
#[derive(Debug, Clone)]
pub struct DirtySets {
    levels: [BTreeSet<Entity>; MAX_LEVELS],
}

impl Default for DirtySets {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtySets {
    /// Create empty dirty sets
    pub fn new() -> Self {
        Self {
            levels: std::array::from_fn(|_| BTreeSet::new()),
        }
    }

    /// Mark `entity` and every descendant dirty
    pub fn mark_subtree(&mut self, hierarchy: &HierarchyStore, entity: Entity) {
        for node in hierarchy.subtree(entity) {
            self.levels[hierarchy.get(node).level].insert(node);
        }
    }

    /// Entities waiting at `level`
    pub fn level(&self, level: usize) -> &BTreeSet<Entity> {
        &self.levels[level]
    }

    /// Total number of entities waiting across all levels
    pub fn pending(&self) -> usize {
        self.levels.iter().map(BTreeSet::len).sum()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(BTreeSet::is_empty)
    }

    /// Recompute world transforms of every dirty entity and empty the sets
    ///
    /// Returns the number of entities recomputed.
    ///
    /// # Panics
    /// If level 0 holds anything but the root, or a dirty entity's parent is
    /// not on a strictly lower level. Both indicate a corrupted hierarchy.
    pub fn propagate(
        &mut self,
        hierarchy: &HierarchyStore,
        transforms: &mut [TransformComponent],
        meshes: &mut MeshTable,
    ) -> usize {
        let mut resolved = 0;

        let roots = std::mem::take(&mut self.levels[0]);
        if !roots.is_empty() {
            assert!(
                roots.len() == 1 && roots.contains(&Entity::ROOT),
                "level 0 dirty set may only hold the root, found {:?}",
                roots
            );
            let root = &mut transforms[Entity::ROOT.index()];
            root.refresh_local();
            let world = *root.local_transform();
            root.set_world(world);
            meshes.stage_transform(Entity::ROOT, &world);
            resolved += 1;
        }

        for level in 1..MAX_LEVELS {
            let dirty = std::mem::take(&mut self.levels[level]);
            for entity in dirty {
                let links = hierarchy.get(entity);
                let parent = links.parent.unwrap_or(Entity::ROOT);
                assert!(
                    hierarchy.get(parent).level < level,
                    "entity {} at level {} has parent {} on the same or a deeper level",
                    entity,
                    level,
                    parent
                );

                let parent_world = *transforms[parent.index()].world_transform();
                let transform = &mut transforms[entity.index()];
                transform.refresh_local();
                let world = parent_world * transform.local_transform();
                transform.set_world(world);
                meshes.stage_transform(entity, &world);
                resolved += 1;
            }
        }

        if resolved > 0 {
            log::trace!("Propagated {} world transforms", resolved);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use approx::assert_relative_eq;

    fn chain(depth: usize) -> (HierarchyStore, Vec<TransformComponent>) {
        let mut hierarchy = HierarchyStore::new();
        let mut parent = Entity::ROOT;
        for level in 1..=depth {
            parent = hierarchy.add_node(Some(parent), level).unwrap();
        }
        let transforms = vec![TransformComponent::identity(); hierarchy.len()];
        (hierarchy, transforms)
    }

    #[test]
    fn test_mark_subtree_buckets_by_level() {
        let (hierarchy, _) = chain(3);
        let mut dirty = DirtySets::new();
        dirty.mark_subtree(&hierarchy, Entity::new(1));

        assert!(dirty.level(0).is_empty());
        assert!(dirty.level(1).contains(&Entity::new(1)));
        assert!(dirty.level(2).contains(&Entity::new(2)));
        assert!(dirty.level(3).contains(&Entity::new(3)));
        assert_eq!(dirty.pending(), 3);
    }

    #[test]
    fn test_marking_twice_keeps_one_entry() {
        let (hierarchy, _) = chain(2);
        let mut dirty = DirtySets::new();
        dirty.mark_subtree(&hierarchy, Entity::ROOT);
        dirty.mark_subtree(&hierarchy, Entity::new(1));

        assert_eq!(dirty.level(0).len(), 1);
        assert_eq!(dirty.pending(), 3);
    }

    #[test]
    fn test_chain_accumulates_translations() {
        let (hierarchy, mut transforms) = chain(3);
        for transform in transforms.iter_mut().skip(1) {
            transform.set_position(Vec3::new(1.0, 0.0, 0.0));
        }
        let mut meshes = MeshTable::default();
        let mut dirty = DirtySets::new();
        dirty.mark_subtree(&hierarchy, Entity::ROOT);

        let resolved = dirty.propagate(&hierarchy, &mut transforms, &mut meshes);

        assert_eq!(resolved, 4);
        assert!(dirty.is_empty());
        assert_relative_eq!(
            *transforms[3].world_transform(),
            Mat4::new_translation(&Vec3::new(3.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_mesh_transform_staged() {
        let (hierarchy, mut transforms) = chain(1);
        transforms[1].set_position(Vec3::new(0.0, 2.0, 0.0));
        let mut meshes = MeshTable::default();
        let slot = meshes.insert(Entity::new(1), 0, 3, 0, Mat4::identity());
        let mut dirty = DirtySets::new();
        dirty.mark_subtree(&hierarchy, Entity::new(1));

        dirty.propagate(&hierarchy, &mut transforms, &mut meshes);

        assert_relative_eq!(
            meshes.transforms()[slot as usize],
            Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0))
        );
    }

    #[test]
    fn test_empty_propagation_is_noop() {
        let (hierarchy, mut transforms) = chain(2);
        let mut meshes = MeshTable::default();
        let mut dirty = DirtySets::new();

        assert_eq!(dirty.propagate(&hierarchy, &mut transforms, &mut meshes), 0);
    }

    #[test]
    #[should_panic(expected = "level 0 dirty set")]
    fn test_non_root_on_level_zero_panics() {
        let (hierarchy, mut transforms) = chain(1);
        let mut meshes = MeshTable::default();
        let mut dirty = DirtySets::new();
        dirty.levels[0].insert(Entity::new(1));

        dirty.propagate(&hierarchy, &mut transforms, &mut meshes);
    }
}
