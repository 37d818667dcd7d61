//! Parent/child links stored as flat arrays
//!
//! Children form a singly linked list through `next_sibling`, in creation
//! order. Appending walks the parent's list to its tail; fan-out in imported
//! scenes is small, so the linear scan never shows up in profiles.

use super::{Entity, SceneError, SceneResult, MAX_LEVELS};

/// Tree links for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyComponent {
    /// Depth from the root (root = 0)
    pub level: usize,
    /// Parent entity, `None` only for the root
    pub parent: Option<Entity>,
    /// Head of the child list
    pub first_child: Option<Entity>,
    /// Next entry in the parent's child list
    pub next_sibling: Option<Entity>,
}

impl HierarchyComponent {
    const fn root() -> Self {
        Self {
            level: 0,
            parent: None,
            first_child: None,
            next_sibling: None,
        }
    }
}

/// Hierarchy of every entity in a scene, indexed by entity
#[derive(Debug, Clone)]
pub struct HierarchyStore {
    nodes: Vec<HierarchyComponent>,
}

impl Default for HierarchyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyStore {
    /// Create a store holding only the root
    pub fn new() -> Self {
        Self {
            nodes: vec![HierarchyComponent::root()],
        }
    }

    /// Append a node under `parent` (the root when `None`)
    ///
    /// `explicit_level` is only a hint: the stored level is always
    /// `parent.level + 1`, and a disagreeing hint is corrected and logged.
    pub fn add_node(&mut self, parent: Option<Entity>, explicit_level: usize) -> SceneResult<Entity> {
        let parent = parent.unwrap_or(Entity::ROOT);
        let parent_level = self.try_get(parent)?.level;

        let level = parent_level + 1;
        if explicit_level != level {
            log::debug!(
                "Corrected level hint {} -> {} for new child of {}",
                explicit_level,
                level,
                parent
            );
        }
        if level >= MAX_LEVELS {
            return Err(SceneError::HierarchyTooDeep { level, max: MAX_LEVELS });
        }

        let entity = Entity::from_index(self.nodes.len());
        self.nodes.push(HierarchyComponent {
            level,
            parent: Some(parent),
            first_child: None,
            next_sibling: None,
        });

        match self.nodes[parent.index()].first_child {
            None => self.nodes[parent.index()].first_child = Some(entity),
            Some(first) => {
                let mut tail = first;
                while let Some(next) = self.nodes[tail.index()].next_sibling {
                    tail = next;
                }
                self.nodes[tail.index()].next_sibling = Some(entity);
            }
        }

        Ok(entity)
    }

    /// Links for `entity`
    ///
    /// # Panics
    /// If `entity` was not issued by this store.
    pub fn get(&self, entity: Entity) -> &HierarchyComponent {
        &self.nodes[entity.index()]
    }

    /// Links for `entity`, or an error for ids this store never issued
    pub fn try_get(&self, entity: Entity) -> SceneResult<&HierarchyComponent> {
        self.nodes
            .get(entity.index())
            .ok_or(SceneError::UnknownEntity(entity))
    }

    /// Whether `entity` was issued by this store
    pub fn contains(&self, entity: Entity) -> bool {
        entity.index() < self.nodes.len()
    }

    /// Number of entities, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is present from construction
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of `entity` in insertion order
    pub fn children(&self, entity: Entity) -> Children<'_> {
        Children {
            store: self,
            next: self.get(entity).first_child,
        }
    }

    /// `entity` followed by all of its descendants, pre-order
    pub fn subtree(&self, entity: Entity) -> Subtree<'_> {
        Subtree {
            store: self,
            root: entity,
            next: Some(entity),
        }
    }
}

/// Iterator over the direct children of an entity
pub struct Children<'a> {
    store: &'a HierarchyStore,
    next: Option<Entity>,
}

impl Iterator for Children<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let current = self.next?;
        self.next = self.store.get(current).next_sibling;
        Some(current)
    }
}

/// Pre-order walk of a subtree that follows the sibling links without a stack
pub struct Subtree<'a> {
    store: &'a HierarchyStore,
    root: Entity,
    next: Option<Entity>,
}

impl Iterator for Subtree<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let current = self.next?;
        let node = self.store.get(current);

        self.next = match node.first_child {
            Some(child) => Some(child),
            None => {
                let mut cursor = current;
                loop {
                    if cursor == self.root {
                        break None;
                    }
                    let links = self.store.get(cursor);
                    if let Some(sibling) = links.next_sibling {
                        break Some(sibling);
                    }
                    match links.parent {
                        Some(parent) => cursor = parent,
                        None => break None,
                    }
                }
            }
        };

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_derived_from_parent() {
        let mut store = HierarchyStore::new();
        let a = store.add_node(None, 7).unwrap();
        let b = store.add_node(Some(a), 0).unwrap();

        assert_eq!(store.get(a).level, 1);
        assert_eq!(store.get(b).level, 2);
        assert_eq!(store.get(b).parent, Some(a));
    }

    #[test]
    fn test_children_in_insertion_order() {
        let mut store = HierarchyStore::new();
        let first = store.add_node(None, 1).unwrap();
        let second = store.add_node(None, 1).unwrap();
        let third = store.add_node(None, 1).unwrap();

        let children: Vec<_> = store.children(Entity::ROOT).collect();
        assert_eq!(children, vec![first, second, third]);
        assert_eq!(store.get(first).next_sibling, Some(second));
        assert_eq!(store.get(third).next_sibling, None);
    }

    #[test]
    fn test_depth_limit() {
        let mut store = HierarchyStore::new();
        let mut parent = Entity::ROOT;
        for level in 1..MAX_LEVELS {
            parent = store.add_node(Some(parent), level).unwrap();
        }

        let result = store.add_node(Some(parent), MAX_LEVELS);
        assert!(matches!(
            result,
            Err(SceneError::HierarchyTooDeep { level, .. }) if level == MAX_LEVELS
        ));
        assert_eq!(store.len(), MAX_LEVELS);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut store = HierarchyStore::new();
        let result = store.add_node(Some(Entity::new(42)), 1);
        assert!(matches!(result, Err(SceneError::UnknownEntity(_))));
    }

    #[test]
    fn test_subtree_stays_inside_root() {
        let mut store = HierarchyStore::new();
        let a = store.add_node(None, 1).unwrap();
        let a1 = store.add_node(Some(a), 2).unwrap();
        let a1x = store.add_node(Some(a1), 3).unwrap();
        let a2 = store.add_node(Some(a), 2).unwrap();
        let b = store.add_node(None, 1).unwrap();

        let walk: Vec<_> = store.subtree(a).collect();
        assert_eq!(walk, vec![a, a1, a1x, a2]);

        let whole: Vec<_> = store.subtree(Entity::ROOT).collect();
        assert_eq!(whole, vec![Entity::ROOT, a, a1, a1x, a2, b]);

        let leaf: Vec<_> = store.subtree(a1x).collect();
        assert_eq!(leaf, vec![a1x]);
    }
}
