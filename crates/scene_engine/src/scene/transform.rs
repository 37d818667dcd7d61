//! Per-entity transform component
//!
//! Position, rotation and scale are the editable source of truth. The local
//! matrix is derived from them lazily: setters only raise
//! `need_update_model_matrix`, and the propagator rebuilds the matrix the next
//! time the entity is resolved.

use crate::foundation::math::{Mat4, Quat, Trs, Vec3};

/// Local and world transform of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct TransformComponent {
    trs: Trs,
    local_transform: Mat4,
    world_transform: Mat4,
    need_update_model_matrix: bool,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            trs: Trs::identity(),
            local_transform: Mat4::identity(),
            world_transform: Mat4::identity(),
            need_update_model_matrix: false,
        }
    }
}

impl TransformComponent {
    /// Identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Local translation
    pub fn position(&self) -> Vec3 {
        self.trs.position
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.trs.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.trs.scale
    }

    /// Decomposed local transform
    pub fn trs(&self) -> &Trs {
        &self.trs
    }

    /// Set local translation; the matrix is rebuilt on the next propagation
    pub fn set_position(&mut self, position: Vec3) {
        self.trs.position = position;
        self.need_update_model_matrix = true;
    }

    /// Set local rotation; the matrix is rebuilt on the next propagation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.trs.rotation = rotation;
        self.need_update_model_matrix = true;
    }

    /// Set local scale; the matrix is rebuilt on the next propagation
    pub fn set_scale(&mut self, scale: Vec3) {
        self.trs.scale = scale;
        self.need_update_model_matrix = true;
    }

    /// Replace all three local components at once
    pub fn set_trs(&mut self, trs: Trs) {
        self.trs = trs;
        self.need_update_model_matrix = true;
    }

    /// Matrix relative to the parent
    pub fn local_transform(&self) -> &Mat4 {
        &self.local_transform
    }

    /// Matrix relative to the scene root, valid after propagation
    pub fn world_transform(&self) -> &Mat4 {
        &self.world_transform
    }

    /// Whether the local matrix lags behind position/rotation/scale
    pub fn needs_model_matrix_update(&self) -> bool {
        self.need_update_model_matrix
    }

    /// Store `matrix` verbatim as the local transform and decompose it for editing
    pub(crate) fn set_local_matrix(&mut self, matrix: Mat4) {
        self.local_transform = matrix;
        self.trs = Trs::from_matrix(&matrix);
        self.need_update_model_matrix = false;
    }

    /// Rebuild the local matrix if an editable component changed
    pub(crate) fn refresh_local(&mut self) {
        if self.need_update_model_matrix {
            self.local_transform = self.trs.to_matrix();
            self.need_update_model_matrix = false;
        }
    }

    pub(crate) fn set_world(&mut self, world: Mat4) {
        self.world_transform = world;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_setters_defer_matrix_rebuild() {
        let mut transform = TransformComponent::identity();
        transform.set_position(Vec3::new(1.0, 2.0, 3.0));

        assert!(transform.needs_model_matrix_update());
        assert_eq!(*transform.local_transform(), Mat4::identity());

        transform.refresh_local();
        assert!(!transform.needs_model_matrix_update());
        assert_relative_eq!(
            *transform.local_transform(),
            Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_set_local_matrix_is_verbatim() {
        let matrix = Mat4::new_translation(&Vec3::new(0.5, 0.0, -2.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 3.0, 4.0));
        let mut transform = TransformComponent::identity();
        transform.set_position(Vec3::x());
        transform.set_local_matrix(matrix);

        assert_eq!(*transform.local_transform(), matrix);
        assert!(!transform.needs_model_matrix_update());
        assert_relative_eq!(transform.scale(), Vec3::new(2.0, 3.0, 4.0), epsilon = 1e-6);
    }
}
