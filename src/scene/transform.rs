//! Local TRS transform with dirty-checked matrix caching (§3, §4.D).

use glam::{Affine3A, EulerRot, Quat, Vec3};

/// Position/rotation/scale transform attached to every [`Entity`](super::entity::Entity).
///
/// Rotation is stored as Euler XYZ angles (matching the scene graph's
/// authoring model) and converted to a quaternion on demand; the composed
/// local matrix is cached and only recomputed when TRS state actually
/// changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_euler: Vec3,
    pub scale: Vec3,
    /// Hint that `scale` is uniform across axes; informational only (the
    /// packer always composes the full anisotropic scale matrix).
    pub uniform_scale_hint: bool,

    local_matrix: Affine3A,
    last_position: Vec3,
    last_rotation_euler: Vec3,
    last_scale: Vec3,
    force_update: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation_euler: Vec3::ZERO,
            scale: Vec3::ONE,
            uniform_scale_hint: true,

            local_matrix: Affine3A::IDENTITY,
            last_position: Vec3::ZERO,
            last_rotation_euler: Vec3::ZERO,
            last_scale: Vec3::ONE,
            force_update: true,
        }
    }

    /// Rebuilds `local_matrix` from TRS state if anything changed since
    /// the last call. Returns whether a rebuild happened.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.position != self.last_position
            || self.rotation_euler != self.last_rotation_euler
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            let rotation = Quat::from_euler(
                EulerRot::XYZ,
                self.rotation_euler.x,
                self.rotation_euler.y,
                self.rotation_euler.z,
            );
            self.local_matrix = Affine3A::from_scale_rotation_translation(
                self.scale,
                rotation,
                self.position,
            );

            self.last_position = self.position;
            self.last_rotation_euler = self.rotation_euler;
            self.last_scale = self.scale;
            self.force_update = false;
        }

        changed
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> Affine3A {
        self.local_matrix
    }

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation_euler = Vec3::new(x, y, z);
        self.mark_dirty();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.mark_dirty();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.uniform_scale_hint = (scale.x - scale.y).abs() < 1e-6 && (scale.y - scale.z).abs() < 1e-6;
        self.mark_dirty();
    }

    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_has_identity_matrix() {
        let mut t = Transform::new();
        t.update_local_matrix();
        assert_eq!(t.local_matrix(), Affine3A::IDENTITY);
    }

    #[test]
    fn update_local_matrix_is_idempotent_until_changed() {
        let mut t = Transform::new();
        assert!(t.update_local_matrix());
        assert!(!t.update_local_matrix());
        t.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(t.update_local_matrix());
        assert!(!t.update_local_matrix());
    }

    #[test]
    fn composed_matrix_transforms_a_point() {
        let mut t = Transform::new();
        t.set_position(Vec3::new(1.0, 0.0, 0.0));
        t.set_scale(Vec3::splat(2.0));
        t.update_local_matrix();
        let p = t.local_matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn uniform_scale_hint_tracks_scale() {
        let mut t = Transform::new();
        assert!(t.uniform_scale_hint);
        t.set_scale(Vec3::new(1.0, 2.0, 1.0));
        assert!(!t.uniform_scale_hint);
        t.set_scale(Vec3::splat(3.0));
        assert!(t.uniform_scale_hint);
    }
}
