//! Light-space math for the shadowed sun pass.

use crate::device::CullMode;
use glam::{Mat4, Vec3};

/// Shadow maps at or above this size render back faces.
pub const FRONT_FACE_CULL_THRESHOLD: u32 = 2048;

/// Orthographic view-projection from the sun, centered on the camera and
/// covering `affect_distance` in every direction.
pub fn sun_light_space_matrix(direction: Vec3, center: Vec3, affect_distance: f32) -> Mat4 {
    let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let extent = affect_distance.max(f32::EPSILON);
    let eye = center - dir * extent;
    // Straight-down light would make Y a degenerate up vector.
    let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(eye, center, up);
    let projection =
        Mat4::orthographic_rh_gl(-extent, extent, -extent, extent, 0.0, extent * 2.0);
    projection * view
}

/// Face culling for the shadow depth pass.
///
/// Heuristic: maps below [`FRONT_FACE_CULL_THRESHOLD`] cull back faces,
/// larger maps cull front faces.
pub fn shadow_cull_face(shadow_map_size: u32) -> CullMode {
    if shadow_map_size < FRONT_FACE_CULL_THRESHOLD {
        CullMode::Back
    } else {
        CullMode::Front
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn center_lands_mid_depth() {
        let m = sun_light_space_matrix(Vec3::new(-1.0, -1.0, 0.0), Vec3::ZERO, 10.0);
        let clip = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.z / clip.w, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn vertical_sun_is_well_formed() {
        let m = sun_light_space_matrix(Vec3::NEG_Y, Vec3::new(1.0, 0.0, 1.0), 5.0);
        assert!(m.is_finite());
        let edge = m * Vec4::new(6.0, 0.0, 1.0, 1.0);
        assert_relative_eq!(edge.x.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn cull_flips_at_threshold() {
        assert_eq!(shadow_cull_face(512), CullMode::Back);
        assert_eq!(shadow_cull_face(1024), CullMode::Back);
        assert_eq!(shadow_cull_face(2048), CullMode::Front);
        assert_eq!(shadow_cull_face(4096), CullMode::Front);
    }
}
