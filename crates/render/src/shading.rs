//! CPU versions of the lighting math the GLSL passes implement.
//!
//! Backends use these for uniform packing and tests use them as the expected
//! per-pixel result.

use glam::Vec3;

/// G-buffer positions are stored scaled so they fit half floats.
pub const POSITION_SCALE: f32 = 0.1;

pub fn encode_position(world: Vec3) -> Vec3 {
    world * POSITION_SCALE
}

pub fn decode_position(stored: Vec3) -> Vec3 {
    stored / POSITION_SCALE
}

/// `1.055 * c^(1/gamma) - 0.055`, clamped to the displayable range.
pub fn gamma_encode(c: f32, gamma: f32) -> f32 {
    (1.055 * c.max(0.0).powf(1.0 / gamma) - 0.055).clamp(0.0, 1.0)
}

pub fn gamma_encode_rgb(c: Vec3, gamma: f32) -> Vec3 {
    Vec3::new(
        gamma_encode(c.x, gamma),
        gamma_encode(c.y, gamma),
        gamma_encode(c.z, gamma),
    )
}

/// Linear falloff to zero at `affect_distance`.
pub fn omni_falloff(distance: f32, affect_distance: f32) -> f32 {
    if affect_distance <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / affect_distance).max(0.0)
}

/// Diffuse sun contribution. `direction` is the way the light travels.
pub fn sun_lambert(albedo: Vec3, normal: Vec3, direction: Vec3, color: Vec3) -> Vec3 {
    let n_dot_l = normal.dot(-direction.normalize_or_zero()).max(0.0);
    albedo * color * n_dot_l
}

/// Diffuse omni contribution at `point`.
pub fn omni_lambert(
    albedo: Vec3,
    normal: Vec3,
    point: Vec3,
    light_position: Vec3,
    color: Vec3,
    affect_distance: f32,
) -> Vec3 {
    let to_light = light_position - point;
    let n_dot_l = normal.dot(to_light.normalize_or_zero()).max(0.0);
    albedo * color * n_dot_l * omni_falloff(to_light.length(), affect_distance)
}

/// Depth bias for shadow lookups, larger on surfaces at grazing angles.
pub fn shadow_bias(normal: Vec3, direction: Vec3) -> f32 {
    let cos = normal.dot(-direction.normalize_or_zero()).clamp(0.0, 1.0);
    (0.005 * (1.0 - cos)).max(0.0005)
}

/// Half-width of the percentage-closer filter kernel (5x5 taps).
pub const PCF_RADIUS: i32 = 2;
