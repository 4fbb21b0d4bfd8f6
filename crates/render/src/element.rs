//! Draw commands stored in the render queue.

use crate::handles::{MeshId, ShaderId, TextureId};
use crate::parameter::ParameterBlock;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// How a blending-phase element is composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorMode {
    /// Lit forward shading, written without blending.
    #[default]
    Lit,
    /// `(SRC_ALPHA, ONE_MINUS_SRC_ALPHA)`.
    Alpha,
    /// `(SRC_ALPHA, ONE)`.
    Addition,
}

/// One draw call.
#[derive(Debug, Clone)]
pub struct RenderElement {
    pub model: Mat4,
    /// `view_projection * model`, captured when the element was queued.
    pub model_view_projection: Mat4,
    pub shader: ShaderId,
    pub texture: Option<TextureId>,
    pub mesh: MeshId,
    pub params: ParameterBlock,
    pub opacity: f32,
    pub color_mode: ColorMode,
    pub uv_shift: Vec2,
    pub uv_size: Vec2,
}

impl RenderElement {
    /// Depth of the element origin in normalized device coordinates.
    /// Larger values are farther from the camera.
    pub fn depth_key(&self) -> f32 {
        let clip = self.model_view_projection * Vec4::W;
        if clip.w.abs() <= f32::EPSILON {
            clip.z
        } else {
            clip.z / clip.w
        }
    }
}

/// Geometry-only draw used when filling a shadow map.
#[derive(Debug, Clone, Copy)]
pub struct ShadowCaster {
    pub model: Mat4,
    pub mesh: MeshId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Directional light; `position` is the direction the light travels.
    Sun,
    /// Point light with distance falloff.
    Omni,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderElementLight {
    pub kind: LightKind,
    pub position: Vec3,
    /// Already scaled by intensity.
    pub color: Vec3,
    pub affect_distance: f32,
    pub casts_shadow: bool,
}

impl RenderElementLight {
    /// Normalized direction for sun lights.
    pub fn direction(&self) -> Vec3 {
        self.position.try_normalize().unwrap_or(Vec3::NEG_Y)
    }
}

/// Wireframe shapes for the debug pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugShape {
    Aabb { min: Vec3, max: Vec3 },
    Sphere { center: Vec3, radius: f32 },
    Lines(Vec<[Vec3; 2]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderElementDebug {
    pub shape: DebugShape,
    pub color: Vec4,
}

impl RenderElementDebug {
    /// Line segments in world space.
    pub fn segments(&self) -> Vec<[Vec3; 2]> {
        match &self.shape {
            DebugShape::Aabb { min, max } => aabb_segments(*min, *max),
            DebugShape::Sphere { center, radius } => sphere_segments(*center, *radius, 24),
            DebugShape::Lines(lines) => lines.clone(),
        }
    }
}

fn aabb_segments(min: Vec3, max: Vec3) -> Vec<[Vec3; 2]> {
    let corner = |i: usize| {
        Vec3::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        )
    };
    let mut lines = Vec::with_capacity(12);
    for i in 0..8 {
        for bit in [1, 2, 4] {
            if i & bit == 0 {
                lines.push([corner(i), corner(i | bit)]);
            }
        }
    }
    lines
}

/// Three great circles, one per axis plane.
fn sphere_segments(center: Vec3, radius: f32, steps: usize) -> Vec<[Vec3; 2]> {
    let point = |plane: usize, angle: f32| {
        let (s, c) = angle.sin_cos();
        let offset = match plane {
            0 => Vec3::new(c, s, 0.0),
            1 => Vec3::new(c, 0.0, s),
            _ => Vec3::new(0.0, c, s),
        };
        center + offset * radius
    };
    let step = std::f32::consts::TAU / steps as f32;
    (0..3)
        .flat_map(|plane| {
            (0..steps).map(move |i| {
                [
                    point(plane, i as f32 * step),
                    point(plane, (i + 1) as f32 * step),
                ]
            })
        })
        .collect()
}
