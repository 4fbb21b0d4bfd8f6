use super::Component;
use glam::{Mat4, Vec3};
use stagecraft_render::{
    ColorMode, Draw, MeshId, ParameterBlock, RenderQueue, Renderable, ShaderId, TextureId,
};

/// A translucent hull drawn around a mesh: glow, force fields, selection.
///
/// The shell is the mesh scaled about its origin by `1 + thickness` and
/// queued in the blending phase. It never casts shadows.
#[derive(Debug, Clone)]
pub struct MeshShellComponent {
    shader: ShaderId,
    mesh: MeshId,
    texture: Option<TextureId>,
    params: ParameterBlock,
    thickness: f32,
    color_mode: ColorMode,
    opacity: f32,
}

impl MeshShellComponent {
    pub fn new(shader: ShaderId, mesh: MeshId, thickness: f32) -> Self {
        Self {
            shader,
            mesh,
            texture: None,
            params: ParameterBlock::default(),
            thickness: thickness.max(0.0),
            color_mode: ColorMode::Addition,
            opacity: 0.5,
        }
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_params(mut self, params: ParameterBlock) -> Self {
        self.params = params;
        self
    }

    pub fn with_blend(mut self, mode: ColorMode, opacity: f32) -> Self {
        self.color_mode = mode;
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn thickness(&self) -> f32 {
        self.thickness
    }
}

impl Renderable for MeshShellComponent {
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let model = *owner * Mat4::from_scale(Vec3::splat(1.0 + self.thickness));
        let draw = Draw::new(self.shader, self.mesh)
            .with_texture(self.texture)
            .with_params(self.params.clone());
        queue.add_blending_phase(model, self.color_mode, self.opacity, draw);
    }
}

impl Component for MeshShellComponent {
    fn kind(&self) -> &'static str {
        "mesh_shell"
    }
}
