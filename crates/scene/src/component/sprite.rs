use super::Component;
use glam::{Mat4, Vec2, Vec3, Vec4};
use stagecraft_render::{
    ColorMode, DebugShape, Draw, MeshId, ParameterBlock, RenderElementDebug, RenderQueue,
    Renderable, ShaderId, TextureId,
};

/// A textured quad cut from a spritesheet grid, drawn in the blending phase.
///
/// Frames are numbered row by row from the top-left cell of the sheet.
#[derive(Debug, Clone)]
pub struct SpriteComponent {
    shader: ShaderId,
    quad: MeshId,
    texture: Option<TextureId>,
    params: ParameterBlock,
    size: Vec2,
    columns: u32,
    rows: u32,
    frame: u32,
    color_mode: ColorMode,
    opacity: f32,
}

impl SpriteComponent {
    /// A single-frame sprite. `quad` must be a unit quad in the XY plane.
    pub fn new(shader: ShaderId, quad: MeshId, texture: Option<TextureId>) -> Self {
        Self {
            shader,
            quad,
            texture,
            params: ParameterBlock::default(),
            size: Vec2::ONE,
            columns: 1,
            rows: 1,
            frame: 0,
            color_mode: ColorMode::Alpha,
            opacity: 1.0,
        }
    }

    pub fn with_sheet(mut self, columns: u32, rows: u32) -> Self {
        self.columns = columns.max(1);
        self.rows = rows.max(1);
        self.frame %= self.frame_count();
        self
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        self.size = size;
        self
    }

    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    pub fn with_params(mut self, params: ParameterBlock) -> Self {
        self.params = params;
        self
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn frame_count(&self) -> u32 {
        self.columns * self.rows
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Select a frame; indices wrap around the sheet.
    pub fn set_frame(&mut self, frame: u32) {
        self.frame = frame % self.frame_count();
    }

    pub fn next_frame(&mut self) {
        self.set_frame(self.frame + 1);
    }

    /// Texture-space offset and size of the current frame.
    pub fn frame_uv(&self) -> (Vec2, Vec2) {
        let size = Vec2::new(1.0 / self.columns as f32, 1.0 / self.rows as f32);
        let column = self.frame % self.columns;
        let row = self.frame / self.columns;
        // UV origin is bottom-left, the first row is at the top.
        let shift = Vec2::new(column as f32 * size.x, 1.0 - (row + 1) as f32 * size.y);
        (shift, size)
    }
}

impl Renderable for SpriteComponent {
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let model = *owner * Mat4::from_scale(self.size.extend(1.0));
        let (shift, size) = self.frame_uv();
        let draw = Draw::new(self.shader, self.quad)
            .with_texture(self.texture)
            .with_params(self.params.clone())
            .with_uv(shift, size);
        queue.add_blending_phase(model, self.color_mode, self.opacity, draw);
    }
}

impl Component for SpriteComponent {
    fn kind(&self) -> &'static str {
        "sprite"
    }

    fn on_debug_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let half = self.size * 0.5;
        let corners = [
            Vec3::new(-half.x, -half.y, 0.0),
            Vec3::new(half.x, -half.y, 0.0),
            Vec3::new(half.x, half.y, 0.0),
            Vec3::new(-half.x, half.y, 0.0),
        ]
        .map(|c| owner.transform_point3(c));
        let lines = (0..4).map(|i| [corners[i], corners[(i + 1) % 4]]).collect();
        queue.add_debug(RenderElementDebug {
            shape: DebugShape::Lines(lines),
            color: Vec4::new(1.0, 1.0, 0.2, 1.0),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn sprite() -> SpriteComponent {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        SpriteComponent::new(shaders.insert(()), meshes.insert(()), None)
    }

    #[test]
    fn frames_map_to_sheet_cells() {
        let mut s = sprite().with_sheet(4, 2);
        let (shift, size) = s.frame_uv();
        assert_relative_eq!(size, Vec2::new(0.25, 0.5));
        assert_relative_eq!(shift, Vec2::new(0.0, 0.5));

        s.set_frame(5);
        let (shift, _) = s.frame_uv();
        assert_relative_eq!(shift, Vec2::new(0.25, 0.0));

        s.set_frame(7);
        s.next_frame();
        assert_eq!(s.frame(), 0);
    }

    #[test]
    fn queues_blended_quad_with_uv_window() {
        let mut s = sprite()
            .with_sheet(2, 1)
            .with_size(Vec2::new(2.0, 3.0))
            .with_color_mode(ColorMode::Addition);
        s.set_frame(1);
        s.set_opacity(0.5);
        let mut queue = RenderQueue::new();
        s.on_render_queue(&Mat4::IDENTITY, &mut queue);
        assert_eq!(queue.main_phase_count(), 0);
        let e = &queue.blending_phase()[0];
        assert_eq!(e.color_mode, ColorMode::Addition);
        assert_eq!(e.opacity, 0.5);
        assert_relative_eq!(e.uv_shift, Vec2::new(0.5, 0.0));
        assert_relative_eq!(e.uv_size, Vec2::new(0.5, 1.0));
        assert_relative_eq!(e.model.x_axis.x, 2.0);
        assert_relative_eq!(e.model.y_axis.y, 3.0);
    }
}
