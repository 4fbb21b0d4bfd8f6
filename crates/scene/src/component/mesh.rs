use super::Component;
use glam::{Mat4, Vec4};
use stagecraft_render::{
    BoundingSphere, ColorMode, DebugShape, Draw, LodGroup, MeshData, MeshId, ParameterBlock,
    RenderElementDebug, RenderQueue, Renderable, ShaderBackend, ShaderId, TextureId,
};
use std::sync::Arc;

const NORMAL_LINE_LENGTH: f32 = 0.1;
const BOUNDS_COLOR: Vec4 = Vec4::new(0.2, 1.0, 0.2, 1.0);
const NORMALS_COLOR: Vec4 = Vec4::new(0.2, 0.4, 1.0, 1.0);

/// A static mesh with one material.
#[derive(Debug, Clone)]
pub struct MeshComponent {
    shader: ShaderId,
    mesh: MeshId,
    texture: Option<TextureId>,
    params: ParameterBlock,
    local: Mat4,
    lod: Option<LodGroup>,
    casts_shadow: bool,
    blend: Option<(ColorMode, f32)>,
    geometry: Option<Arc<MeshData>>,
}

impl MeshComponent {
    pub fn new(shader: ShaderId, mesh: MeshId) -> Self {
        Self {
            shader,
            mesh,
            texture: None,
            params: ParameterBlock::default(),
            local: Mat4::IDENTITY,
            lod: None,
            casts_shadow: true,
            blend: None,
            geometry: None,
        }
    }

    /// Draw `mesh` with its own default shader, or `fallback` when it has none.
    pub fn for_mesh(backend: &impl ShaderBackend, mesh: MeshId, fallback: ShaderId) -> Self {
        Self::new(backend.mesh_shader(mesh).unwrap_or(fallback), mesh)
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_params(mut self, params: ParameterBlock) -> Self {
        self.params = params;
        self
    }

    pub fn with_local_transform(mut self, local: Mat4) -> Self {
        self.local = local;
        self
    }

    /// Replace the mesh by distance. An empty group is ignored.
    pub fn with_lod(mut self, lod: LodGroup) -> Self {
        self.lod = (!lod.is_empty()).then_some(lod);
        self
    }

    pub fn casting_shadows(mut self, casts: bool) -> Self {
        self.casts_shadow = casts;
        self
    }

    /// Draw in the forward blending phase instead of the G-buffer.
    pub fn blended(mut self, mode: ColorMode, opacity: f32) -> Self {
        self.blend = Some((mode, opacity.clamp(0.0, 1.0)));
        self
    }

    /// CPU copy of the vertices, used for debug bounds and normals.
    pub fn with_geometry(mut self, geometry: Arc<MeshData>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn params(&self) -> &ParameterBlock {
        &self.params
    }

    /// The mesh drawn at `distance` from the camera.
    pub fn mesh_at(&self, distance: f32) -> MeshId {
        self.lod
            .as_ref()
            .and_then(|lod| lod.select(distance))
            .unwrap_or(self.mesh)
    }

    fn bounds(&self, model: &Mat4) -> Option<BoundingSphere> {
        self.geometry
            .as_ref()
            .map(|g| g.bounding_sphere().transformed(model))
    }
}

impl Renderable for MeshComponent {
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let model = *owner * self.local;
        let distance = model
            .w_axis
            .truncate()
            .distance(queue.camera_position());
        let mesh = self.mesh_at(distance);
        let draw = Draw::new(self.shader, mesh)
            .with_texture(self.texture)
            .with_params(self.params.clone());
        match self.blend {
            Some((mode, opacity)) => queue.add_blending_phase(model, mode, opacity, draw),
            None => queue.add_main_phase(model, draw),
        }
        if self.casts_shadow {
            queue.add_shadow_caster(model, mesh);
        }
    }
}

impl Component for MeshComponent {
    fn kind(&self) -> &'static str {
        "mesh"
    }

    fn on_debug_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let model = *owner * self.local;
        let Some(bounds) = self.bounds(&model) else {
            return;
        };
        queue.add_debug(RenderElementDebug {
            shape: DebugShape::Sphere {
                center: bounds.center,
                radius: bounds.radius,
            },
            color: BOUNDS_COLOR,
        });
        if let Some(geometry) = &self.geometry {
            queue.add_debug(RenderElementDebug {
                shape: DebugShape::Lines(geometry.normal_lines(&model, NORMAL_LINE_LENGTH)),
                color: NORMALS_COLOR,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use slotmap::SlotMap;
    use stagecraft_common::RenderSettings;
    use stagecraft_render_gl::{GlRenderer, HeadlessDevice};

    fn ids() -> (ShaderId, [MeshId; 3]) {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        (
            shaders.insert(()),
            [meshes.insert(()), meshes.insert(()), meshes.insert(())],
        )
    }

    #[test]
    fn opaque_mesh_fills_main_and_shadow_phases() {
        let (shader, [mesh, ..]) = ids();
        let c = MeshComponent::new(shader, mesh);
        let mut queue = RenderQueue::new();
        c.on_render_queue(&Mat4::from_translation(Vec3::X), &mut queue);
        let counts = queue.counts();
        assert_eq!((counts.main, counts.blending, counts.shadow_casters), (1, 0, 1));
        assert_eq!(queue.main_phase()[0].model.w_axis.x, 1.0);
    }

    #[test]
    fn instances_draw_with_their_default_shader() {
        let mut renderer =
            GlRenderer::new(HeadlessDevice::new(), RenderSettings::default()).unwrap();
        let cube = renderer.create_mesh(&MeshData::cube(), false).unwrap();
        let instance = renderer.create_mesh_instance(cube).unwrap();
        let (phong, sprite) = (renderer.phong_shader(), renderer.sprite_shader());
        renderer.set_mesh_shader(instance, Some(sprite)).unwrap();

        let mut queue = RenderQueue::new();
        MeshComponent::for_mesh(&renderer, cube, phong)
            .on_render_queue(&Mat4::IDENTITY, &mut queue);
        MeshComponent::for_mesh(&renderer, instance, phong)
            .on_render_queue(&Mat4::IDENTITY, &mut queue);
        let shaders: Vec<ShaderId> = queue.main_phase().iter().map(|e| e.shader).collect();
        assert_eq!(shaders, [phong, sprite]);
    }

    #[test]
    fn blended_mesh_without_shadow() {
        let (shader, [mesh, ..]) = ids();
        let c = MeshComponent::new(shader, mesh)
            .blended(ColorMode::Addition, 2.0)
            .casting_shadows(false);
        let mut queue = RenderQueue::new();
        c.on_render_queue(&Mat4::IDENTITY, &mut queue);
        assert_eq!(queue.main_phase_count(), 0);
        assert_eq!(queue.shadow_casters().len(), 0);
        let element = &queue.blending_phase()[0];
        assert_eq!(element.color_mode, ColorMode::Addition);
        assert_eq!(element.opacity, 1.0);
    }

    #[test]
    fn lod_follows_camera_distance() {
        let (shader, [hi, lo, base]) = ids();
        let c = MeshComponent::new(shader, base)
            .with_lod(LodGroup::new().with_level(hi, 10.0).with_level(lo, 50.0));
        let mut queue = RenderQueue::new();
        queue.set_camera_position(Vec3::new(0.0, 0.0, 5.0));
        c.on_render_queue(&Mat4::IDENTITY, &mut queue);
        queue.set_camera_position(Vec3::new(0.0, 0.0, 30.0));
        c.on_render_queue(&Mat4::IDENTITY, &mut queue);
        let meshes: Vec<MeshId> = queue.main_phase().iter().map(|e| e.mesh).collect();
        assert_eq!(meshes, vec![hi, lo]);
        assert_eq!(queue.shadow_casters()[1].mesh, lo);
    }

    #[test]
    fn debug_draws_bounds_and_normals() {
        let (shader, [mesh, ..]) = ids();
        let c = MeshComponent::new(shader, mesh).with_geometry(Arc::new(MeshData::quad()));
        let mut queue = RenderQueue::new();
        c.on_debug_queue(&Mat4::IDENTITY, &mut queue);
        assert_eq!(queue.debug_phase().len(), 2);
        assert_eq!(queue.debug_phase()[1].segments().len(), 6);
    }
}
