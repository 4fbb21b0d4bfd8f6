//! The per-frame, phase-partitioned list of draw commands.
//!
//! # Invariants
//! - `reset` runs once per frame before any producer writes.
//! - Phases are append-only between `reset` calls; append order is draw order.
//! - An element's model-view-projection is fixed when it is queued.
//! - Consumers read the blending, shadow, light and debug phases only after
//!   `is_done()`; only the main phase may be streamed while traversal runs.

use crate::element::{
    ColorMode, LightKind, RenderElement, RenderElementDebug, RenderElementLight, ShadowCaster,
};
use crate::handles::{MeshId, ShaderId, TextureId};
use crate::parameter::ParameterBlock;
use crossbeam_channel::{Receiver, Sender};
use glam::{Mat4, Vec2, Vec3};

/// Material side of a draw: what to bind before drawing a mesh.
#[derive(Debug, Clone)]
pub struct Draw {
    pub shader: ShaderId,
    pub mesh: MeshId,
    pub texture: Option<TextureId>,
    pub params: ParameterBlock,
    pub uv_shift: Vec2,
    pub uv_size: Vec2,
}

impl Draw {
    pub fn new(shader: ShaderId, mesh: MeshId) -> Self {
        Self {
            shader,
            mesh,
            texture: None,
            params: ParameterBlock::default(),
            uv_shift: Vec2::ZERO,
            uv_size: Vec2::ONE,
        }
    }

    pub fn with_texture(mut self, texture: Option<TextureId>) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_params(mut self, params: ParameterBlock) -> Self {
        self.params = params;
        self
    }

    /// Spritesheet frame: offset and size in normalized texture space.
    pub fn with_uv(mut self, shift: Vec2, size: Vec2) -> Self {
        self.uv_shift = shift;
        self.uv_size = size;
        self
    }
}

/// Scalar state shared by every element of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub view_projection: Mat4,
    pub ambient: Vec3,
    pub camera_position: Vec3,
    pub camera_direction: Vec3,
    pub gamma: f32,
    /// Sharp HDR environment, sampled for reflections and the sky cube.
    pub hdr_texture: Option<TextureId>,
    /// Blurred HDR environment, sampled for diffuse ambient.
    pub radiance_texture: Option<TextureId>,
    pub environment_rotation: f32,
    pub show_environment: bool,
    /// Back-to-front sorting replaces depth testing for the whole layer.
    pub sorting: bool,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
            ambient: Vec3::ZERO,
            camera_position: Vec3::ZERO,
            camera_direction: Vec3::NEG_Z,
            gamma: 2.2,
            hdr_texture: None,
            radiance_texture: None,
            environment_rotation: 0.0,
            show_environment: false,
            sorting: false,
        }
    }
}

impl FrameState {
    /// The sky cube is drawn only when an environment is set and visible.
    pub fn draws_environment(&self) -> bool {
        self.show_environment && self.hdr_texture.is_some()
    }
}

/// Number of elements per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub main: usize,
    pub blending: usize,
    pub shadow_casters: usize,
    pub lights: usize,
    pub debug: usize,
}

/// Phase-partitioned draw list, reused across frames.
#[derive(Debug, Default)]
pub struct RenderQueue {
    main: Vec<RenderElement>,
    blending: Vec<RenderElement>,
    shadow_casters: Vec<ShadowCaster>,
    lights: Vec<RenderElementLight>,
    debug: Vec<RenderElementDebug>,
    frame: FrameState,
    done: bool,
    main_stream: Option<Sender<RenderElement>>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the main phase; the other phases scale from it.
    pub fn with_capacity(main: usize) -> Self {
        Self {
            main: Vec::with_capacity(main),
            blending: Vec::with_capacity(main / 4),
            shadow_casters: Vec::with_capacity(main),
            lights: Vec::with_capacity(16),
            ..Self::default()
        }
    }

    /// Clear every phase and restore default frame state. Buffers keep their capacity.
    pub fn reset(&mut self) {
        self.main.clear();
        self.blending.clear();
        self.shadow_casters.clear();
        self.lights.clear();
        self.debug.clear();
        self.frame = FrameState::default();
        self.done = false;
        self.main_stream = None;
    }

    // --- Frame state ---

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn set_view_projection_matrix(&mut self, view_projection: Mat4) {
        self.frame.view_projection = view_projection;
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.frame.view_projection
    }

    pub fn set_ambient_light(&mut self, ambient: Vec3) {
        self.frame.ambient = ambient;
    }

    pub fn set_camera_position(&mut self, position: Vec3) {
        self.frame.camera_position = position;
    }

    pub fn camera_position(&self) -> Vec3 {
        self.frame.camera_position
    }

    pub fn set_camera_direction(&mut self, direction: Vec3) {
        self.frame.camera_direction = direction;
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        self.frame.gamma = gamma;
    }

    pub fn set_hdr_texture(&mut self, texture: Option<TextureId>) {
        self.frame.hdr_texture = texture;
    }

    pub fn set_radiance_texture(&mut self, texture: Option<TextureId>) {
        self.frame.radiance_texture = texture;
    }

    pub fn set_environment_rotation(&mut self, radians: f32) {
        self.frame.environment_rotation = radians;
    }

    pub fn set_show_env_hdr(&mut self, show: bool) {
        self.frame.show_environment = show;
    }

    pub fn enable_sorting(&mut self) {
        self.frame.sorting = true;
    }

    pub fn disable_sorting(&mut self) {
        self.frame.sorting = false;
    }

    pub fn is_using_sorting(&self) -> bool {
        self.frame.sorting
    }

    // --- Producer side ---

    /// Queue an opaque, deferred-shaded draw.
    pub fn add_main_phase(&mut self, model: Mat4, draw: Draw) {
        let element = self.element(model, draw, 1.0, ColorMode::Lit);
        let disconnected = self
            .main_stream
            .as_ref()
            .is_some_and(|stream| stream.send(element.clone()).is_err());
        if disconnected {
            // Consumer went away; keep filling the queue for a joined render.
            self.main_stream = None;
        }
        self.main.push(element);
    }

    /// Queue a forward-shaded, possibly transparent draw.
    pub fn add_blending_phase(
        &mut self,
        model: Mat4,
        color_mode: ColorMode,
        opacity: f32,
        draw: Draw,
    ) {
        let element = self.element(model, draw, opacity, color_mode);
        self.blending.push(element);
    }

    /// Queue geometry for the sun shadow map.
    pub fn add_shadow_caster(&mut self, model: Mat4, mesh: MeshId) {
        self.shadow_casters.push(ShadowCaster { model, mesh });
    }

    /// Queue a light. Sun lights read `position` as a direction.
    pub fn add_light(
        &mut self,
        kind: LightKind,
        position: Vec3,
        color: Vec3,
        affect_distance: f32,
        casts_shadow: bool,
    ) {
        self.lights.push(RenderElementLight {
            kind,
            position,
            color,
            affect_distance,
            casts_shadow,
        });
    }

    pub fn add_debug(&mut self, debug: RenderElementDebug) {
        self.debug.push(debug);
    }

    fn element(
        &self,
        model: Mat4,
        draw: Draw,
        opacity: f32,
        color_mode: ColorMode,
    ) -> RenderElement {
        RenderElement {
            model,
            model_view_projection: self.frame.view_projection * model,
            shader: draw.shader,
            texture: draw.texture,
            mesh: draw.mesh,
            params: draw.params,
            opacity,
            color_mode,
            uv_shift: draw.uv_shift,
            uv_size: draw.uv_size,
        }
    }

    /// Mirror every subsequent main-phase append into the returned channel.
    /// The channel disconnects when the queue is finished or reset.
    pub fn attach_main_stream(&mut self) -> Receiver<RenderElement> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.main_stream = Some(sender);
        receiver
    }

    /// Mark traversal complete and close the main-phase stream.
    pub fn finish(&mut self) {
        self.main_stream = None;
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Sort the blending phase back-to-front by NDC depth of each element origin.
    pub fn sort_blending_phase(&mut self) {
        self.blending
            .sort_by(|a, b| b.depth_key().total_cmp(&a.depth_key()));
    }

    // --- Consumer side ---

    pub fn main_phase(&self) -> &[RenderElement] {
        &self.main
    }

    pub fn main_phase_count(&self) -> usize {
        self.main.len()
    }

    pub fn blending_phase(&self) -> &[RenderElement] {
        &self.blending
    }

    pub fn blending_phase_count(&self) -> usize {
        self.blending.len()
    }

    pub fn shadow_casters(&self) -> &[ShadowCaster] {
        &self.shadow_casters
    }

    pub fn shadow_caster_count(&self) -> usize {
        self.shadow_casters.len()
    }

    pub fn lights(&self) -> &[RenderElementLight] {
        &self.lights
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn debug_phase(&self) -> &[RenderElementDebug] {
        &self.debug
    }

    pub fn counts(&self) -> PhaseCounts {
        PhaseCounts {
            main: self.main.len(),
            blending: self.blending.len(),
            shadow_casters: self.shadow_casters.len(),
            lights: self.lights.len(),
            debug: self.debug.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::DebugShape;
    use glam::Vec4;
    use slotmap::SlotMap;

    fn ids() -> (ShaderId, MeshId) {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        (shaders.insert(()), meshes.insert(()))
    }

    fn perspective_queue() -> RenderQueue {
        let mut q = RenderQueue::new();
        let proj = Mat4::perspective_rh_gl(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        q.set_view_projection_matrix(proj * view);
        q
    }

    #[test]
    fn phases_count_their_own_appends() {
        let (shader, mesh) = ids();
        let mut q = RenderQueue::new();
        for _ in 0..3 {
            q.add_main_phase(Mat4::IDENTITY, Draw::new(shader, mesh));
        }
        for _ in 0..2 {
            q.add_blending_phase(Mat4::IDENTITY, ColorMode::Alpha, 0.5, Draw::new(shader, mesh));
        }
        q.add_shadow_caster(Mat4::IDENTITY, mesh);
        for _ in 0..4 {
            q.add_light(LightKind::Omni, Vec3::ZERO, Vec3::ONE, 10.0, false);
        }
        assert_eq!(
            q.counts(),
            PhaseCounts {
                main: 3,
                blending: 2,
                shadow_casters: 1,
                lights: 4,
                debug: 0
            }
        );

        q.reset();
        assert_eq!(q.counts(), PhaseCounts::default());
        assert!(!q.is_done());
    }

    #[test]
    fn mvp_is_captured_at_append_time() {
        let (shader, mesh) = ids();
        let mut q = RenderQueue::new();
        let vp = Mat4::from_scale(Vec3::splat(2.0));
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        q.set_view_projection_matrix(vp);
        q.add_main_phase(model, Draw::new(shader, mesh));

        q.set_view_projection_matrix(Mat4::IDENTITY);
        q.add_main_phase(model, Draw::new(shader, mesh));

        assert_eq!(q.main_phase()[0].model_view_projection, vp * model);
        assert_eq!(q.main_phase()[1].model_view_projection, model);
    }

    #[test]
    fn reset_restores_frame_state() {
        let mut q = RenderQueue::new();
        q.enable_sorting();
        q.set_gamma(1.8);
        q.set_ambient_light(Vec3::ONE);
        q.finish();
        q.reset();
        assert_eq!(q.frame(), &FrameState::default());
        assert!(!q.is_using_sorting());
    }

    #[test]
    fn sorting_orders_back_to_front() {
        let (shader, mesh) = ids();
        let mut q = perspective_queue();
        for z in [5.0, 10.0, 2.0, 30.0, 7.5] {
            let model = Mat4::from_translation(Vec3::new(0.0, 0.0, -z));
            q.add_blending_phase(model, ColorMode::Alpha, 1.0, Draw::new(shader, mesh));
        }
        q.sort_blending_phase();

        let keys: Vec<f32> = q.blending_phase().iter().map(|e| e.depth_key()).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] >= pair[1], "{keys:?}");
        }
        let first_z = q.blending_phase()[0].model.w_axis.z;
        assert_eq!(first_z, -30.0);
    }

    #[test]
    fn main_stream_mirrors_appends_until_finish() {
        let (shader, mesh) = ids();
        let mut q = RenderQueue::new();
        let rx = q.attach_main_stream();
        q.add_main_phase(Mat4::IDENTITY, Draw::new(shader, mesh));
        q.add_blending_phase(Mat4::IDENTITY, ColorMode::Lit, 1.0, Draw::new(shader, mesh));
        q.add_main_phase(Mat4::IDENTITY, Draw::new(shader, mesh));
        q.finish();

        let streamed: Vec<_> = rx.iter().collect();
        assert_eq!(streamed.len(), 2);
        assert!(q.is_done());
        assert_eq!(q.main_phase_count(), 2);
    }

    #[test]
    fn dropped_stream_consumer_does_not_lose_elements() {
        let (shader, mesh) = ids();
        let mut q = RenderQueue::new();
        drop(q.attach_main_stream());
        q.add_main_phase(Mat4::IDENTITY, Draw::new(shader, mesh));
        assert_eq!(q.main_phase_count(), 1);
    }

    #[test]
    fn debug_phase_is_additive() {
        let mut q = RenderQueue::new();
        q.add_debug(RenderElementDebug {
            shape: DebugShape::Sphere {
                center: Vec3::ZERO,
                radius: 1.0,
            },
            color: Vec4::ONE,
        });
        assert_eq!(q.counts().debug, 1);
        assert_eq!(q.counts().main, 0);
    }

    #[test]
    fn environment_requires_texture_and_flag() {
        let mut q = RenderQueue::new();
        q.set_show_env_hdr(true);
        assert!(!q.frame().draws_environment());
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        q.set_hdr_texture(Some(textures.insert(())));
        assert!(q.frame().draws_environment());
    }
}
