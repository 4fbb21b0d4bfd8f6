//! Deferred OpenGL frame renderer.
//!
//! Pass order: environment, geometry, ambient, per-light (shadow map then
//! shaded sun, or omni), blending, debug lines, composite.
//!
//! # Invariants
//! - Draws with a non-ready shader or an unknown resource are skipped
//!   before any device call and counted in [`FrameStats::skipped_draws`].
//! - Lighting passes accumulate additively into the lighting buffer, which
//!   shares depth with the G-buffer.
//! - The composite pass is the only writer of the result image.

use crate::context::GlContext;
use crate::device::{BlendFunc, CullMode, GlDevice, PrimitiveMode, RawTexture};
use crate::error::GlError;
use crate::glsl::{self, GBUFFER_SAMPLERS};
use crate::light::{shadow_cull_face, sun_light_space_matrix};
use crate::mesh::MeshStatic;
use crate::resources::Resources;
use crate::shader::{Shader, TextureSlot};
use crate::target::RenderTarget;
use crate::texture::Texture;
use glam::{Mat4, Vec2};
use stagecraft_common::{Antialiasing, RenderSettings};
use stagecraft_render::{
    ColorMode, FrameRenderer, FrameState, FrameStats, LightKind, MeshData, MeshId, ParamType,
    Pass, RenderElement, RenderElementLight, RenderError, RenderQueue, ShaderBackend, ShaderId,
    ShaderParameter, TextureId,
};
use std::sync::Arc;

const ENVIRONMENT_UNIT: u32 = 4;
const RADIANCE_UNIT: u32 = 5;

/// Handles of everything the pipeline itself needs.
#[derive(Debug, Clone, Copy)]
struct Builtins {
    sky: ShaderId,
    ambient: ShaderId,
    sun: ShaderId,
    sun_shadow: ShaderId,
    omni: ShaderId,
    shadow_depth: ShaderId,
    lines: ShaderId,
    composite: ShaderId,
    composite_fxaa: ShaderId,
    phong: ShaderId,
    sprite: ShaderId,
    screen_quad: MeshId,
    sky_cube: MeshId,
    white: TextureId,
}

impl Builtins {
    fn create<D: GlDevice>(gl: &mut GlContext<D>, res: &mut Resources) -> Result<Self, GlError> {
        let mut program = |shader: Shader| -> Result<ShaderId, GlError> {
            let name = shader.name().to_string();
            let id = res.add_shader(gl, shader);
            if res.is_ready(id) {
                Ok(id)
            } else {
                Err(GlError::Device(format!("built-in program `{name}` failed to build")))
            }
        };
        let sky = program(Shader::from_source(&glsl::SKY))?;
        let ambient = program(Shader::from_source(&glsl::AMBIENT))?;
        let sun = program(Shader::from_source(&glsl::SUN))?;
        let sun_shadow = program(Shader::from_source(&glsl::SUN_SHADOW))?;
        let omni = program(Shader::from_source(&glsl::OMNI))?;
        let shadow_depth = program(Shader::from_source(&glsl::SHADOW_DEPTH))?;
        let lines = program(Shader::from_source(&glsl::DEBUG_LINES))?;
        let composite = program(Shader::from_source(&glsl::COMPOSITE))?;
        let composite_fxaa = program(Shader::from_source(&glsl::COMPOSITE_FXAA))?;
        let phong = program(Shader::phong("builtin/phong", glsl::PHONG_FRAGMENT))?;
        let sprite = program(Shader::phong("builtin/sprite", glsl::SPRITE_FRAGMENT))?;

        Ok(Self {
            sky,
            ambient,
            sun,
            sun_shadow,
            omni,
            shadow_depth,
            lines,
            composite,
            composite_fxaa,
            phong,
            sprite,
            screen_quad: res.create_mesh(gl, &MeshData::screen_quad(), false)?,
            sky_cube: res.create_mesh(gl, &MeshData::cube().inverted(), false)?,
            white: res.white_texture(gl)?,
        })
    }
}

pub struct GlRenderer<D: GlDevice> {
    gl: GlContext<D>,
    resources: Resources,
    settings: RenderSettings,
    builtins: Builtins,
    frame: FrameState,
    stats: FrameStats,
    last_stats: FrameStats,
}

impl<D: GlDevice> GlRenderer<D> {
    /// Build the pipeline programs and shared meshes on `device`.
    pub fn new(device: D, settings: RenderSettings) -> Result<Self, GlError> {
        let _span = tracing::info_span!("renderer_init").entered();
        let mut gl = GlContext::new(device);
        let mut resources = Resources::new();
        let builtins = Builtins::create(&mut gl, &mut resources)?;
        let settings = settings.sanitized();
        tracing::info!(
            quality = ?settings.quality,
            antialiasing = ?settings.antialiasing,
            supersampling = settings.supersampling,
            "renderer ready"
        );
        Ok(Self {
            gl,
            resources,
            settings,
            builtins,
            frame: FrameState::default(),
            stats: FrameStats::default(),
            last_stats: FrameStats::default(),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// New settings apply to targets created afterwards.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings.sanitized();
    }

    pub fn create_target(&mut self, width: u32, height: u32) -> Result<RenderTarget, GlError> {
        Ok(RenderTarget::new(&mut self.gl, width, height, &self.settings)?)
    }

    pub fn resize_target(
        &mut self,
        target: &mut RenderTarget,
        width: u32,
        height: u32,
    ) -> Result<(), GlError> {
        Ok(target.resize(&mut self.gl, width, height, &self.settings)?)
    }

    pub fn destroy_target(&mut self, target: RenderTarget) {
        target.destroy(&mut self.gl);
    }

    pub fn context(&self) -> &GlContext<D> {
        &self.gl
    }

    pub fn device(&self) -> &D {
        self.gl.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.gl.device_mut()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Context and registry together, for uploads the helpers below don't cover.
    pub fn parts_mut(&mut self) -> (&mut GlContext<D>, &mut Resources) {
        (&mut self.gl, &mut self.resources)
    }

    /// Deferred material writing the G-buffer.
    pub fn phong_shader(&self) -> ShaderId {
        self.builtins.phong
    }

    /// Forward material for the blending phase.
    pub fn sprite_shader(&self) -> ShaderId {
        self.builtins.sprite
    }

    pub fn add_shader(&mut self, shader: Shader) -> ShaderId {
        self.resources.add_shader(&mut self.gl, shader)
    }

    pub fn create_mesh(
        &mut self,
        data: &MeshData,
        build_tangents: bool,
    ) -> Result<MeshId, GlError> {
        self.resources.create_mesh(&mut self.gl, data, build_tangents)
    }

    pub fn create_mesh_instance(&mut self, source: MeshId) -> Result<MeshId, GlError> {
        self.resources.create_mesh_instance(source)
    }

    /// Give `mesh` its own default shader. Instances keep theirs apart from
    /// the source.
    pub fn set_mesh_shader(
        &mut self,
        mesh: MeshId,
        shader: Option<ShaderId>,
    ) -> Result<(), GlError> {
        self.resources
            .mesh_mut(mesh)
            .ok_or(GlError::UnknownMesh)?
            .set_default_shader(shader);
        Ok(())
    }

    pub fn destroy_mesh(&mut self, mesh: MeshId) -> Result<(), GlError> {
        self.resources.destroy_mesh(&mut self.gl, mesh)
    }

    pub fn create_texture_rgba8(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureId, GlError> {
        let texture = Texture::rgba8(&mut self.gl, width, height, pixels)?;
        Ok(self.resources.add_texture(texture))
    }

    pub fn create_hdr_texture(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[f32],
    ) -> Result<TextureId, GlError> {
        let texture = Texture::hdr(&mut self.gl, width, height, pixels)?;
        Ok(self.resources.add_texture(texture))
    }

    /// Stats of the last completed frame.
    pub fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    /// Free every resource and hand the device back.
    pub fn shutdown(mut self) -> D {
        self.resources.clear(&mut self.gl);
        tracing::info!("renderer shut down");
        self.gl.into_device()
    }

    fn texture_raw(&self, id: Option<TextureId>) -> Option<RawTexture> {
        id.and_then(|id| self.resources.texture(id)).map(Texture::raw)
    }

    fn environment_pass(&mut self) {
        let Some(environment) = self.texture_raw(self.frame.hdr_texture) else {
            return;
        };
        let _span = tracing::debug_span!("pass", pass = ?Pass::Environment).entered();
        let gl = &mut self.gl;
        gl.set_depth_test(false);
        gl.set_depth_write(false);
        gl.set_blend(None);
        gl.set_cull(None);
        let (Some(shader), Some(cube)) = (
            self.resources.shader(self.builtins.sky),
            self.resources.mesh(self.builtins.sky_cube),
        ) else {
            return;
        };
        // Centered on the camera so the sky never moves relative to it.
        let mvp = self.frame.view_projection * Mat4::from_translation(self.frame.camera_position);
        if shader.use_with(gl, &Mat4::IDENTITY, &mvp) {
            gl.set_i32(shader.uniform("tEnvironment"), 0);
            gl.bind_texture(0, Some(environment));
            gl.set_f32(shader.uniform("uEnvRotation"), self.frame.environment_rotation);
            cube.draw(gl);
            self.stats.passes.push(Pass::Environment);
        }
    }

    fn ambient_pass(&mut self, target: &RenderTarget) {
        let _span = tracing::debug_span!("pass", pass = ?Pass::Ambient).entered();
        target.setup_lightning(&mut self.gl, true);
        fullscreen_state(&mut self.gl);

        let environment = self.texture_raw(self.frame.hdr_texture);
        let radiance = self
            .texture_raw(self.frame.radiance_texture)
            .or(environment);
        let frame = &self.frame;
        let drawn = draw_fullscreen(
            &mut self.gl,
            &self.resources,
            self.builtins.screen_quad,
            self.builtins.ambient,
            |gl, shader| {
                bind_gbuffer(gl, shader, target);
                gl.set_vec3(shader.uniform("uAmbient"), frame.ambient);
                gl.set_vec3(shader.uniform("uCameraPosition"), frame.camera_position);
                gl.set_f32(shader.uniform("uEnvRotation"), frame.environment_rotation);
                let has_environment = environment.is_some();
                gl.set_i32(shader.uniform("uHasEnvironment"), i32::from(has_environment));
                gl.set_i32(shader.uniform("tEnvironment"), ENVIRONMENT_UNIT as i32);
                gl.set_i32(shader.uniform("tRadiance"), RADIANCE_UNIT as i32);
                gl.bind_texture(ENVIRONMENT_UNIT, environment);
                gl.bind_texture(RADIANCE_UNIT, radiance);
            },
        );
        if drawn {
            self.stats.passes.push(Pass::Ambient);
        }
    }

    fn shadow_map_pass(&mut self, queue: &RenderQueue, target: &RenderTarget, light_space: &Mat4) {
        let _span = tracing::debug_span!("pass", pass = ?Pass::SunShadowMap).entered();
        let gl = &mut self.gl;
        target.setup_shadow(gl, true);
        gl.set_depth_test(true);
        gl.set_depth_write(true);
        gl.set_blend(None);
        gl.set_cull(Some(shadow_cull_face(target.shadow_map_size())));

        let Some(shader) = self.resources.shader(self.builtins.shadow_depth) else {
            return;
        };
        let Some(program) = shader.program() else {
            return;
        };
        gl.use_program(Some(program));
        for caster in queue.shadow_casters() {
            let Some(mesh) = self.resources.mesh(caster.mesh) else {
                self.stats.skipped_draws += 1;
                continue;
            };
            gl.set_mat4(shader.uniform("uLightMVP"), &(*light_space * caster.model));
            mesh.draw(gl);
            self.stats.shadow_draws += 1;
        }
        self.stats.passes.push(Pass::SunShadowMap);
    }

    fn light_pass(
        &mut self,
        queue: &RenderQueue,
        target: &RenderTarget,
        light: &RenderElementLight,
    ) {
        let shadowed = light.kind == LightKind::Sun && light.casts_shadow;
        let light_space = sun_light_space_matrix(
            light.direction(),
            self.frame.camera_position,
            light.affect_distance,
        );
        if shadowed {
            self.shadow_map_pass(queue, target, &light_space);
        } else if light.casts_shadow {
            tracing::debug!("omni shadows are not supported, drawing unshadowed");
        }

        let pass = match light.kind {
            LightKind::Sun => Pass::SunLight,
            LightKind::Omni => Pass::OmniLight,
        };
        let _span = tracing::debug_span!("pass", pass = ?pass).entered();
        target.setup_lightning(&mut self.gl, false);
        fullscreen_state(&mut self.gl);

        let program = match (light.kind, shadowed) {
            (LightKind::Sun, true) => self.builtins.sun_shadow,
            (LightKind::Sun, false) => self.builtins.sun,
            (LightKind::Omni, _) => self.builtins.omni,
        };
        let camera_position = self.frame.camera_position;
        let shadow = target.shadow_texture().raw();
        let shadow_texel = 1.0 / target.shadow_map_size() as f32;
        let drawn = draw_fullscreen(
            &mut self.gl,
            &self.resources,
            self.builtins.screen_quad,
            program,
            |gl, shader| {
                bind_gbuffer(gl, shader, target);
                gl.set_vec3(shader.uniform("uLightColor"), light.color);
                match light.kind {
                    LightKind::Sun => {
                        gl.set_vec3(shader.uniform("uLightDirection"), light.direction());
                    }
                    LightKind::Omni => {
                        gl.set_vec3(shader.uniform("uLightPosition"), light.position);
                        gl.set_f32(shader.uniform("uAffectDistance"), light.affect_distance);
                    }
                }
                if shadowed {
                    let unit = TextureSlot::Shadow.unit();
                    gl.set_i32(shader.uniform("tShadow"), unit as i32);
                    gl.bind_texture(unit, Some(shadow));
                    gl.set_mat4(shader.uniform("uLightSpace"), &light_space);
                    gl.set_f32(shader.uniform("uShadowTexel"), shadow_texel);
                    gl.set_vec3(shader.uniform("uCameraPosition"), camera_position);
                }
            },
        );
        if drawn {
            self.stats.light_passes += 1;
            self.stats.passes.push(pass);
        }
    }

    fn blending_pass(&mut self, queue: &RenderQueue, target: &RenderTarget) {
        if queue.blending_phase().is_empty() {
            return;
        }
        let _span = tracing::debug_span!("pass", pass = ?Pass::Blending).entered();
        let gl = &mut self.gl;
        target.setup_lightning(gl, false);
        gl.set_depth_test(!self.frame.sorting);
        gl.set_depth_write(false);
        gl.set_cull(None);
        for element in queue.blending_phase() {
            let blend = match element.color_mode {
                ColorMode::Lit => None,
                ColorMode::Alpha => Some(BlendFunc::ALPHA),
                ColorMode::Addition => Some(BlendFunc::ALPHA_ADDITIVE),
            };
            gl.set_blend(blend);
            if draw_element(gl, &self.resources, self.builtins.white, element) {
                self.stats.blending_draws += 1;
            } else {
                self.stats.skipped_draws += 1;
            }
        }
        self.stats.passes.push(Pass::Blending);
    }

    fn debug_pass(&mut self, queue: &RenderQueue, target: &RenderTarget) {
        if queue.debug_phase().is_empty() {
            return;
        }
        let _span = tracing::debug_span!("pass", pass = ?Pass::Debug).entered();
        let gl = &mut self.gl;
        target.setup_lightning(gl, false);
        gl.set_depth_test(true);
        gl.set_depth_write(false);
        gl.set_blend(Some(BlendFunc::ALPHA));
        let Some(shader) = self.resources.shader(self.builtins.lines) else {
            return;
        };
        let Some(program) = shader.program() else {
            return;
        };
        gl.use_program(Some(program));
        gl.set_mat4(shader.uniform("uViewProjection"), &self.frame.view_projection);
        for debug in queue.debug_phase() {
            let floats: Vec<f32> = debug
                .segments()
                .iter()
                .flat_map(|[a, b]| [a.x, a.y, a.z, b.x, b.y, b.z])
                .collect();
            if floats.is_empty() {
                continue;
            }
            // Transient buffer, freed right after the draw.
            match gl.create_vertex_buffer(&floats, &[3]) {
                Ok((buffer, array)) => {
                    gl.set_vec4(shader.uniform("uColor"), debug.color);
                    gl.draw(array, PrimitiveMode::Lines, floats.len() / 3);
                    gl.delete_vertex_buffer(buffer, array);
                    self.stats.debug_lines += floats.len() / 6;
                }
                Err(err) => tracing::warn!(%err, "debug line buffer not created"),
            }
        }
        self.stats.passes.push(Pass::Debug);
    }

    fn composite_pass(&mut self, target: &RenderTarget) {
        let _span = tracing::debug_span!("pass", pass = ?Pass::Composite).entered();
        target.use_result_buffer(&mut self.gl);
        fullscreen_state(&mut self.gl);
        self.gl.set_blend(None);

        let program = match self.settings.antialiasing {
            Antialiasing::Fxaa => self.builtins.composite_fxaa,
            Antialiasing::None => self.builtins.composite,
        };
        let gamma = self.frame.gamma;
        let lightning = target.lightning_texture().raw();
        let (w, h) = target.render_size();
        let texel = Vec2::new(1.0 / w as f32, 1.0 / h as f32);
        let drawn = draw_fullscreen(
            &mut self.gl,
            &self.resources,
            self.builtins.screen_quad,
            program,
            |gl, shader| {
                gl.set_i32(shader.uniform("tLightning"), 0);
                gl.bind_texture(0, Some(lightning));
                gl.set_f32(shader.uniform("uGamma"), gamma);
                gl.set_vec2(shader.uniform("uInverseScreenSize"), texel);
            },
        );
        if drawn {
            self.stats.passes.push(Pass::Composite);
        }
    }
}

/// Full-screen passes read the G-buffer and ignore depth.
fn fullscreen_state<D: GlDevice>(gl: &mut GlContext<D>) {
    gl.set_depth_test(false);
    gl.set_depth_write(false);
    gl.set_cull(None);
    gl.set_blend(Some(BlendFunc::ADDITIVE));
}

fn draw_fullscreen<D: GlDevice>(
    gl: &mut GlContext<D>,
    resources: &Resources,
    quad: MeshId,
    shader: ShaderId,
    setup: impl FnOnce(&mut GlContext<D>, &Shader),
) -> bool {
    let (Some(shader), Some(mesh)) = (resources.shader(shader), resources.mesh(quad)) else {
        return false;
    };
    let Some(program) = shader.program() else {
        return false;
    };
    gl.use_program(Some(program));
    setup(gl, shader);
    mesh.draw(gl);
    true
}

fn bind_gbuffer<D: GlDevice>(gl: &mut GlContext<D>, shader: &Shader, target: &RenderTarget) {
    for (unit, (name, texture)) in GBUFFER_SAMPLERS
        .iter()
        .zip(target.gbuffer_textures())
        .enumerate()
    {
        gl.set_i32(shader.uniform(name), unit as i32);
        gl.bind_texture(unit as u32, Some(texture));
    }
}

/// One material draw. Returns `false`, having issued nothing, when the
/// shader is not ready or a resource is missing.
fn draw_element<D: GlDevice>(
    gl: &mut GlContext<D>,
    resources: &Resources,
    white: TextureId,
    element: &RenderElement,
) -> bool {
    let Some(shader) = resources.shader(element.shader).filter(|s| s.is_ready()) else {
        return false;
    };
    let Some(mesh) = resources.mesh(element.mesh) else {
        return false;
    };
    let Some(texture) = resources.texture(element.texture.unwrap_or(white)) else {
        return false;
    };
    shader.use_with(gl, &element.model, &element.model_view_projection);
    shader.set_uv_frame(gl, element.uv_shift, element.uv_size);
    shader.set_opacity(gl, element.opacity);
    if shader.slots().contains(&TextureSlot::Albedo) {
        gl.bind_texture(TextureSlot::Albedo.unit(), Some(texture.raw()));
    }
    element.params.apply_for(element.shader, gl);
    mesh.draw(gl);
    true
}

impl<D: GlDevice> FrameRenderer for GlRenderer<D> {
    type Target = RenderTarget;

    fn begin_frame(
        &mut self,
        frame: &FrameState,
        target: &mut RenderTarget,
    ) -> Result<(), RenderError> {
        self.frame = frame.clone();
        self.stats = FrameStats::default();
        target.setup_new_frame(&mut self.gl, true);
        if frame.draws_environment() {
            self.environment_pass();
        }

        let _span = tracing::debug_span!("pass", pass = ?Pass::Geometry).entered();
        let gl = &mut self.gl;
        gl.set_depth_test(!frame.sorting);
        gl.set_depth_write(true);
        gl.set_blend(None);
        gl.set_cull(Some(CullMode::Back));
        self.stats.passes.push(Pass::Geometry);
        Ok(())
    }

    fn submit_main(&mut self, element: &RenderElement, _target: &mut RenderTarget) {
        if draw_element(&mut self.gl, &self.resources, self.builtins.white, element) {
            self.stats.main_draws += 1;
        } else {
            tracing::trace!("main draw skipped");
            self.stats.skipped_draws += 1;
        }
    }

    fn finish_frame(
        &mut self,
        queue: &RenderQueue,
        target: &mut RenderTarget,
    ) -> Result<FrameStats, RenderError> {
        if !queue.is_done() {
            return Err(RenderError::QueueNotFinished);
        }
        self.ambient_pass(target);
        for light in queue.lights() {
            self.light_pass(queue, target, light);
        }
        self.blending_pass(queue, target);
        self.debug_pass(queue, target);
        self.composite_pass(target);

        let stats = std::mem::take(&mut self.stats);
        tracing::debug!(
            draws = stats.total_draws(),
            skipped = stats.skipped_draws,
            lights = stats.light_passes,
            "frame finished"
        );
        self.last_stats = stats.clone();
        Ok(stats)
    }

    fn present_to_screen(
        &mut self,
        target: &RenderTarget,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        self.gl
            .blit_to_screen(target.result_framebuffer(), target.display_size(), (width, height));
        Ok(())
    }
}

impl<D: GlDevice> ShaderBackend for GlRenderer<D> {
    fn create_parameter(
        &mut self,
        shader: ShaderId,
        name: &str,
        ty: ParamType,
    ) -> Result<Arc<ShaderParameter>, RenderError> {
        Ok(self.resources.create_parameter(&mut self.gl, shader, name, ty)?)
    }

    fn is_ready(&self, shader: ShaderId) -> bool {
        self.resources.is_ready(shader)
    }

    fn mesh_shader(&self, mesh: MeshId) -> Option<ShaderId> {
        self.resources.mesh(mesh).and_then(MeshStatic::default_shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCommand, HeadlessDevice, RawFramebuffer, RawProgram, UniformValue};
    use approx::assert_relative_eq;
    use glam::{Vec3, Vec4};
    use stagecraft_common::RenderQuality;
    use stagecraft_render::shading::{gamma_encode_rgb, sun_lambert};
    use stagecraft_render::{DebugShape, Draw, ParameterBlock, RenderElementDebug};
    use std::collections::HashMap;

    fn renderer() -> (GlRenderer<HeadlessDevice>, RenderTarget) {
        let settings = RenderSettings {
            quality: RenderQuality::Low,
            ..RenderSettings::default()
        };
        let mut r = GlRenderer::new(HeadlessDevice::new(), settings).unwrap();
        let target = r.create_target(64, 48).unwrap();
        (r, target)
    }

    fn camera() -> Mat4 {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        Mat4::perspective_rh_gl(1.0, 4.0 / 3.0, 0.1, 100.0) * view
    }

    fn float_uniform(r: &GlRenderer<HeadlessDevice>, shader: ShaderId, name: &str) -> Vec<f32> {
        let program = r.resources().shader(shader).and_then(Shader::program).unwrap();
        match r.device().uniform_value(program, name) {
            Some(UniformValue::Float(v)) => v.clone(),
            other => panic!("{name}: {other:?}"),
        }
    }

    /// Program, framebuffer and texture units in effect at one recorded draw.
    #[derive(Debug)]
    struct DrawState {
        program: Option<RawProgram>,
        framebuffer: Option<RawFramebuffer>,
        units: HashMap<u32, Option<RawTexture>>,
    }

    fn draw_states(commands: &[GlCommand]) -> Vec<DrawState> {
        let mut program = None;
        let mut framebuffer = None;
        let mut units = HashMap::new();
        let mut out = Vec::new();
        for command in commands {
            match command {
                GlCommand::UseProgram(p) => program = *p,
                GlCommand::BindFramebuffer(f) => framebuffer = *f,
                GlCommand::BindTexture { unit, texture } => {
                    units.insert(*unit, *texture);
                }
                GlCommand::Draw { .. } => out.push(DrawState {
                    program,
                    framebuffer,
                    units: units.clone(),
                }),
                _ => {}
            }
        }
        out
    }

    fn program_of(r: &GlRenderer<HeadlessDevice>, shader: ShaderId) -> RawProgram {
        r.resources().shader(shader).and_then(Shader::program).unwrap()
    }

    #[test]
    fn white_quad_under_white_sun_renders_white() {
        let (mut r, mut target) = renderer();
        let quad = r.create_mesh(&MeshData::quad(), false).unwrap();
        let white = r.create_texture_rgba8(1, 1, &[255, 255, 255, 255]).unwrap();
        let white_raw = r.resources().texture(white).unwrap().raw();
        let mut queue = RenderQueue::new();
        queue.set_view_projection_matrix(camera());
        queue.set_ambient_light(Vec3::ZERO);
        queue.add_main_phase(
            Mat4::IDENTITY,
            Draw::new(r.phong_shader(), quad).with_texture(Some(white)),
        );
        queue.add_light(LightKind::Sun, Vec3::new(0.0, 0.0, -1.0), Vec3::ONE, 10.0, false);
        queue.finish();

        let stats = r.render(&mut queue, &mut target).unwrap();
        assert_eq!(stats.main_draws, 1);
        assert_eq!(stats.light_passes, 1);

        let commands = r.device().commands();
        assert!(commands.contains(&GlCommand::BindTexture {
            unit: TextureSlot::Albedo.unit(),
            texture: Some(white_raw),
        }));
        let draws = draw_states(commands);
        let at = |program: RawProgram| {
            draws
                .iter()
                .find(|d| d.program == Some(program))
                .unwrap_or_else(|| panic!("no draw with {program:?}"))
        };

        // Geometry pass samples the uploaded texture.
        let main = at(program_of(&r, r.phong_shader()));
        assert_eq!(main.units[&TextureSlot::Albedo.unit()], Some(white_raw));

        // Sun pass reads the G-buffer on the units its samplers name.
        let sun_program = program_of(&r, r.builtins.sun);
        let sun = at(sun_program);
        for (unit, (name, texture)) in GBUFFER_SAMPLERS
            .iter()
            .zip(target.gbuffer_textures())
            .enumerate()
        {
            assert_eq!(sun.units[&(unit as u32)], Some(texture), "{name}");
        }
        for (unit, name) in [(0, "gAlbedoSpec"), (1, "gNormal")] {
            assert_eq!(
                r.device().uniform_value(sun_program, name),
                Some(&UniformValue::Int(vec![unit])),
                "{name}"
            );
        }

        // Composite reads the lighting buffer and writes the result buffer.
        let composite = at(program_of(&r, r.builtins.composite));
        assert_eq!(composite.framebuffer, Some(target.result_framebuffer()));
        assert_eq!(composite.units[&0], Some(target.lightning_texture().raw()));

        let sun = r.builtins.sun;
        assert_eq!(float_uniform(&r, sun, "uLightColor"), vec![1.0, 1.0, 1.0]);
        let dir = float_uniform(&r, sun, "uLightDirection");
        assert_relative_eq!(Vec3::from_slice(&dir), Vec3::NEG_Z);
        let gamma = float_uniform(&r, r.builtins.composite, "uGamma");
        assert_relative_eq!(gamma[0], RenderSettings::DEFAULT_GAMMA);

        // Same inputs through the CPU reference of the lighting and composite shaders.
        let lit = sun_lambert(Vec3::ONE, Vec3::Z, Vec3::from_slice(&dir), Vec3::ONE);
        let pixel = gamma_encode_rgb(lit, gamma[0]);
        assert_relative_eq!(pixel, Vec3::ONE, epsilon = 1e-5);
    }

    #[test]
    fn sorted_blending_draws_far_before_near() {
        let (mut r, mut target) = renderer();
        let near = r.create_mesh(&MeshData::quad(), false).unwrap();
        let far = r.create_mesh(&MeshData::cube(), false).unwrap();
        let sprite = r.sprite_shader();
        let mut queue = RenderQueue::new();
        queue.set_view_projection_matrix(camera());
        queue.enable_sorting();
        let at = |z: f32| Mat4::from_translation(Vec3::new(0.0, 0.0, z));
        queue.add_blending_phase(at(2.0), ColorMode::Alpha, 0.5, Draw::new(sprite, near));
        queue.add_blending_phase(at(-5.0), ColorMode::Alpha, 0.5, Draw::new(sprite, far));
        queue.finish();

        r.render(&mut queue, &mut target).unwrap();
        let counts: Vec<usize> = r
            .device()
            .commands()
            .iter()
            .filter_map(|c| match c {
                GlCommand::Draw { vertex_count, .. } => Some(*vertex_count),
                _ => None,
            })
            .collect();
        // ambient quad, far cube, near quad, composite quad
        assert_eq!(counts, vec![6, 36, 6, 6]);
        assert!(r.device().commands().contains(&GlCommand::DepthTest(false)));
    }

    #[test]
    fn broken_shader_issues_no_commands() {
        let (mut r, mut target) = renderer();
        let quad = r.create_mesh(&MeshData::quad(), false).unwrap();
        let broken = r.add_shader(Shader::phong("broken", "#version 410 core\nvoid main() {"));
        assert!(!r.is_ready(broken));

        let mut queue = RenderQueue::new();
        queue.add_main_phase(Mat4::IDENTITY, Draw::new(broken, quad));
        queue.finish();
        r.begin_frame(queue.frame(), &mut target).unwrap();
        r.device_mut().take_commands();
        r.submit_main(&queue.main_phase()[0], &mut target);
        assert!(r.device().commands().is_empty());

        let stats = r.finish_frame(&queue, &mut target).unwrap();
        assert_eq!(stats.skipped_draws, 1);
        assert_eq!(stats.main_draws, 0);
    }

    #[test]
    fn parameters_reach_the_program() {
        let (mut r, mut target) = renderer();
        let fragment = "#version 410 core
uniform float pF; uniform vec2 pF2; uniform vec3 pF3; uniform vec4 pF4;
uniform int pI; uniform ivec2 pI2; uniform ivec3 pI3; uniform ivec4 pI4;
layout(location = 0) out vec4 gAlbedoSpec;
void main() { gAlbedoSpec = vec4(pF); }
";
        let shader = r.add_shader(Shader::phong("params", fragment));
        let names = ["pF", "pF2", "pF3", "pF4", "pI", "pI2", "pI3", "pI4"];
        let mut params = Vec::new();
        for (name, ty) in names.iter().zip(ParamType::ALL) {
            let p = r.create_parameter(shader, name, ty).unwrap();
            let n = ty.components();
            if ty.is_int() {
                let data: Vec<i32> = (1..=n as i32).collect();
                p.set(1, &data).unwrap();
            } else {
                let data: Vec<f32> = (1..=n).map(|i| i as f32 * 0.5).collect();
                p.set(1, &data).unwrap();
            }
            params.push(p);
        }
        let missing = r.create_parameter(shader, "pMissing", ParamType::Float).unwrap();
        assert!(missing.location().is_none());

        let quad = r.create_mesh(&MeshData::quad(), false).unwrap();
        let mut queue = RenderQueue::new();
        let block = ParameterBlock::new(params);
        queue.add_main_phase(Mat4::IDENTITY, Draw::new(shader, quad).with_params(block));
        queue.finish();
        r.render(&mut queue, &mut target).unwrap();

        let program = r.resources().shader(shader).and_then(Shader::program).unwrap();
        let device = r.device();
        assert_eq!(device.uniform_value(program, "pF"), Some(&UniformValue::Float(vec![0.5])));
        assert_eq!(
            device.uniform_value(program, "pF4"),
            Some(&UniformValue::Float(vec![0.5, 1.0, 1.5, 2.0]))
        );
        assert_eq!(device.uniform_value(program, "pI"), Some(&UniformValue::Int(vec![1])));
        assert_eq!(
            device.uniform_value(program, "pI3"),
            Some(&UniformValue::Int(vec![1, 2, 3]))
        );
    }

    #[test]
    fn full_frame_runs_every_pass_in_order() {
        let (mut r, mut target) = renderer();
        let cube = r.create_mesh(&MeshData::cube(), false).unwrap();
        let sky = r.create_hdr_texture(2, 1, &[0.25; 8]).unwrap();
        let mut queue = RenderQueue::new();
        queue.set_view_projection_matrix(camera());
        queue.set_hdr_texture(Some(sky));
        queue.set_show_env_hdr(true);
        queue.add_main_phase(Mat4::IDENTITY, Draw::new(r.phong_shader(), cube));
        queue.add_shadow_caster(Mat4::IDENTITY, cube);
        queue.add_light(LightKind::Sun, Vec3::NEG_Y, Vec3::ONE, 20.0, true);
        queue.add_light(LightKind::Omni, Vec3::Y, Vec3::ONE, 5.0, false);
        queue.add_blending_phase(
            Mat4::IDENTITY,
            ColorMode::Addition,
            1.0,
            Draw::new(r.sprite_shader(), cube),
        );
        queue.add_debug(RenderElementDebug {
            shape: DebugShape::Aabb {
                min: Vec3::splat(-1.0),
                max: Vec3::ONE,
            },
            color: Vec4::ONE,
        });
        queue.finish();

        let stats = r.render(&mut queue, &mut target).unwrap();
        assert_eq!(
            stats.passes,
            vec![
                Pass::Environment,
                Pass::Geometry,
                Pass::Ambient,
                Pass::SunShadowMap,
                Pass::SunLight,
                Pass::OmniLight,
                Pass::Blending,
                Pass::Debug,
                Pass::Composite,
            ]
        );
        assert_eq!(stats.shadow_draws, 1);
        assert_eq!(stats.debug_lines, 12);
        assert_eq!(r.last_stats(), &stats);
        assert!(r.device().commands().contains(&GlCommand::Cull(Some(CullMode::Back))));
        // The transient debug buffer is gone.
        let buffers = r.device().live(crate::device::ResourceKind::Buffer);
        assert_eq!(buffers, r.resources().mesh_count());
    }

    #[test]
    fn unfinished_queue_is_refused() {
        let (mut r, mut target) = renderer();
        let mut queue = RenderQueue::new();
        assert!(matches!(
            r.render(&mut queue, &mut target),
            Err(RenderError::QueueNotFinished)
        ));
    }

    #[test]
    fn present_blits_the_result() {
        let (mut r, target) = renderer();
        r.present_to_screen(&target, 640, 480).unwrap();
        let commands = r.device().commands();
        // The blit leaves the default framebuffer bound.
        assert_eq!(
            &commands[commands.len() - 2..],
            &[
                GlCommand::BlitToScreen {
                    source: target.result_framebuffer(),
                    from: (64, 48),
                    to: (640, 480),
                },
                GlCommand::BindFramebuffer(None),
            ]
        );
    }

    #[test]
    fn shutdown_frees_everything() {
        let (mut r, target) = renderer();
        r.destroy_target(target);
        let device = r.shutdown();
        for kind in [
            crate::device::ResourceKind::Program,
            crate::device::ResourceKind::Texture,
            crate::device::ResourceKind::Buffer,
            crate::device::ResourceKind::Framebuffer,
        ] {
            assert_eq!(device.live(kind), 0, "{kind:?}");
        }
    }
}
