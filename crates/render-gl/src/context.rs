//! Bound-state cache in front of a [`GlDevice`].
//!
//! # Invariants
//! - This is the only tracker of bound GL state; shaders, targets and the
//!   renderer all bind through it.
//! - A cached value always matches what the device last received. Anything
//!   that talks to the device directly must call [`GlContext::invalidate`].

use crate::device::{
    BlendFunc, CullMode, GlDevice, PrimitiveMode, RawBuffer, RawFramebuffer, RawProgram,
    RawTexture, RawVertexArray, TexelData, TextureDesc,
};
use glam::{Mat4, Vec2, Vec3, Vec4};
use stagecraft_render::{ParamType, UniformLocation, UniformSink};

/// Texture units the pipeline binds; unit 15 is kept for uploads.
pub const TEXTURE_UNITS: usize = 15;

#[derive(Debug, Default, Clone)]
struct Bound {
    program: Option<Option<RawProgram>>,
    framebuffer: Option<Option<RawFramebuffer>>,
    viewport: Option<(u32, u32)>,
    depth_test: Option<bool>,
    depth_write: Option<bool>,
    blend: Option<Option<BlendFunc>>,
    cull: Option<Option<CullMode>>,
    textures: [Option<Option<RawTexture>>; TEXTURE_UNITS],
}

/// Owns a device and skips state changes it already made.
pub struct GlContext<D> {
    device: D,
    bound: Bound,
    skipped: usize,
}

/// Replace a cached value, reporting whether the device needs the call.
fn changed<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

impl<D: GlDevice> GlContext<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            bound: Bound::default(),
            skipped: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Raw device access. Calls made here bypass the cache; follow them with
    /// [`GlContext::invalidate`] if they change bound state.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Forget all cached state.
    pub fn invalidate(&mut self) {
        self.bound = Bound::default();
    }

    /// State changes filtered out so far.
    pub fn skipped_calls(&self) -> usize {
        self.skipped
    }

    fn filter(&mut self, needed: bool) -> bool {
        if !needed {
            self.skipped += 1;
        }
        needed
    }

    pub fn bound_program(&self) -> Option<RawProgram> {
        self.bound.program.flatten()
    }

    /// Returns `true` when the program actually changed.
    pub fn use_program(&mut self, program: Option<RawProgram>) -> bool {
        let needed = changed(&mut self.bound.program, program);
        if self.filter(needed) {
            self.device.use_program(program);
        }
        needed
    }

    /// Forget `program` if it is bound, after deleting it.
    pub(crate) fn forget_program(&mut self, program: RawProgram) {
        if self.bound.program == Some(Some(program)) {
            self.bound.program = None;
        }
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<RawFramebuffer>) {
        let needed = changed(&mut self.bound.framebuffer, framebuffer);
        if self.filter(needed) {
            self.device.bind_framebuffer(framebuffer);
        }
    }

    pub fn viewport(&mut self, width: u32, height: u32) {
        let needed = changed(&mut self.bound.viewport, (width, height));
        if self.filter(needed) {
            self.device.viewport(width, height);
        }
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        let needed = changed(&mut self.bound.depth_test, enabled);
        if self.filter(needed) {
            self.device.set_depth_test(enabled);
        }
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        let needed = changed(&mut self.bound.depth_write, enabled);
        if self.filter(needed) {
            self.device.set_depth_write(enabled);
        }
    }

    pub fn set_blend(&mut self, blend: Option<BlendFunc>) {
        let needed = changed(&mut self.bound.blend, blend);
        if self.filter(needed) {
            self.device.set_blend(blend);
        }
    }

    pub fn set_cull(&mut self, cull: Option<CullMode>) {
        let needed = changed(&mut self.bound.cull, cull);
        if self.filter(needed) {
            self.device.set_cull(cull);
        }
    }

    pub fn bind_texture(&mut self, unit: u32, texture: Option<RawTexture>) {
        let Some(slot) = self.bound.textures.get_mut(unit as usize) else {
            tracing::warn!(unit, "texture unit out of range");
            return;
        };
        let needed = changed(slot, texture);
        if self.filter(needed) {
            self.device.bind_texture(unit, texture);
        }
    }

    /// Clear the bound framebuffer. Depth writes are enabled first when
    /// clearing depth, since a masked depth buffer ignores clears.
    pub fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        if depth {
            self.set_depth_write(true);
        }
        self.device.clear(color, depth);
    }

    pub fn draw(&mut self, array: RawVertexArray, mode: PrimitiveMode, vertex_count: usize) {
        self.device.draw_arrays(array, mode, vertex_count);
    }

    // --- Uniforms on the bound program ---

    pub fn set_mat4(&mut self, location: Option<UniformLocation>, value: &Mat4) {
        if let Some(l) = location {
            self.device.uniform_mat4(l, value);
        }
    }

    pub fn set_f32(&mut self, location: Option<UniformLocation>, value: f32) {
        if let Some(l) = location {
            self.device.uniform_f32(l, ParamType::Float, &[value]);
        }
    }

    pub fn set_vec2(&mut self, location: Option<UniformLocation>, value: Vec2) {
        if let Some(l) = location {
            self.device.uniform_f32(l, ParamType::Float2, &value.to_array());
        }
    }

    pub fn set_vec3(&mut self, location: Option<UniformLocation>, value: Vec3) {
        if let Some(l) = location {
            self.device.uniform_f32(l, ParamType::Float3, &value.to_array());
        }
    }

    pub fn set_vec4(&mut self, location: Option<UniformLocation>, value: Vec4) {
        if let Some(l) = location {
            self.device.uniform_f32(l, ParamType::Float4, &value.to_array());
        }
    }

    pub fn set_i32(&mut self, location: Option<UniformLocation>, value: i32) {
        if let Some(l) = location {
            self.device.uniform_i32(l, ParamType::Int, &[value]);
        }
    }

    // --- Resource creation. These may disturb bindings, so the cache is
    // adjusted afterwards. ---

    pub fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<TexelData<'_>>,
    ) -> Result<RawTexture, String> {
        self.device.create_texture(desc, data)
    }

    pub fn delete_texture(&mut self, texture: RawTexture) {
        for slot in &mut self.bound.textures {
            if *slot == Some(Some(texture)) {
                *slot = None;
            }
        }
        self.device.delete_texture(texture);
    }

    pub fn create_vertex_buffer(
        &mut self,
        floats: &[f32],
        attribute_sizes: &[usize],
    ) -> Result<(RawBuffer, RawVertexArray), String> {
        self.device.create_vertex_buffer(floats, attribute_sizes)
    }

    pub fn delete_vertex_buffer(&mut self, buffer: RawBuffer, array: RawVertexArray) {
        self.device.delete_vertex_buffer(buffer, array);
    }

    pub fn create_framebuffer(
        &mut self,
        colors: &[RawTexture],
        depth: Option<RawTexture>,
    ) -> Result<RawFramebuffer, String> {
        let result = self.device.create_framebuffer(colors, depth);
        self.bound.framebuffer = None;
        result
    }

    pub fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        if self.bound.framebuffer == Some(Some(framebuffer)) {
            self.bound.framebuffer = None;
        }
        self.device.delete_framebuffer(framebuffer);
    }

    pub fn blit_to_screen(&mut self, source: RawFramebuffer, from: (u32, u32), to: (u32, u32)) {
        self.device.blit_to_screen(source, from, to);
        self.bound.framebuffer = Some(None);
        self.bound.viewport = None;
    }
}

impl<D: GlDevice> UniformSink for GlContext<D> {
    fn upload_f32(&mut self, location: UniformLocation, ty: ParamType, data: &[f32]) {
        self.device.uniform_f32(location, ty, data);
    }

    fn upload_i32(&mut self, location: UniformLocation, ty: ParamType, data: &[i32]) {
        self.device.uniform_i32(location, ty, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCommand, HeadlessDevice};

    #[test]
    fn redundant_state_changes_are_skipped() {
        let mut gl = GlContext::new(HeadlessDevice::new());
        gl.set_depth_test(true);
        gl.set_depth_test(true);
        gl.set_blend(Some(BlendFunc::ADDITIVE));
        gl.set_blend(Some(BlendFunc::ADDITIVE));
        gl.set_blend(None);
        assert_eq!(
            gl.device().commands(),
            &[
                GlCommand::DepthTest(true),
                GlCommand::Blend(Some(BlendFunc::ADDITIVE)),
                GlCommand::Blend(None),
            ]
        );
        assert_eq!(gl.skipped_calls(), 2);
    }

    #[test]
    fn invalidate_forces_rebind() {
        let mut gl = GlContext::new(HeadlessDevice::new());
        gl.bind_framebuffer(None);
        gl.bind_framebuffer(None);
        gl.invalidate();
        gl.bind_framebuffer(None);
        assert_eq!(gl.device().commands().len(), 2);
    }

    #[test]
    fn depth_clear_enables_depth_writes() {
        let mut gl = GlContext::new(HeadlessDevice::new());
        gl.set_depth_write(false);
        gl.clear(None, true);
        assert_eq!(
            gl.device().commands()[1..],
            [
                GlCommand::DepthWrite(true),
                GlCommand::Clear {
                    color: None,
                    depth: true
                },
            ]
        );
    }

    #[test]
    fn texture_units_are_tracked_separately() {
        let mut gl = GlContext::new(HeadlessDevice::new());
        gl.bind_texture(0, None);
        gl.bind_texture(1, None);
        gl.bind_texture(0, None);
        gl.bind_texture(99, None);
        assert_eq!(gl.device().commands().len(), 2);
    }
}
