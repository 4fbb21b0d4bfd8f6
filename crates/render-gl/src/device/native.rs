//! `GlDevice` over a real OpenGL 4.1 core context.

use super::{
    BlendFactor, BlendFunc, CullMode, GlDevice, PrimitiveMode, RawBuffer, RawFramebuffer,
    RawProgram, RawShaderObject, RawTexture, RawVertexArray, ShaderStage, TexelData,
    TextureDesc, TextureFilter, TextureFormat,
};
use glam::{Mat4, Vec4};
use glow::HasContext;
use stagecraft_render::{ParamType, UniformLocation};

/// Texture unit used for uploads so creating a texture never disturbs a
/// binding the state cache knows about.
pub(crate) const UPLOAD_UNIT: u32 = 15;

pub struct GlowDevice {
    gl: glow::Context,
}

impl GlowDevice {
    /// Wrap a context that is current on this thread.
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// Load GL entry points with a windowing library's loader.
    ///
    /// # Safety
    /// A GL 4.1 core context must be current on the calling thread, and the
    /// loader must return valid function pointers for it.
    pub unsafe fn from_loader_function<F>(loader: F) -> Self
    where
        F: FnMut(&str) -> *const std::ffi::c_void,
    {
        let gl = unsafe { glow::Context::from_loader_function(loader) };
        Self { gl }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    pub fn version(&self) -> String {
        unsafe { self.gl.get_parameter_string(glow::VERSION) }
    }
}

fn program(p: RawProgram) -> glow::NativeProgram {
    glow::NativeProgram(p.0)
}

fn texture(t: RawTexture) -> glow::NativeTexture {
    glow::NativeTexture(t.0)
}

fn framebuffer(f: RawFramebuffer) -> glow::NativeFramebuffer {
    glow::NativeFramebuffer(f.0)
}

fn location(l: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(l.0)
}

fn blend_factor(f: BlendFactor) -> u32 {
    match f {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
    }
}

fn enable(gl: &glow::Context, cap: u32, on: bool) {
    unsafe {
        if on {
            gl.enable(cap);
        } else {
            gl.disable(cap);
        }
    }
}

impl GlDevice for GlowDevice {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<RawShaderObject, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self.gl.create_shader(kind)?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(RawShaderObject(shader.0))
            } else {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                Err(log)
            }
        }
    }

    fn delete_shader(&mut self, shader: RawShaderObject) {
        unsafe { self.gl.delete_shader(glow::NativeShader(shader.0)) }
    }

    fn link_program(
        &mut self,
        vertex: RawShaderObject,
        fragment: RawShaderObject,
    ) -> Result<RawProgram, String> {
        unsafe {
            let p = self.gl.create_program()?;
            let (vs, fs) = (glow::NativeShader(vertex.0), glow::NativeShader(fragment.0));
            self.gl.attach_shader(p, vs);
            self.gl.attach_shader(p, fs);
            self.gl.link_program(p);
            self.gl.detach_shader(p, vs);
            self.gl.detach_shader(p, fs);
            if self.gl.get_program_link_status(p) {
                Ok(RawProgram(p.0))
            } else {
                let log = self.gl.get_program_info_log(p);
                self.gl.delete_program(p);
                Err(log)
            }
        }
    }

    fn delete_program(&mut self, p: RawProgram) {
        unsafe { self.gl.delete_program(program(p)) }
    }

    fn use_program(&mut self, p: Option<RawProgram>) {
        unsafe { self.gl.use_program(p.map(program)) }
    }

    fn uniform_location(&mut self, p: RawProgram, name: &str) -> Option<UniformLocation> {
        unsafe { self.gl.get_uniform_location(program(p), name) }.map(|l| UniformLocation(l.0))
    }

    fn uniform_f32(&mut self, l: UniformLocation, ty: ParamType, data: &[f32]) {
        let l = location(l);
        unsafe {
            match ty.components() {
                1 => self.gl.uniform_1_f32_slice(Some(&l), data),
                2 => self.gl.uniform_2_f32_slice(Some(&l), data),
                3 => self.gl.uniform_3_f32_slice(Some(&l), data),
                _ => self.gl.uniform_4_f32_slice(Some(&l), data),
            }
        }
    }

    fn uniform_i32(&mut self, l: UniformLocation, ty: ParamType, data: &[i32]) {
        let l = location(l);
        unsafe {
            match ty.components() {
                1 => self.gl.uniform_1_i32_slice(Some(&l), data),
                2 => self.gl.uniform_2_i32_slice(Some(&l), data),
                3 => self.gl.uniform_3_i32_slice(Some(&l), data),
                _ => self.gl.uniform_4_i32_slice(Some(&l), data),
            }
        }
    }

    fn uniform_mat4(&mut self, l: UniformLocation, value: &Mat4) {
        let l = location(l);
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&l), false, &value.to_cols_array())
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<TexelData<'_>>,
    ) -> Result<RawTexture, String> {
        let (internal, format, ty) = match desc.format {
            TextureFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
            TextureFormat::Rgba16F => (glow::RGBA16F, glow::RGBA, glow::FLOAT),
            TextureFormat::Depth32F => {
                (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT)
            }
        };
        let bytes: Option<&[u8]> = data.map(|d| match d {
            TexelData::U8(b) => b,
            TexelData::F32(f) => bytemuck::cast_slice(f),
        });
        let filter = match desc.filter {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        } as i32;
        let wrap = if desc.clamp {
            glow::CLAMP_TO_EDGE
        } else {
            glow::REPEAT
        } as i32;
        unsafe {
            let t = self.gl.create_texture()?;
            self.gl.active_texture(glow::TEXTURE0 + UPLOAD_UNIT);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(t));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal as i32,
                desc.width as i32,
                desc.height as i32,
                0,
                format,
                ty,
                bytes,
            );
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(RawTexture(t.0)),
                code => {
                    self.gl.delete_texture(t);
                    Err(format!("glTexImage2D failed with 0x{code:x}"))
                }
            }
        }
    }

    fn delete_texture(&mut self, t: RawTexture) {
        unsafe { self.gl.delete_texture(texture(t)) }
    }

    fn bind_texture(&mut self, unit: u32, t: Option<RawTexture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, t.map(texture));
        }
    }

    fn create_vertex_buffer(
        &mut self,
        floats: &[f32],
        attribute_sizes: &[usize],
    ) -> Result<(RawBuffer, RawVertexArray), String> {
        let stride = attribute_sizes.iter().sum::<usize>() * size_of::<f32>();
        unsafe {
            let vao = self.gl.create_vertex_array()?;
            let vbo = self.gl.create_buffer()?;
            self.gl.bind_vertex_array(Some(vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(floats),
                glow::STATIC_DRAW,
            );
            let mut offset = 0;
            for (index, &size) in attribute_sizes.iter().enumerate() {
                self.gl.enable_vertex_attrib_array(index as u32);
                self.gl.vertex_attrib_pointer_f32(
                    index as u32,
                    size as i32,
                    glow::FLOAT,
                    false,
                    stride as i32,
                    (offset * size_of::<f32>()) as i32,
                );
                offset += size;
            }
            self.gl.bind_vertex_array(None);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok((RawBuffer(vbo.0), RawVertexArray(vao.0)))
        }
    }

    fn delete_vertex_buffer(&mut self, buffer: RawBuffer, array: RawVertexArray) {
        unsafe {
            self.gl.delete_vertex_array(glow::NativeVertexArray(array.0));
            self.gl.delete_buffer(glow::NativeBuffer(buffer.0));
        }
    }

    fn draw_arrays(&mut self, array: RawVertexArray, mode: PrimitiveMode, vertex_count: usize) {
        let mode = match mode {
            PrimitiveMode::Triangles => glow::TRIANGLES,
            PrimitiveMode::Lines => glow::LINES,
        };
        unsafe {
            self.gl
                .bind_vertex_array(Some(glow::NativeVertexArray(array.0)));
            self.gl.draw_arrays(mode, 0, vertex_count as i32);
        }
    }

    fn create_framebuffer(
        &mut self,
        colors: &[RawTexture],
        depth: Option<RawTexture>,
    ) -> Result<RawFramebuffer, String> {
        unsafe {
            let fbo = self.gl.create_framebuffer()?;
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            let mut draw_buffers = Vec::with_capacity(colors.len());
            for (i, &c) in colors.iter().enumerate() {
                let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
                self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    Some(texture(c)),
                    0,
                );
                draw_buffers.push(attachment);
            }
            if let Some(d) = depth {
                self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_ATTACHMENT,
                    glow::TEXTURE_2D,
                    Some(texture(d)),
                    0,
                );
            }
            if draw_buffers.is_empty() {
                self.gl.draw_buffer(glow::NONE);
                self.gl.read_buffer(glow::NONE);
            } else {
                self.gl.draw_buffers(&draw_buffers);
            }
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status == glow::FRAMEBUFFER_COMPLETE {
                Ok(RawFramebuffer(fbo.0))
            } else {
                self.gl.delete_framebuffer(fbo);
                Err(format!("status 0x{status:x}"))
            }
        }
    }

    fn delete_framebuffer(&mut self, f: RawFramebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer(f)) }
    }

    fn bind_framebuffer(&mut self, f: Option<RawFramebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, f.map(framebuffer)) }
    }

    fn viewport(&mut self, width: u32, height: u32) {
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) }
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        let mut mask = 0;
        unsafe {
            if let Some(c) = color {
                self.gl.clear_color(c.x, c.y, c.z, c.w);
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if depth {
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            if mask != 0 {
                self.gl.clear(mask);
            }
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        enable(&self.gl, glow::DEPTH_TEST, enabled);
    }

    fn set_depth_write(&mut self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) }
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        enable(&self.gl, glow::BLEND, blend.is_some());
        if let Some(f) = blend {
            unsafe {
                self.gl
                    .blend_func(blend_factor(f.src), blend_factor(f.dst))
            }
        }
    }

    fn set_cull(&mut self, cull: Option<CullMode>) {
        enable(&self.gl, glow::CULL_FACE, cull.is_some());
        if let Some(mode) = cull {
            let face = match mode {
                CullMode::Front => glow::FRONT,
                CullMode::Back => glow::BACK,
            };
            unsafe { self.gl.cull_face(face) }
        }
    }

    fn blit_to_screen(&mut self, source: RawFramebuffer, from: (u32, u32), to: (u32, u32)) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::READ_FRAMEBUFFER, Some(framebuffer(source)));
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            self.gl.blit_framebuffer(
                0,
                0,
                from.0 as i32,
                from.1 as i32,
                0,
                0,
                to.0 as i32,
                to.1 as i32,
                glow::COLOR_BUFFER_BIT,
                glow::LINEAR,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }
}
