//! In-process fake device.
//!
//! Records every state change and draw, counts live objects per kind, and
//! keeps uploaded uniform values for readback. GLSL is checked structurally
//! (version line, `main`, balanced delimiters) instead of by a driver, and
//! uniform locations come from the `uniform` declarations in the source.

use super::{
    BlendFunc, CullMode, GlDevice, PrimitiveMode, RawBuffer, RawFramebuffer, RawProgram,
    RawShaderObject, RawTexture, RawVertexArray, ShaderStage, TexelData, TextureDesc,
};
use glam::{Mat4, Vec4};
use stagecraft_render::{ParamType, UniformLocation};
use std::collections::HashMap;
use std::num::NonZeroU32;

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Mat4(Mat4),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Shader,
    Program,
    Texture,
    Buffer,
    VertexArray,
    Framebuffer,
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCommand {
    UseProgram(Option<RawProgram>),
    Uniform(UniformLocation),
    BindTexture {
        unit: u32,
        texture: Option<RawTexture>,
    },
    BindFramebuffer(Option<RawFramebuffer>),
    Viewport(u32, u32),
    Clear {
        color: Option<Vec4>,
        depth: bool,
    },
    DepthTest(bool),
    DepthWrite(bool),
    Blend(Option<BlendFunc>),
    Cull(Option<CullMode>),
    Draw {
        array: RawVertexArray,
        mode: PrimitiveMode,
        vertex_count: usize,
    },
    BlitToScreen {
        source: RawFramebuffer,
        from: (u32, u32),
        to: (u32, u32),
    },
}

#[derive(Debug)]
struct Program {
    uniforms: Vec<String>,
    values: HashMap<u32, UniformValue>,
}

#[derive(Debug)]
struct Framebuffer {
    colors: Vec<RawTexture>,
    depth: Option<RawTexture>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u32,
    shaders: HashMap<RawShaderObject, String>,
    programs: HashMap<RawProgram, Program>,
    textures: HashMap<RawTexture, TextureDesc>,
    buffers: HashMap<RawBuffer, usize>,
    arrays: HashMap<RawVertexArray, RawBuffer>,
    framebuffers: HashMap<RawFramebuffer, Framebuffer>,
    bound_program: Option<RawProgram>,
    commands: Vec<GlCommand>,
    max_texture_size: u32,
    fail_framebuffers: bool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self {
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            arrays: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_program: None,
            commands: Vec::new(),
            max_texture_size: 16384,
            fail_framebuffers: false,
        }
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures larger than this fail to allocate.
    pub fn set_max_texture_size(&mut self, size: u32) {
        self.max_texture_size = size;
    }

    /// Make every following framebuffer incomplete.
    pub fn set_fail_framebuffers(&mut self, fail: bool) {
        self.fail_framebuffers = fail;
    }

    pub fn commands(&self) -> &[GlCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GlCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GlCommand::Draw { .. }))
            .count()
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Shader => self.shaders.len(),
            ResourceKind::Program => self.programs.len(),
            ResourceKind::Texture => self.textures.len(),
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::VertexArray => self.arrays.len(),
            ResourceKind::Framebuffer => self.framebuffers.len(),
        }
    }

    pub fn bound_program(&self) -> Option<RawProgram> {
        self.bound_program
    }

    /// Last value uploaded to `name` on `program`.
    pub fn uniform_value(&self, program: RawProgram, name: &str) -> Option<&UniformValue> {
        let p = self.programs.get(&program)?;
        let index = p.uniforms.iter().position(|u| u == name)?;
        p.values.get(&(index as u32))
    }

    pub fn texture_desc(&self, texture: RawTexture) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: RawFramebuffer,
    ) -> Option<(&[RawTexture], Option<RawTexture>)> {
        self.framebuffers
            .get(&framebuffer)
            .map(|f| (f.colors.as_slice(), f.depth))
    }

    fn next(&mut self) -> NonZeroU32 {
        self.next_id += 1;
        NonZeroU32::MIN.saturating_add(self.next_id - 1)
    }

    fn store_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.bound_program.and_then(|p| self.programs.get_mut(&p)) else {
            return;
        };
        if (location.0 as usize) < program.uniforms.len() {
            program.values.insert(location.0, value);
            self.commands.push(GlCommand::Uniform(location));
        }
    }
}

/// Stand-in for a compiler front end: catches truncated or garbled sources.
pub(crate) fn check_glsl(source: &str) -> Result<(), String> {
    let first = source.lines().map(str::trim).find(|l| !l.is_empty());
    if !first.is_some_and(|l| l.starts_with("#version")) {
        return Err("ERROR: 0:1: '#version' must be the first directive".into());
    }
    if !source.contains("void main") {
        return Err("ERROR: missing entry point 'main'".into());
    }
    let mut depth = [0i32; 3];
    for (line_no, line) in strip_comments(source).lines().enumerate() {
        for c in line.chars() {
            let (slot, delta) = match c {
                '{' => (0, 1),
                '}' => (0, -1),
                '(' => (1, 1),
                ')' => (1, -1),
                '[' => (2, 1),
                ']' => (2, -1),
                _ => continue,
            };
            depth[slot] += delta;
            if depth[slot] < 0 {
                return Err(format!("ERROR: 0:{}: unexpected '{c}'", line_no + 1));
            }
        }
    }
    if depth != [0; 3] {
        return Err("ERROR: unexpected end of file".into());
    }
    Ok(())
}

fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|l| l.split("//").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Names from `uniform <type> <name>;` declarations, in source order.
pub(crate) fn declared_uniforms(source: &str) -> Vec<String> {
    let code: String = strip_comments(source)
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");
    code.split(';')
        .filter_map(|stmt| {
            let stmt = stmt.rsplit(['{', '}']).next()?.trim();
            let mut words = stmt.split_whitespace();
            (words.next()? == "uniform").then_some(())?;
            let name = words.last()?;
            Some(name.split('[').next().unwrap_or(name).to_string())
        })
        .collect()
}

impl GlDevice for HeadlessDevice {
    fn compile_shader(
        &mut self,
        _stage: ShaderStage,
        source: &str,
    ) -> Result<RawShaderObject, String> {
        check_glsl(source)?;
        let id = RawShaderObject(self.next());
        self.shaders.insert(id, source.to_string());
        Ok(id)
    }

    fn delete_shader(&mut self, shader: RawShaderObject) {
        self.shaders.remove(&shader);
    }

    fn link_program(
        &mut self,
        vertex: RawShaderObject,
        fragment: RawShaderObject,
    ) -> Result<RawProgram, String> {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex), self.shaders.get(&fragment)) else {
            return Err("ERROR: attached shader does not exist".into());
        };
        let mut uniforms = declared_uniforms(vs);
        for name in declared_uniforms(fs) {
            if !uniforms.contains(&name) {
                uniforms.push(name);
            }
        }
        let id = RawProgram(self.next());
        self.programs.insert(
            id,
            Program {
                uniforms,
                values: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, program: RawProgram) {
        self.programs.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn use_program(&mut self, program: Option<RawProgram>) {
        self.bound_program = program;
        self.commands.push(GlCommand::UseProgram(program));
    }

    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(&program)?;
        p.uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn uniform_f32(&mut self, location: UniformLocation, _ty: ParamType, data: &[f32]) {
        self.store_uniform(location, UniformValue::Float(data.to_vec()));
    }

    fn uniform_i32(&mut self, location: UniformLocation, _ty: ParamType, data: &[i32]) {
        self.store_uniform(location, UniformValue::Int(data.to_vec()));
    }

    fn uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.store_uniform(location, UniformValue::Mat4(*value));
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<TexelData<'_>>,
    ) -> Result<RawTexture, String> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.max_texture_size
            || desc.height > self.max_texture_size
        {
            return Err(format!(
                "GL_INVALID_VALUE: texture size {}x{}",
                desc.width, desc.height
            ));
        }
        if let Some(data) = data {
            let expected = desc.texel_count() * desc.format.channels();
            if data.len() != expected {
                return Err(format!(
                    "GL_INVALID_OPERATION: {} values for {} expected",
                    data.len(),
                    expected
                ));
            }
        }
        let id = RawTexture(self.next());
        self.textures.insert(id, *desc);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: RawTexture) {
        self.textures.remove(&texture);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<RawTexture>) {
        self.commands.push(GlCommand::BindTexture { unit, texture });
    }

    fn create_vertex_buffer(
        &mut self,
        floats: &[f32],
        attribute_sizes: &[usize],
    ) -> Result<(RawBuffer, RawVertexArray), String> {
        if attribute_sizes.is_empty() {
            return Err("GL_INVALID_OPERATION: no vertex attributes".into());
        }
        let buffer = RawBuffer(self.next());
        let array = RawVertexArray(self.next());
        self.buffers.insert(buffer, floats.len());
        self.arrays.insert(array, buffer);
        Ok((buffer, array))
    }

    fn delete_vertex_buffer(&mut self, buffer: RawBuffer, array: RawVertexArray) {
        self.arrays.remove(&array);
        self.buffers.remove(&buffer);
    }

    fn draw_arrays(&mut self, array: RawVertexArray, mode: PrimitiveMode, vertex_count: usize) {
        if self.arrays.contains_key(&array) {
            self.commands.push(GlCommand::Draw {
                array,
                mode,
                vertex_count,
            });
        }
    }

    fn create_framebuffer(
        &mut self,
        colors: &[RawTexture],
        depth: Option<RawTexture>,
    ) -> Result<RawFramebuffer, String> {
        if self.fail_framebuffers {
            return Err("GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT".into());
        }
        let mut size = None;
        for (t, want_depth) in colors
            .iter()
            .map(|c| (c, false))
            .chain(depth.iter().map(|d| (d, true)))
        {
            let desc = self
                .textures
                .get(t)
                .ok_or("GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT: missing texture")?;
            if desc.format.is_depth() != want_depth {
                return Err("GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT: wrong format".into());
            }
            let dims = (desc.width, desc.height);
            if *size.get_or_insert(dims) != dims {
                return Err("GL_FRAMEBUFFER_INCOMPLETE_DIMENSIONS".into());
            }
        }
        if size.is_none() {
            return Err("GL_FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT".into());
        }
        let id = RawFramebuffer(self.next());
        self.framebuffers.insert(
            id,
            Framebuffer {
                colors: colors.to_vec(),
                depth,
            },
        );
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer) {
        self.framebuffers.remove(&framebuffer);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<RawFramebuffer>) {
        self.commands.push(GlCommand::BindFramebuffer(framebuffer));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.commands.push(GlCommand::Viewport(width, height));
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        self.commands.push(GlCommand::Clear { color, depth });
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.commands.push(GlCommand::DepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.commands.push(GlCommand::DepthWrite(enabled));
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        self.commands.push(GlCommand::Blend(blend));
    }

    fn set_cull(&mut self, cull: Option<CullMode>) {
        self.commands.push(GlCommand::Cull(cull));
    }

    fn blit_to_screen(&mut self, source: RawFramebuffer, from: (u32, u32), to: (u32, u32)) {
        self.commands
            .push(GlCommand::BlitToScreen { source, from, to });
        self.commands.push(GlCommand::BindFramebuffer(None));
    }
}
