//! GPU programs and their texture slots.
//!
//! # Invariants
//! - A shader that failed to build stays not-ready; it is never rebuilt.
//! - Uniform locations are resolved once, at build time.
//! - Binding goes through [`GlContext::use_program`], the single tracker of
//!   the current program.

use crate::context::GlContext;
use crate::device::{GlDevice, RawProgram, ShaderStage};
use crate::error::GlError;
use crate::glsl::{self, ProgramSource};
use glam::{Mat4, Vec2};
use stagecraft_render::UniformLocation;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Program with no material conventions beyond the transform uniforms.
    Raw,
    /// Material program with texture slots and a spritesheet UV window.
    Phong,
}

/// Well-known material texture bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Albedo,
    Normal,
    Emission,
    Roughness,
    Shadow,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        Self::Albedo,
        Self::Normal,
        Self::Emission,
        Self::Roughness,
        Self::Shadow,
    ];

    pub fn unit(self) -> u32 {
        match self {
            Self::Albedo => 0,
            Self::Normal => 1,
            Self::Emission => 2,
            Self::Roughness => 3,
            Self::Shadow => 4,
        }
    }

    pub fn sampler(self) -> &'static str {
        match self {
            Self::Albedo => "tAlbedo",
            Self::Normal => "tNormal",
            Self::Emission => "tEmission",
            Self::Roughness => "tRoughness",
            Self::Shadow => "tShadow",
        }
    }
}

const TRANSFORM_UNIFORMS: [&str; 2] = ["uModel", "uMVP"];
const PHONG_UNIFORMS: [&str; 3] = ["uUvShift", "uUvSize", "uOpacity"];

#[derive(Debug)]
pub struct Shader {
    name: String,
    kind: ShaderKind,
    vertex: String,
    fragment: String,
    extra_uniforms: Vec<String>,
    program: Option<RawProgram>,
    failed: bool,
    uniforms: HashMap<String, UniformLocation>,
    slots: Vec<TextureSlot>,
}

impl Shader {
    pub fn new(
        name: impl Into<String>,
        kind: ShaderKind,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            vertex: vertex.into(),
            fragment: fragment.into(),
            extra_uniforms: Vec::new(),
            program: None,
            failed: false,
            uniforms: HashMap::new(),
            slots: Vec::new(),
        }
    }

    /// Material shader over the standard vertex stage.
    pub fn phong(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::new(name, ShaderKind::Phong, glsl::MATERIAL_VERTEX, fragment)
    }

    pub fn from_source(source: &ProgramSource) -> Self {
        Self::new(source.name, ShaderKind::Raw, source.vertex, source.fragment)
            .with_uniforms(source.uniforms.iter().copied())
    }

    /// Read both stages from disk.
    pub fn from_files(
        name: impl Into<String>,
        kind: ShaderKind,
        vertex: &Path,
        fragment: &Path,
    ) -> Result<Self, GlError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| GlError::Io {
                path: path.display().to_string(),
                source,
            })
        };
        Ok(Self::new(name, kind, read(vertex)?, read(fragment)?))
    }

    /// Extra uniforms to resolve when the program is built.
    pub fn with_uniforms<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.extra_uniforms
            .extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<RawProgram> {
        self.program
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Texture slots the program samples.
    pub fn slots(&self) -> &[TextureSlot] {
        &self.slots
    }

    /// Compile and link. Failures are logged with the full source and leave
    /// the shader not-ready.
    pub fn build<D: GlDevice>(&mut self, gl: &mut GlContext<D>) -> bool {
        if self.program.is_some() {
            return true;
        }
        if self.failed {
            return false;
        }
        let _span = tracing::debug_span!("shader_build", shader = %self.name).entered();

        let device = gl.device_mut();
        let vs = match device.compile_shader(ShaderStage::Vertex, &self.vertex) {
            Ok(vs) => vs,
            Err(log) => return self.fail("vertex", &self.vertex.clone(), &log),
        };
        let fs = match device.compile_shader(ShaderStage::Fragment, &self.fragment) {
            Ok(fs) => fs,
            Err(log) => {
                device.delete_shader(vs);
                return self.fail("fragment", &self.fragment.clone(), &log);
            }
        };
        let linked = device.link_program(vs, fs);
        device.delete_shader(vs);
        device.delete_shader(fs);
        let program = match linked {
            Ok(p) => p,
            Err(log) => {
                let source = format!("{}\n{}", self.vertex, self.fragment);
                return self.fail("link", &source, &log);
            }
        };

        let mut names: Vec<&str> = TRANSFORM_UNIFORMS.to_vec();
        if self.kind == ShaderKind::Phong {
            names.extend(PHONG_UNIFORMS);
            names.extend(TextureSlot::ALL.map(TextureSlot::sampler));
        }
        names.extend(self.extra_uniforms.iter().map(String::as_str));
        for name in names {
            if let Some(location) = device.uniform_location(program, name) {
                self.uniforms.insert(name.to_string(), location);
            }
        }

        // Samplers keep their unit for the program's lifetime.
        gl.use_program(Some(program));
        for slot in TextureSlot::ALL {
            if let Some(location) = self.uniform(slot.sampler()) {
                gl.set_i32(Some(location), slot.unit() as i32);
                self.slots.push(slot);
            }
        }

        tracing::debug!(shader = %self.name, uniforms = self.uniforms.len(), "shader built");
        self.program = Some(program);
        true
    }

    fn fail(&mut self, stage: &str, source: &str, log: &str) -> bool {
        tracing::error!(
            shader = %self.name,
            stage,
            log,
            source,
            "shader failed to build"
        );
        self.failed = true;
        false
    }

    /// Bind the program and upload the per-draw transforms. Returns `false`
    /// without touching the device if the shader is not ready.
    pub fn use_with<D: GlDevice>(&self, gl: &mut GlContext<D>, model: &Mat4, mvp: &Mat4) -> bool {
        let Some(program) = self.program else {
            return false;
        };
        gl.use_program(Some(program));
        gl.set_mat4(self.uniform("uModel"), model);
        gl.set_mat4(self.uniform("uMVP"), mvp);
        true
    }

    /// Spritesheet window for the next draw. Only material shaders have one.
    pub fn set_uv_frame<D: GlDevice>(&self, gl: &mut GlContext<D>, shift: Vec2, size: Vec2) {
        if self.kind == ShaderKind::Phong {
            gl.set_vec2(self.uniform("uUvShift"), shift);
            gl.set_vec2(self.uniform("uUvSize"), size);
        }
    }

    pub fn set_opacity<D: GlDevice>(&self, gl: &mut GlContext<D>, opacity: f32) {
        gl.set_f32(self.uniform("uOpacity"), opacity);
    }

    pub fn destroy<D: GlDevice>(&mut self, gl: &mut GlContext<D>) {
        if let Some(program) = self.program.take() {
            gl.forget_program(program);
            gl.device_mut().delete_program(program);
            self.uniforms.clear();
            self.slots.clear();
        }
    }
}
