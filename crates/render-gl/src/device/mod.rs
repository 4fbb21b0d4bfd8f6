//! The slice of OpenGL the pipeline uses.
//!
//! [`GlDevice`] is implemented by [`GlowDevice`] for a real context and by
//! [`HeadlessDevice`] for tests and tooling. Callers go through
//! [`crate::GlContext`], which filters redundant state changes.
//!
//! # Invariants
//! - Every method runs on the thread that owns the GL context.
//! - Raw handles are only meaningful to the device that created them.

pub(crate) mod headless;
mod native;

pub use headless::{GlCommand, HeadlessDevice, ResourceKind, UniformValue};
pub use native::GlowDevice;

use glam::{Mat4, Vec4};
use stagecraft_render::{ParamType, UniformLocation};
use std::num::NonZeroU32;

macro_rules! raw_handle {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub NonZeroU32);
    )*};
}

raw_handle!(
    RawShaderObject,
    /// A linked program.
    RawProgram,
    RawTexture,
    RawBuffer,
    RawVertexArray,
    RawFramebuffer,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba16F,
    Depth32F,
}

impl TextureFormat {
    /// Upload values per texel.
    pub fn channels(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba16F => 4,
            Self::Depth32F => 1,
        }
    }

    pub fn is_depth(self) -> bool {
        self == Self::Depth32F
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: TextureFilter,
    /// Clamp to edge instead of repeating.
    pub clamp: bool,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            filter: TextureFilter::Linear,
            clamp: false,
        }
    }

    pub fn filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn clamped(mut self) -> Self {
        self.clamp = true;
        self
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pixel data for a texture upload.
#[derive(Debug, Clone, Copy)]
pub enum TexelData<'a> {
    U8(&'a [u8]),
    F32(&'a [f32]),
}

impl TexelData<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(d) => d.len(),
            Self::F32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendFunc {
    pub const REPLACE: Self = Self::new(BlendFactor::One, BlendFactor::Zero);
    pub const ADDITIVE: Self = Self::new(BlendFactor::One, BlendFactor::One);
    pub const ALPHA: Self = Self::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    pub const ALPHA_ADDITIVE: Self = Self::new(BlendFactor::SrcAlpha, BlendFactor::One);

    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src, dst }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Triangles,
    Lines,
}

/// Thin graphics device. Compile and link failures come back as the driver's
/// info log.
pub trait GlDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
    -> Result<RawShaderObject, String>;
    fn delete_shader(&mut self, shader: RawShaderObject);
    /// Link a vertex and fragment stage.
    fn link_program(
        &mut self,
        vertex: RawShaderObject,
        fragment: RawShaderObject,
    ) -> Result<RawProgram, String>;
    fn delete_program(&mut self, program: RawProgram);
    fn use_program(&mut self, program: Option<RawProgram>);
    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<UniformLocation>;
    /// Upload to the bound program.
    fn uniform_f32(&mut self, location: UniformLocation, ty: ParamType, data: &[f32]);
    fn uniform_i32(&mut self, location: UniformLocation, ty: ParamType, data: &[i32]);
    fn uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<TexelData<'_>>,
    ) -> Result<RawTexture, String>;
    fn delete_texture(&mut self, texture: RawTexture);
    fn bind_texture(&mut self, unit: u32, texture: Option<RawTexture>);

    /// Upload interleaved floats and describe them as consecutive attributes.
    fn create_vertex_buffer(
        &mut self,
        floats: &[f32],
        attribute_sizes: &[usize],
    ) -> Result<(RawBuffer, RawVertexArray), String>;
    fn delete_vertex_buffer(&mut self, buffer: RawBuffer, array: RawVertexArray);
    fn draw_arrays(&mut self, array: RawVertexArray, mode: PrimitiveMode, vertex_count: usize);

    /// Color attachments are bound in order as draw buffers; no colors means
    /// draw and read buffers are disabled.
    fn create_framebuffer(
        &mut self,
        colors: &[RawTexture],
        depth: Option<RawTexture>,
    ) -> Result<RawFramebuffer, String>;
    fn delete_framebuffer(&mut self, framebuffer: RawFramebuffer);
    fn bind_framebuffer(&mut self, framebuffer: Option<RawFramebuffer>);
    fn viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: Option<Vec4>, depth: bool);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_blend(&mut self, blend: Option<BlendFunc>);
    fn set_cull(&mut self, cull: Option<CullMode>);
    /// Copy the color of `source` into the default framebuffer with linear
    /// filtering. Leaves the default framebuffer bound.
    fn blit_to_screen(&mut self, source: RawFramebuffer, from: (u32, u32), to: (u32, u32));
}
