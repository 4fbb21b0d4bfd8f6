//! OpenGL 4.1 backend for the deferred renderer.
//!
//! [`GlRenderer`] consumes a [`stagecraft_render::RenderQueue`] against a
//! [`RenderTarget`]. All GL calls go through the [`GlDevice`] trait:
//! [`GlowDevice`] drives a real context, [`HeadlessDevice`] records calls
//! for tests and tools without a display.
//!
//! # Invariants
//! - [`GlContext`] is the only tracker of bound GL state.
//! - Resources are addressed by handle; render elements never own them.
//! - A shader that fails to build never breaks a frame.

mod context;
pub mod device;
mod error;
pub mod glsl;
pub mod light;
mod mesh;
mod renderer;
mod resources;
mod shader;
mod target;
mod texture;

pub use context::{GlContext, TEXTURE_UNITS};
pub use device::{GlCommand, GlDevice, GlowDevice, HeadlessDevice, ResourceKind, UniformValue};
pub use error::{GlError, TargetError};
pub use mesh::MeshStatic;
pub use renderer::GlRenderer;
pub use resources::Resources;
pub use shader::{Shader, ShaderKind, TextureSlot};
pub use target::RenderTarget;
pub use texture::Texture;

pub fn crate_info() -> &'static str {
    "stagecraft-render-gl v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render-gl"));
    }
}
