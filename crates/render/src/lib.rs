//! Render core: the backend-agnostic half of the deferred renderer.
//!
//! Scene traversal fills a [`RenderQueue`] with draw elements; a
//! [`FrameRenderer`] backend consumes it against its own render target.
//!
//! # Invariants
//! - Render elements hold handles, never resources; resources outlive frames.
//! - The queue is reset once per frame and only appended to during traversal.
//! - Only the main phase may be consumed while traversal is still running.
//! - Nothing in this crate touches a graphics API.

pub mod camera;
pub mod compound;
pub mod element;
pub mod frame;
pub mod geometry;
pub mod handles;
pub mod lod;
pub mod parameter;
pub mod queue;
pub mod shading;

pub use camera::{Camera, Projection};
pub use compound::{CompoundNode, MeshCompound, Pose};
pub use element::{
    ColorMode, DebugShape, LightKind, RenderElement, RenderElementDebug, RenderElementLight,
    ShadowCaster,
};
pub use frame::{FrameRenderer, FrameStats, Pass, RenderError, Renderable, ShaderBackend};
pub use geometry::{BoundingSphere, MeshData, MeshError};
pub use handles::{MeshId, ShaderId, TextureId, UniformLocation};
pub use lod::{LodGroup, LodLevel};
pub use parameter::{ParamError, ParamType, ParameterBlock, ShaderParameter, UniformSink};
pub use queue::{Draw, FrameState, PhaseCounts, RenderQueue};

pub fn crate_info() -> &'static str {
    "stagecraft-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
