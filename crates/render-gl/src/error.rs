use stagecraft_render::{MeshError, RenderError};

/// Errors from GPU resource management.
#[derive(Debug, thiserror::Error)]
pub enum GlError {
    #[error("device error: {0}")]
    Device(String),
    #[error("unknown shader handle")]
    UnknownShader,
    #[error("unknown mesh handle")]
    UnknownMesh,
    #[error("unknown texture handle")]
    UnknownTexture,
    #[error("mesh still shares its buffers with {0} instance(s)")]
    InstancesAlive(usize),
    #[error("texture data has {got} values, expected {expected}")]
    TextureSize { expected: usize, got: usize },
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Errors from building a render target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("render target size {width}x{height} is empty")]
    ZeroSize { width: u32, height: u32 },
    #[error("allocating {image}: {reason}")]
    Allocation { image: &'static str, reason: String },
    #[error("framebuffer `{framebuffer}` is incomplete: {reason}")]
    Incomplete {
        framebuffer: &'static str,
        reason: String,
    },
}

impl From<GlError> for RenderError {
    fn from(err: GlError) -> Self {
        match err {
            GlError::UnknownShader => RenderError::UnknownShader,
            GlError::UnknownMesh => RenderError::UnknownMesh,
            GlError::UnknownTexture => RenderError::UnknownTexture,
            GlError::Mesh(e) => RenderError::Mesh(e),
            other => RenderError::Backend(other.to_string()),
        }
    }
}
