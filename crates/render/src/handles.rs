//! Copyable handles to long-lived GPU resources.
//!
//! Render elements hold these instead of references so a queue can be filled
//! on a worker thread while the resources stay owned by the backend.

slotmap::new_key_type! {
    /// Handle to a compiled shader program owned by the backend.
    pub struct ShaderId;
    /// Handle to an uploaded mesh (source or instance).
    pub struct MeshId;
    /// Handle to a GPU texture.
    pub struct TextureId;
}

/// Location of a uniform inside one linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);
