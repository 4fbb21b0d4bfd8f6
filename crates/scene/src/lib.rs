//! Scene layer: actors, their render components, layers and stages.
//!
//! Traversal walks the visible actors of a layer and lets every component
//! append draws to the shared [`stagecraft_render::RenderQueue`]. The queue
//! is then handed to a [`stagecraft_render::FrameRenderer`].
//!
//! # Invariants
//! - Components only append to the queue; they never read other phases.
//! - Traversal order is actor insertion order, then component order.

pub mod actor;
pub mod component;
mod error;
pub mod layer;
pub mod stage;

pub use actor::Actor;
pub use component::{
    AnimatedMeshComponent, Component, LightComponent, MeshComponent, MeshShellComponent,
    SpriteComponent,
};
pub use error::SceneError;
pub use layer::{LayerActors, TraversalMode};
pub use stage::Stage;

pub fn crate_info() -> &'static str {
    "stagecraft-scene v0.1.0"
}
