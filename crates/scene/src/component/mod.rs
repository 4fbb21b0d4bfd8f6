//! Components: the render-facing parts of an actor.
//!
//! Each component composes the owner transform with its own local transform
//! and picks the queue phase its material calls for.

mod animated;
mod light;
mod mesh;
mod shell;
mod sprite;

pub use animated::AnimatedMeshComponent;
pub use light::LightComponent;
pub use mesh::MeshComponent;
pub use shell::MeshShellComponent;
pub use sprite::SpriteComponent;

use glam::Mat4;
use stagecraft_render::{RenderQueue, Renderable};
use std::fmt;

pub trait Component: Renderable + fmt::Debug {
    /// Short type name for logs.
    fn kind(&self) -> &'static str;

    /// Wireframe helpers, queued only for actors with debug drawing enabled.
    fn on_debug_queue(&self, _owner: &Mat4, _queue: &mut RenderQueue) {}
}
