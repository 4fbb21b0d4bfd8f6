//! Frame protocol between scene traversal and a render backend.
//!
//! A frame is consumed in three steps so the opaque pass can start while the
//! queue is still being filled:
//!
//! 1. `begin_frame` draws the environment and binds the G-buffer.
//! 2. `submit_main` draws one opaque element, in queue order.
//! 3. `finish_frame` runs every later pass once traversal is done.
//!
//! # Invariants
//! - `finish_frame` only sees a queue whose `is_done()` is true.
//! - When sorting is enabled the blending phase is sorted before `finish_frame`.
//! - A backend never fails a frame because of a broken shader or a missing
//!   resource; such draws are skipped and counted.

use crate::element::RenderElement;
use crate::geometry::MeshError;
use crate::handles::{MeshId, ShaderId};
use crate::parameter::{ParamError, ParamType, ShaderParameter};
use crate::queue::{FrameState, RenderQueue};
use glam::Mat4;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render queue consumed before traversal finished")]
    QueueNotFinished,
    #[error("scene traversal panicked")]
    TraversalPanicked,
    #[error("unknown shader handle")]
    UnknownShader,
    #[error("unknown mesh handle")]
    UnknownMesh,
    #[error("unknown texture handle")]
    UnknownTexture,
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Pipeline passes in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Environment,
    Geometry,
    Ambient,
    SunShadowMap,
    SunLight,
    OmniLight,
    Blending,
    Debug,
    Composite,
}

/// What one frame did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub passes: Vec<Pass>,
    pub main_draws: usize,
    pub blending_draws: usize,
    pub shadow_draws: usize,
    pub light_passes: usize,
    pub debug_lines: usize,
    /// Draws dropped because of a non-ready shader or a missing resource.
    pub skipped_draws: usize,
}

impl FrameStats {
    pub fn total_draws(&self) -> usize {
        self.main_draws + self.blending_draws + self.shadow_draws
    }
}

/// A consumer of render queues.
pub trait FrameRenderer {
    type Target;

    fn begin_frame(&mut self, frame: &FrameState, target: &mut Self::Target)
        -> Result<(), RenderError>;

    fn submit_main(&mut self, element: &RenderElement, target: &mut Self::Target);

    fn finish_frame(
        &mut self,
        queue: &RenderQueue,
        target: &mut Self::Target,
    ) -> Result<FrameStats, RenderError>;

    /// Copy the target's result image to the default framebuffer.
    fn present_to_screen(
        &mut self,
        target: &Self::Target,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError>;

    /// Sort if the frame asks for it, then run the passes after the opaque one.
    fn complete(
        &mut self,
        queue: &mut RenderQueue,
        target: &mut Self::Target,
    ) -> Result<FrameStats, RenderError> {
        if !queue.is_done() {
            return Err(RenderError::QueueNotFinished);
        }
        if queue.is_using_sorting() {
            queue.sort_blending_phase();
        }
        self.finish_frame(queue, target)
    }

    /// Render a finished queue in one go.
    fn render(
        &mut self,
        queue: &mut RenderQueue,
        target: &mut Self::Target,
    ) -> Result<FrameStats, RenderError> {
        if !queue.is_done() {
            return Err(RenderError::QueueNotFinished);
        }
        self.begin_frame(queue.frame(), target)?;
        for element in queue.main_phase() {
            self.submit_main(element, target);
        }
        self.complete(queue, target)
    }
}

/// Anything that contributes draws during traversal.
pub trait Renderable: Send + Sync {
    /// Append this object's draws. `owner` is the owning actor's transform.
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue);
}

/// Shader capabilities components need when they are set up.
pub trait ShaderBackend {
    /// Create a parameter on `shader`, resolving its uniform location now.
    /// A uniform the program does not declare yields a parameter that
    /// uploads nothing.
    fn create_parameter(
        &mut self,
        shader: ShaderId,
        name: &str,
        ty: ParamType,
    ) -> Result<Arc<ShaderParameter>, RenderError>;

    fn is_ready(&self, shader: ShaderId) -> bool;

    /// The default shader `mesh` carries, if one was assigned.
    fn mesh_shader(&self, _mesh: MeshId) -> Option<ShaderId> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Draw;
    use glam::Vec3;
    use slotmap::SlotMap;

    /// Records the order in which elements reach it.
    #[derive(Default)]
    struct Recorder {
        begun: bool,
        opaque: Vec<Mat4>,
        blending_order: Vec<f32>,
    }

    impl FrameRenderer for Recorder {
        type Target = ();

        fn begin_frame(&mut self, _: &FrameState, _: &mut ()) -> Result<(), RenderError> {
            self.begun = true;
            Ok(())
        }

        fn submit_main(&mut self, element: &RenderElement, _: &mut ()) {
            self.opaque.push(element.model);
        }

        fn finish_frame(
            &mut self,
            queue: &RenderQueue,
            _: &mut (),
        ) -> Result<FrameStats, RenderError> {
            self.blending_order = queue.blending_phase().iter().map(|e| e.depth_key()).collect();
            Ok(FrameStats {
                main_draws: self.opaque.len(),
                blending_draws: queue.blending_phase_count(),
                ..FrameStats::default()
            })
        }

        fn present_to_screen(&mut self, _: &(), _: u32, _: u32) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn ids() -> (ShaderId, MeshId) {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        (shaders.insert(()), meshes.insert(()))
    }

    #[test]
    fn render_requires_finished_queue() {
        let mut queue = RenderQueue::new();
        let err = Recorder::default().render(&mut queue, &mut ()).unwrap_err();
        assert!(matches!(err, RenderError::QueueNotFinished));
    }

    #[test]
    fn render_sorts_when_enabled() {
        let (shader, mesh) = ids();
        let mut queue = RenderQueue::new();
        queue.set_view_projection_matrix(Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0));
        queue.enable_sorting();
        for z in [-5.0, -10.0, -2.0] {
            queue.add_blending_phase(
                Mat4::from_translation(Vec3::new(0.0, 0.0, z)),
                crate::element::ColorMode::Alpha,
                0.5,
                Draw::new(shader, mesh),
            );
        }
        queue.add_main_phase(Mat4::IDENTITY, Draw::new(shader, mesh));
        queue.finish();

        let mut r = Recorder::default();
        let stats = r.render(&mut queue, &mut ()).unwrap();
        assert!(r.begun);
        assert_eq!(stats.main_draws, 1);
        assert_eq!(stats.blending_draws, 3);
        assert!(r.blending_order.windows(2).all(|w| w[0] >= w[1]));
    }
}
