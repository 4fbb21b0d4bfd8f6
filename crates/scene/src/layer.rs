//! A layer of actors seen through one camera.
//!
//! # Invariants
//! - The queue is reset and its frame state set before any actor is visited.
//! - In overlapped mode only opaque draws reach the renderer before the
//!   traversal worker has joined; every other phase is read afterwards.
//! - A panic inside traversal is reported as
//!   [`RenderError::TraversalPanicked`] and never hangs the render thread.

use crate::actor::Actor;
use crate::error::SceneError;
use glam::Vec3;
use stagecraft_common::{ActorId, RenderSettings};
use stagecraft_render::{Camera, FrameRenderer, FrameStats, RenderError, RenderQueue, TextureId};
use std::panic::{self, AssertUnwindSafe};

/// How traversal is scheduled against submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// Traverse, mark the queue done, then render.
    #[default]
    Joined,
    /// Traverse on a worker thread while opaque draws are submitted as they
    /// arrive.
    Overlapped,
}

impl TraversalMode {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        if settings.overlap_traversal {
            Self::Overlapped
        } else {
            Self::Joined
        }
    }
}

#[derive(Debug)]
pub struct LayerActors {
    name: String,
    pub camera: Camera,
    pub ambient: Vec3,
    pub environment: Option<TextureId>,
    /// Blurred irradiance map; the environment is used when unset.
    pub radiance: Option<TextureId>,
    pub environment_rotation: f32,
    pub show_environment: bool,
    pub gamma: f32,
    /// Depth-sort the blending phase and render without depth testing.
    pub sorting: bool,
    pub visible: bool,
    /// Force debug drawing for every actor.
    pub debug: bool,
    pub mode: TraversalMode,
    actors: Vec<Actor>,
}

impl LayerActors {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            camera: Camera::default(),
            ambient: Vec3::splat(0.1),
            environment: None,
            radiance: None,
            environment_rotation: 0.0,
            show_environment: true,
            gamma: RenderSettings::DEFAULT_GAMMA,
            sorting: false,
            visible: true,
            debug: false,
            mode: TraversalMode::Joined,
            actors: Vec::new(),
        }
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take gamma, scheduling and debug drawing from render settings.
    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        self.gamma = settings.gamma;
        self.mode = TraversalMode::from_settings(settings);
        self.debug = settings.debug_draw;
    }

    pub fn add_actor(&mut self, actor: Actor) -> ActorId {
        let id = actor.id();
        self.actors.push(actor);
        id
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id() == id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.iter_mut().find(|a| a.id() == id)
    }

    pub fn remove_actor(&mut self, id: ActorId) -> Result<Actor, SceneError> {
        let index = self
            .actors
            .iter()
            .position(|a| a.id() == id)
            .ok_or(SceneError::UnknownActor(id))?;
        Ok(self.actors.remove(index))
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Reset the queue and load this layer's camera and lighting state.
    pub fn prepare(&self, queue: &mut RenderQueue) {
        queue.reset();
        queue.set_view_projection_matrix(self.camera.view_projection());
        queue.set_camera_position(self.camera.position);
        queue.set_camera_direction(self.camera.forward());
        queue.set_ambient_light(self.ambient);
        queue.set_gamma(self.gamma);
        queue.set_hdr_texture(self.environment);
        queue.set_radiance_texture(self.radiance);
        queue.set_environment_rotation(self.environment_rotation);
        queue.set_show_env_hdr(self.show_environment);
        if self.sorting {
            queue.enable_sorting();
        } else {
            queue.disable_sorting();
        }
    }

    /// Visit every visible actor in insertion order.
    pub fn traverse(&self, queue: &mut RenderQueue) {
        let _span = tracing::info_span!("traversal", layer = %self.name).entered();
        for actor in &self.actors {
            actor.queue_draws(queue, self.debug);
        }
        tracing::debug!(counts = ?queue.counts(), "traversal done");
    }

    /// Fill `queue` from this layer and render it into `target`.
    pub fn render<R: FrameRenderer>(
        &self,
        queue: &mut RenderQueue,
        renderer: &mut R,
        target: &mut R::Target,
    ) -> Result<FrameStats, SceneError> {
        let _span = tracing::info_span!("layer_render", layer = %self.name).entered();
        self.prepare(queue);
        let stats = match self.mode {
            TraversalMode::Joined => {
                self.traverse(queue);
                queue.finish();
                renderer.render(queue, target)?
            }
            TraversalMode::Overlapped => self.render_overlapped(queue, renderer, target)?,
        };
        Ok(stats)
    }

    fn render_overlapped<R: FrameRenderer>(
        &self,
        queue: &mut RenderQueue,
        renderer: &mut R,
        target: &mut R::Target,
    ) -> Result<FrameStats, RenderError> {
        let frame = queue.frame().clone();
        let stream = queue.attach_main_stream();
        let (queue, traversed) = std::thread::scope(|scope| {
            let worker = scope.spawn(move || {
                let traversed =
                    panic::catch_unwind(AssertUnwindSafe(|| self.traverse(queue))).is_ok();
                // Closes the stream even after a panic.
                queue.finish();
                (queue, traversed)
            });
            renderer.begin_frame(&frame, target)?;
            let mut streamed = 0usize;
            for element in stream.iter() {
                renderer.submit_main(&element, target);
                streamed += 1;
            }
            tracing::trace!(streamed, "main phase drained");
            worker.join().map_err(|_| RenderError::TraversalPanicked)
        })?;
        if !traversed {
            tracing::error!(layer = %self.name, "traversal panicked, frame dropped");
            return Err(RenderError::TraversalPanicked);
        }
        renderer.complete(queue, target)
    }
}
