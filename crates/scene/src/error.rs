use stagecraft_common::ActorId;
use stagecraft_render::RenderError;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("no actor {0:?} on this layer")]
    UnknownActor(ActorId),
    #[error("no layer named `{0}`")]
    UnknownLayer(String),
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}
