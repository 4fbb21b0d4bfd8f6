use crate::error::SceneError;
use crate::layer::LayerActors;
use stagecraft_common::RenderSettings;
use stagecraft_render::{FrameRenderer, FrameStats, RenderQueue};

/// Ordered layers sharing one render queue.
///
/// Each visible layer renders a complete frame into the target, in order;
/// the queue is reused across layers and frames.
#[derive(Debug, Default)]
pub struct Stage {
    layers: Vec<LayerActors>,
    queue: RenderQueue,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: LayerActors) -> Result<(), SceneError> {
        if self.layer(layer.name()).is_some() {
            return Err(SceneError::DuplicateLayer(layer.name().to_string()));
        }
        tracing::debug!(layer = %layer.name(), "layer added");
        self.layers.push(layer);
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&LayerActors> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut LayerActors> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    pub fn remove_layer(&mut self, name: &str) -> Result<LayerActors, SceneError> {
        let index = self
            .layers
            .iter()
            .position(|l| l.name() == name)
            .ok_or_else(|| SceneError::UnknownLayer(name.to_string()))?;
        Ok(self.layers.remove(index))
    }

    pub fn layers(&self) -> &[LayerActors] {
        &self.layers
    }

    /// The queue as the last rendered layer left it.
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        for layer in &mut self.layers {
            layer.apply_settings(settings);
        }
    }

    pub fn render_layer<R: FrameRenderer>(
        &mut self,
        name: &str,
        renderer: &mut R,
        target: &mut R::Target,
    ) -> Result<FrameStats, SceneError> {
        let layer = self
            .layers
            .iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| SceneError::UnknownLayer(name.to_string()))?;
        layer.render(&mut self.queue, renderer, target)
    }

    /// Render every visible layer. Returns per-layer stats in layer order.
    pub fn render<R: FrameRenderer>(
        &mut self,
        renderer: &mut R,
        target: &mut R::Target,
    ) -> Result<Vec<(String, FrameStats)>, SceneError> {
        let mut out = Vec::with_capacity(self.layers.len());
        for layer in self.layers.iter().filter(|l| l.visible) {
            let stats = layer.render(&mut self.queue, renderer, target)?;
            out.push((layer.name().to_string(), stats));
        }
        Ok(out)
    }
}
