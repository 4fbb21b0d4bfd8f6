use crate::component::Component;
use glam::Mat4;
use stagecraft_common::{ActorId, Transform};
use stagecraft_render::RenderQueue;

/// A placed object on a layer: a transform plus the components it draws with.
#[derive(Debug)]
pub struct Actor {
    id: ActorId,
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    /// Queue wireframe helpers for this actor's components.
    pub debug: bool,
    components: Vec<Box<dyn Component>>,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(),
            name: name.into(),
            transform: Transform::default(),
            visible: true,
            debug: false,
            components: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.add_component(component);
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn add_component(&mut self, component: impl Component + 'static) {
        self.components.push(Box::new(component));
    }

    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// Drop every component. Their parameter blocks are released with them.
    pub fn clear_components(&mut self) {
        self.components.clear();
    }

    /// Queue this actor's draws. Invisible actors queue nothing.
    pub fn on_render_queue(&self, queue: &mut RenderQueue) {
        self.queue_draws(queue, false);
    }

    /// As [`Actor::on_render_queue`], with debug drawing forced on by the layer.
    pub(crate) fn queue_draws(&self, queue: &mut RenderQueue, force_debug: bool) {
        if !self.visible {
            return;
        }
        let owner: Mat4 = self.transform.matrix();
        let debug = self.debug || force_debug;
        for component in &self.components {
            component.on_render_queue(&owner, queue);
            if debug {
                component.on_debug_queue(&owner, queue);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{LightComponent, MeshComponent};
    use glam::Vec3;
    use slotmap::SlotMap;
    use stagecraft_render::{MeshData, MeshId, ShaderId};
    use std::sync::Arc;

    fn actor() -> Actor {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        Actor::new("crate")
            .with_transform(Transform::from_position(Vec3::new(0.0, 1.0, 0.0)))
            .with_component(
                MeshComponent::new(shaders.insert(()), meshes.insert(()))
                    .with_geometry(Arc::new(MeshData::cube())),
            )
            .with_component(LightComponent::omni(Vec3::ONE, 3.0))
    }

    #[test]
    fn components_see_the_owner_transform() {
        let a = actor();
        let mut queue = RenderQueue::new();
        a.on_render_queue(&mut queue);
        assert_eq!(queue.main_phase()[0].model.w_axis.y, 1.0);
        assert_eq!(queue.lights()[0].position, Vec3::Y);
        assert!(queue.debug_phase().is_empty());
        assert_eq!(a.components()[1].kind(), "light");
    }

    #[test]
    fn hidden_actor_queues_nothing() {
        let mut a = actor();
        a.visible = false;
        let mut queue = RenderQueue::new();
        a.on_render_queue(&mut queue);
        assert_eq!(queue.counts(), Default::default());
    }

    #[test]
    fn debug_flag_adds_wireframes() {
        let mut a = actor();
        a.debug = true;
        let mut queue = RenderQueue::new();
        a.on_render_queue(&mut queue);
        // Mesh bounds and normals, light radius.
        assert_eq!(queue.debug_phase().len(), 3);
    }
}
