use super::Component;
use glam::{Mat4, Vec4};
use stagecraft_render::{
    DebugShape, Draw, MeshCompound, MeshId, ParameterBlock, Pose, RenderElementDebug, RenderQueue,
    Renderable, ShaderId, TextureId,
};

/// A rig of uploaded meshes posed by node-name overrides.
///
/// Each node is queued as its own opaque draw with the node's world
/// transform under the current pose.
#[derive(Debug, Clone)]
pub struct AnimatedMeshComponent {
    shader: ShaderId,
    rig: MeshCompound<MeshId>,
    texture: Option<TextureId>,
    params: ParameterBlock,
    pose: Pose,
    casts_shadow: bool,
}

impl AnimatedMeshComponent {
    pub fn new(shader: ShaderId, rig: MeshCompound<MeshId>) -> Self {
        Self {
            shader,
            rig,
            texture: None,
            params: ParameterBlock::default(),
            pose: Pose::new(),
            casts_shadow: true,
        }
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_params(mut self, params: ParameterBlock) -> Self {
        self.params = params;
        self
    }

    pub fn casting_shadows(mut self, casts: bool) -> Self {
        self.casts_shadow = casts;
        self
    }

    pub fn rig(&self) -> &MeshCompound<MeshId> {
        &self.rig
    }

    /// Replace the pose. Nodes without an entry keep their rest transform.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Override one node's local transform.
    pub fn pose_node(&mut self, node: impl Into<String>, local: Mat4) {
        self.pose.insert(node.into(), local);
    }

    pub fn clear_pose(&mut self) {
        self.pose.clear();
    }
}

impl Renderable for AnimatedMeshComponent {
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let world = self.rig.world_transforms(Some(&self.pose));
        for (node, transform) in self.rig.nodes().iter().zip(world) {
            let model = *owner * transform;
            let draw = Draw::new(self.shader, node.mesh)
                .with_texture(self.texture)
                .with_params(self.params.clone());
            queue.add_main_phase(model, draw);
            if self.casts_shadow {
                queue.add_shadow_caster(model, node.mesh);
            }
        }
    }
}

impl Component for AnimatedMeshComponent {
    fn kind(&self) -> &'static str {
        "animated_mesh"
    }

    /// Bones: a line from every node origin to its parent's.
    fn on_debug_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let origins: Vec<_> = self
            .rig
            .world_transforms(Some(&self.pose))
            .iter()
            .map(|m| owner.transform_point3(m.w_axis.truncate()))
            .collect();
        let bones: Vec<_> = self
            .rig
            .nodes()
            .iter()
            .zip(&origins)
            .filter_map(|(node, &origin)| node.parent.map(|p| [origins[p], origin]))
            .collect();
        if !bones.is_empty() {
            queue.add_debug(RenderElementDebug {
                shape: DebugShape::Lines(bones),
                color: Vec4::new(1.0, 0.4, 0.8, 1.0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;
    use slotmap::SlotMap;

    fn arm() -> AnimatedMeshComponent {
        let mut shaders: SlotMap<ShaderId, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        let mut rig = MeshCompound::new();
        rig.add_node("upper", meshes.insert(()), Mat4::IDENTITY, None)
            .unwrap();
        rig.add_node(
            "lower",
            meshes.insert(()),
            Mat4::from_translation(Vec3::X),
            Some("upper"),
        )
        .unwrap();
        AnimatedMeshComponent::new(shaders.insert(()), rig)
    }

    #[test]
    fn pose_moves_children() {
        let mut c = arm();
        c.pose_node("upper", Mat4::from_translation(Vec3::Y));
        let mut queue = RenderQueue::new();
        c.on_render_queue(&Mat4::IDENTITY, &mut queue);
        assert_eq!(queue.main_phase_count(), 2);
        assert_eq!(queue.shadow_casters().len(), 2);
        let lower = queue.main_phase()[1].model.w_axis.truncate();
        assert_relative_eq!(lower, Vec3::new(1.0, 1.0, 0.0));

        c.clear_pose();
        queue.reset();
        c.on_render_queue(&Mat4::IDENTITY, &mut queue);
        assert_relative_eq!(queue.main_phase()[1].model.w_axis.truncate(), Vec3::X);
    }

    #[test]
    fn debug_draws_one_bone_per_child() {
        let c = arm();
        let mut queue = RenderQueue::new();
        c.on_debug_queue(&Mat4::IDENTITY, &mut queue);
        assert_eq!(queue.debug_phase()[0].segments(), vec![[Vec3::ZERO, Vec3::X]]);
    }
}
