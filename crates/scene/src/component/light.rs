use super::Component;
use glam::{Mat4, Vec3, Vec4};
use stagecraft_render::{DebugShape, LightKind, RenderElementDebug, RenderQueue, Renderable};

#[derive(Debug, Clone, PartialEq)]
pub struct LightComponent {
    kind: LightKind,
    color: Vec3,
    intensity: f32,
    affect_distance: f32,
    casts_shadow: bool,
    /// Travel direction of a sun, in the owner's space.
    direction: Vec3,
}

impl LightComponent {
    /// Directional light travelling along `direction`.
    pub fn sun(direction: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Sun,
            color,
            intensity: 1.0,
            affect_distance: 50.0,
            casts_shadow: false,
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
        }
    }

    /// Point light at the owner's origin.
    pub fn omni(color: Vec3, affect_distance: f32) -> Self {
        Self {
            kind: LightKind::Omni,
            color,
            intensity: 1.0,
            affect_distance: affect_distance.max(0.0),
            casts_shadow: false,
            direction: Vec3::NEG_Y,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity.max(0.0);
        self
    }

    /// For a sun, the half-extent covered by its shadow map.
    pub fn with_affect_distance(mut self, distance: f32) -> Self {
        self.affect_distance = distance.max(0.0);
        self
    }

    pub fn casting_shadows(mut self, casts: bool) -> Self {
        self.casts_shadow = casts;
        self
    }

    pub fn light_kind(&self) -> LightKind {
        self.kind
    }

    /// Color as queued: base color scaled by intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

impl Renderable for LightComponent {
    fn on_render_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        let position = match self.kind {
            LightKind::Sun => owner.transform_vector3(self.direction),
            LightKind::Omni => owner.w_axis.truncate(),
        };
        queue.add_light(
            self.kind,
            position,
            self.radiance(),
            self.affect_distance,
            self.casts_shadow,
        );
    }
}

impl Component for LightComponent {
    fn kind(&self) -> &'static str {
        "light"
    }

    fn on_debug_queue(&self, owner: &Mat4, queue: &mut RenderQueue) {
        if self.kind == LightKind::Omni {
            queue.add_debug(RenderElementDebug {
                shape: DebugShape::Sphere {
                    center: owner.w_axis.truncate(),
                    radius: self.affect_distance,
                },
                color: self.color.extend(1.0).min(Vec4::ONE),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    #[test]
    fn sun_direction_follows_owner_rotation() {
        let light = LightComponent::sun(Vec3::NEG_Y, Vec3::ONE)
            .with_intensity(2.0)
            .casting_shadows(true);
        let owner = Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
            * Mat4::from_translation(Vec3::splat(9.0));
        let mut queue = RenderQueue::new();
        light.on_render_queue(&owner, &mut queue);
        let queued = &queue.lights()[0];
        assert_eq!(queued.kind, LightKind::Sun);
        assert!(queued.casts_shadow);
        assert_relative_eq!(queued.direction(), Vec3::X, epsilon = 1e-5);
        assert_relative_eq!(queued.color, Vec3::splat(2.0));
    }

    #[test]
    fn omni_sits_at_owner_origin() {
        let light = LightComponent::omni(Vec3::new(1.0, 0.5, 0.0), 4.0);
        let mut queue = RenderQueue::new();
        light.on_render_queue(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), &mut queue);
        let queued = &queue.lights()[0];
        assert_eq!(queued.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(queued.affect_distance, 4.0);
    }
}
