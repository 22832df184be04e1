use cgmath::{vec3, InnerSpace, Matrix3, Quaternion, Vector3};
use shipyard::{EntityId, Get, IntoIter, IntoWithId, View, World};

use crate::physics::PhysicsWorld;
use crate::runtime_props::{PropHeldBy, PropPlayerRig};
use crate::session::ParticipantId;

/// Find the avatar rig entity belonging to a participant.
pub fn avatar_of(world: &World, participant: ParticipantId) -> Option<EntityId> {
    let v_rig = world.borrow::<View<PropPlayerRig>>().unwrap();
    v_rig
        .iter()
        .with_id()
        .find(|(_, rig)| rig.participant == participant)
        .map(|(id, _)| id)
}

/// True if the entity is currently held by anyone, per the ECS mirror.
pub fn is_entity_held(world: &World, entity_id: EntityId) -> bool {
    let v_held = world.borrow::<View<PropHeldBy>>().unwrap();
    matches!(v_held.get(entity_id), Ok(PropHeldBy(Some(_))))
}

/// The direction a mechanism body is aiming: its local +Z in world space.
pub fn aim_direction(physics: &PhysicsWorld, entity_id: EntityId) -> Option<Vector3<f32>> {
    physics
        .rotation(entity_id)
        .map(|rotation| (rotation * vec3(0.0, 0.0, 1.0)).normalize())
}

/// The effect that imparts launch motion under the mechanism's configured
/// policy, plus the resulting velocity for event reporting.
pub fn launch_effect(
    entity_id: EntityId,
    policy: crate::scripts::LaunchPolicy,
    direction: Vector3<f32>,
    force: f32,
    mass: f32,
) -> (crate::scripts::Effect, Vector3<f32>) {
    use crate::scripts::{Effect, LaunchPolicy};

    match policy {
        LaunchPolicy::DirectVelocity => {
            let velocity = direction * force;
            (Effect::SetLinearVelocity { entity_id, velocity }, velocity)
        }
        LaunchPolicy::Impulse => {
            let impulse = direction * force;
            let velocity = impulse / mass.max(f32::EPSILON);
            (Effect::ApplyImpulse { entity_id, impulse }, velocity)
        }
    }
}

/// Build the rotation that faces `forward` with the given `up`.
pub fn look_rotation(forward: Vector3<f32>, up: Vector3<f32>) -> Quaternion<f32> {
    let forward = forward.normalize();
    let right = up.cross(forward).normalize();
    let up = forward.cross(right);
    Matrix3::from_cols(right, up, forward).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Rotation;

    #[test]
    fn test_look_rotation_maps_local_axes() {
        let rotation = look_rotation(vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0));

        let forward = rotation.rotate_vector(vec3(0.0, 0.0, 1.0));
        assert!((forward - vec3(1.0, 0.0, 0.0)).magnitude() < 1e-4);

        let up = rotation.rotate_vector(vec3(0.0, 1.0, 0.0));
        assert!((up - vec3(0.0, 1.0, 0.0)).magnitude() < 1e-4);
    }

    #[test]
    fn test_avatar_lookup() {
        let mut world = World::new();
        let avatar = world.add_entity(PropPlayerRig {
            participant: ParticipantId(3),
            locomotion_enabled: true,
        });

        assert_eq!(avatar_of(&world, ParticipantId(3)), Some(avatar));
        assert_eq!(avatar_of(&world, ParticipantId(4)), None);
    }
}
