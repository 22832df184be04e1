// Runtime components mirrored into the ECS so collaborators can query
// mechanism state without reaching into the scripts that own it.

use cgmath::{Quaternion, Vector3};
use shipyard::{Component, EntityId};

use crate::session::ParticipantId;

/// A participant's avatar rig. `locomotion_enabled` is the shared
/// locomotion-enable flag; traversal controllers disable it on entry and
/// restore it exactly once on exit.
#[derive(Clone, Copy, Debug, Component)]
pub struct PropPlayerRig {
    pub participant: ParticipantId,
    pub locomotion_enabled: bool,
}

/// Mirror of a mechanism's grab state, updated when grab events are applied.
#[derive(Clone, Copy, Debug, Default, Component)]
pub struct PropHeldBy(pub Option<ParticipantId>);

/// Mirror of a mechanism's traversal state.
#[derive(Clone, Copy, Debug, Default, Component)]
pub struct PropTraversing(pub bool);

/// Explicit ownership record for a carried or stuck body; replaces transform
/// parenting. The child's pose is recomputed from the parent every tick.
#[derive(Clone, Copy, Debug, Component)]
pub struct PropAttachment {
    pub parent: EntityId,
    pub local_offset: Vector3<f32>,
    pub local_rotation: Quaternion<f32>,
}
