use shipyard::EntityId;

use crate::session::ParticipantId;

/// Discrete interaction actions delivered by the input layer. Continuous hand
/// poses are applied to the held body directly; only the edges arrive here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAction {
    /// A "select" (grab) on the target mechanism.
    Select,
    /// The matching release of a prior select.
    Release,
    /// An "activate" (use) request, e.g. starting a zipline or ride.
    Activate,
}

/// One input event, tagged with the participant who performed it.
#[derive(Clone, Copy, Debug)]
pub struct InputEvent {
    pub target: EntityId,
    pub action: InputAction,
    pub participant: ParticipantId,
}

impl InputEvent {
    pub fn select(target: EntityId, participant: ParticipantId) -> InputEvent {
        InputEvent {
            target,
            action: InputAction::Select,
            participant,
        }
    }

    pub fn release(target: EntityId, participant: ParticipantId) -> InputEvent {
        InputEvent {
            target,
            action: InputAction::Release,
            participant,
        }
    }

    pub fn activate(target: EntityId, participant: ParticipantId) -> InputEvent {
        InputEvent {
            target,
            action: InputAction::Activate,
            participant,
        }
    }
}
