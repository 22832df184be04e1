use crate::session::ParticipantId;

/// Grab state for a manipulable object. `Firing` is transient: a release runs
/// the mechanism's side effects and the handle is back to `Idle` before the
/// tick ends, so it is never observable between ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GrabState {
    Idle,
    Held { by: ParticipantId },
}

/// Outcome of a grab-machine operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GrabTransition {
    Grabbed { by: ParticipantId },
    /// A valid release; the mechanism should run its firing side effects.
    Released { by: ParticipantId },
    /// The grab ended without firing.
    ForceReleased { by: ParticipantId },
    /// The request did not apply in the current state; nothing changed.
    Refused,
}

/// Single-holder grab tracking for one manipulable object. Authority is the
/// caller's responsibility; the handle only enforces the holder protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManipulableHandle {
    state: Option<ParticipantId>,
}

impl ManipulableHandle {
    pub fn new() -> ManipulableHandle {
        ManipulableHandle { state: None }
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> GrabState {
        match self.state {
            Some(by) => GrabState::Held { by },
            None => GrabState::Idle,
        }
    }

    /// Idle -> Held. Refused while held; single-holder mode never steals.
    pub fn try_grab(&mut self, by: ParticipantId) -> GrabTransition {
        if self.state.is_some() {
            return GrabTransition::Refused;
        }

        self.state = Some(by);
        GrabTransition::Grabbed { by }
    }

    /// Held -> Firing -> Idle. Only the holder may release.
    pub fn release(&mut self, by: ParticipantId) -> GrabTransition {
        if self.state != Some(by) {
            return GrabTransition::Refused;
        }

        self.state = None;
        GrabTransition::Released { by }
    }

    /// Held -> Idle without firing.
    pub fn force_release(&mut self) -> GrabTransition {
        match self.state.take() {
            Some(by) => GrabTransition::ForceReleased { by },
            None => GrabTransition::Refused,
        }
    }
}
