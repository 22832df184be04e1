use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shipyard::EntityId;

use crate::scoped_log;

/// Identifies one session participant. The session layer hands these out when
/// participants join; this crate only compares them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u32);

/// Record of which participant's simulation is the source of truth for a
/// mechanism body. At most one holder per mechanism at any instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OwnershipToken {
    pub mechanism: EntityId,
    pub holder: ParticipantId,
}

/// Authority queries for the session. Constructed once at startup and passed
/// into every component that needs them; there is no global singleton.
pub struct SessionContext {
    local: ParticipantId,
    owners: HashMap<EntityId, ParticipantId>,
}

impl SessionContext {
    pub fn new(local: ParticipantId) -> SessionContext {
        SessionContext {
            local,
            owners: HashMap::new(),
        }
    }

    pub fn local_participant(&self) -> ParticipantId {
        self.local
    }

    /// Assign the authoritative owner of a body. Replaces any previous owner,
    /// so the single-holder invariant holds by construction.
    pub fn assign_owner(&mut self, mechanism: EntityId, holder: ParticipantId) {
        scoped_log!(debug, "session", "assigning owner {:?} for {:?}", holder, mechanism);
        self.owners.insert(mechanism, holder);
    }

    pub fn release_owner(&mut self, mechanism: EntityId) {
        self.owners.remove(&mechanism);
    }

    pub fn owner_of(&self, mechanism: EntityId) -> Option<ParticipantId> {
        self.owners.get(&mechanism).copied()
    }

    pub fn token_for(&self, mechanism: EntityId) -> Option<OwnershipToken> {
        self.owner_of(mechanism).map(|holder| OwnershipToken {
            mechanism,
            holder,
        })
    }

    /// True if `participant` is the authoritative owner of `mechanism`.
    pub fn owns(&self, participant: ParticipantId, mechanism: EntityId) -> bool {
        self.owner_of(mechanism) == Some(participant)
    }

    /// True if the local simulation drives this body.
    pub fn is_locally_owned(&self, mechanism: EntityId) -> bool {
        self.owns(self.local, mechanism)
    }
}
