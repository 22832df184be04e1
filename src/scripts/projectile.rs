use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use crate::scoped_log;

use super::grab::{GrabTransition, ManipulableHandle};
use super::{Effect, MechanismEventKind, MessagePayload, Script};
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProjectileConfig {
    /// Seconds of free flight before the projectile is removed.
    pub lifetime: f32,
    /// The launching mechanism's body; contacts with it are not terminal.
    #[serde(skip)]
    pub ignore: Option<EntityId>,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        ProjectileConfig {
            lifetime: 10.0,
            ignore: None,
        }
    }
}

/// A free-flying projectile (an arrow).
///
/// Its first terminal contact sticks it to the struck surface: velocities are
/// zeroed and physics is permanently disabled. Otherwise it is destroyed when
/// its lifetime elapses. Catching it mid-air cancels the lifetime cutoff for
/// good; a later drop never restarts it.
pub struct ProjectileScript {
    config: ProjectileConfig,
    handle: ManipulableHandle,
    remaining: Option<f32>,
    stuck: bool,
}

impl ProjectileScript {
    pub fn new(config: ProjectileConfig) -> ProjectileScript {
        ProjectileScript {
            remaining: Some(config.lifetime),
            config,
            handle: ManipulableHandle::new(),
            stuck: false,
        }
    }

}

impl Script for ProjectileScript {
    fn update(
        &mut self,
        entity_id: EntityId,
        _world: &World,
        _physics: &PhysicsWorld,
        session: &SessionContext,
        time: &Time,
    ) -> Effect {
        if !session.is_locally_owned(entity_id) {
            return Effect::NoEffect;
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= time.elapsed.as_secs_f32();
            if *remaining <= 0.0 {
                self.remaining = None;
                scoped_log!(info, "launch", "projectile {:?} expired; removing", entity_id);
                return Effect::DestroyEntity { entity_id };
            }
        }

        Effect::NoEffect
    }

    fn handle_message(
        &mut self,
        entity_id: EntityId,
        _world: &World,
        _physics: &PhysicsWorld,
        _session: &SessionContext,
        msg: &MessagePayload,
    ) -> Effect {
        match msg {
            MessagePayload::Collided { with } => {
                if self.stuck || Some(*with) == self.config.ignore {
                    return Effect::NoEffect;
                }

                // Terminal attach: stop dead, drop out of the simulation, and
                // follow whatever was struck.
                self.stuck = true;
                self.remaining = None;
                Effect::Multiple(vec![
                    Effect::SetLinearVelocity {
                        entity_id,
                        velocity: cgmath::vec3(0.0, 0.0, 0.0),
                    },
                    Effect::SetAngularVelocity {
                        entity_id,
                        velocity: cgmath::vec3(0.0, 0.0, 0.0),
                    },
                    Effect::SetKinematic {
                        entity_id,
                        kinematic: true,
                    },
                    Effect::SetGravity {
                        entity_id,
                        enabled: false,
                    },
                    Effect::AttachTo {
                        entity_id,
                        parent: *with,
                    },
                ])
            }
            MessagePayload::SelectStart { by } => {
                if self.stuck {
                    return Effect::NoEffect;
                }

                match self.handle.try_grab(*by) {
                    GrabTransition::Grabbed { by } => {
                        // Catching the projectile cancels the pending cutoff.
                        self.remaining = None;
                        Effect::Multiple(vec![
                            Effect::SetKinematic {
                                entity_id,
                                kinematic: true,
                            },
                            Effect::SetGravity {
                                entity_id,
                                enabled: false,
                            },
                            Effect::Emit {
                                event: MechanismEventKind::Grabbed { by },
                            },
                        ])
                    }
                    _ => Effect::NoEffect,
                }
            }
            MessagePayload::SelectEnd { by } => match self.handle.release(*by) {
                GrabTransition::Released { by } => Effect::Multiple(vec![
                    Effect::SetKinematic {
                        entity_id,
                        kinematic: false,
                    },
                    Effect::SetGravity {
                        entity_id,
                        enabled: true,
                    },
                    Effect::Emit {
                        event: MechanismEventKind::Released { by },
                    },
                ]),
                _ => Effect::NoEffect,
            },
            _ => Effect::NoEffect,
        }
    }
}
