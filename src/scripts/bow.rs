use cgmath::{vec3, Vector3};
use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::{debug, error};

use crate::scoped_log;

use super::grab::{GrabTransition, ManipulableHandle};
use super::script_util::{aim_direction, is_entity_held, launch_effect};
use super::{
    ConfigError, Effect, LaunchPolicy, MechanismEventKind, Message, MessagePayload, Script,
};
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;
use crate::trajectory::{PreviewConfig, TrajectoryPreview};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BowConfig {
    pub launch_force: f32,
    pub arrow_mass: f32,
    pub arrow_lifetime: f32,
    /// Where a nocked arrow sits, in the bow body's local space.
    pub nock_offset: Vector3<f32>,
    pub policy: LaunchPolicy,
    pub preview: PreviewConfig,
}

impl Default for BowConfig {
    fn default() -> Self {
        BowConfig {
            launch_force: 30.0,
            arrow_mass: 1.0,
            arrow_lifetime: 10.0,
            nock_offset: vec3(0.0, 0.0, -0.1),
            policy: LaunchPolicy::Impulse,
            preview: PreviewConfig::default(),
        }
    }
}

/// The string half of the bow. Grabbing it is honored only while the bow
/// body itself is held; otherwise the grab is refused on the spot, exactly
/// like an interaction manager kicking the hand back off.
pub struct BowStringScript {
    bow: EntityId,
    handle: ManipulableHandle,
}

impl BowStringScript {
    pub fn new(bow: EntityId) -> BowStringScript {
        BowStringScript {
            bow,
            handle: ManipulableHandle::new(),
        }
    }
}

impl Script for BowStringScript {
    fn handle_message(
        &mut self,
        _entity_id: EntityId,
        world: &World,
        _physics: &PhysicsWorld,
        _session: &SessionContext,
        msg: &MessagePayload,
    ) -> Effect {
        match msg {
            MessagePayload::SelectStart { by } => {
                if !is_entity_held(world, self.bow) {
                    debug!("string grab refused; bow {:?} is not held", self.bow);
                    return Effect::NoEffect;
                }

                match self.handle.try_grab(*by) {
                    GrabTransition::Grabbed { by } => Effect::Multiple(vec![
                        Effect::Emit {
                            event: MechanismEventKind::Grabbed { by },
                        },
                        Effect::Send {
                            msg: Message {
                                to: self.bow,
                                payload: MessagePayload::StringGrabbed { by },
                            },
                        },
                    ]),
                    _ => Effect::NoEffect,
                }
            }
            MessagePayload::SelectEnd { by } => match self.handle.release(*by) {
                GrabTransition::Released { by } => Effect::Multiple(vec![
                    Effect::Emit {
                        event: MechanismEventKind::Released { by },
                    },
                    Effect::Send {
                        msg: Message {
                            to: self.bow,
                            payload: MessagePayload::StringReleased { by },
                        },
                    },
                ]),
                _ => Effect::NoEffect,
            },
            // The bow was dropped mid-draw; let go without firing.
            MessagePayload::ForceRelease => match self.handle.force_release() {
                GrabTransition::ForceReleased { by } => Effect::Emit {
                    event: MechanismEventKind::Released { by },
                },
                _ => Effect::NoEffect,
            },
            _ => Effect::NoEffect,
        }
    }
}

/// The bow body. Holds the grab state for the bow itself, nocks an arrow
/// when the string is drawn, and fires it with the impulse policy when the
/// string is released.
pub struct BowScript {
    config: BowConfig,
    preview: TrajectoryPreview,
    string: Option<EntityId>,
    handle: ManipulableHandle,
    loaded: Option<EntityId>,
    awaiting_arrow: bool,
    config_reported: bool,
}

impl BowScript {
    pub fn new(config: BowConfig, string: Option<EntityId>) -> BowScript {
        BowScript {
            preview: TrajectoryPreview::new(config.preview),
            config,
            string,
            handle: ManipulableHandle::new(),
            loaded: None,
            awaiting_arrow: false,
            config_reported: false,
        }
    }

    fn check_config(&mut self, entity_id: EntityId, physics: &PhysicsWorld) -> bool {
        let error = if self.string.is_none() {
            Some(ConfigError::MissingBody {
                mechanism: "bow",
                role: "string",
            })
        } else if !physics.has_body(entity_id) {
            Some(ConfigError::MissingBody {
                mechanism: "bow",
                role: "bow body",
            })
        } else {
            None
        };

        match error {
            None => true,
            Some(error) => {
                if !self.config_reported {
                    self.config_reported = true;
                    error!("{}", error);
                }
                false
            }
        }
    }

    fn nocked_velocity_hint(
        &self,
        physics: &PhysicsWorld,
        entity_id: EntityId,
        arrow: EntityId,
    ) -> Option<Vector3<f32>> {
        let direction = aim_direction(physics, entity_id)?;
        let mass = physics.mass(arrow).unwrap_or(self.config.arrow_mass);
        Some(direction * self.config.launch_force / mass.max(f32::EPSILON))
    }
}

impl Script for BowScript {
    fn update(
        &mut self,
        entity_id: EntityId,
        _world: &World,
        physics: &PhysicsWorld,
        session: &SessionContext,
        _time: &Time,
    ) -> Effect {
        if !session.is_locally_owned(entity_id) {
            return Effect::NoEffect;
        }

        // Same-tick aim: sample from the arrow's current pose every frame
        // the bow is drawn.
        if let Some(arrow) = self.loaded {
            // The arrow's lifetime can run out while it is still nocked.
            if !physics.has_body(arrow) {
                self.loaded = None;
                return Effect::HidePreview { entity_id };
            }
            if self.handle.is_held() {
                if let (Some(start), Some(velocity)) = (
                    physics.position(arrow),
                    self.nocked_velocity_hint(physics, entity_id, arrow),
                ) {
                    return Effect::DrawPreview {
                        entity_id,
                        points: self.preview.sample(start, velocity),
                    };
                }
            }
        }

        Effect::NoEffect
    }

    fn handle_message(
        &mut self,
        entity_id: EntityId,
        _world: &World,
        physics: &PhysicsWorld,
        _session: &SessionContext,
        msg: &MessagePayload,
    ) -> Effect {
        match msg {
            MessagePayload::SelectStart { by } => {
                if !self.check_config(entity_id, physics) {
                    return Effect::NoEffect;
                }

                match self.handle.try_grab(*by) {
                    GrabTransition::Grabbed { by } => Effect::Emit {
                        event: MechanismEventKind::Grabbed { by },
                    },
                    _ => Effect::NoEffect,
                }
            }
            MessagePayload::SelectEnd { by } => match self.handle.release(*by) {
                GrabTransition::Released { by } => {
                    let mut effects = Vec::new();

                    // Dropping the bow mid-draw kicks the hand off the string
                    // and unloads without firing.
                    if self.loaded.is_some() || self.awaiting_arrow {
                        if let Some(string) = self.string {
                            effects.push(Effect::Send {
                                msg: Message {
                                    to: string,
                                    payload: MessagePayload::ForceRelease,
                                },
                            });
                        }
                        if let Some(arrow) = self.loaded.take() {
                            effects.push(Effect::DestroyEntity { entity_id: arrow });
                        }
                        self.awaiting_arrow = false;
                        effects.push(Effect::HidePreview { entity_id });
                    }

                    effects.push(Effect::Emit {
                        event: MechanismEventKind::Released { by },
                    });
                    Effect::combine(effects)
                }
                _ => Effect::NoEffect,
            },
            MessagePayload::StringGrabbed { by: _ } => {
                if !self.handle.is_held() || self.loaded.is_some() || self.awaiting_arrow {
                    return Effect::NoEffect;
                }

                self.awaiting_arrow = true;
                Effect::SpawnProjectile {
                    parent: entity_id,
                    offset: self.config.nock_offset,
                    mass: self.config.arrow_mass,
                    lifetime: self.config.arrow_lifetime,
                }
            }
            MessagePayload::ProjectileReady { projectile } => {
                self.awaiting_arrow = false;
                self.loaded = Some(*projectile);
                debug!("bow {:?} nocked arrow {:?}", entity_id, projectile);
                Effect::NoEffect
            }
            MessagePayload::StringReleased { by: _ } => {
                // A release while the bow itself is not engaged has no valid
                // aim reference and is ignored.
                if !self.handle.is_held() {
                    return Effect::NoEffect;
                }

                let Some(arrow) = self.loaded.take() else {
                    return Effect::NoEffect;
                };
                // An arrow that expired on the string cannot be fired.
                if !physics.has_body(arrow) {
                    return Effect::HidePreview { entity_id };
                }
                let Some(direction) = aim_direction(physics, entity_id) else {
                    return Effect::NoEffect;
                };

                let mass = physics.mass(arrow).unwrap_or(self.config.arrow_mass);
                let (launch, velocity) =
                    launch_effect(arrow, self.config.policy, direction, self.config.launch_force, mass);

                scoped_log!(info, "launch", "bow {:?} fired arrow {:?} at {:?}", entity_id, arrow, velocity);

                Effect::Multiple(vec![
                    Effect::Detach { entity_id: arrow },
                    Effect::SetKinematic {
                        entity_id: arrow,
                        kinematic: false,
                    },
                    Effect::SetGravity {
                        entity_id: arrow,
                        enabled: true,
                    },
                    launch,
                    Effect::HidePreview { entity_id },
                    Effect::Emit {
                        event: MechanismEventKind::Launched { velocity },
                    },
                ])
            }
            _ => Effect::NoEffect,
        }
    }
}
