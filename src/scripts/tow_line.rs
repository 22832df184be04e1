use cgmath::{vec3, Vector3};
use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::{debug, error};

use crate::scoped_log;

use super::grab::{GrabTransition, ManipulableHandle};
use super::script_util::avatar_of;
use super::{ConfigError, Effect, MechanismEventKind, MessagePayload, Script};
use crate::paths::PathCurve;
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TowLineConfig {
    /// Tow speed along the curve, in meters per second.
    pub speed: f32,
    /// Rider pose relative to the towed handle.
    pub rider_offset: Vector3<f32>,
}

impl Default for TowLineConfig {
    fn default() -> Self {
        TowLineConfig {
            speed: 4.0,
            rider_offset: vec3(0.0, -1.0, 0.0),
        }
    }
}

struct Tow {
    rider: EntityId,
    t: f32,
}

/// A grabbable handle that tows its holder one way along a curve.
///
/// Grabbing the handle starts the tow; once started it always runs to the far
/// end, even if the hand comes off early, and the handle then returns to the
/// start for the next rider. Both the handle and the rider are
/// position-commanded from the curve.
pub struct TowLineScript {
    config: TowLineConfig,
    curve: Option<PathCurve>,
    handle: ManipulableHandle,
    tow: Option<Tow>,
    config_reported: bool,
}

impl TowLineScript {
    pub fn new(config: TowLineConfig, curve: Option<PathCurve>) -> TowLineScript {
        TowLineScript {
            config,
            curve,
            handle: ManipulableHandle::new(),
            tow: None,
            config_reported: false,
        }
    }

    pub fn is_towing(&self) -> bool {
        self.tow.is_some()
    }

    fn check_config(&mut self, entity_id: EntityId, physics: &PhysicsWorld) -> bool {
        let error = if !physics.has_body(entity_id) {
            Some(ConfigError::MissingBody {
                mechanism: "tow line",
                role: "handle",
            })
        } else if !matches!(self.curve.as_ref(), Some(curve) if !curve.is_degenerate()) {
            Some(ConfigError::MissingCurve { mechanism: "tow line" })
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
                debug!("tow line {:?} refused grab: {}", entity_id, error);
                false
            }
        }
    }
}

impl Script for TowLineScript {
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

        let Some(tow) = self.tow.as_mut() else {
            return Effect::NoEffect;
        };
        let Some(curve) = self.curve.as_ref() else {
            return Effect::NoEffect;
        };

        tow.t += self.config.speed * time.elapsed.as_secs_f32() / curve.length();

        if tow.t >= 1.0 {
            let tow = self.tow.take().unwrap();
            let end = curve.evaluate(1.0);
            let start = curve.evaluate(0.0);

            let mut effects = vec![
                Effect::SetPosition {
                    entity_id: tow.rider,
                    position: end.position + self.config.rider_offset,
                },
                Effect::SetLocomotion {
                    entity_id: tow.rider,
                    enabled: true,
                },
                // The handle rides back to the start on its own.
                Effect::SetPosition {
                    entity_id,
                    position: start.position,
                },
            ];

            // A hand still on the handle at the far end is shaken off.
            if let GrabTransition::ForceReleased { by } = self.handle.force_release() {
                effects.push(Effect::Emit {
                    event: MechanismEventKind::Released { by },
                });
            }
            effects.push(Effect::Emit {
                event: MechanismEventKind::TraversalCompleted,
            });

            scoped_log!(info, "traverse", "tow line {:?} delivered rider {:?}", entity_id, tow.rider);
            return Effect::Multiple(effects);
        }

        let sample = curve.evaluate(tow.t);
        Effect::Multiple(vec![
            Effect::SetPosition {
                entity_id,
                position: sample.position,
            },
            Effect::SetPosition {
                entity_id: tow.rider,
                position: sample.position + self.config.rider_offset,
            },
        ])
    }

    fn handle_message(
        &mut self,
        entity_id: EntityId,
        world: &World,
        physics: &PhysicsWorld,
        _session: &SessionContext,
        msg: &MessagePayload,
    ) -> Effect {
        match msg {
            MessagePayload::SelectStart { by } => {
                if self.tow.is_some() {
                    debug!("tow line {:?} busy; grab refused", entity_id);
                    return Effect::NoEffect;
                }
                if !self.check_config(entity_id, physics) {
                    return Effect::NoEffect;
                }
                let Some(curve) = self.curve.as_ref() else {
                    return Effect::NoEffect;
                };

                let Some(rider) = avatar_of(world, *by) else {
                    error!("{}", ConfigError::MissingRig { mechanism: "tow line" });
                    return Effect::NoEffect;
                };

                match self.handle.try_grab(*by) {
                    GrabTransition::Grabbed { by } => {
                        let start = curve.evaluate(0.0);
                        scoped_log!(info, "traverse", "tow line {:?} towing rider {:?}", entity_id, rider);
                        self.tow = Some(Tow { rider, t: 0.0 });

                        Effect::Multiple(vec![
                            Effect::SetPosition {
                                entity_id,
                                position: start.position,
                            },
                            Effect::SetLocomotion {
                                entity_id: rider,
                                enabled: false,
                            },
                            Effect::SetPosition {
                                entity_id: rider,
                                position: start.position + self.config.rider_offset,
                            },
                            Effect::Emit {
                                event: MechanismEventKind::Grabbed { by },
                            },
                            Effect::Emit {
                                event: MechanismEventKind::TraversalStarted,
                            },
                        ])
                    }
                    _ => Effect::NoEffect,
                }
            }
            // Letting go early does not cancel the tow; the rider is carried
            // to the far end regardless.
            MessagePayload::SelectEnd { by } => match self.handle.release(*by) {
                GrabTransition::Released { by } => Effect::Emit {
                    event: MechanismEventKind::Released { by },
                },
                _ => Effect::NoEffect,
            },
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
