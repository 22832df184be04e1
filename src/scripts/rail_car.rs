use cgmath::{vec3, Vector3};
use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::{debug, error};

use crate::scoped_log;

use super::script_util::{avatar_of, look_rotation};
use super::{ConfigError, Effect, MechanismEventKind, MessagePayload, Script};
use crate::paths::PathCurve;
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RailCarConfig {
    /// Travel speed along the curve, in meters per second.
    pub speed: f32,
    /// Rider pose relative to the car while seated.
    pub seat_offset: Vector3<f32>,
}

impl Default for RailCarConfig {
    fn default() -> Self {
        RailCarConfig {
            speed: 3.0,
            seat_offset: vec3(0.0, 0.5, 0.0),
        }
    }
}

struct Ride {
    rider: EntityId,
    t: f32,
    target: f32,
}

/// A vehicle that shuttles a seated rider along a curve, alternating
/// direction on each activation.
///
/// The car's pose is commanded from the curve every tick; it is never driven
/// by forces. The rider is seated by an attachment record and follows the car
/// until arrival, when the seat releases and locomotion is restored. The next
/// activation runs the return leg.
pub struct RailCarScript {
    config: RailCarConfig,
    curve: Option<PathCurve>,
    at_start: bool,
    ride: Option<Ride>,
    config_reported: bool,
}

impl RailCarScript {
    pub fn new(config: RailCarConfig, curve: Option<PathCurve>) -> RailCarScript {
        RailCarScript {
            config,
            curve,
            at_start: true,
            ride: None,
            config_reported: false,
        }
    }

    pub fn is_riding(&self) -> bool {
        self.ride.is_some()
    }

    fn check_config(&mut self, entity_id: EntityId, physics: &PhysicsWorld) -> bool {
        let error = if !physics.has_body(entity_id) {
            Some(ConfigError::MissingBody {
                mechanism: "rail car",
                role: "vehicle",
            })
        } else if !matches!(self.curve.as_ref(), Some(curve) if !curve.is_degenerate()) {
            Some(ConfigError::MissingCurve { mechanism: "rail car" })
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
                debug!("rail car {:?} refused activation: {}", entity_id, error);
                false
            }
        }
    }
}

impl Script for RailCarScript {
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

        let Some(ride) = self.ride.as_mut() else {
            return Effect::NoEffect;
        };
        let Some(curve) = self.curve.as_ref() else {
            return Effect::NoEffect;
        };

        // Equal parameter steps cover equal distance; normalize by curve
        // length so speed is in world units.
        let step = self.config.speed * time.elapsed.as_secs_f32() / curve.length();
        let remaining = (ride.target - ride.t).abs();

        if step >= remaining {
            let ride = self.ride.take().unwrap();
            self.at_start = !self.at_start;

            let sample = curve.evaluate(ride.target);
            let facing = if ride.target > 0.5 { sample.forward } else { -sample.forward };

            scoped_log!(info, "traverse", "rail car {:?} arrived; releasing rider {:?}", entity_id, ride.rider);

            return Effect::Multiple(vec![
                Effect::SetPositionRotation {
                    entity_id,
                    position: sample.position,
                    rotation: look_rotation(facing, sample.up),
                },
                Effect::Detach { entity_id: ride.rider },
                Effect::SetPosition {
                    entity_id: ride.rider,
                    position: sample.position + self.config.seat_offset,
                },
                Effect::SetLocomotion {
                    entity_id: ride.rider,
                    enabled: true,
                },
                Effect::Emit {
                    event: MechanismEventKind::TraversalCompleted,
                },
            ]);
        }

        ride.t += step * (ride.target - ride.t).signum();
        let sample = curve.evaluate(ride.t);
        let facing = if ride.target > 0.5 { sample.forward } else { -sample.forward };

        Effect::SetPositionRotation {
            entity_id,
            position: sample.position,
            rotation: look_rotation(facing, sample.up),
        }
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
            MessagePayload::Activate { by } => {
                if self.ride.is_some() {
                    debug!("rail car {:?} busy; activation refused", entity_id);
                    return Effect::NoEffect;
                }

                if !self.check_config(entity_id, physics) {
                    return Effect::NoEffect;
                }
                let Some(curve) = self.curve.as_ref() else {
                    return Effect::NoEffect;
                };

                let Some(rider) = avatar_of(world, *by) else {
                    error!("{}", ConfigError::MissingRig { mechanism: "rail car" });
                    return Effect::NoEffect;
                };

                let (t, target) = if self.at_start { (0.0, 1.0) } else { (1.0, 0.0) };
                let sample = curve.evaluate(t);
                let facing = if target > 0.5 { sample.forward } else { -sample.forward };

                scoped_log!(
                    info,
                    "traverse",
                    "rail car {:?} departing with rider {:?} (forward leg: {})",
                    entity_id,
                    rider,
                    self.at_start
                );

                self.ride = Some(Ride { rider, t, target });

                // Seat the rider, then record the attachment so they track the
                // car from this relative pose.
                Effect::Multiple(vec![
                    Effect::SetPositionRotation {
                        entity_id,
                        position: sample.position,
                        rotation: look_rotation(facing, sample.up),
                    },
                    Effect::SetLocomotion {
                        entity_id: rider,
                        enabled: false,
                    },
                    Effect::SetPosition {
                        entity_id: rider,
                        position: sample.position + self.config.seat_offset,
                    },
                    Effect::AttachTo {
                        entity_id: rider,
                        parent: entity_id,
                    },
                    Effect::Emit {
                        event: MechanismEventKind::TraversalStarted,
                    },
                ])
            }
            _ => Effect::NoEffect,
        }
    }
}
