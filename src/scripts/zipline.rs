use cgmath::{vec3, InnerSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::{debug, error};

use crate::scoped_log;

use super::script_util::avatar_of;
use super::{ConfigError, Effect, MechanismEventKind, MessagePayload, Script};
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;

/// Remaining distance at which a carried rider snaps to the destination.
const ARRIVAL_EPSILON: f32 = 0.01;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ZipLineConfig {
    pub endpoint_a: Point3<f32>,
    pub endpoint_b: Point3<f32>,
    /// Carry speed in meters per second.
    pub speed: f32,
    /// Rider pose relative to the carried point on the line.
    pub rider_offset: Vector3<f32>,
}

impl Default for ZipLineConfig {
    fn default() -> Self {
        ZipLineConfig {
            endpoint_a: Point3::new(0.0, 0.0, 0.0),
            endpoint_b: Point3::new(10.0, 0.0, 0.0),
            speed: 5.0,
            rider_offset: vec3(0.0, -1.0, 0.0),
        }
    }
}

struct ZipTraversal {
    rider: EntityId,
    /// The carried point, on the segment between the endpoints.
    position: Point3<f32>,
    destination: Point3<f32>,
}

/// A point-to-point line that carries a rider to the farther endpoint.
///
/// The rider is tracked through the line's interaction volume; activation is
/// honored only while a rider is inside it. The boarding point is the rider's
/// position projected onto the segment, and the destination is whichever
/// endpoint is farther from it, so the rider always gets a ride (ties go to
/// B). Motion is position-commanded at constant speed with the rider's own
/// locomotion suspended for the duration.
pub struct ZipLineScript {
    config: ZipLineConfig,
    rider_in_volume: Option<EntityId>,
    traversal: Option<ZipTraversal>,
    config_reported: bool,
}

impl ZipLineScript {
    pub fn new(config: ZipLineConfig) -> ZipLineScript {
        ZipLineScript {
            config,
            rider_in_volume: None,
            traversal: None,
            config_reported: false,
        }
    }

    pub fn is_carrying(&self) -> bool {
        self.traversal.is_some()
    }

    fn destination_for(&self, origin: Point3<f32>) -> Point3<f32> {
        let to_a = (self.config.endpoint_a - origin).magnitude();
        let to_b = (self.config.endpoint_b - origin).magnitude();
        if to_a > to_b {
            self.config.endpoint_a
        } else {
            self.config.endpoint_b
        }
    }
}

impl Script for ZipLineScript {
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

        let Some(traversal) = self.traversal.as_mut() else {
            return Effect::NoEffect;
        };

        let to_destination = traversal.destination - traversal.position;
        let remaining = to_destination.magnitude();
        let step = self.config.speed * time.elapsed.as_secs_f32();

        if remaining <= ARRIVAL_EPSILON || step >= remaining {
            let traversal = self.traversal.take().unwrap();
            scoped_log!(info, "traverse", "zipline {:?} delivered rider {:?}", entity_id, traversal.rider);
            return Effect::Multiple(vec![
                Effect::SetPosition {
                    entity_id: traversal.rider,
                    position: traversal.destination + self.config.rider_offset,
                },
                Effect::SetLocomotion {
                    entity_id: traversal.rider,
                    enabled: true,
                },
                Effect::Emit {
                    event: MechanismEventKind::TraversalCompleted,
                },
            ]);
        }

        traversal.position += to_destination * (step / remaining);
        Effect::SetPosition {
            entity_id: traversal.rider,
            position: traversal.position + self.config.rider_offset,
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
            MessagePayload::SensorBeginIntersect { with } => {
                self.rider_in_volume = Some(*with);
                Effect::NoEffect
            }
            MessagePayload::SensorEndIntersect { with } => {
                if self.rider_in_volume == Some(*with) {
                    self.rider_in_volume = None;
                }
                Effect::NoEffect
            }
            MessagePayload::Activate { by } => {
                // One rider at a time; a second activation mid-carry is
                // refused outright.
                if self.traversal.is_some() {
                    debug!("zipline {:?} busy; activation refused", entity_id);
                    return Effect::NoEffect;
                }

                let Some(rider) = self.rider_in_volume else {
                    debug!("zipline {:?} has no rider in volume", entity_id);
                    return Effect::NoEffect;
                };

                // Only the participant standing at the line may ride it.
                if avatar_of(world, *by) != Some(rider) {
                    debug!(
                        "zipline {:?} activation by {:?} does not match rider {:?}",
                        entity_id, by, rider
                    );
                    return Effect::NoEffect;
                }

                let Some(rider_position) = physics.position(rider) else {
                    if !self.config_reported {
                        self.config_reported = true;
                        error!(
                            "{}",
                            ConfigError::MissingBody {
                                mechanism: "zipline",
                                role: "rider",
                            }
                        );
                    }
                    return Effect::NoEffect;
                };

                // The rider hangs below the cable, so project where their
                // hang point meets the line, not their body.
                let origin = crate::paths::closest_point_on_segment(
                    self.config.endpoint_a,
                    self.config.endpoint_b,
                    rider_position - self.config.rider_offset,
                );
                let destination = self.destination_for(origin);

                scoped_log!(
                    info,
                    "traverse",
                    "zipline {:?} carrying rider {:?} from {:?} to {:?}",
                    entity_id,
                    rider,
                    origin,
                    destination
                );

                self.traversal = Some(ZipTraversal {
                    rider,
                    position: origin,
                    destination,
                });

                Effect::Multiple(vec![
                    Effect::SetLocomotion {
                        entity_id: rider,
                        enabled: false,
                    },
                    Effect::SetPosition {
                        entity_id: rider,
                        position: origin + self.config.rider_offset,
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
