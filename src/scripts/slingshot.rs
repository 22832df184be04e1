use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::error;

use crate::scoped_log;

use super::grab::{GrabTransition, ManipulableHandle};
use super::script_util::{aim_direction, launch_effect};
use super::{ConfigError, Effect, LaunchPolicy, MechanismEventKind, MessagePayload, Script};
use crate::physics::PhysicsWorld;
use crate::session::SessionContext;
use crate::time::Time;
use crate::trajectory::{PreviewConfig, TrajectoryPreview};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SlingshotConfig {
    /// Fixed power of the shot.
    pub launch_force: f32,
    /// Seconds after firing before the projectile soft-stops; None = no limit.
    pub stop_after: Option<f32>,
    pub policy: LaunchPolicy,
    pub preview: PreviewConfig,
}

impl Default for SlingshotConfig {
    fn default() -> Self {
        SlingshotConfig {
            launch_force: 15.0,
            stop_after: Some(5.0),
            policy: LaunchPolicy::DirectVelocity,
            preview: PreviewConfig::default(),
        }
    }
}

/// Grab-aim-release launcher where the grabbed body is itself the projectile.
///
/// While held the body is kinematic and follows the hand; the aim preview is
/// redrawn every tick from the current pose. Release launches along the aim
/// direction. The post-launch countdown soft-stops the body in place: both
/// velocities are zeroed but physics stays enabled and the position is left
/// wherever gravity carried it. Grabbing the body again cancels the
/// countdown.
pub struct SlingshotScript {
    config: SlingshotConfig,
    preview: TrajectoryPreview,
    handle: ManipulableHandle,
    stop_timer: Option<f32>,
    config_reported: bool,
}

impl SlingshotScript {
    pub fn new(config: SlingshotConfig) -> SlingshotScript {
        SlingshotScript {
            preview: TrajectoryPreview::new(config.preview),
            config,
            handle: ManipulableHandle::new(),
            stop_timer: None,
            config_reported: false,
        }
    }

    fn check_config(&mut self, entity_id: EntityId, physics: &PhysicsWorld) -> bool {
        if physics.has_body(entity_id) {
            return true;
        }

        if !self.config_reported {
            self.config_reported = true;
            error!(
                "{}",
                ConfigError::MissingBody {
                    mechanism: "slingshot",
                    role: "projectile",
                }
            );
        }
        false
    }

    fn launch_velocity_hint(&self, physics: &PhysicsWorld, entity_id: EntityId) -> Option<cgmath::Vector3<f32>> {
        let direction = aim_direction(physics, entity_id)?;
        let mass = physics.mass(entity_id).unwrap_or(1.0);
        Some(match self.config.policy {
            LaunchPolicy::DirectVelocity => direction * self.config.launch_force,
            LaunchPolicy::Impulse => direction * self.config.launch_force / mass.max(f32::EPSILON),
        })
    }
}

impl Script for SlingshotScript {
    fn update(
        &mut self,
        entity_id: EntityId,
        _world: &World,
        physics: &PhysicsWorld,
        session: &SessionContext,
        time: &Time,
    ) -> Effect {
        if !session.is_locally_owned(entity_id) {
            return Effect::NoEffect;
        }

        let mut effects = Vec::new();

        // Redraw the aim arc from this tick's pose so the preview can never
        // lag the rendered aim.
        if self.handle.is_held() {
            if let (Some(start), Some(velocity)) = (
                physics.position(entity_id),
                self.launch_velocity_hint(physics, entity_id),
            ) {
                effects.push(Effect::DrawPreview {
                    entity_id,
                    points: self.preview.sample(start, velocity),
                });
            }
        }

        if let Some(timer) = self.stop_timer.as_mut() {
            *timer -= time.elapsed.as_secs_f32();
            if *timer <= 0.0 {
                self.stop_timer = None;
                scoped_log!(info, "launch", "slingshot {:?} flight window elapsed; soft stop", entity_id);
                effects.push(Effect::SetLinearVelocity {
                    entity_id,
                    velocity: cgmath::vec3(0.0, 0.0, 0.0),
                });
                effects.push(Effect::SetAngularVelocity {
                    entity_id,
                    velocity: cgmath::vec3(0.0, 0.0, 0.0),
                });
            }
        }

        Effect::combine(effects)
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
                    GrabTransition::Grabbed { by } => {
                        // Catching the body mid-flight cancels the pending
                        // soft stop; whatever the catch imparts stands.
                        self.stop_timer = None;
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
                GrabTransition::Released { by } => {
                    let Some(direction) = aim_direction(physics, entity_id) else {
                        return Effect::NoEffect;
                    };
                    let mass = physics.mass(entity_id).unwrap_or(1.0);

                    let (launch, velocity) = launch_effect(
                        entity_id,
                        self.config.policy,
                        direction,
                        self.config.launch_force,
                        mass,
                    );

                    self.stop_timer = self.config.stop_after;
                    scoped_log!(info, "launch", "slingshot {:?} fired at {:?}", entity_id, velocity);

                    Effect::Multiple(vec![
                        Effect::SetKinematic {
                            entity_id,
                            kinematic: false,
                        },
                        Effect::SetGravity {
                            entity_id,
                            enabled: true,
                        },
                        launch,
                        Effect::HidePreview { entity_id },
                        Effect::Emit {
                            event: MechanismEventKind::Released { by },
                        },
                        Effect::Emit {
                            event: MechanismEventKind::Launched { velocity },
                        },
                    ])
                }
                // A release with no grab in flight is ignored.
                _ => Effect::NoEffect,
            },
            MessagePayload::ForceRelease => match self.handle.force_release() {
                GrabTransition::ForceReleased { by } => Effect::Multiple(vec![
                    Effect::HidePreview { entity_id },
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
