// Mechanism scripts.
//
// Each interactive mechanism is an entity with a Script attached. Scripts
// receive discrete messages and a per-tick update, read the ECS world and the
// physics facade, and return Effects; the game loop applies the effects.
// Scripts never mutate shared state directly.

pub mod bow;
pub mod grab;
pub mod projectile;
pub mod rail_car;
pub mod script_util;
pub mod slingshot;
pub mod tow_line;
pub mod zipline;

use std::collections::{HashMap, VecDeque};
use std::fmt;

use cgmath::{Point3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use shipyard::{EntityId, World};
use tracing::warn;

use crate::physics::PhysicsWorld;
use crate::session::{ParticipantId, SessionContext};
use crate::time::Time;

/// How a launch controller imparts motion on release. Configured per
/// mechanism, not universal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchPolicy {
    /// Velocity = aim direction x launch force, assigned directly.
    DirectVelocity,
    /// Impulse = aim direction x launch force, applied against body mass.
    Impulse,
}

/// Discrete messages delivered to mechanism scripts.
#[derive(Clone, Debug, PartialEq)]
pub enum MessagePayload {
    /// A participant grabbed the mechanism (authority already checked).
    SelectStart { by: ParticipantId },
    /// A participant released their grab.
    SelectEnd { by: ParticipantId },
    /// A participant requested activation (authority already checked).
    Activate { by: ParticipantId },
    /// The collision subsystem reported a contact with another entity.
    Collided { with: EntityId },
    /// An entity entered this mechanism's interaction volume.
    SensorBeginIntersect { with: EntityId },
    /// An entity left this mechanism's interaction volume.
    SensorEndIntersect { with: EntityId },
    /// The bow string was grabbed while the bow itself is held.
    StringGrabbed { by: ParticipantId },
    /// The bow string was released after a valid string grab.
    StringReleased { by: ParticipantId },
    /// A projectile spawned on this mechanism's behalf is ready.
    ProjectileReady { projectile: EntityId },
    /// End any active grab without firing.
    ForceRelease,
}

/// A message addressed to a mechanism entity.
#[derive(Clone, Debug)]
pub struct Message {
    pub to: EntityId,
    pub payload: MessagePayload,
}

/// Events a mechanism exposes to collaborators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MechanismEventKind {
    Grabbed { by: ParticipantId },
    Released { by: ParticipantId },
    Launched { velocity: Vector3<f32> },
    TraversalStarted,
    TraversalCompleted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MechanismEvent {
    pub mechanism: EntityId,
    pub kind: MechanismEventKind,
}

/// Configuration failures detected at activation. Fatal for the mechanism
/// instance only; it refuses to enter any active state and reports once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingBody {
        mechanism: &'static str,
        role: &'static str,
    },
    MissingCurve {
        mechanism: &'static str,
    },
    MissingRig {
        mechanism: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingBody { mechanism, role } => {
                write!(f, "{mechanism}: no physics body for {role}")
            }
            ConfigError::MissingCurve { mechanism } => {
                write!(f, "{mechanism}: no usable curve")
            }
            ConfigError::MissingRig { mechanism } => {
                write!(f, "{mechanism}: no avatar rig for requesting participant")
            }
        }
    }
}

/// State mutations and notifications produced by scripts, applied by the
/// game loop after each dispatch.
#[derive(Clone, Debug)]
pub enum Effect {
    NoEffect,
    Multiple(Vec<Effect>),
    SetKinematic {
        entity_id: EntityId,
        kinematic: bool,
    },
    SetGravity {
        entity_id: EntityId,
        enabled: bool,
    },
    SetLinearVelocity {
        entity_id: EntityId,
        velocity: Vector3<f32>,
    },
    SetAngularVelocity {
        entity_id: EntityId,
        velocity: Vector3<f32>,
    },
    ApplyImpulse {
        entity_id: EntityId,
        impulse: Vector3<f32>,
    },
    SetPosition {
        entity_id: EntityId,
        position: Point3<f32>,
    },
    SetPositionRotation {
        entity_id: EntityId,
        position: Point3<f32>,
        rotation: Quaternion<f32>,
    },
    /// Record an attachment of `entity_id` to `parent` at their current
    /// relative pose; the child follows the parent until detached.
    AttachTo {
        entity_id: EntityId,
        parent: EntityId,
    },
    Detach {
        entity_id: EntityId,
    },
    SetLocomotion {
        entity_id: EntityId,
        enabled: bool,
    },
    DrawPreview {
        entity_id: EntityId,
        points: Vec<Point3<f32>>,
    },
    HidePreview {
        entity_id: EntityId,
    },
    /// Spawn a kinematic projectile attached to `parent`; the spawning
    /// mechanism receives `ProjectileReady` once it exists.
    SpawnProjectile {
        parent: EntityId,
        offset: Vector3<f32>,
        mass: f32,
        lifetime: f32,
    },
    DestroyEntity {
        entity_id: EntityId,
    },
    Send {
        msg: Message,
    },
    Emit {
        event: MechanismEventKind,
    },
}

impl Effect {
    /// Collapse a batch of effects, dropping no-ops.
    pub fn combine(effects: Vec<Effect>) -> Effect {
        let mut effects: Vec<Effect> = effects
            .into_iter()
            .filter(|effect| !matches!(effect, Effect::NoEffect))
            .collect();

        match effects.len() {
            0 => Effect::NoEffect,
            1 => effects.remove(0),
            _ => Effect::Multiple(effects),
        }
    }
}

pub trait Script {
    fn initialize(
        &mut self,
        _entity_id: EntityId,
        _world: &World,
        _physics: &PhysicsWorld,
    ) -> Effect {
        Effect::NoEffect
    }

    fn update(
        &mut self,
        _entity_id: EntityId,
        _world: &World,
        _physics: &PhysicsWorld,
        _session: &SessionContext,
        _time: &Time,
    ) -> Effect {
        Effect::NoEffect
    }

    fn handle_message(
        &mut self,
        _entity_id: EntityId,
        _world: &World,
        _physics: &PhysicsWorld,
        _session: &SessionContext,
        _msg: &MessagePayload,
    ) -> Effect {
        Effect::NoEffect
    }
}

/// Owns the per-entity scripts and the message queue between them.
pub struct ScriptWorld {
    scripts: Vec<(EntityId, Option<Box<dyn Script>>)>,
    index: HashMap<EntityId, usize>,
    queue: VecDeque<Message>,
}

impl Default for ScriptWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptWorld {
    pub fn new() -> ScriptWorld {
        ScriptWorld {
            scripts: Vec::new(),
            index: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn add_entity(
        &mut self,
        entity_id: EntityId,
        mut script: Box<dyn Script>,
        world: &World,
        physics: &PhysicsWorld,
    ) -> Effect {
        let effect = script.initialize(entity_id, world, physics);
        self.index.insert(entity_id, self.scripts.len());
        self.scripts.push((entity_id, Some(script)));
        effect
    }

    pub fn remove_entity(&mut self, entity_id: EntityId) {
        if let Some(slot) = self.index.remove(&entity_id) {
            self.scripts[slot].1 = None;
        }
    }

    pub fn dispatch(&mut self, msg: Message) {
        self.queue.push_back(msg);
    }

    pub fn has_pending_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Deliver every queued message, collecting each resulting effect with
    /// the entity that produced it. Messages queued while draining are
    /// delivered in the same pass.
    pub fn drain_messages(
        &mut self,
        world: &World,
        physics: &PhysicsWorld,
        session: &SessionContext,
    ) -> Vec<(EntityId, Effect)> {
        let mut effects = Vec::new();

        while let Some(msg) = self.queue.pop_front() {
            let Some(slot) = self.index.get(&msg.to).copied() else {
                warn!("message for {:?} dropped; no script attached", msg.to);
                continue;
            };

            let Some(mut script) = self.scripts[slot].1.take() else {
                continue;
            };
            let effect = script.handle_message(msg.to, world, physics, session, &msg.payload);
            if self.scripts[slot].0 == msg.to && self.index.contains_key(&msg.to) {
                self.scripts[slot].1 = Some(script);
            }
            effects.push((msg.to, effect));
        }

        effects
    }

    /// Run every script's per-tick update in registration order.
    pub fn update(
        &mut self,
        world: &World,
        physics: &PhysicsWorld,
        session: &SessionContext,
        time: &Time,
    ) -> Vec<(EntityId, Effect)> {
        let mut effects = Vec::new();
        let count = self.scripts.len();

        for slot in 0..count {
            let entity_id = self.scripts[slot].0;
            let Some(mut script) = self.scripts[slot].1.take() else {
                continue;
            };
            let effect = script.update(entity_id, world, physics, session, time);
            if self.index.contains_key(&entity_id) {
                self.scripts[slot].1 = Some(script);
            }
            effects.push((entity_id, effect));
        }

        effects
    }
}
