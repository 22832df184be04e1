// Interactive motion mechanisms for a multi-participant VR playground:
// grab-and-release launchers, projectiles that stick where they land, and
// path-constrained rides. Scripts own mechanism state and return effects;
// the Game loop owns the ECS world, the physics facade, and the session
// authority rules, and applies those effects in order.

pub mod input;
pub mod logging;
pub mod paths;
pub mod physics;
pub mod runtime_props;
pub mod scripts;
pub mod session;
pub mod time;
pub mod trajectory;

use std::collections::HashMap;

use cgmath::{vec3, One, Point3, Quaternion, Rotation, Vector3};
use shipyard::{EntityId, Get, IntoIter, IntoWithId, Remove, View, ViewMut, World};
use tracing::{debug, warn};

use input::{InputAction, InputEvent};
use physics::{BodyMode, PhysicsWorld};
use runtime_props::{PropAttachment, PropHeldBy, PropPlayerRig, PropTraversing};
use scripts::projectile::{ProjectileConfig, ProjectileScript};
use scripts::{Effect, MechanismEvent, MechanismEventKind, Message, MessagePayload, Script, ScriptWorld};
use session::{ParticipantId, SessionContext};
use time::Time;

/// Message cascades longer than this are cut off and resumed next tick.
const MAX_MESSAGE_PASSES: usize = 8;

const PLAYER_MASS: f32 = 70.0;

/// Receives the events of one mechanism. Registration is explicit; nothing is
/// broadcast to unregistered parties.
pub trait MechanismObserver {
    fn on_event(&mut self, event: &MechanismEvent);
}

/// Returned from `subscribe`; required to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

pub struct GameOptions {
    pub gravity: Vector3<f32>,
}

impl Default for GameOptions {
    fn default() -> Self {
        GameOptions {
            gravity: vec3(0.0, -9.81, 0.0),
        }
    }
}

/// Top-level runtime: the ECS world, the physics facade, the session
/// authority table, and the mechanism scripts, advanced one tick at a time.
pub struct Game {
    world: World,
    physics: PhysicsWorld,
    session: SessionContext,
    scripts: ScriptWorld,
    previews: HashMap<EntityId, Box<dyn trajectory::PolylineSink>>,
    observers: HashMap<EntityId, Vec<(ObserverHandle, Box<dyn MechanismObserver>)>>,
    next_observer: u64,
    pending_events: Vec<MechanismEvent>,
    events: Vec<MechanismEvent>,
}

impl Game {
    pub fn new(local: ParticipantId, options: GameOptions) -> Game {
        Game {
            world: World::new(),
            physics: PhysicsWorld::new(options.gravity),
            session: SessionContext::new(local),
            scripts: ScriptWorld::new(),
            previews: HashMap::new(),
            observers: HashMap::new(),
            next_observer: 0,
            pending_events: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Spawn a participant's avatar rig with a position-commanded body.
    pub fn add_player(&mut self, participant: ParticipantId, position: Point3<f32>) -> EntityId {
        let id = self.world.add_entity(PropPlayerRig {
            participant,
            locomotion_enabled: true,
        });
        self.physics
            .add_body(id, BodyMode::Kinematic, position, PLAYER_MASS);
        id
    }

    /// Spawn a mechanism entity backed by a physics body.
    pub fn add_body_entity(
        &mut self,
        mode: BodyMode,
        position: Point3<f32>,
        mass: f32,
    ) -> EntityId {
        let id = self
            .world
            .add_entity((PropHeldBy::default(), PropTraversing::default()));
        self.physics.add_body(id, mode, position, mass);
        id
    }

    /// Spawn a mechanism entity with no body of its own (e.g. a line whose
    /// endpoints are pure configuration).
    pub fn add_entity(&mut self) -> EntityId {
        self.world
            .add_entity((PropHeldBy::default(), PropTraversing::default()))
    }

    pub fn attach_script(&mut self, entity_id: EntityId, script: Box<dyn Script>) {
        let effect = self
            .scripts
            .add_entity(entity_id, script, &self.world, &self.physics);
        self.apply_effect(entity_id, effect);
    }

    pub fn set_preview_sink(
        &mut self,
        entity_id: EntityId,
        sink: Box<dyn trajectory::PolylineSink>,
    ) {
        self.previews.insert(entity_id, sink);
    }

    pub fn subscribe(
        &mut self,
        mechanism: EntityId,
        observer: Box<dyn MechanismObserver>,
    ) -> ObserverHandle {
        let handle = ObserverHandle(self.next_observer);
        self.next_observer += 1;
        self.observers
            .entry(mechanism)
            .or_default()
            .push((handle, observer));
        handle
    }

    pub fn unsubscribe(&mut self, mechanism: EntityId, handle: ObserverHandle) -> bool {
        match self.observers.get_mut(&mechanism) {
            Some(list) => {
                let before = list.len();
                list.retain(|(h, _)| *h != handle);
                list.len() != before
            }
            None => false,
        }
    }

    /// Hand authority over a mechanism to a participant. Refused while the
    /// mechanism is mid-traversal; authority never changes under a rider.
    pub fn set_owner(&mut self, mechanism: EntityId, holder: ParticipantId) -> bool {
        if self.is_traversing(mechanism) {
            warn!(
                "ownership transfer of {:?} to {:?} refused during traversal",
                mechanism, holder
            );
            return false;
        }
        self.session.assign_owner(mechanism, holder);
        true
    }

    pub fn current_owner(&self, mechanism: EntityId) -> Option<ParticipantId> {
        self.session.owner_of(mechanism)
    }

    /// Report a contact from the collision subsystem. Delivered next update.
    pub fn notify_collision(&mut self, entity_id: EntityId, with: EntityId) {
        self.scripts.dispatch(Message {
            to: entity_id,
            payload: MessagePayload::Collided { with },
        });
    }

    pub fn notify_volume_enter(&mut self, entity_id: EntityId, with: EntityId) {
        self.scripts.dispatch(Message {
            to: entity_id,
            payload: MessagePayload::SensorBeginIntersect { with },
        });
    }

    pub fn notify_volume_exit(&mut self, entity_id: EntityId, with: EntityId) {
        self.scripts.dispatch(Message {
            to: entity_id,
            payload: MessagePayload::SensorEndIntersect { with },
        });
    }

    pub fn holder(&self, entity_id: EntityId) -> Option<ParticipantId> {
        let v_held = self.world.borrow::<View<PropHeldBy>>().unwrap();
        match v_held.get(entity_id) {
            Ok(PropHeldBy(holder)) => *holder,
            Err(_) => None,
        }
    }

    pub fn is_held(&self, entity_id: EntityId) -> bool {
        self.holder(entity_id).is_some()
    }

    pub fn is_traversing(&self, entity_id: EntityId) -> bool {
        let v = self.world.borrow::<View<PropTraversing>>().unwrap();
        matches!(v.get(entity_id), Ok(PropTraversing(true)))
    }

    pub fn locomotion_enabled(&self, entity_id: EntityId) -> bool {
        let v = self.world.borrow::<View<PropPlayerRig>>().unwrap();
        match v.get(entity_id) {
            Ok(rig) => rig.locomotion_enabled,
            Err(_) => false,
        }
    }

    /// Events emitted since the last call, in emission order.
    pub fn take_events(&mut self) -> Vec<MechanismEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn despawn(&mut self, entity_id: EntityId) {
        self.apply_effect(entity_id, Effect::DestroyEntity { entity_id });
    }

    /// Advance one tick: route inputs, deliver messages, run script updates,
    /// step physics, re-pose attached bodies, then notify observers.
    pub fn update(&mut self, time: &Time, inputs: &[InputEvent]) {
        self.route_inputs(inputs);
        self.drain_message_passes();

        let effects = self
            .scripts
            .update(&self.world, &self.physics, &self.session, time);
        self.apply_effects(effects);
        self.drain_message_passes();

        self.physics.step(time.elapsed.as_secs_f32());
        self.sync_attachments();
        self.dispatch_events();
    }

    /// Authority gate for interaction input. An owner's request is processed
    /// before anyone else's for the same tick, and requests against a
    /// mechanism owned by someone else are dropped here, before any script
    /// sees them. Selecting or activating an unowned mechanism acquires it.
    fn route_inputs(&mut self, inputs: &[InputEvent]) {
        let mut ordered: Vec<InputEvent> = inputs.to_vec();
        ordered.sort_by_key(|event| match self.session.owner_of(event.target) {
            Some(owner) if owner == event.participant => 0,
            _ => 1,
        });

        for event in ordered {
            match event.action {
                InputAction::Select | InputAction::Activate => {
                    match self.session.owner_of(event.target) {
                        Some(owner) if owner != event.participant => {
                            debug!(
                                "{:?} by {:?} on {:?} dropped; owned by {:?}",
                                event.action, event.participant, event.target, owner
                            );
                            continue;
                        }
                        Some(_) => {}
                        None => self.session.assign_owner(event.target, event.participant),
                    }

                    let payload = match event.action {
                        InputAction::Select => MessagePayload::SelectStart {
                            by: event.participant,
                        },
                        _ => MessagePayload::Activate {
                            by: event.participant,
                        },
                    };
                    self.scripts.dispatch(Message {
                        to: event.target,
                        payload,
                    });
                }
                InputAction::Release => {
                    // The holder protocol in the script refuses a stranger's
                    // release, so this needs no gate.
                    self.scripts.dispatch(Message {
                        to: event.target,
                        payload: MessagePayload::SelectEnd {
                            by: event.participant,
                        },
                    });
                }
            }
        }
    }

    fn drain_message_passes(&mut self) {
        for _ in 0..MAX_MESSAGE_PASSES {
            if !self.scripts.has_pending_messages() {
                return;
            }
            let effects = self
                .scripts
                .drain_messages(&self.world, &self.physics, &self.session);
            self.apply_effects(effects);
        }
        if self.scripts.has_pending_messages() {
            warn!(
                "message cascade exceeded {} passes; resuming next tick",
                MAX_MESSAGE_PASSES
            );
        }
    }

    fn apply_effects(&mut self, effects: Vec<(EntityId, Effect)>) {
        for (source, effect) in effects {
            self.apply_effect(source, effect);
        }
    }

    fn apply_effect(&mut self, source: EntityId, effect: Effect) {
        match effect {
            Effect::NoEffect => {}
            Effect::Multiple(effects) => {
                for effect in effects {
                    self.apply_effect(source, effect);
                }
            }
            Effect::SetKinematic {
                entity_id,
                kinematic,
            } => self.physics.set_kinematic(entity_id, kinematic),
            Effect::SetGravity { entity_id, enabled } => {
                self.physics.set_gravity_enabled(entity_id, enabled)
            }
            Effect::SetLinearVelocity {
                entity_id,
                velocity,
            } => self.physics.set_linear_velocity(entity_id, velocity),
            Effect::SetAngularVelocity {
                entity_id,
                velocity,
            } => self.physics.set_angular_velocity(entity_id, velocity),
            Effect::ApplyImpulse { entity_id, impulse } => {
                self.physics.apply_impulse(entity_id, impulse)
            }
            Effect::SetPosition {
                entity_id,
                position,
            } => self.physics.set_translation(entity_id, position),
            Effect::SetPositionRotation {
                entity_id,
                position,
                rotation,
            } => {
                self.physics.set_translation(entity_id, position);
                self.physics.set_rotation(entity_id, rotation);
            }
            Effect::AttachTo { entity_id, parent } => self.attach(entity_id, parent),
            Effect::Detach { entity_id } => {
                self.world.run(|mut v: ViewMut<PropAttachment>| {
                    v.remove(entity_id);
                });
            }
            Effect::SetLocomotion { entity_id, enabled } => {
                self.world.run(|mut v: ViewMut<PropPlayerRig>| {
                    if let Ok(rig) = (&mut v).get(entity_id) {
                        rig.locomotion_enabled = enabled;
                    }
                });
            }
            Effect::DrawPreview { entity_id, points } => {
                if let Some(sink) = self.previews.get_mut(&entity_id) {
                    sink.set_points(&points);
                }
            }
            Effect::HidePreview { entity_id } => {
                if let Some(sink) = self.previews.get_mut(&entity_id) {
                    sink.clear();
                }
            }
            Effect::SpawnProjectile {
                parent,
                offset,
                mass,
                lifetime,
            } => self.spawn_projectile(parent, offset, mass, lifetime),
            Effect::DestroyEntity { entity_id } => {
                self.scripts.remove_entity(entity_id);
                self.physics.remove(entity_id);
                self.previews.remove(&entity_id);
                self.session.release_owner(entity_id);
                self.world.delete_entity(entity_id);
            }
            Effect::Send { msg } => self.scripts.dispatch(msg),
            Effect::Emit { event: kind } => {
                match kind {
                    MechanismEventKind::Grabbed { by } => {
                        // Grabbing is how authority moves between
                        // participants.
                        self.session.assign_owner(source, by);
                        self.world.add_component(source, PropHeldBy(Some(by)));
                    }
                    MechanismEventKind::Released { .. } => {
                        // Authority stays with the last holder so the flight
                        // keeps simulating on their side.
                        self.world.add_component(source, PropHeldBy(None));
                    }
                    MechanismEventKind::TraversalStarted => {
                        self.world.add_component(source, PropTraversing(true));
                    }
                    MechanismEventKind::TraversalCompleted => {
                        self.world.add_component(source, PropTraversing(false));
                    }
                    MechanismEventKind::Launched { .. } => {}
                }
                self.pending_events.push(MechanismEvent {
                    mechanism: source,
                    kind,
                });
            }
        }
    }

    /// Record an attachment at the pair's current relative pose.
    fn attach(&mut self, entity_id: EntityId, parent: EntityId) {
        let (Some(child_pos), Some(parent_pos)) = (
            self.physics.position(entity_id),
            self.physics.position(parent),
        ) else {
            warn!(
                "attachment of {:?} to {:?} skipped; missing body",
                entity_id, parent
            );
            return;
        };
        let child_rot = self.physics.rotation(entity_id).unwrap_or_else(Quaternion::one);
        let parent_rot = self.physics.rotation(parent).unwrap_or_else(Quaternion::one);

        let inverse = parent_rot.invert();
        self.world.add_component(
            entity_id,
            PropAttachment {
                parent,
                local_offset: inverse.rotate_vector(child_pos - parent_pos),
                local_rotation: inverse * child_rot,
            },
        );
    }

    fn spawn_projectile(&mut self, parent: EntityId, offset: Vector3<f32>, mass: f32, lifetime: f32) {
        let Some(parent_pos) = self.physics.position(parent) else {
            warn!("projectile spawn for {:?} skipped; parent has no body", parent);
            return;
        };
        let parent_rot = self.physics.rotation(parent).unwrap_or_else(Quaternion::one);

        let id = self
            .world
            .add_entity((PropHeldBy::default(), PropTraversing::default()));
        self.physics.add_body(
            id,
            BodyMode::Kinematic,
            parent_pos + parent_rot.rotate_vector(offset),
            mass,
        );
        self.physics.set_rotation(id, parent_rot);
        self.physics.set_gravity_enabled(id, false);

        // The projectile simulates on the same side as its launcher.
        let owner = self
            .session
            .owner_of(parent)
            .unwrap_or_else(|| self.session.local_participant());
        self.session.assign_owner(id, owner);

        self.world.add_component(
            id,
            PropAttachment {
                parent,
                local_offset: offset,
                local_rotation: Quaternion::one(),
            },
        );

        let script = ProjectileScript::new(ProjectileConfig {
            lifetime,
            ignore: Some(parent),
        });
        let effect = self
            .scripts
            .add_entity(id, Box::new(script), &self.world, &self.physics);
        self.apply_effect(id, effect);

        self.scripts.dispatch(Message {
            to: parent,
            payload: MessagePayload::ProjectileReady { projectile: id },
        });
    }

    /// Re-pose every attached body from its parent's pose this tick.
    fn sync_attachments(&mut self) {
        let attachments: Vec<(EntityId, PropAttachment)> = {
            let v = self.world.borrow::<View<PropAttachment>>().unwrap();
            v.iter().with_id().map(|(id, a)| (id, *a)).collect()
        };

        for (child, attachment) in attachments {
            let (Some(parent_pos), Some(parent_rot)) = (
                self.physics.position(attachment.parent),
                self.physics.rotation(attachment.parent),
            ) else {
                continue;
            };
            if !self.physics.has_body(child) {
                continue;
            }
            self.physics.set_translation(
                child,
                parent_pos + parent_rot.rotate_vector(attachment.local_offset),
            );
            self.physics
                .set_rotation(child, parent_rot * attachment.local_rotation);
        }
    }

    fn dispatch_events(&mut self) {
        let events = std::mem::take(&mut self.pending_events);
        for event in &events {
            if let Some(list) = self.observers.get_mut(&event.mechanism) {
                for (_, observer) in list.iter_mut() {
                    observer.on_event(event);
                }
            }
        }
        self.events.extend(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use cgmath::{point3, InnerSpace};
    use crate::paths::PathCurve;
    use crate::scripts::bow::{BowConfig, BowScript, BowStringScript};
    use crate::scripts::rail_car::{RailCarConfig, RailCarScript};
    use crate::scripts::slingshot::{SlingshotConfig, SlingshotScript};
    use crate::scripts::tow_line::{TowLineConfig, TowLineScript};
    use crate::scripts::zipline::{ZipLineConfig, ZipLineScript};
    use crate::trajectory::PolylineSink;

    const P1: ParticipantId = ParticipantId(1);
    const P2: ParticipantId = ParticipantId(2);

    /// Zero-gravity game so launch velocities stay exact across ticks.
    fn game() -> (Game, Time) {
        let game = Game::new(
            P1,
            GameOptions {
                gravity: vec3(0.0, 0.0, 0.0),
            },
        );
        (game, Time::zero())
    }

    fn tick(game: &mut Game, time: &mut Time, dt: f32, inputs: &[InputEvent]) {
        *time = time.advanced(Duration::from_secs_f32(dt));
        game.update(time, inputs);
    }

    fn run_seconds(game: &mut Game, time: &mut Time, seconds: f32) {
        let steps = (seconds / 0.1).round() as usize;
        for _ in 0..steps {
            tick(game, time, 0.1, &[]);
        }
    }

    fn kinds(events: &[MechanismEvent], mechanism: EntityId) -> Vec<MechanismEventKind> {
        events
            .iter()
            .filter(|e| e.mechanism == mechanism)
            .map(|e| e.kind)
            .collect()
    }

    #[derive(Default)]
    struct SharedSink {
        points: Rc<RefCell<Vec<Point3<f32>>>>,
        cleared: Rc<RefCell<usize>>,
    }

    impl PolylineSink for SharedSink {
        fn set_points(&mut self, points: &[Point3<f32>]) {
            *self.points.borrow_mut() = points.to_vec();
        }

        fn clear(&mut self) {
            self.points.borrow_mut().clear();
            *self.cleared.borrow_mut() += 1;
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Rc<RefCell<Vec<MechanismEventKind>>>,
    }

    impl MechanismObserver for RecordingObserver {
        fn on_event(&mut self, event: &MechanismEvent) {
            self.seen.borrow_mut().push(event.kind);
        }
    }

    #[test]
    fn test_slingshot_launches_along_aim() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        assert_eq!(game.holder(ball), Some(P1));
        assert!(game.physics().is_kinematic(ball));

        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);
        assert!(!game.is_held(ball));
        assert!(!game.physics().is_kinematic(ball));

        // Default aim is local +Z; default force is 15.
        let velocity = game.physics().linear_velocity(ball).unwrap();
        assert!((velocity - vec3(0.0, 0.0, 15.0)).magnitude() < 1e-3);

        let events = game.take_events();
        assert!(kinds(&events, ball)
            .iter()
            .any(|k| matches!(k, MechanismEventKind::Launched { velocity } if (velocity.z - 15.0).abs() < 1e-3)));
    }

    #[test]
    fn test_slingshot_soft_stops_after_flight_window() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);

        run_seconds(&mut game, &mut time, 5.2);

        // Stopped in place, not rewound.
        let velocity = game.physics().linear_velocity(ball).unwrap();
        assert!(velocity.magnitude() < 1e-3);
        let position = game.physics().position(ball).unwrap();
        assert!(position.z > 10.0);
    }

    #[test]
    fn test_catching_the_ball_cancels_the_stop_timer() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);
        run_seconds(&mut game, &mut time, 2.0);

        // Caught mid-flight; the cutoff must not fire later.
        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        assert!(game.physics().is_kinematic(ball));
        run_seconds(&mut game, &mut time, 6.0);

        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);
        let velocity = game.physics().linear_velocity(ball).unwrap();
        assert!((velocity.z - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_preview_drawn_while_held_and_cleared_on_release() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));

        let sink = SharedSink::default();
        let points = Rc::clone(&sink.points);
        let cleared = Rc::clone(&sink.cleared);
        game.set_preview_sink(ball, Box::new(sink));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        assert_eq!(points.borrow().len(), 30);
        assert_eq!(points.borrow()[0], point3(0.0, 1.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);
        assert!(points.borrow().is_empty());
        assert_eq!(*cleared.borrow(), 1);
    }

    #[test]
    fn test_non_owner_interaction_is_dropped() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));
        assert!(game.set_owner(ball, P2));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        assert!(!game.is_held(ball));
        assert_eq!(game.current_owner(ball), Some(P2));
    }

    #[test]
    fn test_owner_wins_when_both_grab_in_the_same_tick() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));
        assert!(game.set_owner(ball, P2));

        // Non-owner listed first; the owner's grab is still the one honored.
        tick(
            &mut game,
            &mut time,
            0.01,
            &[InputEvent::select(ball, P1), InputEvent::select(ball, P2)],
        );
        assert_eq!(game.holder(ball), Some(P2));
    }

    #[test]
    fn test_projectile_removed_after_lifetime() {
        let (mut game, mut time) = game();
        let arrow = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(
            arrow,
            Box::new(ProjectileScript::new(ProjectileConfig {
                lifetime: 1.0,
                ignore: None,
            })),
        );
        assert!(game.set_owner(arrow, P1));

        run_seconds(&mut game, &mut time, 1.2);
        assert!(!game.physics().has_body(arrow));
    }

    #[test]
    fn test_catching_a_projectile_cancels_removal() {
        let (mut game, mut time) = game();
        let arrow = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(
            arrow,
            Box::new(ProjectileScript::new(ProjectileConfig {
                lifetime: 1.0,
                ignore: None,
            })),
        );
        assert!(game.set_owner(arrow, P1));

        run_seconds(&mut game, &mut time, 0.5);
        tick(&mut game, &mut time, 0.01, &[InputEvent::select(arrow, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(arrow, P1)]);

        // Long past the original lifetime; the cutoff stays cancelled.
        run_seconds(&mut game, &mut time, 3.0);
        assert!(game.physics().has_body(arrow));
    }

    #[test]
    fn test_projectile_sticks_where_it_lands() {
        let (mut game, mut time) = game();
        let arrow = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        let wall = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 1.0, 5.0), 100.0);
        game.attach_script(
            arrow,
            Box::new(ProjectileScript::new(ProjectileConfig::default())),
        );
        assert!(game.set_owner(arrow, P1));

        game.notify_collision(arrow, wall);
        tick(&mut game, &mut time, 0.01, &[]);

        assert!(game.physics().is_kinematic(arrow));
        assert!(!game.physics().is_gravity_enabled(arrow));
        assert!(game.physics().linear_velocity(arrow).unwrap().magnitude() < 1e-6);

        let v = game.world().borrow::<View<PropAttachment>>().unwrap();
        assert_eq!(v.get(arrow).unwrap().parent, wall);
    }

    #[test]
    fn test_bow_string_grab_refused_unless_bow_held() {
        let (mut game, mut time) = game();
        let bow = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 1.0, 0.0), 1.0);
        let string = game.add_entity();
        game.attach_script(bow, Box::new(BowScript::new(BowConfig::default(), Some(string))));
        game.attach_script(string, Box::new(BowStringScript::new(bow)));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(string, P1)]);
        assert!(!game.is_held(string));
    }

    fn nocked_arrow(game: &Game, bow: EntityId) -> Option<EntityId> {
        let v = game.world().borrow::<View<PropAttachment>>().unwrap();
        v.iter()
            .with_id()
            .find(|(_, a)| a.parent == bow)
            .map(|(id, _)| id)
    }

    #[test]
    fn test_bow_nocks_and_fires_an_arrow() {
        let (mut game, mut time) = game();
        let bow = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 1.0, 0.0), 1.0);
        let string = game.add_entity();
        game.attach_script(bow, Box::new(BowScript::new(BowConfig::default(), Some(string))));
        game.attach_script(string, Box::new(BowStringScript::new(bow)));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(bow, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::select(string, P1)]);
        assert_eq!(game.holder(string), Some(P1));

        let arrow = nocked_arrow(&game, bow).expect("arrow nocked");
        assert!(game.physics().is_kinematic(arrow));

        tick(&mut game, &mut time, 0.01, &[InputEvent::release(string, P1)]);

        // Impulse of 30 against a 1 kg arrow, along the bow's +Z aim.
        let velocity = game.physics().linear_velocity(arrow).unwrap();
        assert!((velocity.z - 30.0).abs() < 1e-3);
        assert!(!game.physics().is_kinematic(arrow));
        assert!(nocked_arrow(&game, bow).is_none());
    }

    #[test]
    fn test_dropping_the_bow_discards_the_nocked_arrow() {
        let (mut game, mut time) = game();
        let bow = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 1.0, 0.0), 1.0);
        let string = game.add_entity();
        game.attach_script(bow, Box::new(BowScript::new(BowConfig::default(), Some(string))));
        game.attach_script(string, Box::new(BowStringScript::new(bow)));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(bow, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::select(string, P1)]);
        let arrow = nocked_arrow(&game, bow).expect("arrow nocked");

        tick(&mut game, &mut time, 0.01, &[InputEvent::release(bow, P1)]);
        assert!(!game.physics().has_body(arrow));
        assert!(!game.is_held(string));
        assert!(!game.is_held(bow));
    }

    #[test]
    fn test_arrow_expired_on_the_string_does_not_fire() {
        let (mut game, mut time) = game();
        let bow = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 1.0, 0.0), 1.0);
        let string = game.add_entity();
        game.attach_script(
            bow,
            Box::new(BowScript::new(
                BowConfig {
                    arrow_lifetime: 0.2,
                    ..BowConfig::default()
                },
                Some(string),
            )),
        );
        game.attach_script(string, Box::new(BowStringScript::new(bow)));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(bow, P1)]);
        tick(&mut game, &mut time, 0.01, &[InputEvent::select(string, P1)]);
        let arrow = nocked_arrow(&game, bow).expect("arrow nocked");

        // The arrow's lifetime elapses while it is still on the string.
        run_seconds(&mut game, &mut time, 0.5);
        assert!(!game.physics().has_body(arrow));

        game.take_events();
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(string, P1)]);
        let events = game.take_events();
        assert!(!kinds(&events, bow)
            .iter()
            .any(|k| matches!(k, MechanismEventKind::Launched { .. })));
    }

    #[test]
    fn test_zipline_carries_rider_to_the_farther_endpoint() {
        let (mut game, mut time) = game();
        let line = game.add_entity();
        game.attach_script(line, Box::new(ZipLineScript::new(ZipLineConfig::default())));
        let player = game.add_player(P1, point3(2.0, 0.5, 0.0));

        let observer = RecordingObserver::default();
        let seen = Rc::clone(&observer.seen);
        game.subscribe(line, Box::new(observer));

        game.notify_volume_enter(line, player);
        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(line, P1)]);

        // Boarded at the projection of (2, 0.5, 0) onto the line, offset
        // down; the carry also advanced a fraction of this first tick.
        assert!(game.is_traversing(line));
        assert!(!game.locomotion_enabled(player));
        let position = game.physics().position(player).unwrap();
        assert!((position - point3(2.0, -1.0, 0.0)).magnitude() < 0.1);

        // 8 m to the far endpoint at 5 m/s.
        let mut elapsed: f32 = 0.0;
        while game.is_traversing(line) && elapsed < 3.0 {
            tick(&mut game, &mut time, 0.1, &[]);
            elapsed += 0.1;
        }
        assert!((elapsed - 1.6).abs() < 0.2);

        let position = game.physics().position(player).unwrap();
        assert!((position - point3(10.0, -1.0, 0.0)).magnitude() < 1e-3);
        assert!(game.locomotion_enabled(player));

        let seen = seen.borrow();
        assert!(seen.contains(&MechanismEventKind::TraversalStarted));
        assert!(seen.contains(&MechanismEventKind::TraversalCompleted));
    }

    #[test]
    fn test_zipline_boards_at_the_hang_point_on_a_sloped_line() {
        let (mut game, mut time) = game();
        let line = game.add_entity();
        game.attach_script(
            line,
            Box::new(ZipLineScript::new(ZipLineConfig {
                endpoint_a: point3(0.0, 0.0, 0.0),
                endpoint_b: point3(10.0, 10.0, 0.0),
                speed: 5.0,
                rider_offset: vec3(0.0, -1.0, 0.0),
            })),
        );
        // Hanging 1 m below the cable point (5, 5, 0).
        let player = game.add_player(P1, point3(5.0, 4.0, 0.0));

        game.notify_volume_enter(line, player);
        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(line, P1)]);

        // Boarding must not slide the rider along the cable; only the first
        // tick's carry moves them.
        let position = game.physics().position(player).unwrap();
        assert!((position - point3(5.0, 4.0, 0.0)).magnitude() < 0.1);
    }

    #[test]
    fn test_zipline_ownership_locked_during_traversal() {
        let (mut game, mut time) = game();
        let line = game.add_entity();
        game.attach_script(line, Box::new(ZipLineScript::new(ZipLineConfig::default())));
        let player = game.add_player(P1, point3(2.0, 0.5, 0.0));

        game.notify_volume_enter(line, player);
        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(line, P1)]);
        assert!(game.is_traversing(line));

        assert!(!game.set_owner(line, P2));
        assert_eq!(game.current_owner(line), Some(P1));
    }

    #[test]
    fn test_zipline_refuses_activation_mid_carry() {
        let (mut game, mut time) = game();
        let line = game.add_entity();
        game.attach_script(line, Box::new(ZipLineScript::new(ZipLineConfig::default())));
        let player = game.add_player(P1, point3(2.0, 0.5, 0.0));

        game.notify_volume_enter(line, player);
        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(line, P1)]);
        game.take_events();

        tick(&mut game, &mut time, 0.1, &[InputEvent::activate(line, P1)]);
        let events = game.take_events();
        assert!(!kinds(&events, line).contains(&MechanismEventKind::TraversalStarted));
    }

    #[test]
    fn test_rail_car_round_trip() {
        let (mut game, mut time) = game();
        let car = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 0.0, 0.0), 10.0);
        let curve = PathCurve::new(vec![point3(0.0, 0.0, 0.0), point3(10.0, 0.0, 0.0)]);
        game.attach_script(
            car,
            Box::new(RailCarScript::new(
                RailCarConfig {
                    speed: 5.0,
                    seat_offset: vec3(0.0, 0.5, 0.0),
                },
                Some(curve),
            )),
        );
        let player = game.add_player(P1, point3(0.0, 0.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(car, P1)]);
        assert!(game.is_traversing(car));
        assert!(!game.locomotion_enabled(player));

        // Forward leg: 10 m at 5 m/s.
        let mut elapsed: f32 = 0.0;
        while game.is_traversing(car) && elapsed < 4.0 {
            tick(&mut game, &mut time, 0.1, &[]);
            elapsed += 0.1;
        }
        assert!((elapsed - 2.0).abs() < 0.2);

        let car_pos = game.physics().position(car).unwrap();
        assert!((car_pos - point3(10.0, 0.0, 0.0)).magnitude() < 1e-3);
        let rider_pos = game.physics().position(player).unwrap();
        assert!((rider_pos - point3(10.0, 0.5, 0.0)).magnitude() < 1e-3);
        assert!(game.locomotion_enabled(player));

        // The next activation runs the return leg.
        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(car, P1)]);
        run_seconds(&mut game, &mut time, 2.2);
        assert!(!game.is_traversing(car));
        let car_pos = game.physics().position(car).unwrap();
        assert!((car_pos - point3(0.0, 0.0, 0.0)).magnitude() < 1e-3);
    }

    #[test]
    fn test_rail_car_refuses_activation_without_a_curve() {
        let (mut game, mut time) = game();
        let car = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 0.0, 0.0), 10.0);
        game.attach_script(
            car,
            Box::new(RailCarScript::new(RailCarConfig::default(), None)),
        );
        let player = game.add_player(P1, point3(0.0, 0.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(car, P1)]);
        assert!(!game.is_traversing(car));
        assert!(game.locomotion_enabled(player));
    }

    #[test]
    fn test_rail_car_refuses_activation_without_a_body() {
        let (mut game, mut time) = game();
        let car = game.add_entity();
        let curve = PathCurve::new(vec![point3(0.0, 0.0, 0.0), point3(10.0, 0.0, 0.0)]);
        game.attach_script(
            car,
            Box::new(RailCarScript::new(RailCarConfig::default(), Some(curve))),
        );
        let player = game.add_player(P1, point3(0.0, 0.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::activate(car, P1)]);
        assert!(!game.is_traversing(car));
        assert!(game.locomotion_enabled(player));
    }

    #[test]
    fn test_tow_line_refuses_grab_without_a_body() {
        let (mut game, mut time) = game();
        let handle = game.add_entity();
        let curve = PathCurve::new(vec![point3(0.0, 0.0, 0.0), point3(8.0, 0.0, 0.0)]);
        game.attach_script(
            handle,
            Box::new(TowLineScript::new(TowLineConfig::default(), Some(curve))),
        );
        let player = game.add_player(P1, point3(0.0, 0.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(handle, P1)]);
        assert!(!game.is_held(handle));
        assert!(!game.is_traversing(handle));
        assert!(game.locomotion_enabled(player));
    }

    #[test]
    fn test_tow_line_runs_to_completion_after_early_release() {
        let (mut game, mut time) = game();
        let handle = game.add_body_entity(BodyMode::Kinematic, point3(0.0, 0.0, 0.0), 1.0);
        let curve = PathCurve::new(vec![point3(0.0, 0.0, 0.0), point3(8.0, 0.0, 0.0)]);
        game.attach_script(
            handle,
            Box::new(TowLineScript::new(TowLineConfig::default(), Some(curve))),
        );
        let player = game.add_player(P1, point3(0.0, 0.0, 0.0));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(handle, P1)]);
        assert!(game.is_traversing(handle));
        assert!(!game.locomotion_enabled(player));

        // Let go half way; the tow keeps pulling the rider anyway.
        run_seconds(&mut game, &mut time, 1.0);
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(handle, P1)]);
        assert!(game.is_traversing(handle));

        run_seconds(&mut game, &mut time, 1.2);
        assert!(!game.is_traversing(handle));
        let rider_pos = game.physics().position(player).unwrap();
        assert!((rider_pos - point3(8.0, -1.0, 0.0)).magnitude() < 1e-3);
        assert!(game.locomotion_enabled(player));

        // The handle rides back for the next customer.
        let handle_pos = game.physics().position(handle).unwrap();
        assert!((handle_pos - point3(0.0, 0.0, 0.0)).magnitude() < 1e-3);
    }

    #[test]
    fn test_unsubscribed_observer_no_longer_receives_events() {
        let (mut game, mut time) = game();
        let ball = game.add_body_entity(BodyMode::Dynamic, point3(0.0, 1.0, 0.0), 1.0);
        game.attach_script(ball, Box::new(SlingshotScript::new(SlingshotConfig::default())));

        let observer = RecordingObserver::default();
        let seen = Rc::clone(&observer.seen);
        let handle = game.subscribe(ball, Box::new(observer));

        tick(&mut game, &mut time, 0.01, &[InputEvent::select(ball, P1)]);
        assert_eq!(seen.borrow().len(), 1);

        assert!(game.unsubscribe(ball, handle));
        tick(&mut game, &mut time, 0.01, &[InputEvent::release(ball, P1)]);
        assert_eq!(seen.borrow().len(), 1);
    }
}
