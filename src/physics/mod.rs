// Facade over rapier3d, keyed by entity id.
//
// Mechanism scripts read body state through this facade and mutate it through
// effects applied by the game loop; only the stepping code here touches the
// rapier sets directly.

pub mod util;

use std::collections::HashMap;

use cgmath::{Point3, Quaternion, Vector3};
use rapier3d::prelude::*;
use shipyard::EntityId;
use tracing::warn;

use util::{to_cgpoint, to_cgquat, to_cgvec, to_npoint, to_nquat, to_nvec};

/// How a body participates in the simulation when created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyMode {
    /// Driven by forces and gravity.
    Dynamic,
    /// Position is commanded directly; velocities and forces are ignored.
    Kinematic,
}

pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    entity_to_body: HashMap<EntityId, RigidBodyHandle>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector3<f32>) -> PhysicsWorld {
        PhysicsWorld {
            gravity: to_nvec(gravity),
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            entity_to_body: HashMap::new(),
        }
    }

    pub fn gravity(&self) -> Vector3<f32> {
        to_cgvec(self.gravity)
    }

    /// Create a body for an entity. Collision geometry is not simulated here;
    /// contact and overlap notifications arrive from the collision subsystem
    /// as discrete events.
    pub fn add_body(
        &mut self,
        entity_id: EntityId,
        mode: BodyMode,
        position: Point3<f32>,
        mass: f32,
    ) -> RigidBodyHandle {
        let builder = match mode {
            BodyMode::Dynamic => RigidBodyBuilder::dynamic(),
            BodyMode::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };

        // No colliders contribute mass here, so the body's mass properties
        // must be stated outright or the body ends up massless and inert to
        // impulses.
        let body = builder
            .translation(to_npoint(position))
            .additional_mass_properties(MassProperties::new(
                Point::origin(),
                mass,
                vector![0.0, 0.0, 0.0],
            ))
            .build();

        let handle = self.bodies.insert(body);
        // rapier folds additional mass properties into the effective ones
        // lazily; recompute now so the stated mass is live before the first
        // pipeline step.
        if let Some(body) = self.bodies.get_mut(handle) {
            body.recompute_mass_properties_from_colliders(&self.colliders);
        }
        self.entity_to_body.insert(entity_id, handle);
        handle
    }

    pub fn remove(&mut self, entity_id: EntityId) {
        if let Some(handle) = self.entity_to_body.remove(&entity_id) {
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    pub fn has_body(&self, entity_id: EntityId) -> bool {
        self.entity_to_body.contains_key(&entity_id)
    }

    fn body(&self, entity_id: EntityId) -> Option<&RigidBody> {
        self.entity_to_body
            .get(&entity_id)
            .and_then(|handle| self.bodies.get(*handle))
    }

    fn body_mut(&mut self, entity_id: EntityId) -> Option<&mut RigidBody> {
        match self.entity_to_body.get(&entity_id) {
            Some(handle) => self.bodies.get_mut(*handle),
            None => {
                warn!("no body registered for {:?}", entity_id);
                None
            }
        }
    }

    pub fn position(&self, entity_id: EntityId) -> Option<Point3<f32>> {
        self.body(entity_id)
            .map(|body| to_cgpoint(*body.translation()))
    }

    pub fn rotation(&self, entity_id: EntityId) -> Option<Quaternion<f32>> {
        self.body(entity_id).map(|body| to_cgquat(*body.rotation()))
    }

    pub fn linear_velocity(&self, entity_id: EntityId) -> Option<Vector3<f32>> {
        self.body(entity_id).map(|body| to_cgvec(*body.linvel()))
    }

    pub fn angular_velocity(&self, entity_id: EntityId) -> Option<Vector3<f32>> {
        self.body(entity_id).map(|body| to_cgvec(*body.angvel()))
    }

    pub fn mass(&self, entity_id: EntityId) -> Option<f32> {
        self.body(entity_id).map(|body| body.mass())
    }

    pub fn is_kinematic(&self, entity_id: EntityId) -> bool {
        self.body(entity_id)
            .map(|body| body.is_kinematic())
            .unwrap_or(false)
    }

    pub fn is_gravity_enabled(&self, entity_id: EntityId) -> bool {
        self.body(entity_id)
            .map(|body| body.gravity_scale() > 0.0)
            .unwrap_or(false)
    }

    pub fn set_translation(&mut self, entity_id: EntityId, position: Point3<f32>) {
        if let Some(body) = self.body_mut(entity_id) {
            body.set_translation(to_npoint(position), true);
        }
    }

    pub fn set_rotation(&mut self, entity_id: EntityId, rotation: Quaternion<f32>) {
        if let Some(body) = self.body_mut(entity_id) {
            body.set_rotation(to_nquat(rotation), true);
        }
    }

    pub fn set_linear_velocity(&mut self, entity_id: EntityId, velocity: Vector3<f32>) {
        if let Some(body) = self.body_mut(entity_id) {
            body.set_linvel(to_nvec(velocity), true);
        }
    }

    pub fn set_angular_velocity(&mut self, entity_id: EntityId, velocity: Vector3<f32>) {
        if let Some(body) = self.body_mut(entity_id) {
            body.set_angvel(to_nvec(velocity), true);
        }
    }

    pub fn apply_impulse(&mut self, entity_id: EntityId, impulse: Vector3<f32>) {
        if let Some(body) = self.body_mut(entity_id) {
            body.apply_impulse(to_nvec(impulse), true);
        }
    }

    pub fn set_kinematic(&mut self, entity_id: EntityId, kinematic: bool) {
        if let Some(body) = self.body_mut(entity_id) {
            let body_type = if kinematic {
                RigidBodyType::KinematicPositionBased
            } else {
                RigidBodyType::Dynamic
            };
            body.set_body_type(body_type, true);
        }
    }

    /// Toggle gravity for a body via its gravity scale.
    pub fn set_gravity_enabled(&mut self, entity_id: EntityId, enabled: bool) {
        if let Some(body) = self.body_mut(entity_id) {
            body.set_gravity_scale(if enabled { 1.0 } else { 0.0 }, true);
        }
    }

    pub fn step(&mut self, delta_seconds: f32) {
        self.integration_parameters.dt = delta_seconds;

        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{point3, vec3, InnerSpace};
    use shipyard::World;

    fn entity() -> EntityId {
        World::new().add_entity(())
    }

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(vec3(0.0, -9.81, 0.0))
    }

    #[test]
    fn test_dynamic_body_falls_under_gravity() {
        let mut physics = world();
        let id = entity();
        physics.add_body(id, BodyMode::Dynamic, point3(0.0, 10.0, 0.0), 1.0);

        for _ in 0..60 {
            physics.step(1.0 / 60.0);
        }

        let position = physics.position(id).unwrap();
        assert!(position.y < 10.0);
        assert!(physics.linear_velocity(id).unwrap().y < 0.0);
    }

    #[test]
    fn test_kinematic_body_ignores_gravity() {
        let mut physics = world();
        let id = entity();
        physics.add_body(id, BodyMode::Kinematic, point3(0.0, 5.0, 0.0), 1.0);

        for _ in 0..60 {
            physics.step(1.0 / 60.0);
        }

        assert_eq!(physics.position(id).unwrap(), point3(0.0, 5.0, 0.0));
        assert!(physics.is_kinematic(id));
    }

    #[test]
    fn test_direct_velocity_assignment() {
        let mut physics = world();
        let id = entity();
        physics.add_body(id, BodyMode::Dynamic, point3(0.0, 0.0, 0.0), 1.0);
        physics.set_gravity_enabled(id, false);

        physics.set_linear_velocity(id, vec3(0.0, 0.0, 15.0));
        assert_eq!(physics.linear_velocity(id).unwrap(), vec3(0.0, 0.0, 15.0));

        physics.step(1.0);
        let position = physics.position(id).unwrap();
        assert!((position.z - 15.0).abs() < 1.0);
    }

    #[test]
    fn test_impulse_scales_with_mass() {
        let mut physics = world();
        // Ids must come from one shared world; separate worlds hand out the
        // same first id, which would alias the two bodies.
        let mut ids = World::new();
        let light = ids.add_entity(());
        let heavy = ids.add_entity(());
        physics.add_body(light, BodyMode::Dynamic, point3(0.0, 0.0, 0.0), 1.0);
        physics.add_body(heavy, BodyMode::Dynamic, point3(5.0, 0.0, 0.0), 4.0);

        // A freshly built dynamic body must already carry its stated mass;
        // a massless body would swallow the impulse entirely.
        assert_eq!(physics.mass(light), Some(1.0));
        assert_eq!(physics.mass(heavy), Some(4.0));

        physics.apply_impulse(light, vec3(0.0, 0.0, 8.0));
        physics.apply_impulse(heavy, vec3(0.0, 0.0, 8.0));

        let v_light = physics.linear_velocity(light).unwrap().magnitude();
        let v_heavy = physics.linear_velocity(heavy).unwrap().magnitude();
        assert!((v_light - 8.0).abs() < 1e-3);
        assert!((v_heavy - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_mode_switch_round_trip() {
        let mut physics = world();
        let id = entity();
        physics.add_body(id, BodyMode::Kinematic, point3(0.0, 0.0, 0.0), 1.0);
        assert!(physics.is_kinematic(id));

        physics.set_kinematic(id, false);
        assert!(!physics.is_kinematic(id));

        physics.set_kinematic(id, true);
        assert!(physics.is_kinematic(id));
    }

    #[test]
    fn test_remove_body() {
        let mut physics = world();
        let id = entity();
        physics.add_body(id, BodyMode::Dynamic, point3(0.0, 0.0, 0.0), 1.0);
        assert!(physics.has_body(id));

        physics.remove(id);
        assert!(!physics.has_body(id));
        assert!(physics.position(id).is_none());
    }
}
