/// Physics adapter over Rapier
///
/// Owns the physics world's lifecycle and hides engine-specific setup.
/// The rest of the game touches physics only through this facade:
/// bounded sub-stepping with a per-substep tick, closest-hit ray casts
/// against a reusable scratch result, filtered shape/body construction,
/// kinematic character movement and sensor overlap polling.

use std::sync::Once;

use glam::{Quat, Vec3};
use nalgebra as na;
use rapier3d::control::KinematicCharacterController;
use rapier3d::prelude::*;
use thiserror::Error;

use super::entity::EntityId;

/// Engine-fixed sub-step length, seconds.
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;

static ENGINE_INIT: Once = Once::new();

/// One-time engine initialization. Safe to call from anywhere, any number
/// of times: the engine is never initialized twice, and `on_ready` runs
/// once the engine is usable.
pub fn init<F: FnOnce()>(on_ready: F) {
    ENGINE_INIT.call_once(|| {
        log::debug!("physics engine initialized (fixed timestep {FIXED_TIMESTEP}s)");
    });
    on_ready();
}

bitflags::bitflags! {
    /// Collision filter groups. Bodies declare a membership and a filter
    /// of groups they interact with; ray casts pass a filter of groups
    /// they may hit. Masks combine with bitwise OR and are tested with
    /// bitwise AND.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CollisionFilter: u32 {
        const DEFAULT = 1;
        const STATIC = 2;
        const KINEMATIC = 4;
        const DEBRIS = 8;
        const SENSOR_TRIGGER = 16;
        const CHARACTER = 32;
        const ALL = u32::MAX;
    }
}

impl CollisionFilter {
    fn to_group(self) -> Group {
        Group::from_bits_truncate(self.bits())
    }
}

#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("convex hull computation failed: vertex cloud is degenerate")]
    DegenerateHull,
    #[error("unknown rigid body handle")]
    UnknownBody,
}

/// Receiver of the per-substep tick, invoked exactly once per fixed
/// sub-step before integration.
pub trait PhysicsTick {
    fn physics_tick(&mut self, world: &mut PhysicsWorld, dt: f32);
}

/// Closest-hit ray result. One instance lives inside the world as scratch
/// state; it is reset and repopulated on every cast, so results must be
/// copied out before the next cast.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub time_of_impact: f32,
    pub collider: Option<ColliderHandle>,
    pub entity: Option<EntityId>,
}

/// Result of one kinematic character move.
#[derive(Debug, Clone, Copy)]
pub struct CharacterMovement {
    pub translation: Vec3,
    pub grounded: bool,
}

/// Physics world wrapper.
pub struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    /// Unconsumed frame time below one sub-step.
    accumulator: f32,
    simulated_time: f64,
    ray_scratch: RayHit,
}

impl PhysicsWorld {
    /// Create a world. FPS arenas want real gravity; pass
    /// `Vec3::new(0.0, -9.81, 0.0)` unless the config says otherwise.
    pub fn new(gravity: Vec3) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = FIXED_TIMESTEP;

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vec3_to_vector(gravity),
            integration_params,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            accumulator: 0.0,
            simulated_time: 0.0,
            ray_scratch: RayHit::default(),
        }
    }

    /// Advance by `dt` using fixed sub-steps, at most `max_substeps` of
    /// them. Each sub-step invokes `tick` exactly once before integrating,
    /// which is where physics-synchronized components run. Surplus time
    /// beyond the sub-step budget is dropped so a long frame hitch cannot
    /// snowball into unbounded catch-up work. Returns the number of
    /// sub-steps taken.
    pub fn step_simulation(&mut self, dt: f32, max_substeps: u32, tick: &mut dyn PhysicsTick) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut steps = 0;
        while self.accumulator >= FIXED_TIMESTEP && steps < max_substeps {
            tick.physics_tick(self, FIXED_TIMESTEP);
            self.step_once();
            self.accumulator -= FIXED_TIMESTEP;
            steps += 1;
        }
        if self.accumulator >= FIXED_TIMESTEP {
            self.accumulator %= FIXED_TIMESTEP;
        }
        steps
    }

    fn step_once(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.query_pipeline.update(&self.collider_set);
        self.simulated_time += f64::from(FIXED_TIMESTEP);
    }

    /// Total fixed time integrated so far.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// World gravity, for characters that integrate their own fall.
    pub fn gravity(&self) -> Vec3 {
        vector_to_vec3(self.gravity)
    }

    /// Rebuild the spatial query acceleration structure. Stepping does this
    /// automatically; call it after constructing bodies outside the step
    /// loop (scene setup) and before the first cast.
    pub fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.collider_set);
    }

    /// Closest-hit ray query between two points. Returns the adapter-owned
    /// scratch result on a hit; `&mut self` keeps casts strictly one at a
    /// time.
    pub fn cast_ray(
        &mut self,
        origin: Vec3,
        dest: Vec3,
        filter: CollisionFilter,
    ) -> Option<&RayHit> {
        self.cast_ray_excluding(origin, dest, filter, None)
    }

    /// `cast_ray`, additionally ignoring one body. Hit-scan shooters pass
    /// their own body so the ray cannot start inside them and stop there.
    pub fn cast_ray_excluding(
        &mut self,
        origin: Vec3,
        dest: Vec3,
        filter: CollisionFilter,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<&RayHit> {
        self.ray_scratch = RayHit::default();

        let segment = dest - origin;
        let max_toi = segment.length();
        if max_toi <= f32::EPSILON {
            return None;
        }
        let ray = Ray::new(vec3_to_point(origin), vec3_to_vector(segment / max_toi));

        let mut query = QueryFilter::default()
            .groups(InteractionGroups::new(Group::ALL, filter.to_group()));
        if let Some(body) = exclude {
            query = query.exclude_rigid_body(body);
        }

        let (handle, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_toi,
            true,
            query,
        )?;

        let collider = &self.collider_set[handle];
        self.ray_scratch = RayHit {
            point: point_to_vec3(ray.point_at(intersection.time_of_impact)),
            normal: vector_to_vec3(intersection.normal),
            time_of_impact: intersection.time_of_impact,
            collider: Some(handle),
            entity: decode_entity(collider.user_data),
        };
        Some(&self.ray_scratch)
    }

    /// Convex collision shape from a mesh's vertex cloud via the engine's
    /// 3D convex-hull computation.
    pub fn convex_hull_shape(points: &[Vec3]) -> Result<SharedShape, PhysicsError> {
        let cloud: Vec<Point<Real>> = points.iter().map(|p| vec3_to_point(*p)).collect();
        SharedShape::convex_hull(&cloud).ok_or(PhysicsError::DegenerateHull)
    }

    /// Static box collider.
    pub fn add_static_box(
        &mut self,
        entity: Option<EntityId>,
        position: Vec3,
        half_extents: Vec3,
        membership: CollisionFilter,
        interacts_with: CollisionFilter,
    ) -> RigidBodyHandle {
        let shape = SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z);
        self.add_static_shape(entity, position, Quat::IDENTITY, shape, membership, interacts_with)
    }

    /// Static collider with an arbitrary shape (convex hulls, etc.).
    pub fn add_static_shape(
        &mut self,
        entity: Option<EntityId>,
        position: Vec3,
        rotation: Quat,
        shape: SharedShape,
        membership: CollisionFilter,
        interacts_with: CollisionFilter,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::fixed()
            .position(isometry(position, rotation))
            .build();
        let body = self.rigid_body_set.insert(rigid_body);

        let collider = ColliderBuilder::new(shape)
            .collision_groups(InteractionGroups::new(
                membership.to_group(),
                interacts_with.to_group(),
            ))
            .user_data(encode_entity(entity))
            .build();
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);

        body
    }

    /// Kinematic capsule for a character (player or NPC), moved through
    /// `move_character` + `set_next_kinematic_position`.
    pub fn add_character(
        &mut self,
        entity: Option<EntityId>,
        position: Vec3,
        half_height: f32,
        radius: f32,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::kinematic_position_based()
            .position(isometry(position, Quat::IDENTITY))
            .build();
        let body = self.rigid_body_set.insert(rigid_body);

        let collider = ColliderBuilder::capsule_y(half_height, radius)
            .collision_groups(InteractionGroups::new(
                CollisionFilter::CHARACTER.to_group(),
                CollisionFilter::ALL.to_group(),
            ))
            .user_data(encode_entity(entity))
            .build();
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);

        body
    }

    /// Standalone sensor sphere: generates intersection pairs, never
    /// contact forces. Only characters trigger it.
    pub fn add_sensor_sphere(
        &mut self,
        entity: Option<EntityId>,
        position: Vec3,
        radius: f32,
    ) -> ColliderHandle {
        let collider = ColliderBuilder::ball(radius)
            .translation(vec3_to_vector(position))
            .sensor(true)
            .collision_groups(InteractionGroups::new(
                CollisionFilter::SENSOR_TRIGGER.to_group(),
                CollisionFilter::CHARACTER.to_group(),
            ))
            // Characters are kinematic and the sensor is fixed; that pair
            // is not tracked unless asked for.
            .active_collision_types(
                ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_FIXED,
            )
            .user_data(encode_entity(entity))
            .build();
        self.collider_set.insert(collider)
    }

    /// Entities currently overlapping a sensor collider.
    pub fn sensor_overlaps(&self, sensor: ColliderHandle) -> Vec<EntityId> {
        self.narrow_phase
            .intersection_pairs_with(sensor)
            .filter(|(_, _, intersecting)| *intersecting)
            .filter_map(|(a, b, _)| {
                let other = if a == sensor { b } else { a };
                decode_entity(self.collider_set.get(other)?.user_data)
            })
            .collect()
    }

    /// Collide-and-slide movement for a kinematic character capsule. The
    /// returned translation is what the capsule can actually move this
    /// sub-step; apply it with `set_next_kinematic_position`.
    pub fn move_character(
        &self,
        controller: &KinematicCharacterController,
        body: RigidBodyHandle,
        desired: Vec3,
        dt: f32,
    ) -> Result<CharacterMovement, PhysicsError> {
        let rigid_body = self
            .rigid_body_set
            .get(body)
            .ok_or(PhysicsError::UnknownBody)?;
        let collider_handle = rigid_body
            .colliders()
            .first()
            .copied()
            .ok_or(PhysicsError::UnknownBody)?;
        let collider = &self.collider_set[collider_handle];

        let movement = controller.move_shape(
            dt,
            &self.rigid_body_set,
            &self.collider_set,
            &self.query_pipeline,
            collider.shape(),
            collider.position(),
            vec3_to_vector(desired),
            QueryFilter::default()
                .exclude_rigid_body(body)
                .exclude_sensors(),
            |_| {},
        );

        Ok(CharacterMovement {
            translation: vector_to_vec3(movement.translation),
            grounded: movement.grounded,
        })
    }

    /// Current body transform.
    pub fn body_position(&self, body: RigidBodyHandle) -> Result<(Vec3, Quat), PhysicsError> {
        let rigid_body = self
            .rigid_body_set
            .get(body)
            .ok_or(PhysicsError::UnknownBody)?;
        let iso = rigid_body.position();
        Ok((
            vector_to_vec3(iso.translation.vector),
            unit_quat_to_quat(&iso.rotation),
        ))
    }

    /// Target transform a kinematic body integrates towards on the next
    /// sub-step.
    pub fn set_next_kinematic_position(
        &mut self,
        body: RigidBodyHandle,
        position: Vec3,
        rotation: Quat,
    ) -> Result<(), PhysicsError> {
        let rigid_body = self
            .rigid_body_set
            .get_mut(body)
            .ok_or(PhysicsError::UnknownBody)?;
        rigid_body.set_next_kinematic_position(isometry(position, rotation));
        Ok(())
    }

    /// Remove a body and its colliders (despawn).
    pub fn remove_body(&mut self, body: RigidBodyHandle) {
        self.rigid_body_set.remove(
            body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    /// Remove a standalone collider (retire a trigger volume).
    pub fn remove_collider(&mut self, collider: ColliderHandle) {
        self.collider_set.remove(
            collider,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            true,
        );
    }
}

fn encode_entity(entity: Option<EntityId>) -> u128 {
    match entity {
        Some(id) => u128::from(id.0) + 1,
        None => 0,
    }
}

fn decode_entity(user_data: u128) -> Option<EntityId> {
    if user_data == 0 {
        None
    } else {
        Some(EntityId((user_data - 1) as u32))
    }
}

/// Convert glam Vec3 to Rapier Point
fn vec3_to_point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

/// Convert glam Vec3 to Rapier Vector
fn vec3_to_vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

fn vector_to_vec3(v: Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn point_to_vec3(p: Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

/// Convert glam Quat to Rapier UnitQuaternion
fn quat_to_unit_quat(q: Quat) -> na::UnitQuaternion<Real> {
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(q.w, q.x, q.y, q.z))
}

fn unit_quat_to_quat(q: &na::UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

fn isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    Isometry::from_parts(
        Translation::new(position.x, position.y, position.z),
        quat_to_unit_quat(rotation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct TickCounter {
        ticks: u32,
    }

    impl PhysicsTick for TickCounter {
        fn physics_tick(&mut self, _world: &mut PhysicsWorld, _dt: f32) {
            self.ticks += 1;
        }
    }

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0))
    }

    #[test]
    fn init_is_repeatable_and_always_reports_ready() {
        let mut ready = 0;
        init(|| ready += 1);
        init(|| ready += 1);
        assert_eq!(ready, 2);
    }

    #[test]
    fn one_substep_for_one_substep_of_time() {
        let mut world = world();
        let mut counter = TickCounter { ticks: 0 };

        let steps = world.step_simulation(FIXED_TIMESTEP, 10, &mut counter);
        assert_eq!(steps, 1);
        assert_eq!(counter.ticks, 1);
        assert_relative_eq!(world.simulated_time() as f32, FIXED_TIMESTEP, epsilon = 1e-6);
    }

    #[test]
    fn substeps_are_clamped_to_the_budget() {
        let mut world = world();
        let mut counter = TickCounter { ticks: 0 };

        // Half a second is 30 sub-steps worth; only 10 may run.
        let steps = world.step_simulation(0.5, 10, &mut counter);
        assert_eq!(steps, 10);
        assert_eq!(counter.ticks, 10);

        // The surplus was dropped, so the next small frame does not
        // trigger a catch-up burst.
        let steps = world.step_simulation(FIXED_TIMESTEP, 10, &mut counter);
        assert_eq!(steps, 1);
    }

    #[test]
    fn accumulator_carries_partial_frames() {
        let mut world = world();
        let mut counter = TickCounter { ticks: 0 };

        let steps = world.step_simulation(2.5 * FIXED_TIMESTEP, 10, &mut counter);
        assert_eq!(steps, 2);
        // The half sub-step left over completes once the next frame tops
        // it up past one full sub-step.
        let steps = world.step_simulation(0.75 * FIXED_TIMESTEP, 10, &mut counter);
        assert_eq!(steps, 1);
    }

    #[test]
    fn ray_through_a_box_reports_the_entry_face() {
        let mut world = world();
        let target = EntityId(7);
        world.add_static_box(
            Some(target),
            Vec3::ZERO,
            Vec3::splat(0.5),
            CollisionFilter::STATIC,
            CollisionFilter::ALL,
        );
        world.refresh_queries();

        let hit = *world
            .cast_ray(
                Vec3::new(-5.0, 0.0, 0.0),
                Vec3::new(5.0, 0.0, 0.0),
                CollisionFilter::ALL,
            )
            .expect("ray through the box center must hit");

        assert_relative_eq!(hit.point.x, -0.5, epsilon = 1e-3);
        assert_relative_eq!(hit.point.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-3);
        assert_eq!(hit.entity, Some(target));
    }

    #[test]
    fn parallel_ray_misses() {
        let mut world = world();
        world.add_static_box(
            None,
            Vec3::ZERO,
            Vec3::splat(0.5),
            CollisionFilter::STATIC,
            CollisionFilter::ALL,
        );
        world.refresh_queries();

        let hit = world.cast_ray(
            Vec3::new(-5.0, 5.0, 0.0),
            Vec3::new(5.0, 5.0, 0.0),
            CollisionFilter::ALL,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn filter_mask_excludes_groups() {
        let mut world = world();
        world.add_static_box(
            None,
            Vec3::ZERO,
            Vec3::splat(0.5),
            CollisionFilter::STATIC,
            CollisionFilter::ALL,
        );
        world.refresh_queries();

        // The box is STATIC; a cast that only accepts DEFAULT passes
        // straight through.
        let hit = world.cast_ray(
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            CollisionFilter::DEFAULT,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn convex_hull_needs_a_volume() {
        let cube = [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        assert!(PhysicsWorld::convex_hull_shape(&cube).is_ok());

        let line = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        assert!(matches!(
            PhysicsWorld::convex_hull_shape(&line),
            Err(PhysicsError::DegenerateHull)
        ));
    }

    #[test]
    fn character_slides_onto_the_ground_and_reports_grounded() {
        let mut world = world();
        world.add_static_box(
            None,
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(10.0, 0.5, 10.0),
            CollisionFilter::STATIC,
            CollisionFilter::ALL,
        );
        // Capsule total half-height 0.8, floating 0.05 above the floor.
        let body = world.add_character(None, Vec3::new(0.0, 0.85, 0.0), 0.5, 0.3);
        world.refresh_queries();

        let controller = KinematicCharacterController::default();
        let movement = world
            .move_character(&controller, body, Vec3::new(0.0, -0.2, 0.0), FIXED_TIMESTEP)
            .unwrap();

        assert!(movement.grounded);
        // The floor stops the capsule well short of the requested drop.
        assert!(movement.translation.y > -0.1);
    }

    #[test]
    fn character_falls_freely_without_ground() {
        let mut world = world();
        let body = world.add_character(None, Vec3::new(0.0, 5.0, 0.0), 0.5, 0.3);
        world.refresh_queries();

        let controller = KinematicCharacterController::default();
        let movement = world
            .move_character(&controller, body, Vec3::new(0.0, -0.5, 0.0), FIXED_TIMESTEP)
            .unwrap();

        assert!(!movement.grounded);
        assert_relative_eq!(movement.translation.y, -0.5, epsilon = 1e-3);
    }

    #[test]
    fn sensor_reports_overlapping_characters() {
        let mut world = world();
        let player = EntityId(1);
        let pickup = EntityId(2);
        world.add_character(Some(player), Vec3::new(0.0, 0.8, 0.0), 0.5, 0.3);
        let sensor = world.add_sensor_sphere(Some(pickup), Vec3::new(0.0, 0.8, 0.0), 1.0);

        struct Noop;
        impl PhysicsTick for Noop {
            fn physics_tick(&mut self, _world: &mut PhysicsWorld, _dt: f32) {}
        }
        world.step_simulation(FIXED_TIMESTEP, 10, &mut Noop);

        let overlaps = world.sensor_overlaps(sensor);
        assert_eq!(overlaps, vec![player]);
    }
}
