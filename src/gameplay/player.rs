use std::any::Any;

use anyhow::Result;
use glam::{EulerRot, Quat, Vec3};
use log::info;
use rapier3d::control::KinematicCharacterController;
use rapier3d::prelude::RigidBodyHandle;
use winit::keyboard::KeyCode;

use crate::config::PlayerConfig;
use crate::ecs::{Component, Context, EntityId, GameEvent, PhysicsWorld, Role};
use crate::render::CameraState;

use super::SharedPointer;

/// Capsule dimensions shared by player and NPC characters.
pub const CAPSULE_HALF_HEIGHT: f32 = 0.6;
pub const CAPSULE_RADIUS: f32 = 0.3;

const PITCH_LIMIT: f32 = 1.5;
const CAMERA_FOV_DEGREES: f32 = 70.0;

/// First-person movement: WASD + mouse look + jump, driven through the
/// kinematic character controller each physics sub-step.
pub struct PlayerControls {
    config: PlayerConfig,
    pointer: SharedPointer,
    controller: KinematicCharacterController,
    body: Option<RigidBodyHandle>,
    yaw: f32,
    pitch: f32,
    vertical_velocity: f32,
    grounded: bool,
}

impl PlayerControls {
    pub fn new(config: PlayerConfig, pointer: SharedPointer) -> Self {
        Self {
            config,
            pointer,
            controller: KinematicCharacterController::default(),
            body: None,
            yaw: 0.0,
            pitch: 0.0,
            vertical_velocity: 0.0,
            grounded: false,
        }
    }

    pub fn body_handle(&self) -> Option<RigidBodyHandle> {
        self.body
    }

    /// Full view rotation, pitch included. The entity transform only
    /// carries the yaw; the capsule does not pitch.
    pub fn view_rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn view_direction(&self) -> Vec3 {
        self.view_rotation() * Vec3::NEG_Z
    }

    pub fn eye_offset(&self) -> Vec3 {
        Vec3::new(0.0, self.config.eye_height, 0.0)
    }

    pub fn camera(&self, entity_position: Vec3) -> CameraState {
        CameraState {
            position: entity_position + self.eye_offset(),
            rotation: self.view_rotation(),
            fov_degrees: CAMERA_FOV_DEGREES,
        }
    }
}

impl Component for PlayerControls {
    fn role(&self) -> Role {
        Role::Controls
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld) -> Result<()> {
        self.body = Some(world.add_character(
            Some(ctx.entity()),
            ctx.position(),
            CAPSULE_HALF_HEIGHT,
            CAPSULE_RADIUS,
        ));
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld, _dt: f32) -> Result<()> {
        let (dx, dy) = {
            let mut pointer = self.pointer.borrow_mut();
            (
                std::mem::take(&mut pointer.look_dx),
                std::mem::take(&mut pointer.look_dy),
            )
        };
        self.yaw -= dx * self.config.mouse_sensitivity;
        self.pitch = (self.pitch - dy * self.config.mouse_sensitivity)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        ctx.set_rotation(Quat::from_rotation_y(self.yaw));
        Ok(())
    }

    fn physics_update(
        &mut self,
        ctx: &mut Context<'_>,
        world: &mut PhysicsWorld,
        dt: f32,
    ) -> Result<()> {
        let Some(body) = self.body else {
            return Ok(());
        };

        // The body position is the previous sub-step's result; copy it back
        // to the visual transform before planning the next move.
        let (position, _) = world.body_position(body)?;
        ctx.set_position(position);

        let input = ctx.input();
        let mut wish = Vec3::ZERO;
        if input.is_key_down(KeyCode::KeyW) {
            wish.z -= 1.0;
        }
        if input.is_key_down(KeyCode::KeyS) {
            wish.z += 1.0;
        }
        if input.is_key_down(KeyCode::KeyA) {
            wish.x -= 1.0;
        }
        if input.is_key_down(KeyCode::KeyD) {
            wish.x += 1.0;
        }
        let horizontal =
            Quat::from_rotation_y(self.yaw) * wish.normalize_or_zero() * self.config.move_speed;

        if self.grounded {
            self.vertical_velocity = if input.is_key_down(KeyCode::Space) {
                self.config.jump_speed
            } else {
                // Small downward bias keeps the capsule snapped to ramps.
                -0.5
            };
        } else {
            self.vertical_velocity += world.gravity().y * dt;
        }

        let desired = (horizontal + Vec3::new(0.0, self.vertical_velocity, 0.0)) * dt;
        let movement = world.move_character(&self.controller, body, desired, dt)?;
        self.grounded = movement.grounded;

        world.set_next_kinematic_position(
            body,
            position + movement.translation,
            Quat::from_rotation_y(self.yaw),
        )?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Player hit points. Subscribes to `hit` on the player entity and keeps
/// the HUD informed; at zero the HUD is told the run is over.
pub struct PlayerHealth {
    health: f32,
    max: f32,
    hud: Option<EntityId>,
}

impl PlayerHealth {
    pub fn new(max: f32) -> Self {
        Self {
            health: max,
            max,
            hud: None,
        }
    }

    pub fn health(&self) -> f32 {
        self.health
    }
}

impl Component for PlayerHealth {
    fn role(&self) -> Role {
        Role::Health
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> Result<()> {
        let hud = ctx.find_entity("hud")?;
        self.hud = Some(hud);
        ctx.register_event_handler("hit");
        ctx.emit(
            hud,
            &GameEvent::HealthChanged {
                current: self.health,
                max: self.max,
            },
        );
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: &GameEvent) {
        let GameEvent::Hit { damage, .. } = event else {
            return;
        };
        if self.health <= 0.0 {
            return;
        }
        self.health = (self.health - damage).max(0.0);

        let Some(hud) = self.hud else { return };
        ctx.emit(
            hud,
            &GameEvent::HealthChanged {
                current: self.health,
                max: self.max,
            },
        );
        if self.health <= 0.0 {
            info!("player down");
            ctx.emit(hud, &GameEvent::PlayerDied);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
