use std::any::Any;

use anyhow::Result;
use glam::{Quat, Vec3};
use log::{debug, info};
use rapier3d::control::KinematicCharacterController;
use rapier3d::prelude::RigidBodyHandle;

use crate::config::NpcConfig;
use crate::ecs::{CollisionFilter, Component, Context, EntityId, GameEvent, PhysicsWorld, Role};

use super::player::{CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS};

/// How far below the capsule center the ground probe looks.
const GROUND_PROBE_DEPTH: f32 = 1.2;

/// Kinematic pursuit: chase the player inside the aggro radius, swing when
/// in reach. Movement runs in the physics fan-out so the capsule and the
/// visual transform stay in lockstep.
pub struct NpcBrain {
    config: NpcConfig,
    controller: KinematicCharacterController,
    body: Option<RigidBodyHandle>,
    player: Option<EntityId>,
    attack_cooldown: f32,
    vertical_velocity: f32,
    dead: bool,
}

impl NpcBrain {
    pub fn new(config: NpcConfig) -> Self {
        Self {
            config,
            controller: KinematicCharacterController::default(),
            body: None,
            player: None,
            attack_cooldown: 0.0,
            vertical_velocity: 0.0,
            dead: false,
        }
    }
}

impl Component for NpcBrain {
    fn role(&self) -> Role {
        Role::Brain
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld) -> Result<()> {
        self.player = Some(ctx.find_entity("player")?);
        self.body = Some(world.add_character(
            Some(ctx.entity()),
            ctx.position(),
            CAPSULE_HALF_HEIGHT,
            CAPSULE_RADIUS,
        ));
        ctx.register_event_handler("enemy_down");
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
        if self.dead {
            world.remove_body(body);
            self.body = None;
            return Ok(());
        }

        let (position, _) = world.body_position(body)?;
        ctx.set_position(position);

        // Reusable ground probe: a short downward cast against the static
        // level.
        let grounded = world
            .cast_ray(
                position,
                position - Vec3::new(0.0, GROUND_PROBE_DEPTH, 0.0),
                CollisionFilter::STATIC,
            )
            .is_some();

        if grounded {
            self.vertical_velocity = -0.5;
        } else {
            self.vertical_velocity += world.gravity().y * dt;
        }

        let Some(player) = self.player else {
            return Ok(());
        };
        let player_position = ctx.position_of(player);
        let to_player = player_position - position;
        let planar = Vec3::new(to_player.x, 0.0, to_player.z);
        let distance = planar.length();

        let mut horizontal = Vec3::ZERO;
        let mut rotation = ctx.rotation();
        if grounded && distance < self.config.aggro_radius && distance > self.config.attack_range {
            horizontal = planar / distance * self.config.move_speed;
            rotation = Quat::from_rotation_y(f32::atan2(-to_player.x, -to_player.z));
            ctx.set_rotation(rotation);
        }

        self.attack_cooldown = (self.attack_cooldown - dt).max(0.0);
        if distance <= self.config.attack_range && self.attack_cooldown <= 0.0 {
            self.attack_cooldown = self.config.attack_cooldown;
            debug!("`{}` swings at the player", ctx.name());
            ctx.emit(
                player,
                &GameEvent::Hit {
                    attacker: ctx.entity(),
                    point: player_position,
                    damage: self.config.attack_damage,
                },
            );
        }

        let desired = (horizontal + Vec3::new(0.0, self.vertical_velocity, 0.0)) * dt;
        let movement = world.move_character(&self.controller, body, desired, dt)?;
        world.set_next_kinematic_position(body, position + movement.translation, rotation)?;
        Ok(())
    }

    fn on_event(&mut self, _ctx: &mut Context<'_>, event: &GameEvent) {
        if matches!(event, GameEvent::EnemyDown { .. }) {
            // Body removal happens on the next physics tick, which owns
            // the world.
            self.dead = true;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// NPC hit points. Dying notifies the brain (same entity) and the HUD.
pub struct NpcHealth {
    health: f32,
    hud: Option<EntityId>,
}

impl NpcHealth {
    pub fn new(health: f32) -> Self {
        Self { health, hud: None }
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

impl Component for NpcHealth {
    fn role(&self) -> Role {
        Role::Health
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> Result<()> {
        self.hud = Some(ctx.find_entity("hud")?);
        ctx.register_event_handler("hit");
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: &GameEvent) {
        let GameEvent::Hit { damage, .. } = event else {
            return;
        };
        if !self.is_alive() {
            return;
        }
        self.health = (self.health - damage).max(0.0);
        debug!("`{}` took {damage} damage, {} left", ctx.name(), self.health);

        if !self.is_alive() {
            info!("`{}` is down", ctx.name());
            let down = GameEvent::EnemyDown {
                victim: ctx.entity(),
            };
            // Own entity first (the brain retires the body), then the HUD.
            ctx.emit(ctx.entity(), &down);
            if let Some(hud) = self.hud {
                ctx.emit(hud, &down);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
