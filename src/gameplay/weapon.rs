use std::any::Any;

use anyhow::Result;
use log::debug;
use winit::keyboard::KeyCode;

use crate::config::WeaponConfig;
use crate::ecs::{CollisionFilter, Component, Context, EntityId, GameEvent, PhysicsWorld, Role};

use super::player::PlayerControls;
use super::SharedPointer;

/// Hit-scan rifle. Firing is one closest-hit ray from the eye along the
/// view direction; whatever it strikes gets a `hit` event on its own bus.
pub struct Weapon {
    config: WeaponConfig,
    pointer: SharedPointer,
    in_clip: u32,
    reserve: u32,
    cooldown: f32,
    reload_was_down: bool,
    hud: Option<EntityId>,
}

impl Weapon {
    pub fn new(config: WeaponConfig, pointer: SharedPointer) -> Self {
        let in_clip = config.clip_size;
        let reserve = config.reserve_ammo;
        Self {
            config,
            pointer,
            in_clip,
            reserve,
            cooldown: 0.0,
            reload_was_down: false,
            hud: None,
        }
    }

    pub fn ammo(&self) -> (u32, u32) {
        (self.in_clip, self.reserve)
    }

    fn notify_hud(&self, ctx: &mut Context<'_>) {
        if let Some(hud) = self.hud {
            ctx.emit(
                hud,
                &GameEvent::AmmoChanged {
                    in_clip: self.in_clip,
                    reserve: self.reserve,
                },
            );
        }
    }

    fn reload(&mut self, ctx: &mut Context<'_>) {
        let missing = self.config.clip_size - self.in_clip;
        let moved = missing.min(self.reserve);
        if moved == 0 {
            return;
        }
        self.in_clip += moved;
        self.reserve -= moved;
        debug!("reloaded {moved} rounds");
        self.notify_hud(ctx);
    }

    fn fire(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld) -> Result<()> {
        self.in_clip -= 1;
        self.cooldown = self.config.fire_interval;

        let shooter = ctx.entity();
        let (origin, direction, shooter_body) = ctx
            .with_component::<PlayerControls, _, _>(shooter, Role::Controls, |pctx, controls| {
                (
                    pctx.position() + controls.eye_offset(),
                    controls.view_direction(),
                    controls.body_handle(),
                )
            })?;
        let dest = origin + direction * self.config.range;

        // Trigger volumes do not stop bullets.
        let mask = CollisionFilter::ALL & !CollisionFilter::SENSOR_TRIGGER;
        let mut struck = None;
        if let Some(hit) = world.cast_ray_excluding(origin, dest, mask, shooter_body) {
            struck = Some((hit.entity, hit.point));
        }

        if let Some((Some(target), point)) = struck {
            ctx.emit(
                target,
                &GameEvent::Hit {
                    attacker: shooter,
                    point,
                    damage: self.config.damage,
                },
            );
        }
        self.notify_hud(ctx);
        Ok(())
    }
}

impl Component for Weapon {
    fn role(&self) -> Role {
        Role::Weapon
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> Result<()> {
        self.hud = Some(ctx.find_entity("hud")?);
        ctx.register_event_handler("pickup");
        self.notify_hud(ctx);
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld, dt: f32) -> Result<()> {
        self.cooldown = (self.cooldown - dt).max(0.0);

        let reload_down = ctx.input().is_key_down(KeyCode::KeyR);
        if reload_down && !self.reload_was_down {
            self.reload(ctx);
        }
        self.reload_was_down = reload_down;

        let fire_held = self.pointer.borrow().fire_held;
        if fire_held && self.cooldown <= 0.0 && self.in_clip > 0 {
            self.fire(ctx, world)?;
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: &GameEvent) {
        if let GameEvent::PickupCollected { rounds } = event {
            self.reserve += rounds;
            self.notify_hud(ctx);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
