use std::any::Any;

use anyhow::Result;
use log::info;

use crate::ecs::{Component, Context, GameEvent, PhysicsWorld, Role};

/// UI state sink. Widget rendering is the backend's business; this
/// component only subscribes to the gameplay events the HUD presents and
/// keeps the latest values.
#[derive(Default)]
pub struct Hud {
    health: f32,
    max_health: f32,
    in_clip: u32,
    reserve: u32,
    kills: u32,
    game_over: bool,
}

impl Hud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn health(&self) -> (f32, f32) {
        (self.health, self.max_health)
    }

    pub fn ammo(&self) -> (u32, u32) {
        (self.in_clip, self.reserve)
    }

    pub fn kills(&self) -> u32 {
        self.kills
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }
}

impl Component for Hud {
    fn role(&self) -> Role {
        Role::Hud
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> Result<()> {
        ctx.register_event_handler("health");
        ctx.register_event_handler("ammo");
        ctx.register_event_handler("enemy_down");
        ctx.register_event_handler("player_died");
        Ok(())
    }

    fn on_event(&mut self, _ctx: &mut Context<'_>, event: &GameEvent) {
        match event {
            GameEvent::HealthChanged { current, max } => {
                self.health = *current;
                self.max_health = *max;
                info!("HP {:.0}/{:.0}", self.health, self.max_health);
            }
            GameEvent::AmmoChanged { in_clip, reserve } => {
                self.in_clip = *in_clip;
                self.reserve = *reserve;
                info!("ammo {}/{}", self.in_clip, self.reserve);
            }
            GameEvent::EnemyDown { .. } => {
                self.kills += 1;
                info!("kills: {}", self.kills);
            }
            GameEvent::PlayerDied => {
                self.game_over = true;
                info!("game over; click to restart");
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
