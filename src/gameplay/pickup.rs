use std::any::Any;

use anyhow::Result;
use log::info;
use rapier3d::prelude::ColliderHandle;

use crate::ecs::{Component, Context, EntityId, GameEvent, PhysicsWorld, Role};

const PICKUP_RADIUS: f32 = 0.75;

/// Ammo crate: a sensor volume polled each physics sub-step. Walking into
/// it grants reserve ammo once, then the trigger retires itself.
pub struct AmmoPickup {
    rounds: u32,
    sensor: Option<ColliderHandle>,
    player: Option<EntityId>,
}

impl AmmoPickup {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            sensor: None,
            player: None,
        }
    }

    pub fn is_collected(&self) -> bool {
        self.sensor.is_none() && self.player.is_some()
    }
}

impl Component for AmmoPickup {
    fn role(&self) -> Role {
        Role::Pickup
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld) -> Result<()> {
        self.player = Some(ctx.find_entity("player")?);
        self.sensor = Some(world.add_sensor_sphere(
            Some(ctx.entity()),
            ctx.position(),
            PICKUP_RADIUS,
        ));
        Ok(())
    }

    fn physics_update(
        &mut self,
        ctx: &mut Context<'_>,
        world: &mut PhysicsWorld,
        _dt: f32,
    ) -> Result<()> {
        let (Some(sensor), Some(player)) = (self.sensor, self.player) else {
            return Ok(());
        };
        if !world.sensor_overlaps(sensor).contains(&player) {
            return Ok(());
        }

        info!("`{}` collected (+{} rounds)", ctx.name(), self.rounds);
        world.remove_collider(sensor);
        self.sensor = None;
        ctx.emit(
            player,
            &GameEvent::PickupCollected {
                rounds: self.rounds,
            },
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
