use glam::Vec3;

use super::entity::EntityId;

/// Payloads carried over the per-entity event bus.
///
/// Handlers subscribe by the stable name of a variant; emission is
/// synchronous and ordered by registration.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Something struck this entity (hit-scan shot, melee swing).
    Hit {
        attacker: EntityId,
        point: Vec3,
        damage: f32,
    },
    HealthChanged {
        current: f32,
        max: f32,
    },
    AmmoChanged {
        in_clip: u32,
        reserve: u32,
    },
    EnemyDown {
        victim: EntityId,
    },
    PickupCollected {
        rounds: u32,
    },
    PlayerDied,
}

impl GameEvent {
    /// The name handlers subscribe under.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::Hit { .. } => "hit",
            GameEvent::HealthChanged { .. } => "health",
            GameEvent::AmmoChanged { .. } => "ammo",
            GameEvent::EnemyDown { .. } => "enemy_down",
            GameEvent::PickupCollected { .. } => "pickup",
            GameEvent::PlayerDied => "player_died",
        }
    }
}
