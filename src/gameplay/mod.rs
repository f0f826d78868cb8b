/// Gameplay components
///
/// The behaviors attached to the scene's entities: player movement and
/// health, the hit-scan weapon, NPC pursuit, static level geometry, the
/// ammo pickup trigger and the HUD state sink.

pub mod hud;
pub mod level;
pub mod npc;
pub mod pickup;
pub mod player;
pub mod weapon;

pub use hud::Hud;
pub use level::LevelGeometry;
pub use npc::{NpcBrain, NpcHealth};
pub use pickup::AmmoPickup;
pub use player::{PlayerControls, PlayerHealth};
pub use weapon::Weapon;

use std::cell::RefCell;
use std::rc::Rc;

/// Pointer state fed by input listeners registered per game session and
/// shared with the components that consume it. Look deltas accumulate
/// between frames and are drained by the consumer.
#[derive(Debug, Default)]
pub struct PointerState {
    pub look_dx: f32,
    pub look_dy: f32,
    pub fire_held: bool,
    pub clicked: bool,
}

pub type SharedPointer = Rc<RefCell<PointerState>>;
