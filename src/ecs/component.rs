use std::any::Any;

use anyhow::Result;

use super::events::GameEvent;
use super::manager::Context;
use super::physics::PhysicsWorld;

/// Capability tag a component is looked up by. Resolved once at attach
/// time; `GetComponent`-style queries key on this, never on runtime type
/// names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Controls,
    Health,
    Weapon,
    Brain,
    Level,
    Hud,
    Pickup,
    Visual,
}

/// Unit of behavior attached to an entity.
///
/// Hooks run on the single frame-driving context, always with the owning
/// entity reachable through `ctx` and the physics adapter passed alongside.
/// `initialize` runs exactly once, after the whole entity graph is
/// registered, so cross-entity lookups are valid there. `physics_update`
/// runs once per fixed sub-step, `update` once per rendered frame.
pub trait Component: 'static {
    fn role(&self) -> Role;

    fn initialize(&mut self, _ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut Context<'_>, _world: &mut PhysicsWorld, _dt: f32) -> Result<()> {
        Ok(())
    }

    fn physics_update(
        &mut self,
        _ctx: &mut Context<'_>,
        _world: &mut PhysicsWorld,
        _dt: f32,
    ) -> Result<()> {
        Ok(())
    }

    /// Delivery point for events the component subscribed to with
    /// `Context::register_event_handler`.
    fn on_event(&mut self, _ctx: &mut Context<'_>, _event: &GameEvent) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
