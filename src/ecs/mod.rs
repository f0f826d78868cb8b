/// Entity/component core
///
/// This module provides:
/// - Named entities owning ordered polymorphic components
/// - Lifecycle fan-out (initialize once, per-frame update, fixed-step
///   physics update)
/// - A synchronous per-entity event bus
/// - The physics adapter the fixed-step fan-out is synchronized with

pub mod component;
pub mod entity;
pub mod events;
pub mod manager;
pub mod physics;

pub use component::{Component, Role};
pub use entity::{Entity, EntityId};
pub use events::GameEvent;
pub use manager::{Context, EntityManager};
pub use physics::{CollisionFilter, PhysicsError, PhysicsTick, PhysicsWorld, RayHit};

use thiserror::Error;

/// Contract violations of the entity graph.
#[derive(Debug, Error)]
pub enum EcsError {
    #[error("entity name `{0}` is already registered")]
    DuplicateName(String),

    #[error("no entity named `{0}`")]
    EntityNotFound(String),

    #[error("entity `{entity}` has no {role:?} component")]
    ComponentNotFound { entity: String, role: Role },

    #[error("{role:?} component on `{entity}` is not of the requested type")]
    RoleMismatch { entity: String, role: Role },

    #[error("{role:?} component on `{entity}` is already on the call stack")]
    ComponentBusy { entity: String, role: Role },

    #[error("setup is complete; the entity graph is frozen")]
    SetupComplete,

    #[error("{0} is only valid once every entity is registered")]
    SetupIncomplete(&'static str),

    #[error("{role:?} component on `{entity}` failed to initialize: {detail}")]
    InitFailed {
        entity: String,
        role: Role,
        detail: String,
    },
}
