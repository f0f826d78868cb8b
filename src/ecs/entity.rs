use glam::{Quat, Vec3};

use super::component::{Component, Role};

/// Non-owning handle to an entity in the manager's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) struct ComponentSlot {
    pub(crate) role: Role,
    /// `None` only while the component is out on the call stack.
    pub(crate) component: Option<Box<dyn Component>>,
    pub(crate) initialized: bool,
}

/// Named bag of components sharing one transform.
pub struct Entity {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) components: Vec<ComponentSlot>,
    /// (event name, component index), in registration order.
    pub(crate) handlers: Vec<(&'static str, usize)>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            components: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Set the initial transform position.
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Attach a component (builder form). Components can only be attached
    /// while the entity graph is still being registered; once it is handed
    /// to the manager, use `EntityManager::add_component`.
    pub fn with_component(mut self, component: Box<dyn Component>) -> Self {
        self.attach(component);
        self
    }

    pub(crate) fn attach(&mut self, component: Box<dyn Component>) {
        let role = component.role();
        self.components.push(ComponentSlot {
            role,
            component: Some(component),
            initialized: false,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the first component carrying the requested role.
    pub(crate) fn component_index(&self, role: Role) -> Option<usize> {
        self.components.iter().position(|slot| slot.role == role)
    }
}
