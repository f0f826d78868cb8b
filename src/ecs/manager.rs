use std::collections::HashMap;

use glam::{Quat, Vec3};
use log::error;

use crate::input::Input;
use crate::render::{RenderInstance, Visual};

use super::component::{Component, Role};
use super::entity::{Entity, EntityId};
use super::events::GameEvent;
use super::physics::PhysicsWorld;
use super::EcsError;

/// Setup progresses strictly forward: entities and components may only be
/// added while registering, lookups become valid once initialization
/// starts, and the frame fan-outs only run once everything is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupPhase {
    Registering,
    Initializing,
    Ready,
}

enum Hook {
    Update(f32),
    PhysicsUpdate(f32),
}

/// Exclusive owner of all entities.
///
/// Entities live in an insertion-ordered arena and are addressed by
/// `EntityId` handles; the whole manager is discarded on scene restart.
pub struct EntityManager {
    entities: Vec<Entity>,
    by_name: HashMap<String, EntityId>,
    phase: SetupPhase,
}

impl EntityManager {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            by_name: HashMap::new(),
            phase: SetupPhase::Registering,
        }
    }

    /// Register an entity. Duplicate names are a configuration error and
    /// are rejected rather than silently overwriting.
    pub fn add(&mut self, entity: Entity) -> Result<EntityId, EcsError> {
        if self.phase != SetupPhase::Registering {
            return Err(EcsError::SetupComplete);
        }
        if self.by_name.contains_key(entity.name()) {
            return Err(EcsError::DuplicateName(entity.name().to_string()));
        }
        let id = EntityId(self.entities.len() as u32);
        self.by_name.insert(entity.name.clone(), id);
        self.entities.push(entity);
        Ok(id)
    }

    /// Attach another component to a registered entity. Fails once setup
    /// has completed: the component set is frozen after `end_setup`.
    pub fn add_component(
        &mut self,
        id: EntityId,
        component: Box<dyn Component>,
    ) -> Result<(), EcsError> {
        if self.phase != SetupPhase::Registering {
            return Err(EcsError::SetupComplete);
        }
        self.entities[id.index()].attach(component);
        Ok(())
    }

    /// Rename an entity. The new name must be free.
    pub fn rename(&mut self, id: EntityId, new_name: &str) -> Result<(), EcsError> {
        if let Some(&existing) = self.by_name.get(new_name) {
            if existing != id {
                return Err(EcsError::DuplicateName(new_name.to_string()));
            }
            return Ok(());
        }
        let old_name = self.entities[id.index()].name.clone();
        self.by_name.remove(&old_name);
        self.by_name.insert(new_name.to_string(), id);
        self.entities[id.index()].name = new_name.to_string();
        Ok(())
    }

    /// O(1) lookup by unique name. Valid once the whole graph is
    /// registered; a miss is an error, never a silent null.
    pub fn find_entity(&self, name: &str) -> Result<EntityId, EcsError> {
        if self.phase == SetupPhase::Registering {
            return Err(EcsError::SetupIncomplete("entity lookup"));
        }
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::EntityNotFound(name.to_string()))
    }

    pub fn entity_name(&self, id: EntityId) -> &str {
        &self.entities[id.index()].name
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn position(&self, id: EntityId) -> Vec3 {
        self.entities[id.index()].position
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec3) {
        self.entities[id.index()].position = position;
    }

    pub fn rotation(&self, id: EntityId) -> Quat {
        self.entities[id.index()].rotation
    }

    pub fn set_rotation(&mut self, id: EntityId, rotation: Quat) {
        self.entities[id.index()].rotation = rotation;
    }

    pub fn has_component(&self, id: EntityId, role: Role) -> bool {
        self.entities[id.index()].component_index(role).is_some()
    }

    /// Initialize every component exactly once, ordered by entity
    /// registration then attachment. Must run after the whole graph exists
    /// and before the first update; a failing initializer aborts setup.
    pub fn end_setup(&mut self, world: &mut PhysicsWorld, input: &Input) -> Result<(), EcsError> {
        if self.phase != SetupPhase::Registering {
            return Err(EcsError::SetupComplete);
        }
        self.phase = SetupPhase::Initializing;

        for e in 0..self.entities.len() {
            for c in 0..self.entities[e].components.len() {
                let Some(mut component) = self.entities[e].components[c].component.take() else {
                    continue;
                };
                let result = {
                    let mut ctx = Context {
                        manager: &mut *self,
                        entity: EntityId(e as u32),
                        component: c,
                        input,
                    };
                    component.initialize(&mut ctx, world)
                };
                self.entities[e].components[c].component = Some(component);

                if let Err(err) = result {
                    return Err(EcsError::InitFailed {
                        entity: self.entities[e].name.clone(),
                        role: self.entities[e].components[c].role,
                        detail: format!("{err:#}"),
                    });
                }
                self.entities[e].components[c].initialized = true;
            }
        }

        self.phase = SetupPhase::Ready;
        Ok(())
    }

    /// Per-frame gameplay fan-out, in initialization order.
    pub fn update(
        &mut self,
        world: &mut PhysicsWorld,
        input: &Input,
        dt: f32,
    ) -> Result<(), EcsError> {
        if self.phase != SetupPhase::Ready {
            return Err(EcsError::SetupIncomplete("update"));
        }
        self.fan_out(world, input, &Hook::Update(dt));
        Ok(())
    }

    /// Fixed-step fan-out, invoked once per physics sub-step for components
    /// whose logic must stay synchronized with the solver.
    pub fn physics_update(
        &mut self,
        world: &mut PhysicsWorld,
        input: &Input,
        dt: f32,
    ) -> Result<(), EcsError> {
        if self.phase != SetupPhase::Ready {
            return Err(EcsError::SetupIncomplete("physics_update"));
        }
        self.fan_out(world, input, &Hook::PhysicsUpdate(dt));
        Ok(())
    }

    fn fan_out(&mut self, world: &mut PhysicsWorld, input: &Input, hook: &Hook) {
        for e in 0..self.entities.len() {
            for c in 0..self.entities[e].components.len() {
                if !self.entities[e].components[c].initialized {
                    continue;
                }
                let Some(mut component) = self.entities[e].components[c].component.take() else {
                    continue;
                };
                let result = {
                    let mut ctx = Context {
                        manager: &mut *self,
                        entity: EntityId(e as u32),
                        component: c,
                        input,
                    };
                    match hook {
                        Hook::Update(dt) => component.update(&mut ctx, world, *dt),
                        Hook::PhysicsUpdate(dt) => component.physics_update(&mut ctx, world, *dt),
                    }
                };
                self.entities[e].components[c].component = Some(component);

                // One broken component must not take the frame down with
                // it; surface the failure and keep going.
                if let Err(err) = result {
                    let hook_name = match hook {
                        Hook::Update(_) => "update",
                        Hook::PhysicsUpdate(_) => "physics_update",
                    };
                    error!(
                        "{:?} component on `{}` failed during {}: {:#}",
                        self.entities[e].components[c].role, self.entities[e].name, hook_name, err
                    );
                }
            }
        }
    }

    /// Run a closure against a typed component looked up by role. The first
    /// component carrying the role is used; a missing role, a type
    /// mismatch, and a component already on the call stack are distinct
    /// errors.
    pub fn with_component<T, R, F>(
        &mut self,
        id: EntityId,
        role: Role,
        input: &Input,
        f: F,
    ) -> Result<R, EcsError>
    where
        T: Component,
        F: FnOnce(&mut Context<'_>, &mut T) -> R,
    {
        if self.phase == SetupPhase::Registering {
            return Err(EcsError::SetupIncomplete("component lookup"));
        }
        let e = id.index();
        let c = self.entities[e]
            .component_index(role)
            .ok_or_else(|| EcsError::ComponentNotFound {
                entity: self.entities[e].name.clone(),
                role,
            })?;
        let Some(mut component) = self.entities[e].components[c].component.take() else {
            return Err(EcsError::ComponentBusy {
                entity: self.entities[e].name.clone(),
                role,
            });
        };

        let result = match component.as_any_mut().downcast_mut::<T>() {
            Some(typed) => {
                let mut ctx = Context {
                    manager: &mut *self,
                    entity: id,
                    component: c,
                    input,
                };
                Ok(f(&mut ctx, typed))
            }
            None => Err(EcsError::RoleMismatch {
                entity: self.entities[e].name.clone(),
                role,
            }),
        };
        self.entities[e].components[c].component = Some(component);
        result
    }

    pub(crate) fn register_handler(&mut self, id: EntityId, event: &'static str, component: usize) {
        self.entities[id.index()].handlers.push((event, component));
    }

    /// Synchronous emission on the invoking call stack: every handler the
    /// target entity registered for this event name fires, in registration
    /// order. Zero subscribers is a no-op. A handler that is itself
    /// currently on the stack is skipped.
    pub(crate) fn emit_inner(&mut self, target: EntityId, event: &GameEvent, input: &Input) {
        let name = event.name();
        let matching: Vec<usize> = self.entities[target.index()]
            .handlers
            .iter()
            .filter(|(event_name, _)| *event_name == name)
            .map(|(_, component)| *component)
            .collect();

        for c in matching {
            let Some(mut component) = self.entities[target.index()].components[c].component.take()
            else {
                continue;
            };
            {
                let mut ctx = Context {
                    manager: &mut *self,
                    entity: target,
                    component: c,
                    input,
                };
                component.on_event(&mut ctx, event);
            }
            self.entities[target.index()].components[c].component = Some(component);
        }
    }

    /// Snapshot of every entity carrying a `Visual` role, for the renderer.
    pub fn render_view(&self) -> Vec<RenderInstance<'_>> {
        self.entities
            .iter()
            .filter_map(|entity| {
                let c = entity.component_index(Role::Visual)?;
                let slot = entity.components[c].component.as_ref()?;
                let visual = slot.as_any().downcast_ref::<Visual>()?;
                Some(RenderInstance {
                    name: entity.name(),
                    mesh: &visual.mesh,
                    material: &visual.material,
                    position: entity.position,
                    rotation: entity.rotation,
                })
            })
            .collect()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-hook view a component gets of the rest of the world: its own
/// entity's transform, name-based lookups, typed peer access, and event
/// emission. Carries no owning references.
pub struct Context<'a> {
    manager: &'a mut EntityManager,
    entity: EntityId,
    component: usize,
    input: &'a Input,
}

impl<'a> Context<'a> {
    /// Handle of the entity the running component is attached to.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn input(&self) -> &'a Input {
        self.input
    }

    pub fn name(&self) -> &str {
        self.manager.entity_name(self.entity)
    }

    pub fn position(&self) -> Vec3 {
        self.manager.position(self.entity)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.manager.set_position(self.entity, position);
    }

    pub fn rotation(&self) -> Quat {
        self.manager.rotation(self.entity)
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.manager.set_rotation(self.entity, rotation);
    }

    pub fn position_of(&self, id: EntityId) -> Vec3 {
        self.manager.position(id)
    }

    pub fn rotation_of(&self, id: EntityId) -> Quat {
        self.manager.rotation(id)
    }

    pub fn find_entity(&self, name: &str) -> Result<EntityId, EcsError> {
        self.manager.find_entity(name)
    }

    pub fn has_component(&self, id: EntityId, role: Role) -> bool {
        self.manager.has_component(id, role)
    }

    pub fn with_component<T, R, F>(&mut self, id: EntityId, role: Role, f: F) -> Result<R, EcsError>
    where
        T: Component,
        F: FnOnce(&mut Context<'_>, &mut T) -> R,
    {
        self.manager.with_component(id, role, self.input, f)
    }

    /// Subscribe the running component to an event name on its own entity.
    pub fn register_event_handler(&mut self, event: &'static str) {
        self.manager
            .register_handler(self.entity, event, self.component);
    }

    /// Emit an event to a target entity's subscribers, synchronously.
    pub fn emit(&mut self, target: EntityId, event: &GameEvent) {
        self.manager.emit_inner(target, event, self.input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Trace = Rc<RefCell<Vec<String>>>;

    /// Test double that records every hook invocation into a shared trace.
    struct Probe {
        tag: &'static str,
        role: Role,
        trace: Trace,
        subscribe: &'static [&'static str],
        fail_update: bool,
        fail_init: bool,
    }

    impl Probe {
        fn new(tag: &'static str, role: Role, trace: &Trace) -> Self {
            Self {
                tag,
                role,
                trace: Rc::clone(trace),
                subscribe: &[],
                fail_update: false,
                fail_init: false,
            }
        }

        fn subscribed(mut self, events: &'static [&'static str]) -> Self {
            self.subscribe = events;
            self
        }
    }

    impl Component for Probe {
        fn role(&self) -> Role {
            self.role
        }

        fn initialize(&mut self, ctx: &mut Context<'_>, _world: &mut PhysicsWorld) -> anyhow::Result<()> {
            if self.fail_init {
                return Err(anyhow!("broken on purpose"));
            }
            for event in self.subscribe {
                ctx.register_event_handler(event);
            }
            self.trace.borrow_mut().push(format!("init:{}", self.tag));
            Ok(())
        }

        fn update(
            &mut self,
            _ctx: &mut Context<'_>,
            _world: &mut PhysicsWorld,
            _dt: f32,
        ) -> anyhow::Result<()> {
            if self.fail_update {
                return Err(anyhow!("update exploded"));
            }
            self.trace.borrow_mut().push(format!("update:{}", self.tag));
            Ok(())
        }

        fn on_event(&mut self, _ctx: &mut Context<'_>, event: &GameEvent) {
            self.trace
                .borrow_mut()
                .push(format!("event:{}:{}", self.tag, event.name()));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(glam::Vec3::new(0.0, -9.81, 0.0))
    }

    #[test]
    fn initialize_runs_once_in_registration_then_attachment_order() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        manager
            .add(
                Entity::new("alpha")
                    .with_component(Box::new(Probe::new("a0", Role::Brain, &trace)))
                    .with_component(Box::new(Probe::new("a1", Role::Health, &trace))),
            )
            .unwrap();
        manager
            .add(Entity::new("beta").with_component(Box::new(Probe::new("b0", Role::Hud, &trace))))
            .unwrap();

        manager.end_setup(&mut world, &input).unwrap();
        assert_eq!(*trace.borrow(), vec!["init:a0", "init:a1", "init:b0"]);

        // A second end_setup must not re-initialize anything.
        assert!(matches!(
            manager.end_setup(&mut world, &input),
            Err(EcsError::SetupComplete)
        ));
        assert_eq!(trace.borrow().len(), 3);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut manager = EntityManager::new();
        manager.add(Entity::new("door")).unwrap();
        assert!(matches!(
            manager.add(Entity::new("door")),
            Err(EcsError::DuplicateName(name)) if name == "door"
        ));
        assert_eq!(manager.entity_count(), 1);
    }

    #[test]
    fn lookups_signal_misses_and_respect_setup_phases() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let id = manager
            .add(Entity::new("alpha").with_component(Box::new(Probe::new("a", Role::Brain, &trace))))
            .unwrap();

        // Lookups before the graph is sealed are a precondition failure.
        assert!(matches!(
            manager.find_entity("alpha"),
            Err(EcsError::SetupIncomplete(_))
        ));
        // So are frame fan-outs.
        assert!(matches!(
            manager.update(&mut world, &input, 0.016),
            Err(EcsError::SetupIncomplete(_))
        ));

        manager.end_setup(&mut world, &input).unwrap();

        assert_eq!(manager.find_entity("alpha").unwrap(), id);
        assert!(matches!(
            manager.find_entity("missing"),
            Err(EcsError::EntityNotFound(name)) if name == "missing"
        ));

        // The graph is frozen after setup.
        assert!(matches!(manager.add(Entity::new("late")), Err(EcsError::SetupComplete)));
        assert!(matches!(
            manager.add_component(id, Box::new(Probe::new("late", Role::Weapon, &trace))),
            Err(EcsError::SetupComplete)
        ));
    }

    #[test]
    fn failing_initializer_aborts_setup() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let mut broken = Probe::new("broken", Role::Brain, &trace);
        broken.fail_init = true;
        manager
            .add(Entity::new("alpha").with_component(Box::new(broken)))
            .unwrap();
        manager
            .add(Entity::new("beta").with_component(Box::new(Probe::new("b", Role::Hud, &trace))))
            .unwrap();

        let err = manager.end_setup(&mut world, &input).unwrap_err();
        assert!(matches!(err, EcsError::InitFailed { ref entity, .. } if entity == "alpha"));
        // Setup aborted before reaching the second entity.
        assert!(trace.borrow().iter().all(|line| !line.contains(":b")));
    }

    #[test]
    fn update_failures_are_isolated_per_component() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let mut flaky = Probe::new("flaky", Role::Brain, &trace);
        flaky.fail_update = true;
        manager
            .add(Entity::new("alpha").with_component(Box::new(flaky)))
            .unwrap();
        manager
            .add(Entity::new("beta").with_component(Box::new(Probe::new("solid", Role::Hud, &trace))))
            .unwrap();

        manager.end_setup(&mut world, &input).unwrap();
        manager.update(&mut world, &input, 0.016).unwrap();

        // The broken component did not stop the frame.
        assert!(trace.borrow().contains(&"update:solid".to_string()));
    }

    #[test]
    fn emit_with_zero_subscribers_is_a_noop() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let id = manager
            .add(Entity::new("alpha").with_component(Box::new(Probe::new("a", Role::Brain, &trace))))
            .unwrap();
        manager.end_setup(&mut world, &input).unwrap();

        manager.emit_inner(id, &GameEvent::PlayerDied, &input);
        assert!(trace.borrow().iter().all(|line| !line.starts_with("event:")));
    }

    #[test]
    fn subscribers_fire_in_registration_order() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let id = manager
            .add(
                Entity::new("alpha")
                    .with_component(Box::new(
                        Probe::new("first", Role::Brain, &trace).subscribed(&["hit"]),
                    ))
                    .with_component(Box::new(
                        Probe::new("second", Role::Health, &trace).subscribed(&["hit"]),
                    ))
                    .with_component(Box::new(
                        Probe::new("other", Role::Hud, &trace).subscribed(&["ammo"]),
                    )),
            )
            .unwrap();
        manager.end_setup(&mut world, &input).unwrap();
        trace.borrow_mut().clear();

        manager.emit_inner(
            id,
            &GameEvent::Hit {
                attacker: id,
                point: glam::Vec3::ZERO,
                damage: 10.0,
            },
            &input,
        );

        assert_eq!(
            *trace.borrow(),
            vec!["event:first:hit", "event:second:hit"]
        );
    }

    #[test]
    fn typed_access_distinguishes_miss_and_mismatch() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let id = manager
            .add(Entity::new("alpha").with_component(Box::new(Probe::new("a", Role::Brain, &trace))))
            .unwrap();
        manager.end_setup(&mut world, &input).unwrap();

        let tag = manager
            .with_component::<Probe, _, _>(id, Role::Brain, &input, |_ctx, probe| probe.tag)
            .unwrap();
        assert_eq!(tag, "a");

        assert!(matches!(
            manager.with_component::<Probe, _, _>(id, Role::Weapon, &input, |_, _| ()),
            Err(EcsError::ComponentNotFound { .. })
        ));

        struct Other;
        impl Component for Other {
            fn role(&self) -> Role {
                Role::Brain
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        assert!(matches!(
            manager.with_component::<Other, _, _>(id, Role::Brain, &input, |_, _| ()),
            Err(EcsError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn rename_keeps_lookup_consistent() {
        let trace: Trace = Rc::default();
        let mut manager = EntityManager::new();
        let mut world = world();
        let input = Input::new();

        let id = manager
            .add(Entity::new("alpha").with_component(Box::new(Probe::new("a", Role::Brain, &trace))))
            .unwrap();
        let other = manager.add(Entity::new("beta")).unwrap();
        manager.end_setup(&mut world, &input).unwrap();

        manager.rename(id, "gamma").unwrap();
        assert_eq!(manager.find_entity("gamma").unwrap(), id);
        assert!(manager.find_entity("alpha").is_err());

        assert!(matches!(
            manager.rename(other, "gamma"),
            Err(EcsError::DuplicateName(_))
        ));
    }
}
