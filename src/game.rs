use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use glam::Vec3;
use log::info;
use winit::event::MouseButton;

use crate::assets::{AssetLoader, AssetStore, MeshData};
use crate::config::{AssetKind, GameConfig};
use crate::ecs::{
    physics, Entity, EntityId, EntityManager, PhysicsTick, PhysicsWorld, Role,
};
use crate::gameplay::{
    AmmoPickup, Hud, LevelGeometry, NpcBrain, NpcHealth, PlayerControls, PlayerHealth,
    PointerState, SharedPointer, Weapon,
};
use crate::input::{Input, InputEvent, ListenerKind};
use crate::render::{CameraState, Renderer, SceneView, Visual};

/// Upper bound on one frame's delta time. Long hitches advance the
/// simulation by at most this much, which bounds sub-stepping and keeps
/// fast bodies from tunneling.
pub const MAX_FRAME_DELTA: f32 = 1.0 / 30.0;

/// Binds the entity fan-out to the physics sub-step tick.
struct SimTick<'a> {
    manager: &'a mut EntityManager,
    input: &'a Input,
}

impl PhysicsTick for SimTick<'_> {
    fn physics_tick(&mut self, world: &mut PhysicsWorld, dt: f32) {
        if let Err(err) = self.manager.physics_update(world, self.input, dt) {
            log::error!("physics fan-out failed: {err}");
        }
    }
}

/// The running game: entity graph, physics world, renderer, and the
/// per-session pointer state. One `advance_frame` per displayed frame.
pub struct Game {
    config: GameConfig,
    assets: AssetStore,
    manager: EntityManager,
    world: PhysicsWorld,
    renderer: Box<dyn Renderer>,
    pointer: SharedPointer,
    player: EntityId,
    hud: EntityId,
    game_over: bool,
}

impl Game {
    pub fn new(config: GameConfig, renderer: Box<dyn Renderer>, input: &mut Input) -> Result<Self> {
        physics::init(|| info!("physics engine ready"));
        let assets = load_assets(&config)?;
        let scene = build_scene(&config, &assets, input)?;
        Ok(Self {
            config,
            assets,
            manager: scene.manager,
            world: scene.world,
            renderer,
            pointer: scene.pointer,
            player: scene.player,
            hud: scene.hud,
            game_over: false,
        })
    }

    /// One display frame: clamp the delta, step physics (which fans out
    /// the fixed-step updates), run the gameplay update, then render.
    pub fn advance_frame(&mut self, input: &mut Input, raw_dt: f32) -> Result<()> {
        let dt = raw_dt.clamp(0.0, MAX_FRAME_DELTA);

        if self.game_over {
            let clicked = std::mem::take(&mut self.pointer.borrow_mut().clicked);
            if clicked {
                self.restart(input)?;
            }
        } else {
            let mut tick = SimTick {
                manager: &mut self.manager,
                input: &*input,
            };
            self.world
                .step_simulation(dt, self.config.physics.max_substeps, &mut tick);
            self.manager.update(&mut self.world, input, dt)?;

            self.game_over = self
                .manager
                .with_component::<Hud, _, _>(self.hud, Role::Hud, input, |_, hud| {
                    hud.is_game_over()
                })?;
        }

        let camera = self.camera_state(input)?;
        let scene = SceneView {
            instances: self.manager.render_view(),
        };
        self.renderer.draw(&scene, &camera);
        Ok(())
    }

    fn camera_state(&mut self, input: &Input) -> Result<CameraState> {
        let camera = self.manager.with_component::<PlayerControls, _, _>(
            self.player,
            Role::Controls,
            input,
            |ctx, controls| controls.camera(ctx.position()),
        )?;
        Ok(camera)
    }

    /// Tear the session down and build a fresh one. The input listener
    /// registry is reset to exactly its internal pair before the new
    /// session registers its own, so restarts never leak listeners.
    pub fn restart(&mut self, input: &mut Input) -> Result<()> {
        info!("restarting game");
        input.clear_listeners();
        let scene = build_scene(&self.config, &self.assets, input)?;
        self.manager = scene.manager;
        self.world = scene.world;
        self.pointer = scene.pointer;
        self.player = scene.player;
        self.hud = scene.hud;
        self.game_over = false;
        Ok(())
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn player(&self) -> EntityId {
        self.player
    }

    pub fn hud(&self) -> EntityId {
        self.hud
    }

    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.manager
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn pointer(&self) -> &SharedPointer {
        &self.pointer
    }
}

struct Scene {
    manager: EntityManager,
    world: PhysicsWorld,
    pointer: SharedPointer,
    player: EntityId,
    hud: EntityId,
}

/// Join on every configured asset before the first frame. A failed load
/// rejects the batch and game start aborts with the menu state intact.
fn load_assets(config: &GameConfig) -> Result<AssetStore> {
    let mut loader = AssetLoader::new();
    for entry in &config.assets {
        match entry.kind {
            AssetKind::Mesh => loader.request_mesh(&entry.name, PathBuf::from(&entry.path)),
            AssetKind::Blob => loader.request_blob(&entry.name, PathBuf::from(&entry.path)),
        }
    }
    let store = loader
        .wait_all(|name, done, total| info!("loaded `{name}` ({done}/{total})"))
        .context("asset load failed, not starting")?;
    Ok(store)
}

fn build_scene(config: &GameConfig, assets: &AssetStore, input: &mut Input) -> Result<Scene> {
    let mut world = PhysicsWorld::new(config.physics.gravity);
    let mut manager = EntityManager::new();

    let pointer: SharedPointer = Rc::new(RefCell::new(PointerState::default()));
    register_pointer_listeners(input, &pointer);

    let crate_mesh = assets
        .mesh("crate")
        .cloned()
        .unwrap_or_else(|| MeshData::cuboid(Vec3::splat(0.5)));

    manager.add(
        Entity::new("level")
            .with_component(Box::new(LevelGeometry::arena(crate_mesh)))
            .with_component(Box::new(Visual::new("level", "concrete"))),
    )?;

    let hud = manager.add(Entity::new("hud").with_component(Box::new(Hud::new())))?;

    let player = manager.add(
        Entity::new("player")
            .at(config.player.spawn)
            .with_component(Box::new(PlayerControls::new(
                config.player.clone(),
                Rc::clone(&pointer),
            )))
            .with_component(Box::new(PlayerHealth::new(config.player.max_health)))
            .with_component(Box::new(Weapon::new(
                config.weapon.clone(),
                Rc::clone(&pointer),
            ))),
    )?;

    for (i, point) in config.npc.spawn_points.iter().enumerate() {
        manager.add(
            Entity::new(format!("npc-{}", i + 1))
                .at(Vec3::from_array(*point))
                .with_component(Box::new(NpcBrain::new(config.npc.clone())))
                .with_component(Box::new(NpcHealth::new(config.npc.health)))
                .with_component(Box::new(Visual::new("mutant", "mutant"))),
        )?;
    }

    manager.add(
        Entity::new("ammo-pickup")
            .at(Vec3::new(6.0, 0.75, 2.0))
            .with_component(Box::new(AmmoPickup::new(30)))
            .with_component(Box::new(Visual::new("ammo-box", "metal"))),
    )?;

    manager.end_setup(&mut world, input)?;
    world.refresh_queries();

    Ok(Scene {
        manager,
        world,
        pointer,
        player,
        hud,
    })
}

/// The session's external input listeners: mouse look, the trigger, and
/// the restart click. They live until the next `clear_listeners`.
fn register_pointer_listeners(input: &mut Input, pointer: &SharedPointer) {
    let look = Rc::clone(pointer);
    input.add_listener(ListenerKind::MouseMove, move |event| {
        if let InputEvent::MouseMove { dx, dy } = event {
            let mut pointer = look.borrow_mut();
            pointer.look_dx += *dx as f32;
            pointer.look_dy += *dy as f32;
        }
    });

    let press = Rc::clone(pointer);
    input.add_listener(ListenerKind::MouseDown, move |event| {
        if matches!(event, InputEvent::MouseDown(MouseButton::Left)) {
            press.borrow_mut().fire_held = true;
        }
    });

    let release = Rc::clone(pointer);
    input.add_listener(ListenerKind::MouseUp, move |event| {
        if matches!(event, InputEvent::MouseUp(MouseButton::Left)) {
            release.borrow_mut().fire_held = false;
        }
    });

    let click = Rc::clone(pointer);
    input.add_listener(ListenerKind::Click, move |event| {
        if matches!(event, InputEvent::Click(MouseButton::Left)) {
            click.borrow_mut().clicked = true;
        }
    });
}
