use std::any::Any;

use glam::{Quat, Vec3};
use log::trace;

use crate::ecs::{Component, Role};

/// Camera the renderer draws from, derived from the player each frame.
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_degrees: f32,
}

/// One drawable entity: a transform plus opaque mesh/material names the
/// backend resolves against its own asset handles.
#[derive(Debug, Clone, Copy)]
pub struct RenderInstance<'a> {
    pub name: &'a str,
    pub mesh: &'a str,
    pub material: &'a str,
    pub position: Vec3,
    pub rotation: Quat,
}

pub struct SceneView<'a> {
    pub instances: Vec<RenderInstance<'a>>,
}

/// The rendering backend. The core calls `draw` exactly once per frame,
/// after the gameplay update; nothing flows back.
pub trait Renderer {
    fn draw(&mut self, scene: &SceneView<'_>, camera: &CameraState);
}

/// Backend used for headless runs and tests: counts frames, draws nothing.
pub struct HeadlessRenderer {
    frames: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self { frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for HeadlessRenderer {
    fn draw(&mut self, scene: &SceneView<'_>, camera: &CameraState) {
        self.frames += 1;
        trace!(
            "frame {}: {} instances, camera at {:?}",
            self.frames,
            scene.instances.len(),
            camera.position
        );
    }
}

/// Data-only component naming what a backend should draw for its entity.
pub struct Visual {
    pub mesh: String,
    pub material: String,
}

impl Visual {
    pub fn new(mesh: impl Into<String>, material: impl Into<String>) -> Self {
        Self {
            mesh: mesh.into(),
            material: material.into(),
        }
    }
}

impl Component for Visual {
    fn role(&self) -> Role {
        Role::Visual
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
