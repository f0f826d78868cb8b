use std::any::Any;

use anyhow::{Context as _, Result};
use glam::{Quat, Vec3};
use log::debug;

use crate::assets::MeshData;
use crate::ecs::{CollisionFilter, Component, Context, PhysicsWorld, Role};

const ARENA_HALF_EXTENT: f32 = 24.0;
const WALL_HALF_HEIGHT: f32 = 3.0;

/// Static level geometry: a floor, four walls, and convex-hull obstacles
/// derived from a mesh's vertex cloud.
pub struct LevelGeometry {
    obstacle_mesh: MeshData,
    obstacle_positions: Vec<Vec3>,
}

impl LevelGeometry {
    /// The default arena: crates scattered between the spawn and the NPCs.
    pub fn arena(obstacle_mesh: MeshData) -> Self {
        Self {
            obstacle_mesh,
            obstacle_positions: vec![
                Vec3::new(-4.0, 0.5, -5.0),
                Vec3::new(5.0, 0.5, -9.0),
                Vec3::new(0.0, 0.5, -16.0),
            ],
        }
    }
}

impl Component for LevelGeometry {
    fn role(&self) -> Role {
        Role::Level
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, world: &mut PhysicsWorld) -> Result<()> {
        let id = Some(ctx.entity());
        let e = ARENA_HALF_EXTENT;

        // Floor, top surface at y = 0.
        world.add_static_box(
            id,
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(e, 0.5, e),
            CollisionFilter::STATIC,
            CollisionFilter::ALL,
        );

        // Perimeter walls.
        let h = WALL_HALF_HEIGHT;
        for (position, half_extents) in [
            (Vec3::new(0.0, h, -e), Vec3::new(e, h, 0.5)),
            (Vec3::new(0.0, h, e), Vec3::new(e, h, 0.5)),
            (Vec3::new(-e, h, 0.0), Vec3::new(0.5, h, e)),
            (Vec3::new(e, h, 0.0), Vec3::new(0.5, h, e)),
        ] {
            world.add_static_box(
                id,
                position,
                half_extents,
                CollisionFilter::STATIC,
                CollisionFilter::ALL,
            );
        }

        // One hull serves every obstacle instance.
        let hull = PhysicsWorld::convex_hull_shape(self.obstacle_mesh.vertex_cloud())
            .context("obstacle mesh has no usable hull")?;
        for position in &self.obstacle_positions {
            world.add_static_shape(
                id,
                *position,
                Quat::IDENTITY,
                hull.clone(),
                CollisionFilter::STATIC,
                CollisionFilter::ALL,
            );
        }
        debug!(
            "level built: floor, 4 walls, {} obstacles",
            self.obstacle_positions.len()
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
