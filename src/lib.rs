pub mod app;
pub mod assets;
pub mod config;
pub mod ecs;
pub mod game;
pub mod gameplay;
pub mod input;
pub mod render;
