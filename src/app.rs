use std::time::Instant;

use log::error;
use winit::{
    event::{DeviceEvent, ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

use crate::config::WindowConfig;
use crate::game::Game;
use crate::input::{Input, InputEvent};

/// Window shell: owns the event loop, translates device events for the
/// input cache, and pumps the game once per redraw.
pub struct App {
    event_loop: EventLoop<()>,
    window: Window,
}

impl App {
    pub fn new(config: &WindowConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height))
            .build(&event_loop)?;

        // FPS-style pointer capture; not every platform supports
        // confinement, and the game works without it.
        let _ = window.set_cursor_grab(winit::window::CursorGrabMode::Confined);
        window.set_cursor_visible(false);

        Ok(Self { event_loop, window })
    }

    pub fn run(self, mut game: Game, mut input: Input) -> anyhow::Result<()> {
        let Self { event_loop, window } = self;

        let mut last_update_time = Instant::now();
        let mut frame_count: u32 = 0;
        let mut fps_timer = Instant::now();

        event_loop.run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    ..
                } => {
                    target.exit();
                }
                Event::WindowEvent {
                    event:
                        WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    physical_key: PhysicalKey::Code(key_code),
                                    state,
                                    ..
                                },
                            ..
                        },
                    ..
                } => match state {
                    ElementState::Pressed => {
                        if key_code == KeyCode::Escape {
                            target.exit();
                            return;
                        }
                        input.dispatch(&InputEvent::KeyDown(key_code));
                    }
                    ElementState::Released => {
                        input.dispatch(&InputEvent::KeyUp(key_code));
                    }
                },
                Event::WindowEvent {
                    event: WindowEvent::MouseInput { state, button, .. },
                    ..
                } => match state {
                    ElementState::Pressed => {
                        input.dispatch(&InputEvent::MouseDown(button));
                    }
                    ElementState::Released => {
                        input.dispatch(&InputEvent::MouseUp(button));
                        input.dispatch(&InputEvent::Click(button));
                    }
                },
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion { delta },
                    ..
                } => {
                    input.dispatch(&InputEvent::MouseMove {
                        dx: delta.0,
                        dy: delta.1,
                    });
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                Event::WindowEvent {
                    event: WindowEvent::RedrawRequested,
                    ..
                } => {
                    let now = Instant::now();
                    let delta_time = now.duration_since(last_update_time).as_secs_f32();
                    last_update_time = now;

                    if let Err(err) = game.advance_frame(&mut input, delta_time) {
                        error!("frame failed: {err:#}");
                        target.exit();
                        return;
                    }

                    frame_count += 1;
                    let elapsed = fps_timer.elapsed().as_secs_f32();
                    if elapsed >= 1.0 {
                        let fps = frame_count as f32 / elapsed;
                        window.set_title(&format!("Ironsight - {fps:.0} FPS"));
                        frame_count = 0;
                        fps_timer = Instant::now();
                    }
                }
                _ => {}
            }
        })?;

        Ok(())
    }
}
