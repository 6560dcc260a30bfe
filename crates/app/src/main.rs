//! vkframe demo: spinning textured quads.
//!
//! Usage: `vkframe [engine.toml]`. A missing config file falls back to
//! defaults.

mod scene;
mod window;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use vkframe_core::{EngineConfig, FrameClock};
use vkframe_renderer::Renderer;

use crate::scene::{Scene, view_matrix};
use crate::window::Window;

const DEFAULT_CONFIG_PATH: &str = "engine.toml";

struct App {
    config: EngineConfig,
    // Field order is drop order: scene, then renderer, then the window it
    // presents to.
    scene: Option<Scene>,
    renderer: Option<Renderer>,
    window: Option<Window>,
    clock: FrameClock,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            scene: None,
            renderer: None,
            window: None,
            clock: FrameClock::new(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let (display, handle) = window.raw_handles()?;

        // SAFETY: `window` is stored after `renderer` and so outlives it.
        let renderer = unsafe {
            Renderer::new(&self.config, display, handle, window.width(), window.height())?
        };
        let scene = Scene::new(&renderer)?;

        self.scene = Some(scene);
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.clock.reset();
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer), Some(scene)) =
            (&self.window, &mut self.renderer, &mut self.scene)
        else {
            return Ok(());
        };

        if window.is_minimized() {
            return Ok(());
        }

        self.clock.tick();
        scene.update(self.clock.elapsed_secs());
        renderer.render_frame(view_matrix(), &scene.drawables())?;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("Initialization failed: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("Render error: {:#}", e);
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let (Some(scene), Some(renderer)) = (self.scene.take(), self.renderer.as_ref())
            && let Err(e) = scene.destroy(renderer)
        {
            warn!("Scene teardown failed: {}", e);
        }

        info!(
            "Rendered {} frame(s), {:.1} fps average",
            self.clock.frame_count(),
            self.clock.average_fps()
        );
    }
}

fn main() -> Result<()> {
    vkframe_core::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = EngineConfig::load_or_default(&config_path)?;

    info!("Starting vkframe with {:?}", config_path);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
