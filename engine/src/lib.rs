#![allow(clippy::too_many_arguments, clippy::missing_safety_doc)]

use anyhow::Result;
use log::*;

pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod renderer;
pub mod vulkan;
pub mod window;

pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use error::{ErrorKind, RenderError};
pub use frame::FrameOutcome;
pub use geometry::{Mesh, Vertex};
pub use renderer::Renderer;
pub use window::AppWindow;

#[derive(Debug)]
pub struct Engine {
    window: AppWindow,
    renderer: Renderer,
    cleaned_up: bool,
}

impl Engine {
    /// Opens a window and renders the default quad into it.
    pub fn new(config: &Config) -> Result<Engine> {
        Engine::with_mesh(config, Mesh::quad())
    }

    pub fn with_mesh(config: &Config, mesh: Mesh) -> Result<Engine> {
        let window = AppWindow::new(config)?;
        Engine::with_window(window, config, mesh)
    }

    pub fn with_window(window: AppWindow, config: &Config, mesh: Mesh) -> Result<Engine> {
        let renderer = unsafe { Renderer::create(&window, config, mesh)? };
        info!("Engine initialized ({}x{}).", config.width, config.height);

        Ok(Engine {
            window,
            renderer,
            cleaned_up: false,
        })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Polls window events and renders one frame.
    pub fn update(&mut self) -> Result<FrameOutcome> {
        self.renderer.frames().ensure_live()?;
        let events = self.window.poll_events();
        if self.window.should_close() {
            return Ok(FrameOutcome::Skipped);
        }
        self.renderer.render(&mut self.window, events)
    }

    pub fn add_triangle(&mut self, triangle: [Vertex; 3]) {
        self.renderer.add_triangle(triangle);
    }

    pub fn update_mesh(&mut self, mesh: &Mesh) {
        self.renderer.update_mesh(mesh);
    }

    /// Rebuilds the swapchain for the current window size.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        self.renderer.recreate_swapchain(&mut self.window)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn window(&self) -> &AppWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut AppWindow {
        &mut self.window
    }

    /// Releases every GPU resource. Further calls do nothing.
    pub fn clean_up(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        unsafe { self.renderer.destroy() };
    }

    pub fn run(mut self) -> Result<()> {
        while !self.should_close() {
            self.update()?;
        }
        self.clean_up();
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.clean_up();
    }
}
