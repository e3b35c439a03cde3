use anyhow::Result;
use log::*;

use crate::config::Config;
use crate::frame::{FrameOutcome, FrameSynchronizer};
use crate::geometry::{Mesh, Vertex};
use crate::vulkan::{VulkanFrame, VulkanRenderer, MAX_FRAMES_IN_FLIGHT};
use crate::window::{AppWindow, WindowEvents};

#[derive(Debug)]
pub struct Renderer {
    pub vk_renderer: VulkanRenderer,
    frames: FrameSynchronizer,
}

impl Renderer {
    pub unsafe fn create(window: &AppWindow, config: &Config, mesh: Mesh) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window, config, mesh)?;
        let frames = FrameSynchronizer::new(MAX_FRAMES_IN_FLIGHT);

        Ok(Self { vk_renderer, frames })
    }

    /// Renders one frame. Nothing is drawn while the window is minimized.
    pub fn render(&mut self, window: &mut AppWindow, events: WindowEvents) -> Result<FrameOutcome> {
        self.frames.ensure_live()?;
        if events.resized {
            self.frames.notify_resized();
        }

        if window.is_minimized() {
            return Ok(FrameOutcome::Skipped);
        }

        let mut driver = VulkanFrame {
            renderer: &mut self.vk_renderer,
            window,
        };
        let outcome = self.frames.draw_frame(&mut driver)?;
        if outcome == FrameOutcome::Recreated {
            debug!("Swapchain recreated ({:?}).", self.vk_renderer.swapchain_extent());
        }

        Ok(outcome)
    }

    /// Rebuilds the swapchain for the current window size.
    pub fn recreate_swapchain(&mut self, window: &mut AppWindow) -> Result<()> {
        self.frames.ensure_live()?;
        unsafe { self.vk_renderer.recreate_swapchain(window) }
    }

    pub fn frames(&self) -> &FrameSynchronizer {
        &self.frames
    }

    /// Appends a triangle to the mesh; uploaded before the next frame is recorded.
    pub fn add_triangle(&mut self, triangle: [Vertex; 3]) {
        self.vk_renderer.mesh_mut().add_triangle(triangle);
        self.frames.mark_mesh_stale();
    }

    /// Replaces the mesh; uploaded before the next frame is recorded.
    pub fn update_mesh(&mut self, mesh: &Mesh) {
        self.vk_renderer.mesh_mut().update_mesh(mesh);
        self.frames.mark_mesh_stale();
    }

    pub unsafe fn destroy(&mut self) {
        self.frames.retire();
        self.vk_renderer.destroy();
    }
}
