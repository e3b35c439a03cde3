use anyhow::Result;
use log::*;

use crate::error::{ErrorKind, RenderError};

/// Result of acquiring a swapchain image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// What happened to a single call of [`FrameSynchronizer::draw_frame`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented,
    /// The frame was submitted and the swapchain was rebuilt after presenting.
    Recreated,
    /// Acquire reported an out of date swapchain; nothing was submitted.
    Skipped,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// The GPU side of a frame. Every method operates on the frame slot it is
/// given; errors are fatal and are never retried by the synchronizer.
pub trait FrameDriver {
    /// Blocks until the slot's in-flight fence is signaled.
    fn wait_for_frame(&mut self, frame: usize) -> Result<()>;
    /// Uploads the current mesh into the vertex and index buffers.
    fn restage_mesh(&mut self) -> Result<()>;
    fn acquire_image(&mut self, frame: usize) -> Result<AcquireOutcome>;
    /// Resets the slot's fence so the next submit can signal it.
    fn reset_fence(&mut self, frame: usize) -> Result<()>;
    fn record(&mut self, frame: usize, image_index: u32) -> Result<()>;
    fn write_uniforms(&mut self, frame: usize) -> Result<()>;
    fn submit(&mut self, frame: usize) -> Result<()>;
    fn present(&mut self, frame: usize, image_index: u32) -> Result<PresentOutcome>;
    fn recreate_swapchain(&mut self) -> Result<()>;
}

/// Per-frame handshake between the CPU and the GPU timeline.
#[derive(Debug)]
pub struct FrameSynchronizer {
    frames_in_flight: usize,
    current_frame: usize,
    mesh_stale: bool,
    resize_pending: bool,
    retired: bool,
    state: FrameState,
}

impl FrameSynchronizer {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_frame: 0,
            mesh_stale: false,
            resize_pending: false,
            retired: false,
            state: FrameState::Idle,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_mesh_stale(&self) -> bool {
        self.mesh_stale
    }

    pub fn is_resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Requests a re-upload before the next frame is recorded. Repeated calls
    /// collapse into one upload.
    pub fn mark_mesh_stale(&mut self) {
        self.mesh_stale = true;
    }

    /// Requests a swapchain rebuild after the next present.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    /// Marks the GPU resources behind the frames as released. Every later
    /// frame fails without reaching the driver.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn ensure_live(&self) -> Result<()> {
        if self.retired {
            return Err(RenderError::new(ErrorKind::UpdateRender, "Renderer already cleaned up").into());
        }
        Ok(())
    }

    pub fn draw_frame<D: FrameDriver>(&mut self, driver: &mut D) -> Result<FrameOutcome> {
        self.ensure_live()?;
        let frame = self.current_frame;

        self.state = FrameState::Idle;
        driver.wait_for_frame(frame)?;

        if self.mesh_stale {
            driver.restage_mesh()?;
            self.mesh_stale = false;
        }

        self.state = FrameState::Acquiring;
        let image_index = match driver.acquire_image(frame)? {
            AcquireOutcome::Ready(image_index) => image_index,
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire (frame {}).", frame);
                driver.recreate_swapchain()?;
                self.resize_pending = false;
                self.state = FrameState::Idle;
                return Ok(FrameOutcome::Skipped);
            }
        };

        self.state = FrameState::Recording;
        driver.reset_fence(frame)?;
        driver.record(frame, image_index)?;
        driver.write_uniforms(frame)?;
        driver.submit(frame)?;

        self.state = FrameState::Submitted;
        self.current_frame = (frame + 1) % self.frames_in_flight;

        self.state = FrameState::Presenting;
        let presented = driver.present(frame, image_index)?;
        let rebuild = presented != PresentOutcome::Presented || self.resize_pending;
        if rebuild {
            debug!(
                "Rebuilding swapchain after present ({:?}, resize pending: {}).",
                presented, self.resize_pending
            );
            driver.recreate_swapchain()?;
            self.resize_pending = false;
        }

        self.state = FrameState::Idle;
        Ok(if rebuild {
            FrameOutcome::Recreated
        } else {
            FrameOutcome::Presented
        })
    }
}
