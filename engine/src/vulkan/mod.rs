use std::fmt;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension},
    Entry,
};

use buffer::{MeshBuffers, VulkanBuffer};
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use descriptor::VulkanDescriptor;
use device::VulkanDevice;
use image::VulkanImage;
use instance::VulkanInstance;
use pipeline::VulkanPipeline;
use queue_family::QueueRole;
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;
use sync::VulkanSync;

use crate::camera::{Camera, UniformBufferObject};
use crate::config::Config;
use crate::error::{ErrorKind, Fatal, RenderError};
use crate::frame::{AcquireOutcome, FrameDriver, PresentOutcome};
use crate::geometry::Mesh;
use crate::window::AppWindow;

pub mod buffer;
pub mod command_buffer;
pub mod constants;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod queue_family;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use constants::MAX_FRAMES_IN_FLIGHT;

pub struct VulkanRenderer {
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    config: Config,
    camera: Camera,
    mesh: Mesh,
    start: Instant,
    destroyed: bool,
}

impl VulkanRenderer {
    pub unsafe fn new(window: &AppWindow, config: &Config, mesh: Mesh) -> Result<VulkanRenderer> {
        let loader = LibloadingLoader::new(LIBRARY)
            .map_err(|e| RenderError::caused_by(ErrorKind::InitVulkan, "Failed to load Vulkan library", e))?;
        let entry = Entry::new(loader)
            .map_err(|b| anyhow!("{}", b))
            .fatal(ErrorKind::InitVulkan, "Failed to load Vulkan entry points")?;

        let mut context = VulkanContext::default();
        let mut instance = VulkanInstance::new(window.window(), &entry, config, &mut context)?;

        let device = match instance
            .create_surface(window.window(), &mut context)
            .and_then(|_| VulkanDevice::new(&entry, &instance, config, &mut context))
        {
            Ok(device) => device,
            Err(error) => {
                instance.destroy(&mut context);
                return Err(error);
            }
        };

        let mut renderer = VulkanRenderer {
            _entry: entry,
            instance,
            device,
            context,
            config: config.clone(),
            camera: Camera::default(),
            mesh,
            start: Instant::now(),
            destroyed: false,
        };

        if let Err(error) = renderer.create_resources(window.framebuffer_size()) {
            renderer.destroy();
            return Err(error);
        }

        Ok(renderer)
    }

    unsafe fn create_resources(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        let instance = &self.instance;
        let device = &self.device;
        let context = &mut self.context;
        let frames = MAX_FRAMES_IN_FLIGHT;

        context.depth_format = VulkanImage::depth_format(instance, context)?;
        VulkanSwapchain::create(framebuffer_size, instance, device, context, self.config.verbose)?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanRenderPass::create(device, context)?;
        VulkanDescriptor::create_set_layout(device, context)?;
        VulkanPipeline::create(device, &self.config, context)?;
        VulkanCommandBuffer::create_command_pools(device, context)?;
        VulkanImage::create_depth_resources(instance, device, context)?;
        framebuffer::VulkanFramebuffer::create(device, context)?;

        let mut mesh_buffers = MeshBuffers::default();
        let result = mesh_buffers.update(instance, device, context, &self.mesh);
        context.mesh_buffers = mesh_buffers;
        result?;

        VulkanDescriptor::create_uniform_buffers(instance, device, context, frames)?;
        VulkanDescriptor::create_pool(device, context, frames)?;
        VulkanDescriptor::create_sets(device, context, frames)?;
        VulkanCommandBuffer::create_command_buffers(device, context, frames)?;
        VulkanSync::create(device, context, frames)?;

        Ok(())
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.context.swapchain_extent()
    }

    pub fn swapchain_image_count(&self) -> usize {
        self.context.swapchain_images.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.context.framebuffers.len()
    }

    pub fn mesh_buffers(&self) -> MeshBuffers {
        self.context.mesh_buffers
    }

    pub unsafe fn read_back_vertices(&self) -> Result<Vec<u8>> {
        VulkanBuffer::read_back(&self.instance, &self.device, &self.context, &self.context.mesh_buffers.vertex)
    }

    pub unsafe fn read_back_indices(&self) -> Result<Vec<u8>> {
        VulkanBuffer::read_back(&self.instance, &self.device, &self.context, &self.context.mesh_buffers.index)
    }

    /// Uploads `bytes` to a fresh device local buffer and copies them back.
    pub unsafe fn staging_round_trip(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = VulkanBuffer::upload(
            &self.instance,
            &self.device,
            &self.context,
            bytes,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )?;
        let result = VulkanBuffer::read_back(&self.instance, &self.device, &self.context, &buffer);
        buffer.destroy(&self.device);
        result
    }

    pub unsafe fn wait_for_frame(&self, frame: usize) -> Result<()> {
        self.device
            .vk_device
            .wait_for_fences(&[self.context.in_flight_fences[frame]], true, u64::MAX)
            .fatal(ErrorKind::UpdateRender, "Failed to wait for in-flight fence")?;
        Ok(())
    }

    /// The other frame in flight may still read the mesh buffers, so the
    /// device is idled before they are replaced.
    pub unsafe fn restage_mesh(&mut self) -> Result<()> {
        self.device
            .vk_device
            .device_wait_idle()
            .fatal(ErrorKind::UpdateRender, "Failed to wait for device idle")?;

        let mut mesh_buffers = std::mem::take(&mut self.context.mesh_buffers);
        let result = mesh_buffers.update(&self.instance, &self.device, &self.context, &self.mesh);
        self.context.mesh_buffers = mesh_buffers;
        result
    }

    pub unsafe fn acquire_image(&self, frame: usize) -> Result<AcquireOutcome> {
        let result = self.device.vk_device.acquire_next_image_khr(
            self.context.swapchain,
            u64::MAX,
            self.context.image_available_semaphores[frame],
            vk::Fence::null(),
        );

        match result {
            Ok((image_index, _)) => Ok(AcquireOutcome::Ready(image_index)),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(error) => Err(RenderError::caused_by(
                ErrorKind::UpdateRender,
                "Failed to acquire swapchain image",
                error,
            )
            .into()),
        }
    }

    pub unsafe fn reset_fence(&self, frame: usize) -> Result<()> {
        self.device
            .vk_device
            .reset_fences(&[self.context.in_flight_fences[frame]])
            .fatal(ErrorKind::UpdateRender, "Failed to reset in-flight fence")?;
        Ok(())
    }

    pub unsafe fn record(&self, frame: usize, image_index: u32) -> Result<()> {
        VulkanCommandBuffer::record(&self.device, &self.context, frame, image_index as usize)
    }

    pub unsafe fn write_uniforms(&self, frame: usize) {
        let extent = self.context.swapchain_extent();
        let time = self.start.elapsed().as_secs_f32();
        let ubo = UniformBufferObject::new(&self.camera, time, extent.width, extent.height);
        VulkanDescriptor::write_uniform_buffer(&self.context, frame, &ubo);
    }

    pub unsafe fn submit(&self, frame: usize) -> Result<()> {
        let wait_semaphores = &[self.context.image_available_semaphores[frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.context.command_buffers[frame]];
        let signal_semaphores = &[self.context.render_finished_semaphores[frame]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        self.device
            .vk_device
            .queue_submit(
                self.context.queue(QueueRole::Graphics),
                &[submit_info],
                self.context.in_flight_fences[frame],
            )
            .fatal(ErrorKind::UpdateRender, "Failed to submit draw command buffer")?;

        Ok(())
    }

    pub unsafe fn present(&self, frame: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphores = &[self.context.render_finished_semaphores[frame]];
        let swapchains = &[self.context.swapchain];
        let image_indices = &[image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = self
            .device
            .vk_device
            .queue_present_khr(self.context.queue(QueueRole::Present), &present_info);

        match result {
            Ok(vk::SuccessCode::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Ok(_) => Ok(PresentOutcome::Presented),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(error) => Err(RenderError::caused_by(
                ErrorKind::UpdateRender,
                "Failed to present swapchain image",
                error,
            )
            .into()),
        }
    }

    /// Rebuilds the swapchain for the current window size. While the window is
    /// minimized this keeps pumping events until it has a non-zero size again.
    pub unsafe fn recreate_swapchain(&mut self, window: &mut AppWindow) -> Result<()> {
        if self.destroyed {
            return Err(RenderError::new(ErrorKind::UpdateRender, "Renderer already cleaned up").into());
        }
        while window.is_minimized() {
            if window.should_close() {
                return Ok(());
            }
            window.wait_events();
        }

        VulkanSwapchain::recreate(
            window.framebuffer_size(),
            &self.instance,
            &self.device,
            &mut self.context,
            self.config.verbose,
        )
    }

    /// Waits for the GPU, then releases everything in reverse creation order.
    /// Safe to call on a partially built renderer, and more than once.
    pub unsafe fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Err(error) = self.device.vk_device.device_wait_idle() {
            error!("Failed to wait for device idle before teardown: {}", error);
        }

        let device = &self.device;
        let context = &mut self.context;

        VulkanSync::destroy(device, context);
        context.mesh_buffers.destroy(device);
        VulkanDescriptor::destroy(device, context);
        VulkanCommandBuffer::destroy(device, context);
        VulkanPipeline::destroy(device, context);
        VulkanSwapchain::destroy(device, context);

        self.device.destroy();
        self.instance.destroy(&mut self.context);
        info!("Destroyed Vulkan renderer.");
    }
}

impl fmt::Debug for VulkanRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanRenderer")
            .field("instance", &self.instance)
            .field("device", &self.device)
            .field("context", &self.context)
            .field("mesh", &self.mesh)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

/// Drives one frame of a [`VulkanRenderer`] for a window.
pub struct VulkanFrame<'a> {
    pub renderer: &'a mut VulkanRenderer,
    pub window: &'a mut AppWindow,
}

impl FrameDriver for VulkanFrame<'_> {
    fn wait_for_frame(&mut self, frame: usize) -> Result<()> {
        unsafe { self.renderer.wait_for_frame(frame) }
    }

    fn restage_mesh(&mut self) -> Result<()> {
        unsafe { self.renderer.restage_mesh() }
    }

    fn acquire_image(&mut self, frame: usize) -> Result<AcquireOutcome> {
        unsafe { self.renderer.acquire_image(frame) }
    }

    fn reset_fence(&mut self, frame: usize) -> Result<()> {
        unsafe { self.renderer.reset_fence(frame) }
    }

    fn record(&mut self, frame: usize, image_index: u32) -> Result<()> {
        unsafe { self.renderer.record(frame, image_index) }
    }

    fn write_uniforms(&mut self, frame: usize) -> Result<()> {
        unsafe { self.renderer.write_uniforms(frame) };
        Ok(())
    }

    fn submit(&mut self, frame: usize) -> Result<()> {
        unsafe { self.renderer.submit(frame) }
    }

    fn present(&mut self, frame: usize, image_index: u32) -> Result<PresentOutcome> {
        unsafe { self.renderer.present(frame, image_index) }
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        unsafe { self.renderer.recreate_swapchain(self.window) }
    }
}
