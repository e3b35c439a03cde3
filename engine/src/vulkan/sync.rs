use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::{context::VulkanContext, device::VulkanDevice};
use crate::error::{ErrorKind, Fatal};

#[derive(Debug)]
pub struct VulkanSync;

impl VulkanSync {
    /// Per frame: an image-available and a render-finished semaphore, and an
    /// in-flight fence created signaled so the first wait returns at once.
    pub unsafe fn create(device: &VulkanDevice, context: &mut VulkanContext, frames: usize) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..frames {
            context.image_available_semaphores.push(
                device
                    .vk_device
                    .create_semaphore(&semaphore_info, None)
                    .fatal(ErrorKind::InitVulkan, "Failed to create semaphore")?,
            );
            context.render_finished_semaphores.push(
                device
                    .vk_device
                    .create_semaphore(&semaphore_info, None)
                    .fatal(ErrorKind::InitVulkan, "Failed to create semaphore")?,
            );
            context.in_flight_fences.push(
                device
                    .vk_device
                    .create_fence(&fence_info, None)
                    .fatal(ErrorKind::InitVulkan, "Failed to create fence")?,
            );
        }

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .in_flight_fences
            .drain(..)
            .for_each(|f| device.vk_device.destroy_fence(f, None));
        context
            .render_finished_semaphores
            .drain(..)
            .for_each(|s| device.vk_device.destroy_semaphore(s, None));
        context
            .image_available_semaphores
            .drain(..)
            .for_each(|s| device.vk_device.destroy_semaphore(s, None));
    }
}
