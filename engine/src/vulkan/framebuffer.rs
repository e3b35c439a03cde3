use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::{context::VulkanContext, device::VulkanDevice};
use crate::error::{ErrorKind, Fatal};

#[derive(Debug)]
pub struct VulkanFramebuffer;

impl VulkanFramebuffer {
    /// One framebuffer per swapchain image view, all sharing the depth view.
    pub unsafe fn create(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let extent = context.swapchain_extent();
        for view in context.swapchain_image_views.clone() {
            let attachments = &[view, context.depth_image_view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(context.render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = device
                .vk_device
                .create_framebuffer(&create_info, None)
                .fatal(ErrorKind::InitVulkan, "Failed to create framebuffer")?;
            context.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .framebuffers
            .drain(..)
            .for_each(|f| device.vk_device.destroy_framebuffer(f, None));
    }
}
