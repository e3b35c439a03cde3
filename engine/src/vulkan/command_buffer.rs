use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{
    constants,
    context::VulkanContext,
    device::VulkanDevice,
    queue_family::QueueRole,
};
use crate::error::{ErrorKind, Fatal};

#[derive(Debug)]
pub struct VulkanCommandBuffer;

impl VulkanCommandBuffer {
    /// A resettable pool on the graphics family, plus a transient pool on the
    /// transfer family when it is a separate one.
    pub unsafe fn create_command_pools(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let families = &device.queue_families;

        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(families.index(QueueRole::Graphics));
        context.graphics_command_pool = device
            .vk_device
            .create_command_pool(&info, None)
            .fatal(ErrorKind::InitBuffer, "Failed to create graphics command pool")?;

        if families.separate_transfer_queue() {
            let info = vk::CommandPoolCreateInfo::builder()
                .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                .queue_family_index(families.index(QueueRole::Transfer));
            context.transfer_command_pool = device
                .vk_device
                .create_command_pool(&info, None)
                .fatal(ErrorKind::InitBuffer, "Failed to create transfer command pool")?;
        }

        Ok(())
    }

    pub unsafe fn create_command_buffers(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        frames: usize,
    ) -> Result<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.graphics_command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames as u32);

        context.command_buffers = device
            .vk_device
            .allocate_command_buffers(&allocate_info)
            .fatal(ErrorKind::InitBuffer, "Failed to allocate command buffers")?;

        Ok(())
    }

    /// Re-records the frame's command buffer to draw the mesh into `image_index`.
    pub unsafe fn record(
        device: &VulkanDevice,
        context: &VulkanContext,
        frame: usize,
        image_index: usize,
    ) -> Result<()> {
        let command_buffer = context.command_buffers[frame];
        let extent = context.swapchain_extent();

        device
            .vk_device
            .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
            .fatal(ErrorKind::UpdateRender, "Failed to reset command buffer")?;

        let info = vk::CommandBufferBeginInfo::builder();
        device
            .vk_device
            .begin_command_buffer(command_buffer, &info)
            .fatal(ErrorKind::UpdateRender, "Failed to begin recording command buffer")?;

        let render_area = vk::Rect2D::builder()
            .offset(vk::Offset2D::default())
            .extent(extent);

        let color_clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: constants::CLEAR_COLOR,
            },
        };
        let depth_clear_value = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };

        let clear_values = &[color_clear_value, depth_clear_value];
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(context.render_pass)
            .framebuffer(context.framebuffers[image_index])
            .render_area(render_area)
            .clear_values(clear_values);

        device
            .vk_device
            .cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);

        device.vk_device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            context.pipeline,
        );

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        device.vk_device.cmd_set_viewport(command_buffer, 0, &[viewport]);

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent);
        device.vk_device.cmd_set_scissor(command_buffer, 0, &[scissor]);

        let mesh = &context.mesh_buffers;
        if !mesh.is_empty() {
            device
                .vk_device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[mesh.vertex.buffer], &[0]);
            device.vk_device.cmd_bind_index_buffer(
                command_buffer,
                mesh.index.buffer,
                0,
                vk::IndexType::UINT32,
            );
            device.vk_device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline_layout,
                0,
                &[context.descriptor_sets[frame]],
                &[],
            );
            device
                .vk_device
                .cmd_draw_indexed(command_buffer, mesh.index_count, 1, 0, 0, 0);
        }

        device.vk_device.cmd_end_render_pass(command_buffer);

        device
            .vk_device
            .end_command_buffer(command_buffer)
            .fatal(ErrorKind::UpdateRender, "Failed to record command buffer")?;

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        // Command buffers are freed with their pool.
        context.command_buffers.clear();
        if !context.transfer_command_pool.is_null() {
            device
                .vk_device
                .destroy_command_pool(context.transfer_command_pool, None);
        }
        if !context.graphics_command_pool.is_null() {
            device
                .vk_device
                .destroy_command_pool(context.graphics_command_pool, None);
        }
        context.transfer_command_pool = vk::CommandPool::null();
        context.graphics_command_pool = vk::CommandPool::null();
    }
}
