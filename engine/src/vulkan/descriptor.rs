use std::mem::size_of;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::buffer::VulkanBuffer;
use super::context::VulkanContext;
use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use crate::camera::UniformBufferObject;
use crate::error::{ErrorKind, Fatal};

#[derive(Debug)]
pub struct VulkanDescriptor;

impl VulkanDescriptor {
    /// Binding 0: the per-frame uniform buffer, read by the vertex stage.
    pub unsafe fn create_set_layout(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX);

        let bindings = &[ubo_binding];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        context.descriptor_set_layout = device
            .vk_device
            .create_descriptor_set_layout(&info, None)
            .fatal(ErrorKind::InitPipeline, "Failed to create descriptor set layout")?;

        Ok(())
    }

    /// One host visible uniform buffer per frame in flight, mapped for its
    /// whole lifetime.
    pub unsafe fn create_uniform_buffers(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        frames: usize,
    ) -> Result<()> {
        for _ in 0..frames {
            let buffer = VulkanBuffer::create(
                instance,
                device,
                context,
                size_of::<UniformBufferObject>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            context.uniform_buffers.push(buffer);

            let memory = device
                .vk_device
                .map_memory(buffer.memory, 0, buffer.size, vk::MemoryMapFlags::empty())
                .fatal(ErrorKind::UpdateMemory, "Failed to map uniform buffer")?;
            context.uniform_buffers_mapped.push(memory);
        }

        Ok(())
    }

    pub unsafe fn write_uniform_buffer(context: &VulkanContext, frame: usize, ubo: &UniformBufferObject) {
        let bytes = bytemuck::bytes_of(ubo);
        memcpy(bytes.as_ptr(), context.uniform_buffers_mapped[frame].cast(), bytes.len());
    }

    pub unsafe fn create_pool(device: &VulkanDevice, context: &mut VulkanContext, frames: usize) -> Result<()> {
        let ubo_size = vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(frames as u32);

        let pool_sizes = &[ubo_size];
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(pool_sizes)
            .max_sets(frames as u32);

        context.descriptor_pool = device
            .vk_device
            .create_descriptor_pool(&info, None)
            .fatal(ErrorKind::InitBuffer, "Failed to create descriptor pool")?;

        Ok(())
    }

    pub unsafe fn create_sets(device: &VulkanDevice, context: &mut VulkanContext, frames: usize) -> Result<()> {
        let layouts = vec![context.descriptor_set_layout; frames];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(&layouts);

        context.descriptor_sets = device
            .vk_device
            .allocate_descriptor_sets(&info)
            .fatal(ErrorKind::InitBuffer, "Failed to allocate descriptor sets")?;

        for (set, buffer) in context.descriptor_sets.iter().zip(&context.uniform_buffers) {
            let info = vk::DescriptorBufferInfo::builder()
                .buffer(buffer.buffer)
                .offset(0)
                .range(size_of::<UniformBufferObject>() as u64);

            let buffer_info = &[info];
            let ubo_write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(buffer_info);

            device
                .vk_device
                .update_descriptor_sets(&[ubo_write], &[] as &[vk::CopyDescriptorSet]);
        }

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.descriptor_pool.is_null() {
            device.vk_device.destroy_descriptor_pool(context.descriptor_pool, None);
        }
        context.descriptor_pool = vk::DescriptorPool::null();
        context.descriptor_sets.clear();

        // Freeing the memory implicitly unmaps it.
        context.uniform_buffers_mapped.clear();
        context
            .uniform_buffers
            .drain(..)
            .for_each(|mut b| b.destroy(device));

        if !context.descriptor_set_layout.is_null() {
            device
                .vk_device
                .destroy_descriptor_set_layout(context.descriptor_set_layout, None);
        }
        context.descriptor_set_layout = vk::DescriptorSetLayout::null();
    }
}
