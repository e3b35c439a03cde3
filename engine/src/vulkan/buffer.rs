use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, InstanceV1_0};

use super::context::VulkanContext;
use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use super::queue_family::QueueRole;
use crate::error::{ErrorKind, Fatal, RenderError};
use crate::geometry::Mesh;

/// First memory type allowed by `type_filter` whose flags include `flags`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory.memory_type_count).find(|i| {
        let allowed = type_filter & (1u32 << *i) != 0;
        allowed && memory.memory_types[*i as usize].property_flags.contains(flags)
    })
}

/// A buffer with its own dedicated allocation.
#[derive(Copy, Clone, Debug, Default)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub fn is_null(&self) -> bool {
        self.buffer.is_null()
    }

    /// Whether new contents of `size` bytes can be copied in place.
    pub fn matches_size(&self, size: vk::DeviceSize) -> bool {
        !self.is_null() && self.size == size
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        if !self.buffer.is_null() {
            device.vk_device.destroy_buffer(self.buffer, None);
        }
        if !self.memory.is_null() {
            device.vk_device.free_memory(self.memory, None);
        }
        *self = AllocatedBuffer::default();
    }
}

#[derive(Debug)]
pub struct VulkanBuffer;

impl VulkanBuffer {
    pub unsafe fn allocate_memory(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let memory = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);
        let memory_type = find_memory_type(&memory, requirements.memory_type_bits, properties)
            .fatal(ErrorKind::UpdateMemory, "Failed to find suitable memory type")?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        Ok(device
            .vk_device
            .allocate_memory(&info, None)
            .fatal(ErrorKind::UpdateMemory, "Failed to allocate memory")?)
    }

    pub unsafe fn create(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<AllocatedBuffer> {
        let families = device.queue_families.graphics_transfer();
        let sharing_mode = if families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families);

        let mut buffer = AllocatedBuffer {
            size,
            ..Default::default()
        };
        buffer.buffer = device
            .vk_device
            .create_buffer(&info, None)
            .fatal(ErrorKind::InitBuffer, "Failed to create buffer")?;

        let requirements = device.vk_device.get_buffer_memory_requirements(buffer.buffer);
        match VulkanBuffer::allocate_memory(instance, device, context, requirements, properties) {
            Ok(memory) => buffer.memory = memory,
            Err(error) => {
                buffer.destroy(device);
                return Err(error);
            }
        }

        if let Err(error) = device.vk_device.bind_buffer_memory(buffer.buffer, buffer.memory, 0) {
            buffer.destroy(device);
            return Err(RenderError::caused_by(ErrorKind::InitBuffer, "Failed to bind buffer memory", error).into());
        }

        Ok(buffer)
    }

    /// A host visible buffer holding a copy of `bytes`.
    unsafe fn create_staging(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        bytes: &[u8],
    ) -> Result<AllocatedBuffer> {
        let mut staging = VulkanBuffer::create(
            instance,
            device,
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        match device.vk_device.map_memory(
            staging.memory,
            0,
            staging.size,
            vk::MemoryMapFlags::empty(),
        ) {
            Ok(memory) => {
                memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
                device.vk_device.unmap_memory(staging.memory);
                Ok(staging)
            }
            Err(error) => {
                staging.destroy(device);
                Err(RenderError::caused_by(ErrorKind::UpdateMemory, "Failed to map staging memory", error).into())
            }
        }
    }

    /// Records and runs a single command buffer on the transfer queue, waiting
    /// for it to finish.
    unsafe fn one_shot<F>(device: &VulkanDevice, context: &VulkanContext, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = context.transfer_pool();
        let queue = context.queue(QueueRole::Transfer);

        let info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(pool)
            .command_buffer_count(1);

        let command_buffer = device
            .vk_device
            .allocate_command_buffers(&info)
            .fatal(ErrorKind::UpdateMemory, "Failed to allocate transfer command buffer")?[0];

        let result = (|| -> Result<()> {
            let info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .vk_device
                .begin_command_buffer(command_buffer, &info)
                .fatal(ErrorKind::UpdateRender, "Failed to begin transfer command buffer")?;

            record(command_buffer);

            device
                .vk_device
                .end_command_buffer(command_buffer)
                .fatal(ErrorKind::UpdateRender, "Failed to end transfer command buffer")?;

            let command_buffers = &[command_buffer];
            let info = vk::SubmitInfo::builder().command_buffers(command_buffers);
            device
                .vk_device
                .queue_submit(queue, &[info], vk::Fence::null())
                .fatal(ErrorKind::UpdateRender, "Failed to submit transfer")?;
            device
                .vk_device
                .queue_wait_idle(queue)
                .fatal(ErrorKind::UpdateRender, "Failed to wait for transfer queue")?;
            Ok(())
        })();

        device.vk_device.free_command_buffers(pool, &[command_buffer]);
        result
    }

    pub unsafe fn copy(
        device: &VulkanDevice,
        context: &VulkanContext,
        source: vk::Buffer,
        destination: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        VulkanBuffer::one_shot(device, context, |command_buffer| {
            let regions = vk::BufferCopy::builder().size(size);
            device
                .vk_device
                .cmd_copy_buffer(command_buffer, source, destination, &[regions]);
        })
    }

    /// Uploads `bytes` into a new device local buffer through a staging buffer.
    pub unsafe fn upload(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<AllocatedBuffer> {
        if bytes.is_empty() {
            return Ok(AllocatedBuffer::default());
        }

        let mut buffer = VulkanBuffer::create(
            instance,
            device,
            context,
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        if let Err(error) = VulkanBuffer::write(instance, device, context, bytes, &buffer) {
            buffer.destroy(device);
            return Err(error);
        }

        Ok(buffer)
    }

    /// Overwrites the start of `destination` with `bytes` through a staging buffer.
    pub unsafe fn write(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        bytes: &[u8],
        destination: &AllocatedBuffer,
    ) -> Result<()> {
        let mut staging = VulkanBuffer::create_staging(instance, device, context, bytes)?;
        let result = VulkanBuffer::copy(device, context, staging.buffer, destination.buffer, staging.size);
        staging.destroy(device);
        result
    }

    /// Copies a device local buffer back to the host.
    pub unsafe fn read_back(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        source: &AllocatedBuffer,
    ) -> Result<Vec<u8>> {
        if source.is_null() {
            return Ok(vec![]);
        }

        let mut staging = VulkanBuffer::create(
            instance,
            device,
            context,
            source.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = (|| -> Result<Vec<u8>> {
            VulkanBuffer::copy(device, context, source.buffer, staging.buffer, source.size)?;
            let memory = device
                .vk_device
                .map_memory(staging.memory, 0, staging.size, vk::MemoryMapFlags::empty())
                .fatal(ErrorKind::UpdateMemory, "Failed to map read back memory")?;
            let bytes = std::slice::from_raw_parts(memory as *const u8, staging.size as usize).to_vec();
            device.vk_device.unmap_memory(staging.memory);
            Ok(bytes)
        })();

        staging.destroy(device);
        result
    }
}

/// Device local vertex and index buffers for the current mesh. An empty mesh
/// has null buffers and is not drawn.
#[derive(Copy, Clone, Debug, Default)]
pub struct MeshBuffers {
    pub vertex: AllocatedBuffer,
    pub index: AllocatedBuffer,
    pub index_count: u32,
}

impl MeshBuffers {
    pub fn is_empty(&self) -> bool {
        self.index_count == 0 || self.vertex.is_null() || self.index.is_null()
    }

    /// Brings the buffers in line with `mesh`. A buffer whose size no longer
    /// matches is recreated; otherwise its contents are overwritten in place.
    pub unsafe fn update(
        &mut self,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        mesh: &Mesh,
    ) -> Result<()> {
        self.index_count = 0;

        MeshBuffers::update_buffer(
            &mut self.vertex,
            instance,
            device,
            context,
            mesh.vertex_bytes(),
            mesh.vertex_buffer_size(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        MeshBuffers::update_buffer(
            &mut self.index,
            instance,
            device,
            context,
            mesh.index_bytes(),
            mesh.index_buffer_size(),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        self.index_count = mesh.indices().len() as u32;
        debug!(
            "Staged mesh ({} vertices, {} indices).",
            mesh.vertices().len(),
            self.index_count
        );

        Ok(())
    }

    unsafe fn update_buffer(
        buffer: &mut AllocatedBuffer,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        bytes: &[u8],
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<()> {
        if buffer.matches_size(size) {
            return VulkanBuffer::write(instance, device, context, bytes, buffer);
        }

        buffer.destroy(device);
        *buffer = VulkanBuffer::upload(instance, device, context, bytes, usage)?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.vertex.destroy(device);
        self.index.destroy(device);
        self.index_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i].property_flags = *flags;
        }
        properties
    }

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;

    #[test]
    fn test_first_matching_type_wins() {
        let memory = memory_properties(&[DEVICE_LOCAL, HOST_VISIBLE | HOST_COHERENT, HOST_VISIBLE | HOST_COHERENT]);

        assert_eq!(find_memory_type(&memory, 0b111, DEVICE_LOCAL), Some(0));
        assert_eq!(find_memory_type(&memory, 0b111, HOST_VISIBLE | HOST_COHERENT), Some(1));
    }

    #[test]
    fn test_filter_excludes_types() {
        let memory = memory_properties(&[HOST_VISIBLE | HOST_COHERENT, DEVICE_LOCAL, HOST_VISIBLE | HOST_COHERENT]);

        assert_eq!(find_memory_type(&memory, 0b100, HOST_VISIBLE), Some(2));
        assert_eq!(find_memory_type(&memory, 0b010, HOST_VISIBLE), None);
    }

    #[test]
    fn test_flags_must_be_a_superset() {
        let memory = memory_properties(&[HOST_VISIBLE, DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT]);

        assert_eq!(find_memory_type(&memory, u32::MAX, HOST_VISIBLE | HOST_COHERENT), Some(1));
        assert_eq!(find_memory_type(&memory, u32::MAX, vk::MemoryPropertyFlags::empty()), Some(0));
    }

    #[test]
    fn test_types_beyond_count_are_ignored() {
        let mut memory = memory_properties(&[HOST_VISIBLE]);
        memory.memory_types[1].property_flags = DEVICE_LOCAL;

        assert_eq!(find_memory_type(&memory, u32::MAX, DEVICE_LOCAL), None);
    }

    #[test]
    fn test_empty_mesh_buffers() {
        let buffers = MeshBuffers::default();
        assert!(buffers.is_empty());
        assert!(buffers.vertex.is_null());
    }

    #[test]
    fn test_same_sized_mesh_is_copied_in_place() {
        let quad = Mesh::quad();
        let rebuilt = Mesh::from_triangles(&[
            [quad.vertices()[0], quad.vertices()[1], quad.vertices()[2]],
            [quad.vertices()[2], quad.vertices()[3], quad.vertices()[0]],
        ]);
        let buffer = AllocatedBuffer {
            buffer: vk::Buffer::from_raw(1),
            memory: vk::DeviceMemory::from_raw(2),
            size: quad.vertex_buffer_size(),
        };

        assert!(buffer.matches_size(rebuilt.vertex_buffer_size()));
        assert!(!buffer.matches_size(Mesh::from_triangles(&[[quad.vertices()[0]; 3]]).vertex_buffer_size()));
        assert!(!AllocatedBuffer::default().matches_size(0));
    }
}
