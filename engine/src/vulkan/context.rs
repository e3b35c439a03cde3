use std::ffi::c_void;

use vulkanalia::vk::{self, Handle};

use super::buffer::{AllocatedBuffer, MeshBuffers};
use super::queue_family::QueueRole;
use super::swapchain::SwapchainConfig;

/// The Vulkan handles owned by the renderer. Every field starts out null so a
/// partially built context can be torn down by the same routine as a full one.
#[derive(Clone, Debug, Default)]
pub struct VulkanContext {
    pub messenger: vk::DebugUtilsMessengerEXT,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub queues: [vk::Queue; QueueRole::COUNT],

    // Swapchain
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_config: SwapchainConfig,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub depth_format: vk::Format,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,

    // Pipeline
    pub render_pass: vk::RenderPass,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,

    // Commands
    pub graphics_command_pool: vk::CommandPool,
    pub transfer_command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,

    // Buffers
    pub mesh_buffers: MeshBuffers,
    pub uniform_buffers: Vec<AllocatedBuffer>,
    pub uniform_buffers_mapped: Vec<*mut c_void>,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,

    // Sync
    pub image_available_semaphores: Vec<vk::Semaphore>,
    pub render_finished_semaphores: Vec<vk::Semaphore>,
    pub in_flight_fences: Vec<vk::Fence>,
}

impl VulkanContext {
    pub fn queue(&self, role: QueueRole) -> vk::Queue {
        self.queues[role as usize]
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_config.extent
    }

    /// The pool used for one-shot copies.
    pub fn transfer_pool(&self) -> vk::CommandPool {
        if self.transfer_command_pool.is_null() {
            self.graphics_command_pool
        } else {
            self.transfer_command_pool
        }
    }
}
