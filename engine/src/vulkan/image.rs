use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, InstanceV1_0};

use super::buffer::VulkanBuffer;
use super::context::VulkanContext;
use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use crate::error::{ErrorKind, Fatal, RenderError};

const DEPTH_FORMATS: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Debug)]
pub struct VulkanImage;

impl VulkanImage {
    pub unsafe fn create_image(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::_1);

        let image = device
            .vk_device
            .create_image(&info, None)
            .fatal(ErrorKind::InitBuffer, "Failed to create image")?;

        let requirements = device.vk_device.get_image_memory_requirements(image);
        let memory = match VulkanBuffer::allocate_memory(instance, device, context, requirements, properties) {
            Ok(memory) => memory,
            Err(error) => {
                device.vk_device.destroy_image(image, None);
                return Err(error);
            }
        };
        if let Err(error) = device.vk_device.bind_image_memory(image, memory, 0) {
            device.vk_device.destroy_image(image, None);
            device.vk_device.free_memory(memory, None);
            return Err(RenderError::caused_by(ErrorKind::InitBuffer, "Failed to bind image memory", error).into());
        }

        Ok((image, memory))
    }

    pub unsafe fn create_image_view(
        device: &VulkanDevice,
        image: vk::Image,
        format: vk::Format,
        aspects: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let subresource_range = vk::ImageSubresourceRange::builder()
            .aspect_mask(aspects)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::_2D)
            .format(format)
            .subresource_range(subresource_range);

        Ok(device
            .vk_device
            .create_image_view(&info, None)
            .fatal(ErrorKind::InitVulkan, "Failed to create image view")?)
    }

    /// First of `candidates` supporting `features` with optimal tiling.
    pub unsafe fn find_supported_format(
        instance: &VulkanInstance,
        context: &VulkanContext,
        candidates: &[vk::Format],
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        Ok(candidates
            .iter()
            .copied()
            .find(|f| {
                instance
                    .vk_instance
                    .get_physical_device_format_properties(context.physical_device, *f)
                    .optimal_tiling_features
                    .contains(features)
            })
            .fatal(ErrorKind::InitVulkan, "Failed to find supported depth format")?)
    }

    pub unsafe fn depth_format(instance: &VulkanInstance, context: &VulkanContext) -> Result<vk::Format> {
        VulkanImage::find_supported_format(
            instance,
            context,
            DEPTH_FORMATS,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    pub unsafe fn create_depth_resources(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let format = context.depth_format;
        debug!(
            "Creating depth buffer ({:?}, stencil: {}).",
            format,
            has_stencil_component(format)
        );
        let (image, memory) = VulkanImage::create_image(
            instance,
            device,
            context,
            context.swapchain_extent(),
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        context.depth_image = image;
        context.depth_image_memory = memory;
        context.depth_image_view =
            VulkanImage::create_image_view(device, image, format, vk::ImageAspectFlags::DEPTH)?;
        Ok(())
    }

    pub unsafe fn destroy_depth_resources(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.depth_image_view.is_null() {
            device.vk_device.destroy_image_view(context.depth_image_view, None);
        }
        if !context.depth_image.is_null() {
            device.vk_device.destroy_image(context.depth_image, None);
        }
        if !context.depth_image_memory.is_null() {
            device.vk_device.free_memory(context.depth_image_memory, None);
        }
        context.depth_image_view = vk::ImageView::null();
        context.depth_image = vk::Image::null();
        context.depth_image_memory = vk::DeviceMemory::null();
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stencil_formats() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }
}
