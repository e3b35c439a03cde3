use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSurfaceExtension, KhrSwapchainExtension};

use super::context::VulkanContext;
use super::device::VulkanDevice;
use super::framebuffer::VulkanFramebuffer;
use super::image::VulkanImage;
use super::instance::VulkanInstance;
use crate::error::{ErrorKind, Fatal};

/// What a surface supports on a given physical device. Always queried fresh.
#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let instance = &instance.vk_instance;
        Ok(Self {
            capabilities: instance
                .get_physical_device_surface_capabilities_khr(physical_device, surface)?,
            formats: instance.get_physical_device_surface_formats_khr(physical_device, surface)?,
            present_modes: instance
                .get_physical_device_surface_present_modes_khr(physical_device, surface)?,
        })
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The settings of one swapchain generation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn configure(support: &SwapchainSupport, framebuffer_size: (u32, u32)) -> Self {
        Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
        }
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .unwrap_or_default()
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `current_extent` is authoritative unless it holds the `u32::MAX` sentinel,
/// in which case the framebuffer size is clamped into the supported range.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum unless that is 0 (unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

#[derive(Debug)]
pub struct VulkanSwapchain;

impl VulkanSwapchain {
    pub unsafe fn create(
        framebuffer_size: (u32, u32),
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        verbose: bool,
    ) -> Result<()> {
        let support = SwapchainSupport::get(instance, context.surface, context.physical_device)
            .fatal(ErrorKind::InitVulkan, "Failed to query swapchain support")?;
        let config = SwapchainConfig::configure(&support, framebuffer_size);

        let families = device.queue_families.graphics_present();
        let sharing_mode = if families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        context.swapchain = device
            .vk_device
            .create_swapchain_khr(&info, None)
            .fatal(ErrorKind::InitVulkan, "Failed to create swapchain")?;
        context.swapchain_images = device
            .vk_device
            .get_swapchain_images_khr(context.swapchain)
            .fatal(ErrorKind::InitVulkan, "Failed to get swapchain images")?;
        context.swapchain_config = config;

        let message = format!(
            "Created swapchain ({} images, {}x{}, {:?}, {:?}, {:?}).",
            context.swapchain_images.len(),
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode,
            sharing_mode,
        );
        if verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }

        Ok(())
    }

    pub unsafe fn create_image_views(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let format = context.swapchain_config.surface_format.format;
        for image in context.swapchain_images.clone() {
            let view = VulkanImage::create_image_view(device, image, format, vk::ImageAspectFlags::COLOR)?;
            context.swapchain_image_views.push(view);
        }
        Ok(())
    }

    /// Creates the swapchain together with everything sized by it.
    pub unsafe fn create_all(
        framebuffer_size: (u32, u32),
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        verbose: bool,
    ) -> Result<()> {
        VulkanSwapchain::create(framebuffer_size, instance, device, context, verbose)?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanImage::create_depth_resources(instance, device, context)?;
        VulkanFramebuffer::create(device, context)?;
        Ok(())
    }

    /// Rebuilds the swapchain, its views, the depth buffer and the framebuffers.
    /// The render pass and pipeline survive since the surface format is fixed.
    pub unsafe fn recreate(
        framebuffer_size: (u32, u32),
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        verbose: bool,
    ) -> Result<()> {
        device
            .vk_device
            .device_wait_idle()
            .fatal(ErrorKind::UpdateRender, "Failed to wait for device idle")?;
        VulkanSwapchain::destroy(device, context);
        VulkanSwapchain::create_all(framebuffer_size, instance, device, context, verbose)
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        VulkanFramebuffer::destroy(device, context);
        VulkanImage::destroy_depth_resources(device, context);
        context
            .swapchain_image_views
            .drain(..)
            .for_each(|v| device.vk_device.destroy_image_view(v, None));
        if !context.swapchain.is_null() {
            device.vk_device.destroy_swapchain_khr(context.swapchain, None);
        }
        context.swapchain = vk::SwapchainKHR::null();
        context.swapchain_images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    const PREFERRED: (vk::Format, vk::ColorSpaceKHR) =
        (vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);

    #[test]
    fn test_preferred_format_is_chosen_wherever_it_appears() {
        let others = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let preferred = format(PREFERRED.0, PREFERRED.1);

        for position in 0..=others.len() {
            let mut formats = others.to_vec();
            formats.insert(position, preferred);
            assert_eq!(choose_surface_format(&formats), preferred);
        }
    }

    #[test]
    fn test_first_format_without_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), formats[0]);
    }

    #[test]
    fn test_present_mode() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::IMMEDIATE, Mode::FIFO]), Mode::FIFO);
        assert_eq!(choose_present_mode(&[Mode::FIFO_RELAXED, Mode::FIFO]), Mode::FIFO);
    }

    #[test]
    fn test_current_extent_is_used_verbatim() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096));
        for size in [(0, 0), (640, 480), (9000, 9000)] {
            assert_eq!(choose_extent(&caps, size), vk::Extent2D { width: 1024, height: 768 });
        }
    }

    #[test]
    fn test_undefined_extent_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 200), (1000, 800));

        assert_eq!(choose_extent(&caps, (640, 480)), vk::Extent2D { width: 640, height: 480 });
        assert_eq!(choose_extent(&caps, (50, 50)), vk::Extent2D { width: 100, height: 200 });
        assert_eq!(choose_extent(&caps, (5000, 5000)), vk::Extent2D { width: 1000, height: 800 });
        assert_eq!(choose_extent(&caps, (50, 5000)), vk::Extent2D { width: 100, height: 800 });
    }

    #[test]
    fn test_image_count() {
        let mut caps = capabilities((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_configure_is_idempotent() {
        let support = SwapchainSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096)),
            formats: vec![
                format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(PREFERRED.0, PREFERRED.1),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let first = SwapchainConfig::configure(&support, (800, 600));
        let second = SwapchainConfig::configure(&support, (800, 600));

        assert_eq!(first, second);
        assert_eq!(first.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(first.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_adequate_support() {
        let mut support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!support.is_adequate());

        support.formats.push(format(PREFERRED.0, PREFERRED.1));
        assert!(support.is_adequate());

        support.present_modes.clear();
        assert!(!support.is_adequate());
    }
}
