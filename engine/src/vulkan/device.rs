use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::{
    vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0},
    Device, Entry,
};

use super::{
    constants,
    context::VulkanContext,
    instance::VulkanInstance,
    queue_family::{QueueFamilyIndices, QueueRole},
    swapchain::SwapchainSupport,
};
use crate::config::Config;
use crate::error::{ErrorKind, Fatal, RenderError};

#[derive(Debug)]
pub struct VulkanDevice {
    pub vk_device: Device,
    pub queue_families: QueueFamilyIndices,
}

#[derive(Debug, Error)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

impl VulkanDevice {
    /// Evaluates every physical device and keeps the first suitable one.
    unsafe fn pick_physical_device(
        instance: &VulkanInstance,
        config: &Config,
        context: &mut VulkanContext,
    ) -> Result<QueueFamilyIndices> {
        let physical_devices = instance
            .vk_instance
            .enumerate_physical_devices()
            .fatal(ErrorKind::InitVulkan, "Failed to enumerate physical devices")?;

        if physical_devices.is_empty() {
            return Err(RenderError::new(ErrorKind::InitVulkan, "Failed to find GPUs with Vulkan support.").into());
        }

        let mut selected = None;
        for physical_device in physical_devices {
            let properties = instance
                .vk_instance
                .get_physical_device_properties(physical_device);

            match VulkanDevice::check_physical_device(instance, context, physical_device) {
                Err(error) => warn!(
                    "Skipping physical device (`{}`): {}",
                    properties.device_name, error
                ),
                Ok(indices) if selected.is_none() => {
                    info!("Selected physical device (`{}`).", properties.device_name);
                    if config.verbose {
                        info!("Queue families ({}).", indices);
                    }
                    selected = Some((physical_device, indices));
                }
                Ok(_) => debug!("Physical device (`{}`) is also suitable.", properties.device_name),
            }
        }

        match selected {
            Some((physical_device, indices)) => {
                context.physical_device = physical_device;
                Ok(indices)
            }
            None => Err(RenderError::new(ErrorKind::InitVulkan, "Failed to find a suitable GPU.").into()),
        }
    }

    unsafe fn check_physical_device(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<QueueFamilyIndices> {
        let indices = QueueFamilyIndices::query(instance, context.surface, physical_device)?;
        VulkanDevice::check_physical_device_extensions(instance, physical_device)?;

        let support = SwapchainSupport::get(instance, context.surface, physical_device)?;
        if !support.is_adequate() {
            return Err(anyhow!(SuitabilityError("sufficient swapchain support")));
        }

        Ok(indices)
    }

    unsafe fn check_physical_device_extensions(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<()> {
        let extensions = instance
            .vk_instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        if constants::DEVICE_EXTENSIONS.iter().all(|e| extensions.contains(e)) {
            Ok(())
        } else {
            Err(anyhow!(SuitabilityError("required device extensions")))
        }
    }

    pub unsafe fn new(
        entry: &Entry,
        instance: &VulkanInstance,
        config: &Config,
        context: &mut VulkanContext,
    ) -> Result<VulkanDevice> {
        let queue_families = VulkanDevice::pick_physical_device(instance, config, context)?;

        let queue_priorities = &[1.0];
        let queue_infos = queue_families
            .unique_indices()
            .iter()
            .map(|i| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*i)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        let layers = instance.layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();

        let mut extensions = constants::DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        if cfg!(target_os = "macos") && entry.version()? >= constants::PORTABILITY_MACOS_VERSION {
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder();

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(context.physical_device, &info, None)
            .fatal(ErrorKind::InitVulkan, "Failed to create logical device")?;

        for role in QueueRole::ALL {
            context.queues[role as usize] = device.get_device_queue(queue_families.index(role), 0);
        }

        Ok(VulkanDevice {
            vk_device: device,
            queue_families,
        })
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_device.destroy_device(None);
    }
}
