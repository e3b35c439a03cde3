use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::c_void;

use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{ExtDebugUtilsExtension, Handle, KhrSurfaceExtension};
use vulkanalia::window as vk_window;
use winit::window::Window;

use super::constants;
use super::context::VulkanContext;
use crate::config::Config;
use crate::error::{ErrorKind, Fatal, RenderError};

#[derive(Debug)]
pub struct VulkanInstance {
    pub vk_instance: Instance,
    pub validation: bool,
    pub layers: Vec<vk::ExtensionName>,
}

impl VulkanInstance {
    pub unsafe fn new(
        window: &Window,
        entry: &Entry,
        config: &Config,
        context: &mut VulkanContext,
    ) -> Result<VulkanInstance> {
        // Application Info
        let application_info = vk::ApplicationInfo::builder()
            .application_name(b"Ember\0")
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(b"Ember\0")
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 0, 0));

        // Layers
        let available_layers = entry
            .enumerate_instance_layer_properties()
            .fatal(ErrorKind::InitVulkan, "Failed to enumerate instance layers")?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();

        let layers = if config.enable_validation {
            config
                .validation_layers
                .iter()
                .map(|l| vk::ExtensionName::from_bytes(l.as_bytes()))
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        if let Some(missing) = layers.iter().find(|l| !available_layers.contains(l)) {
            return Err(RenderError::new(
                ErrorKind::InitVulkan,
                format!("Validation layer `{}` requested but not supported.", missing),
            )
            .into());
        }

        // Extensions
        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .fatal(ErrorKind::InitVulkan, "Failed to enumerate instance extensions")?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let mut extensions = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| **e)
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        let portability = cfg!(target_os = "macos")
            && entry.version().fatal(ErrorKind::InitVulkan, "Failed to query loader version")?
                >= constants::PORTABILITY_MACOS_VERSION;
        let flags = if portability {
            info!("Enabling extensions for macOS portability.");
            extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name);
            extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name);
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        if config.enable_validation {
            extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name);
        }

        if let Some(missing) = extensions.iter().find(|e| !available_extensions.contains(e)) {
            return Err(RenderError::new(
                ErrorKind::InitVulkan,
                format!("Required instance extension `{}` is not supported.", missing),
            )
            .into());
        }

        if config.verbose {
            info!("Available instance extensions: {}", join(&available_extensions));
            info!("Required instance extensions: {}", join(&extensions));
            info!("Available layers: {}", join(&available_layers));
            info!("Enabled layers: {}", join(&layers));
        }

        // Create
        let layer_names = layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();
        let extension_names = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();

        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names)
            .flags(flags);

        let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .user_callback(Some(debug_callback));

        if config.enable_validation {
            info = info.push_next(&mut debug_info);
        }

        let instance = entry
            .create_instance(&info, None)
            .fatal(ErrorKind::InitVulkan, "Failed to create instance")?;

        // Messenger
        if config.enable_validation {
            match instance.create_debug_utils_messenger_ext(&debug_info, None) {
                Ok(messenger) => context.messenger = messenger,
                Err(error) => {
                    instance.destroy_instance(None);
                    return Err(RenderError::caused_by(
                        ErrorKind::InitVulkan,
                        "Failed to create debug messenger",
                        error,
                    )
                    .into());
                }
            }
        }

        Ok(VulkanInstance {
            vk_instance: instance,
            validation: config.enable_validation,
            layers,
        })
    }

    pub unsafe fn create_surface(&self, window: &Window, context: &mut VulkanContext) -> Result<()> {
        context.surface = vk_window::create_surface(&self.vk_instance, window, window)
            .fatal(ErrorKind::InitWindow, "Failed to create window surface")?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, context: &mut VulkanContext) {
        if !context.surface.is_null() {
            self.vk_instance.destroy_surface_khr(context.surface, None);
            context.surface = vk::SurfaceKHR::null();
        }
        if !context.messenger.is_null() {
            self.vk_instance
                .destroy_debug_utils_messenger_ext(context.messenger, None);
            context.messenger = vk::DebugUtilsMessengerEXT::null();
        }
        self.vk_instance.destroy_instance(None);
    }
}

fn join<'a>(names: impl IntoIterator<Item = &'a vk::ExtensionName>) -> String {
    let mut names = names.into_iter().map(|n| n.to_string()).collect::<Vec<_>>();
    names.sort();
    names.join(", ")
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({:?}) {}", type_, message);
    } else {
        trace!("({:?}) {}", type_, message);
    }

    vk::FALSE
}
