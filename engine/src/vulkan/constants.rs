use vulkanalia::{vk, Version};

pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
