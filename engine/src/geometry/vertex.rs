use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use vulkanalia::vk::{self, HasBuilder};

/// Vertex layout consumed by `shaders/shader.vert`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: Vec3, normal: Vec3, color: Vec3) -> Self {
        Self { pos, normal, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let attribute = |location: u32, offset: usize| {
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(location)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset as u32)
                .build()
        };

        [
            attribute(0, offset_of!(Vertex, pos)),
            attribute(1, offset_of!(Vertex, normal)),
            attribute(2, offset_of!(Vertex, color)),
        ]
    }
}
