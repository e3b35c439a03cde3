use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::shader::VulkanShader;
use super::{context::VulkanContext, device::VulkanDevice};
use crate::config::Config;
use crate::error::{ErrorKind, Fatal};
use crate::geometry::Vertex;

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    pub unsafe fn create(device: &VulkanDevice, config: &Config, context: &mut VulkanContext) -> Result<()> {
        VulkanShader::compile(config);
        let vert = VulkanShader::read(&config.vertex_shader_binary())?;
        let frag = VulkanShader::read(&config.fragment_shader_binary())?;

        let vertex_shader_module = VulkanShader::create_module(device, &vert)?;
        let fragment_shader_module = match VulkanShader::create_module(device, &frag) {
            Ok(module) => module,
            Err(error) => {
                device.vk_device.destroy_shader_module(vertex_shader_module, None);
                return Err(error);
            }
        };

        let result = VulkanPipeline::create_with_modules(
            device,
            context,
            vertex_shader_module,
            fragment_shader_module,
        );

        // destroy shader modules
        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        result
    }

    unsafe fn create_with_modules(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        vertex_shader_module: vk::ShaderModule,
        fragment_shader_module: vk::ShaderModule,
    ) -> Result<()> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // viewport and scissor are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

        // rasterizer
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        // multisampling
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        // depth
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // color blending
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments)
            .blend_constants([0.0, 0.0, 0.0, 0.0]);

        // layout
        let set_layouts = &[context.descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        context.pipeline_layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)
            .fatal(ErrorKind::InitPipeline, "Failed to create pipeline layout")?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        context.pipeline = device
            .vk_device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
            .fatal(ErrorKind::InitPipeline, "Failed to create graphics pipeline")?
            .0[0];

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.pipeline.is_null() {
            device.vk_device.destroy_pipeline(context.pipeline, None);
        }
        if !context.pipeline_layout.is_null() {
            device
                .vk_device
                .destroy_pipeline_layout(context.pipeline_layout, None);
        }
        if !context.render_pass.is_null() {
            device
                .vk_device
                .destroy_render_pass(context.render_pass, None);
        }
        context.pipeline = vk::Pipeline::null();
        context.pipeline_layout = vk::PipelineLayout::null();
        context.render_pass = vk::RenderPass::null();
    }
}
