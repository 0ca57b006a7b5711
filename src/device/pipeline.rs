//! Graphics pipeline data model and creation (spec §3 "Pipeline", §4.2
//! `CreatePipeline`: "validates that colour-attachment format list and
//! depth format agree with its target render pass").

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::error::{FrameGraphError, Result};

use super::render_pass::RenderPassDescriptor;

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Fixed at creation (spec invariant: "vertex-input layout (fixed)"). `None`
/// means the pipeline draws with no bound vertex buffer, i.e. a full-screen
/// triangle/quad generated entirely in the vertex shader.
#[derive(Debug, Clone)]
pub struct VertexInputLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy)]
pub struct BlendConfig {
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
}

impl BlendConfig {
    /// `src_alpha * src + (1 - src_alpha) * dst`, used by the grid pass.
    pub const ALPHA: Self = Self {
        src_color: vk::BlendFactor::SRC_ALPHA,
        dst_color: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_op: vk::BlendOp::ADD,
        src_alpha: vk::BlendFactor::ONE,
        dst_alpha: vk::BlendFactor::ZERO,
        alpha_op: vk::BlendOp::ADD,
    };
}

#[derive(Debug, Clone)]
pub struct PipelineCreateInfo {
    pub name: String,
    pub vertex_shader_spirv: Vec<u32>,
    pub fragment_shader_spirv: Vec<u32>,
    pub vertex_input: Option<VertexInputLayout>,
    pub cull_mode: vk::CullModeFlags,
    pub polygon_mode: vk::PolygonMode,
    pub front_face: vk::FrontFace,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    /// `None` per attachment means opaque passthrough (no blending).
    pub color_blend: Vec<Option<BlendConfig>>,
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_range: Option<vk::PushConstantRange>,
    pub color_attachment_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
}

impl PipelineCreateInfo {
    /// Spec testable property 5 / scenario S6: the pipeline's attachment
    /// format list must equal the render pass it targets, in order and
    /// count.
    pub fn validate_against(&self, render_pass: &RenderPassDescriptor) -> Result<()> {
        let rp_colors: Vec<vk::Format> = render_pass.colors.iter().map(|c| c.format).collect();
        if rp_colors != self.color_attachment_formats {
            return Err(FrameGraphError::invalid_config(format!(
                "pipeline '{}' color attachment formats {:?} do not match render pass formats {:?}",
                self.name, self.color_attachment_formats, rp_colors
            )));
        }
        let rp_depth = render_pass.depth.as_ref().map(|d| d.format);
        if rp_depth != self.depth_format {
            return Err(FrameGraphError::invalid_config(format!(
                "pipeline '{}' depth format {:?} does not match render pass depth format {:?}",
                self.name, self.depth_format, rp_depth
            )));
        }
        Ok(())
    }
}

pub struct PipelineObject {
    device: Arc<ash::Device>,
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

fn load_shader_module(device: &ash::Device, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(spirv);
    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_shader_module failed: {e:?}")))
}

impl PipelineObject {
    pub fn new(
        device: Arc<ash::Device>,
        info: &PipelineCreateInfo,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let vert_module = load_shader_module(&device, &info.vertex_shader_spirv)?;
        let frag_module = load_shader_module(&device, &info.fragment_shader_spirv)?;
        let entry_point = CString::new("main").unwrap();

        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(&entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(&entry_point)
                .build(),
        ];

        let bindings;
        let attributes;
        let vertex_input_state = match &info.vertex_input {
            Some(layout) => {
                bindings = [vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: layout.stride,
                    input_rate: vk::VertexInputRate::VERTEX,
                }];
                attributes = layout
                    .attributes
                    .iter()
                    .map(|a| vk::VertexInputAttributeDescription {
                        location: a.location,
                        binding: 0,
                        format: a.format,
                        offset: a.offset,
                    })
                    .collect::<Vec<_>>();
                vk::PipelineVertexInputStateCreateInfo::builder()
                    .vertex_binding_descriptions(&bindings)
                    .vertex_attribute_descriptions(&attributes)
                    .build()
            }
            None => {
                bindings = [];
                attributes = Vec::new();
                vk::PipelineVertexInputStateCreateInfo::builder().build()
            }
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(std::slice::from_ref(&viewport))
            .scissors(std::slice::from_ref(&scissor));

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(info.polygon_mode)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = info
            .color_blend
            .iter()
            .map(|blend| match blend {
                Some(b) => vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(true)
                    .src_color_blend_factor(b.src_color)
                    .dst_color_blend_factor(b.dst_color)
                    .color_blend_op(b.color_op)
                    .src_alpha_blend_factor(b.src_alpha)
                    .dst_alpha_blend_factor(b.dst_alpha)
                    .alpha_blend_op(b.alpha_op)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .build(),
                None => vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .build(),
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(info.depth_test_enable)
            .depth_write_enable(info.depth_write_enable)
            .depth_compare_op(info.depth_compare_op)
            .stencil_test_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let push_constant_ranges = info.push_constant_range.map(|r| [r]).unwrap_or_default();
        let layout_create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&info.descriptor_set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_pipeline_layout failed: {e:?}")))?;

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };

        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        let handle = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(FrameGraphError::Gpu(anyhow::anyhow!(
                    "create_graphics_pipelines failed: {result:?}"
                )));
            }
        };

        trace!(pipeline = %info.name, "pipeline created");
        Ok(Self {
            device,
            handle,
            layout,
        })
    }
}

impl Drop for PipelineObject {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
