//! G-buffer pass (spec §4.6): rasterizes opaque scene geometry into a
//! view-space normal buffer, a view-space position buffer, and a depth
//! buffer the SSAO and lighting passes sample from. Grounded in the
//! original's `GBufferPass` (`gbufferPass.cpp`): skips alpha-tested
//! geometry, writes model matrix and material index via push constant.

use std::collections::HashMap;

use ash::vk;
use bytemuck::bytes_of;
use tracing::debug;

use crate::device::texture::TextureCreateInfo;
use crate::device::GpuDevice;
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::scene::SceneSource;

use super::DrawPushConstants;

const NORMAL_RESOURCE: &str = "viewspace_normal";
const POSITION_RESOURCE: &str = "viewspace_position";
const DEPTH_RESOURCE: &str = "depth_map";

pub struct GBufferPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
}

impl GBufferPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
        }
    }
}

impl Pass for GBufferPass {
    fn name(&self) -> &str {
        "gbuffer"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let extent = state.extent();
        let normal_info = TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R32G32B32A32_SFLOAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, NORMAL_RESOURCE, &normal_info, vk::AttachmentLoadOp::CLEAR)?;

        let position_info = TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R32G32B32A32_SFLOAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, POSITION_RESOURCE, &position_info, vk::AttachmentLoadOp::CLEAR)?;

        let depth_info = TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::D24_UNORM_S8_UINT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, DEPTH_RESOURCE, &depth_info, vk::AttachmentLoadOp::CLEAR)?;

        state.read_resource("camera_buffer", vk::ShaderStageFlags::VERTEX);
        Ok(())
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: Some(super::scene_vertex_layout()),
            cull_mode: vk::CullModeFlags::BACK,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend: vec![None, None],
            extra_descriptor_set_layouts: Vec::new(),
            push_constant_range: Some(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: std::mem::size_of::<DrawPushConstants>() as u32,
            }),
        }
    }

    fn init(
        &mut self,
        device: &mut GpuDevice,
        node: &FrameGraphNode,
        resources: &HashMap<String, LogicalResource>,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let normal_view = device
            .get_texture(resources.get(NORMAL_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;
        let position_view = device
            .get_texture(resources.get(POSITION_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;
        let depth_view = device
            .get_texture(resources.get(DEPTH_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;

        let objects = init_pass_objects(
            device,
            node,
            resources,
            extent,
            1,
            |_| vec![normal_view, position_view, depth_view],
            false,
            self.load_pipeline(),
        )?;
        self.objects = Some(objects);
        debug!("gbuffer pass initialized");
        Ok(())
    }

    fn record(
        &mut self,
        device: &GpuDevice,
        _node: &FrameGraphNode,
        _resources: &HashMap<String, LogicalResource>,
        cmd: vk::CommandBuffer,
        scene: &dyn SceneSource,
    ) -> Result<()> {
        let objects = self.objects.as_ref().expect("gbuffer pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;
        let clear_values = [
            vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } },
            vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } },
            vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 } },
        ];

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &clear_values);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);

        for item in scene.draw_items() {
            if item.alpha_tested {
                continue;
            }
            let push = DrawPushConstants {
                model: item.model_matrix,
                material_index: item.material_index,
                _pad: [0; 3],
            };
            super::draw_item(device, cmd, pipeline.layout, item, bytes_of(&push));
        }

        super::end_render_pass(device, cmd);
        Ok(())
    }

    fn reset(&mut self, device: &mut GpuDevice) {
        if let Some(mut objects) = self.objects.take() {
            objects.reset(device);
        }
    }

    fn resize(
        &mut self,
        device: &mut GpuDevice,
        node: &FrameGraphNode,
        resources: &HashMap<String, LogicalResource>,
        extent: vk::Extent2D,
    ) -> Result<()> {
        self.reset(device);
        self.init(device, node, resources, extent)
    }
}
