//! Tone mapping pass (spec §4.6): resolves the HDR lit+grid composite down
//! to `"main_frame_color"`, the 8-bit target the UI pass then draws on top
//! of. Grounded in the original's `ToneMappingPass` wiring in
//! `frame_graph.cpp` (reads `"hdr_image"`, writes `"main_frame_color"`).

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

const OUTPUT_RESOURCE: &str = "main_frame_color";

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TonemapPushConstants {
    exposure: f32,
    _pad: [f32; 3],
}

pub struct ToneMappingPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
    exposure: f32,
}

impl ToneMappingPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
            exposure: 1.0,
        }
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
    }
}

impl Pass for ToneMappingPass {
    fn name(&self) -> &str {
        "tone_mapping"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let extent = state.extent();
        let info = TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, OUTPUT_RESOURCE, &info, vk::AttachmentLoadOp::CLEAR)?;
        state.read_resource("hdr_image", vk::ShaderStageFlags::FRAGMENT);
        Ok(())
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: None,
            cull_mode: vk::CullModeFlags::FRONT,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            color_blend: vec![None],
            extra_descriptor_set_layouts: Vec::new(),
            push_constant_range: Some(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: std::mem::size_of::<TonemapPushConstants>() as u32,
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
        let output_view = device
            .get_texture(resources.get(OUTPUT_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;

        let objects = init_pass_objects(
            device,
            node,
            resources,
            extent,
            1,
            |_| vec![output_view],
            false,
            self.load_pipeline(),
        )?;
        self.objects = Some(objects);
        debug!("tone mapping pass initialized");
        Ok(())
    }

    fn record(
        &mut self,
        device: &GpuDevice,
        _node: &FrameGraphNode,
        _resources: &HashMap<String, LogicalResource>,
        cmd: vk::CommandBuffer,
        _scene: &dyn SceneSource,
    ) -> Result<()> {
        let objects = self.objects.as_ref().expect("tone mapping pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;
        let clear_values = [vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }];

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &clear_values);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);
        let push = TonemapPushConstants { exposure: self.exposure, _pad: [0.0; 3] };
        super::draw_fullscreen_triangle(device, cmd, pipeline.layout, bytes_of(&push));
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
