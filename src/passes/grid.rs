//! Infinite grid pass (spec §4.6): draws a ground-plane grid, alpha
//! blended on top of the lit scene, reconstructing world position from the
//! camera's inverse view-projection rather than a vertex buffer (no mesh
//! backs this pass — a full-screen triangle is enough). No standalone
//! source file exists for this pass; grounded in the frame graph's own
//! wiring (`frame_graph.cpp`: reads `"camera_buffer"`, writes `"hdr_image"`
//! with `ReadWrite` access) and in [`crate::device::pipeline::BlendConfig`]'s
//! dedicated `ALPHA` preset.

use std::collections::HashMap;

use ash::vk;
use tracing::debug;

use crate::device::pipeline::BlendConfig;
use crate::device::GpuDevice;
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::scene::SceneSource;

const OUTPUT_RESOURCE: &str = "hdr_image";
const DEPTH_RESOURCE: &str = "depth_map";

pub struct InfiniteGridPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
}

impl InfiniteGridPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
        }
    }
}

impl Pass for InfiniteGridPass {
    fn name(&self) -> &str {
        "infinite_grid"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let _ = device;
        state.read_resource("camera_buffer", vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        state.write_resource(OUTPUT_RESOURCE, vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE);
        state.write_resource(DEPTH_RESOURCE, vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE);
        Ok(())
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: None,
            cull_mode: vk::CullModeFlags::NONE,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            color_blend: vec![Some(BlendConfig::ALPHA)],
            extra_descriptor_set_layouts: Vec::new(),
            push_constant_range: None,
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
        let depth_view = device
            .get_texture(resources.get(DEPTH_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;

        let objects = init_pass_objects(
            device,
            node,
            resources,
            extent,
            1,
            |_| vec![output_view, depth_view],
            false,
            self.load_pipeline(),
        )?;
        self.objects = Some(objects);
        debug!("infinite grid pass initialized");
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
        let objects = self.objects.as_ref().expect("infinite grid pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &[]);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);
        super::draw_fullscreen_triangle(device, cmd, pipeline.layout, &[]);
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
