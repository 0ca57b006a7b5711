//! Lighting pass (spec §4.6): forward-shades scene meshes against the
//! directional shadow map, SSAO, and the precomputed IBL terms, compositing
//! onto `"hdr_image"` on top of the skybox background. Grounded in the
//! original's `LightingPass` (`lighting_pass.cpp`/`.h`): back-face culled,
//! per-meshlet `DrawMeshlet` loop pushing model matrix and material index,
//! reads shadow/IBL/SSAO inputs as descriptors.

use std::collections::HashMap;

use ash::vk;
use bytemuck::bytes_of;
use tracing::debug;

use crate::device::GpuDevice;
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::scene::SceneSource;

use super::DrawPushConstants;

const OUTPUT_RESOURCE: &str = "hdr_image";
const DEPTH_RESOURCE: &str = "depth_map";

pub struct LightingPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
}

impl LightingPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
        }
    }
}

impl Pass for LightingPass {
    fn name(&self) -> &str {
        "lighting"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let _ = device;
        state.read_resource("camera_buffer", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("lights_buffer", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("directional_shadow_map", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("irradiance_map_texture", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("ssao_texture", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("prefilter_map_texture", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("brdflut_texture", vk::ShaderStageFlags::FRAGMENT);

        // Composites onto the skybox background; preserves existing colour
        // rather than clearing it (spec §4.4 `write_resource` contract).
        state.write_resource(OUTPUT_RESOURCE, vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE);
        // Depth test against the G-buffer's depth, already populated for
        // this same geometry; never rewritten here.
        state.write_resource(DEPTH_RESOURCE, vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE);
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
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            color_blend: vec![None],
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
        debug!("lighting pass initialized");
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
        let objects = self.objects.as_ref().expect("lighting pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;

        // `LOAD` means no clear value is consulted here; passed as an empty
        // slice matches `RenderPassBeginInfo`'s requirement that the count
        // equal the number of attachments with a `Clear` load op (zero).
        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &[]);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);

        for item in scene.draw_items() {
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
