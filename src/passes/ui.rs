//! UI overlay pass (spec §4.6): draws immediate-mode UI geometry on top of
//! the tonemapped frame. Grounded in the original's `UiPass`
//! (`ui_pass.cpp`/`.h`: `Render(cmd, Scene*)` delegating to the UI
//! backend's draw-data, `LoadPipeline` empty since blending/vertex layout
//! are fixed by the UI backend's conventions rather than derived).

use std::collections::HashMap;

use ash::vk;
use tracing::debug;

use crate::device::pipeline::{BlendConfig, VertexAttribute, VertexInputLayout};
use crate::device::GpuDevice;
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::scene::SceneSource;

const OUTPUT_RESOURCE: &str = "main_frame_color";

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct UiPushConstants {
    texture_id: u32,
    _pad: [u32; 3],
}

pub struct UiPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
}

impl UiPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
        }
    }
}

impl Pass for UiPass {
    fn name(&self) -> &str {
        "ui"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let _ = device;
        // Draws on top of the tonemapped frame; preserves its contents
        // (spec §4.4 `write_resource` contract).
        state.write_resource(OUTPUT_RESOURCE, vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE);
        Ok(())
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: Some(VertexInputLayout {
                stride: 20,
                attributes: vec![
                    VertexAttribute { location: 0, format: vk::Format::R32G32_SFLOAT, offset: 0 },
                    VertexAttribute { location: 1, format: vk::Format::R32G32_SFLOAT, offset: 8 },
                    VertexAttribute { location: 2, format: vk::Format::R8G8B8A8_UNORM, offset: 16 },
                ],
            }),
            cull_mode: vk::CullModeFlags::NONE,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            color_blend: vec![Some(BlendConfig::ALPHA)],
            extra_descriptor_set_layouts: Vec::new(),
            push_constant_range: Some(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: std::mem::size_of::<UiPushConstants>() as u32,
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
        debug!("ui pass initialized");
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
        let objects = self.objects.as_ref().expect("ui pass not initialized");
        let draw_data = scene.ui_draw_data();
        if draw_data.commands.is_empty() {
            return Ok(());
        }
        let (Some(vertex_buffer), Some(index_buffer)) = (draw_data.vertex_buffer, draw_data.index_buffer) else {
            return Ok(());
        };

        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &[]);
        super::bind_pipeline(device, cmd, pipeline.handle);
        unsafe {
            device.device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
            device.device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
        }

        for command in &draw_data.commands {
            let scissor = vk::Rect2D {
                offset: vk::Offset2D {
                    x: command.clip_rect[0].max(0.0) as i32,
                    y: command.clip_rect[1].max(0.0) as i32,
                },
                extent: vk::Extent2D {
                    width: (command.clip_rect[2] - command.clip_rect[0]).max(0.0) as u32,
                    height: (command.clip_rect[3] - command.clip_rect[1]).max(0.0) as u32,
                },
            };
            let push = UiPushConstants { texture_id: command.texture_id, _pad: [0; 3] };
            unsafe {
                device.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
                device.device.cmd_push_constants(
                    cmd,
                    pipeline.layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.device.cmd_draw_indexed(
                    cmd,
                    command.index_count,
                    1,
                    command.index_offset,
                    command.vertex_offset,
                    0,
                );
            }
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
