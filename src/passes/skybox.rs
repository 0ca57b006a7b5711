//! Skybox pass (spec §4.6): draws a unit cube sampling the environment map,
//! establishing the background `"hdr_image"` every later lighting/grid pass
//! composites onto. Grounded in the original's `SkyboxPass`
//! (`skybox_pass.cpp`): front-face culled (camera sits inside the cube),
//! depth test disabled. The cube mesh is generated in place rather than
//! loaded from an asset file, since this crate has no asset pipeline.

use std::collections::HashMap;

use ash::vk;
use tracing::debug;

use crate::device::buffer::MemoryLocation;
use crate::device::pipeline::{VertexAttribute, VertexInputLayout};
use crate::device::texture::TextureCreateInfo;
use crate::device::{AllocatedBuffer, GpuDevice};
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::handle::Handle;
use crate::scene::SceneSource;

const OUTPUT_RESOURCE: &str = "hdr_image";
const DEPTH_RESOURCE: &str = "depth_map";

#[rustfmt::skip]
const CUBE_POSITIONS: [f32; 24] = [
    -1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,
    -1.0, -1.0,  1.0,
     1.0, -1.0,  1.0,
     1.0,  1.0,  1.0,
    -1.0,  1.0,  1.0,
];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    0, 1, 2, 2, 3, 0,
    1, 5, 6, 6, 2, 1,
    5, 4, 7, 7, 6, 5,
    4, 0, 3, 3, 7, 4,
    3, 2, 6, 6, 7, 3,
    4, 5, 1, 1, 0, 4,
];

pub struct SkyboxPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
    vertex_buffer: Handle<AllocatedBuffer>,
    index_buffer: Handle<AllocatedBuffer>,
}

impl SkyboxPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
            vertex_buffer: Handle::default(),
            index_buffer: Handle::default(),
        }
    }

    fn ensure_cube_mesh(&mut self, device: &mut GpuDevice) -> Result<()> {
        if self.vertex_buffer.is_valid() {
            return Ok(());
        }
        let vertex_bytes = bytemuck::cast_slice(&CUBE_POSITIONS);
        let vbo = device.create_buffer(
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::HostMappable,
        )?;
        unsafe { device.get_buffer(vbo)?.mapped_slice() }
            .expect("cube vertex buffer must be host-mappable")[..vertex_bytes.len()]
            .copy_from_slice(vertex_bytes);

        let index_bytes = bytemuck::cast_slice(&CUBE_INDICES);
        let ibo = device.create_buffer(
            index_bytes.len() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::HostMappable,
        )?;
        unsafe { device.get_buffer(ibo)?.mapped_slice() }
            .expect("cube index buffer must be host-mappable")[..index_bytes.len()]
            .copy_from_slice(index_bytes);

        self.vertex_buffer = vbo;
        self.index_buffer = ibo;
        Ok(())
    }
}

impl Pass for SkyboxPass {
    fn name(&self) -> &str {
        "skybox"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let extent = state.extent();
        let info = TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R16G16B16A16_SFLOAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, OUTPUT_RESOURCE, &info, vk::AttachmentLoadOp::CLEAR)?;
        state.write_resource(DEPTH_RESOURCE, vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE);
        state.read_resource("camera_buffer", vk::ShaderStageFlags::VERTEX);
        Ok(())
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: Some(VertexInputLayout {
                stride: 12,
                attributes: vec![VertexAttribute {
                    location: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: 0,
                }],
            }),
            cull_mode: vk::CullModeFlags::FRONT,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            color_blend: vec![None],
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
        self.ensure_cube_mesh(device)?;
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
        debug!("skybox pass initialized");
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
        let objects = self.objects.as_ref().expect("skybox pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;
        let clear_values = [
            vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } },
            vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 } },
        ];

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &clear_values);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);

        let vertex_buffer = device.get_buffer(self.vertex_buffer)?.buffer;
        let index_buffer = device.get_buffer(self.index_buffer)?.buffer;
        unsafe {
            device.device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
            device.device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
            device.device.cmd_draw_indexed(cmd, CUBE_INDICES.len() as u32, 1, 0, 0, 0);
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
