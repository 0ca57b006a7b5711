//! Screen-space ambient occlusion pass (spec §4.6). Grounded in the
//! original's `SSAOPass` (`ssao_pass.h`): a private hemisphere-sample
//! kernel and a tiled rotation-noise texture, both generated once at
//! `Init` and bound as a second descriptor set (set 1) alongside the
//! frame-graph-derived set (set 0) holding the G-buffer inputs.

use std::collections::HashMap;

use ash::vk;
use bytemuck::bytes_of;
use glam::Vec4;
use rand::Rng;
use tracing::debug;

use crate::config::SSAO_KERNEL_SIZE;
use crate::device::buffer::MemoryLocation;
use crate::device::descriptor::{BindingKind, DescriptorBindingDesc, DescriptorSetLayoutObject};
use crate::device::texture::{SamplerParams, TextureCreateInfo};
use crate::device::{AllocatedBuffer, GpuDevice, Texture};
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::handle::Handle;
use crate::scene::SceneSource;

const OUTPUT_RESOURCE: &str = "ssao_texture";
const NOISE_SIZE: u32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SsaoParams {
    resolution: [f32; 2],
    kernel_size: u32,
    radius: f32,
    bias: f32,
    strength: f32,
}

fn generate_kernel() -> Vec<Vec4> {
    let mut rng = rand::thread_rng();
    (0..SSAO_KERNEL_SIZE)
        .map(|i| {
            let mut sample = glam::Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..1.0),
            )
            .normalize();
            let scale = i as f32 / SSAO_KERNEL_SIZE as f32;
            sample *= 0.1 + 0.9 * scale * scale;
            Vec4::new(sample.x, sample.y, sample.z, 0.0)
        })
        .collect()
}

fn generate_noise_data() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut texels = Vec::with_capacity((NOISE_SIZE * NOISE_SIZE) as usize);
    for _ in 0..(NOISE_SIZE * NOISE_SIZE) {
        let x = rng.gen_range(-1.0f32..1.0);
        let y = rng.gen_range(-1.0f32..1.0);
        texels.push(Vec4::new(x, y, 0.0, 0.0));
    }
    bytemuck::cast_slice(&texels).to_vec()
}

pub struct SsaoPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
    kernel_layout: Handle<DescriptorSetLayoutObject>,
    kernel_set: vk::DescriptorSet,
    kernel_buffer: Handle<AllocatedBuffer>,
    noise_texture: Handle<Texture>,
    params: SsaoParams,
}

impl SsaoPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
            kernel_layout: Handle::default(),
            kernel_set: vk::DescriptorSet::null(),
            kernel_buffer: Handle::default(),
            noise_texture: Handle::default(),
            params: SsaoParams {
                resolution: [0.0, 0.0],
                radius: 0.15,
                bias: 0.005,
                strength: 1.0,
                kernel_size: SSAO_KERNEL_SIZE as u32,
            },
        }
    }

    fn ensure_kernel_objects(&mut self, device: &mut GpuDevice) -> Result<()> {
        if self.kernel_layout.is_valid() {
            return Ok(());
        }

        let samples = generate_kernel();
        let size = (samples.len() * std::mem::size_of::<Vec4>()) as u64;
        let buffer_handle = device.create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::HostMappable,
        )?;
        {
            let buffer = device.get_buffer(buffer_handle)?;
            let slice = unsafe { buffer.mapped_slice() }.expect("ssao kernel buffer must be host-mappable");
            slice[..size as usize].copy_from_slice(bytemuck::cast_slice(&samples));
        }

        let noise_info = TextureCreateInfo {
            width: NOISE_SIZE,
            height: NOISE_SIZE,
            format: vk::Format::R32G32B32A32_SFLOAT,
            usage: vk::ImageUsageFlags::SAMPLED,
            sampler: SamplerParams {
                address_mode: vk::SamplerAddressMode::REPEAT,
                min_filter: vk::Filter::NEAREST,
                mag_filter: vk::Filter::NEAREST,
                ..SamplerParams::default()
            },
            data: Some(generate_noise_data()),
            ..TextureCreateInfo::default()
        };
        let noise_handle = device.create_texture(&noise_info)?;

        let bindings = vec![
            DescriptorBindingDesc {
                binding: 0,
                kind: BindingKind::UniformBuffer,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                count: 1,
            },
            DescriptorBindingDesc {
                binding: 1,
                kind: BindingKind::CombinedImageSampler,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                count: 1,
            },
        ];
        let layout = device.create_descriptor_set_layout(bindings)?;
        let set = device.allocate_descriptor_set(layout)?;
        {
            let buffer = device.get_buffer(buffer_handle)?;
            device.descriptor_pool.write_uniform_buffer(set, 0, buffer.buffer, buffer.size);
        }
        {
            let noise = device.get_texture(noise_handle)?;
            device.descriptor_pool.write_combined_image_sampler(
                set,
                1,
                noise.aggregate_view,
                noise.sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        self.kernel_buffer = buffer_handle;
        self.noise_texture = noise_handle;
        self.kernel_layout = layout;
        self.kernel_set = set;
        Ok(())
    }
}

impl Pass for SsaoPass {
    fn name(&self) -> &str {
        "ssao"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let extent = state.extent();
        let info = TextureCreateInfo {
            width: (extent.width / 2).max(1),
            height: (extent.height / 2).max(1),
            format: vk::Format::R8_UNORM,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        };
        state.create_texture_resource(device, OUTPUT_RESOURCE, &info, vk::AttachmentLoadOp::CLEAR)?;

        state.read_resource("viewspace_normal", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("viewspace_position", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("depth_map", vk::ShaderStageFlags::FRAGMENT);
        state.read_resource("camera_buffer", vk::ShaderStageFlags::FRAGMENT);
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
                size: std::mem::size_of::<SsaoParams>() as u32,
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
        self.ensure_kernel_objects(device)?;
        let kernel_layout_handle = device.get_descriptor_set_layout(self.kernel_layout)?.handle;

        let output_view = device
            .get_texture(resources.get(OUTPUT_RESOURCE).unwrap().texture.unwrap())?
            .aggregate_view;
        let output_extent = vk::Extent2D {
            width: (extent.width / 2).max(1),
            height: (extent.height / 2).max(1),
        };

        let mut config = self.load_pipeline();
        config.extra_descriptor_set_layouts.push(kernel_layout_handle);

        let objects = init_pass_objects(
            device,
            node,
            resources,
            output_extent,
            1,
            |_| vec![output_view],
            false,
            config,
        )?;
        self.objects = Some(objects);
        debug!("ssao pass initialized");
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
        let objects = self.objects.as_ref().expect("ssao pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let framebuffer = device.get_framebuffer(objects.framebuffers[0])?.handle;
        let extent = device.get_framebuffer(objects.framebuffers[0])?.extent;
        let pipeline = device.get_pipeline(objects.pipeline)?;
        let clear_values = [vk::ClearValue { color: vk::ClearColorValue { float32: [1.0; 4] } }];
        self.params.resolution = [extent.width as f32, extent.height as f32];

        super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &clear_values);
        super::bind_pipeline(device, cmd, pipeline.handle);
        super::bind_descriptor_set(device, cmd, pipeline.layout, objects.descriptor_set);
        unsafe {
            device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                1,
                &[self.kernel_set],
                &[],
            );
        }
        super::draw_fullscreen_triangle(device, cmd, pipeline.layout, bytes_of(&self.params));
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
