//! Image-based lighting precompute (spec §4.7): bakes the three textures
//! `"irradiance_map_texture"`, `"prefilter_map_texture"` and
//! `"brdflut_texture"` that [`crate::passes::lighting::LightingPass`] reads
//! as external resources. Unlike the frame-graph passes these run once (or
//! whenever the host's environment cubemap changes), not every frame, so
//! they are plain one-shot render jobs driven with [`GpuDevice::immediate_submit`]
//! rather than [`crate::graph::pass::Pass`] implementations.
//!
//! Grounded in the original's `ReflectionProbeGenerator`/`IrradianceMapPass`/
//! `BrdfLUTPass`/`PrefilterMapPass`: a fixed 90° capture projection and six
//! `lookAt` capture views (one per cube face), a BRDF LUT baked once at
//! 512², an irradiance convolution cube baked at low resolution, and a
//! roughness-swept prefiltered environment cube.

use std::f32::consts::FRAC_PI_2;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::debug;

use crate::config::{BRDF_LUT_SIZE, IRRADIANCE_MAP_SIZE, PREFILTER_MAP_SIZE, PREFILTER_MIP_COUNT};
use crate::device::buffer::MemoryLocation;
use crate::device::descriptor::{BindingKind, DescriptorBindingDesc};
use crate::device::pipeline::{PipelineCreateInfo, VertexAttribute, VertexInputLayout};
use crate::device::render_pass::{ColorAttachmentDesc, RenderPassDescriptor};
use crate::device::texture::TextureCreateInfo;
use crate::device::{AllocatedBuffer, GpuDevice, Texture};
use crate::error::Result;
use crate::handle::Handle;

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

fn capture_projection() -> Mat4 {
    Mat4::perspective_rh(FRAC_PI_2, 1.0, 0.1, 10.0)
}

fn capture_views() -> [Mat4; 6] {
    let origin = Vec3::ZERO;
    [
        Mat4::look_at_rh(origin, Vec3::X, Vec3::NEG_Y),
        Mat4::look_at_rh(origin, Vec3::NEG_X, Vec3::NEG_Y),
        Mat4::look_at_rh(origin, Vec3::Y, Vec3::Z),
        Mat4::look_at_rh(origin, Vec3::NEG_Y, Vec3::NEG_Z),
        Mat4::look_at_rh(origin, Vec3::Z, Vec3::NEG_Y),
        Mat4::look_at_rh(origin, Vec3::NEG_Z, Vec3::NEG_Y),
    ]
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransformPushConstants {
    projection: Mat4,
    view: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PrefilterPushConstants {
    projection: Mat4,
    view: Mat4,
    roughness: f32,
    resolution: f32,
    _pad: [f32; 2],
}

/// Roughness-swept prefiltered environment cube. Stored as one single-mip
/// cubemap texture per roughness level rather than a single texture with a
/// mip chain, since [`Texture`] only exposes whole-mip-chain image views;
/// the lighting shader picks a level by `roughness * (levels.len() - 1)`.
pub struct PrefilteredEnvironmentMap {
    pub levels: Vec<Handle<Texture>>,
}

fn cube_mesh_layout() -> VertexInputLayout {
    VertexInputLayout {
        stride: 12,
        attributes: vec![VertexAttribute {
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }],
    }
}

/// Bakes the three IBL textures the lighting pass samples. Holds the cube
/// mesh and descriptor set layout shared by the irradiance/prefilter jobs;
/// shader SPIR-V is supplied by the host (spec §6 `ShaderCache`).
pub struct IblBaker {
    brdf_vertex_spirv: Vec<u32>,
    brdf_fragment_spirv: Vec<u32>,
    cubemap_vertex_spirv: Vec<u32>,
    irradiance_fragment_spirv: Vec<u32>,
    prefilter_fragment_spirv: Vec<u32>,
    cube_vertex_buffer: Handle<AllocatedBuffer>,
    cube_index_buffer: Handle<AllocatedBuffer>,
    environment_set_layout: Handle<crate::device::descriptor::DescriptorSetLayoutObject>,
}

impl IblBaker {
    pub fn new(
        device: &mut GpuDevice,
        brdf_vertex_spirv: Vec<u32>,
        brdf_fragment_spirv: Vec<u32>,
        cubemap_vertex_spirv: Vec<u32>,
        irradiance_fragment_spirv: Vec<u32>,
        prefilter_fragment_spirv: Vec<u32>,
    ) -> Result<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&CUBE_POSITIONS);
        let cube_vertex_buffer = device.create_buffer(
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::HostMappable,
        )?;
        unsafe { device.get_buffer(cube_vertex_buffer)?.mapped_slice() }
            .expect("ibl cube vertex buffer must be host-mappable")[..vertex_bytes.len()]
            .copy_from_slice(vertex_bytes);

        let index_bytes: &[u8] = bytemuck::cast_slice(&CUBE_INDICES);
        let cube_index_buffer = device.create_buffer(
            index_bytes.len() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::HostMappable,
        )?;
        unsafe { device.get_buffer(cube_index_buffer)?.mapped_slice() }
            .expect("ibl cube index buffer must be host-mappable")[..index_bytes.len()]
            .copy_from_slice(index_bytes);

        let environment_set_layout = device.create_descriptor_set_layout(vec![DescriptorBindingDesc {
            binding: 0,
            kind: BindingKind::CombinedImageSampler,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            count: 1,
        }])?;

        Ok(Self {
            brdf_vertex_spirv,
            brdf_fragment_spirv,
            cubemap_vertex_spirv,
            irradiance_fragment_spirv,
            prefilter_fragment_spirv,
            cube_vertex_buffer,
            cube_index_buffer,
            environment_set_layout,
        })
    }

    fn environment_descriptor_set(&self, device: &GpuDevice, environment: Handle<Texture>) -> Result<vk::DescriptorSet> {
        let set = device.allocate_descriptor_set(self.environment_set_layout)?;
        let texture = device.get_texture(environment)?;
        device.descriptor_pool.write_combined_image_sampler(
            set,
            0,
            texture.aggregate_view,
            texture.sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        Ok(set)
    }

    /// Bakes the split-sum BRDF integration LUT: a single 512² render with
    /// no geometry or descriptor inputs (spec: `BrdfLUTPass`, cull front,
    /// depth disabled).
    pub fn bake_brdf_lut(&self, device: &mut GpuDevice) -> Result<Handle<Texture>> {
        let extent = vk::Extent2D { width: BRDF_LUT_SIZE, height: BRDF_LUT_SIZE };
        let texture = device.create_texture(&TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R16G16B16A16_SFLOAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..TextureCreateInfo::default()
        })?;

        let render_pass = device.create_render_pass(RenderPassDescriptor {
            colors: vec![ColorAttachmentDesc {
                format: vk::Format::R16G16B16A16_SFLOAT,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                clear_color: [0.0; 4],
            }],
            depth: None,
        })?;

        let attachment_view = device.get_texture(texture)?.aggregate_view;
        let framebuffer = device.create_framebuffer(render_pass, extent, vec![attachment_view])?;

        let pipeline = device.create_pipeline(
            &PipelineCreateInfo {
                name: "ibl_brdf_lut".to_string(),
                vertex_shader_spirv: self.brdf_vertex_spirv.clone(),
                fragment_shader_spirv: self.brdf_fragment_spirv.clone(),
                vertex_input: None,
                cull_mode: vk::CullModeFlags::FRONT,
                polygon_mode: vk::PolygonMode::FILL,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_test_enable: false,
                depth_write_enable: false,
                depth_compare_op: vk::CompareOp::ALWAYS,
                color_blend: vec![None],
                descriptor_set_layouts: Vec::new(),
                push_constant_range: None,
                color_attachment_formats: vec![vk::Format::R16G16B16A16_SFLOAT],
                depth_format: None,
            },
            render_pass,
            extent,
        )?;

        let render_pass_handle = device.get_render_pass(render_pass)?.handle;
        let framebuffer_handle = device.get_framebuffer(framebuffer)?.handle;
        let pipeline_handle = device.get_pipeline(pipeline)?.handle;
        let pipeline_layout = device.get_pipeline(pipeline)?.layout;

        device.immediate_submit(&|cmd| unsafe {
            crate::passes::set_viewport_scissor(device, cmd, extent);
            crate::passes::begin_render_pass(
                device,
                cmd,
                render_pass_handle,
                framebuffer_handle,
                extent,
                &[vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }],
            );
            crate::passes::bind_pipeline(device, cmd, pipeline_handle);
            crate::passes::draw_fullscreen_triangle(device, cmd, pipeline_layout, &[]);
            crate::passes::end_render_pass(device, cmd);
        })?;

        device.destroy_pipeline(pipeline);
        device.destroy_framebuffer(framebuffer);
        debug!("baked brdf lut");
        Ok(texture)
    }

    /// Bakes the diffuse irradiance cube: six draws of a unit cube sampling
    /// `environment`, one per capture view, convolved in the fragment
    /// shader (spec: `IrradianceMapPass`, cull back, depth disabled).
    pub fn bake_irradiance_map(&self, device: &mut GpuDevice, environment: Handle<Texture>) -> Result<Handle<Texture>> {
        let extent = vk::Extent2D { width: IRRADIANCE_MAP_SIZE, height: IRRADIANCE_MAP_SIZE };
        let texture = device.create_texture(&TextureCreateInfo {
            width: extent.width,
            height: extent.height,
            format: vk::Format::R16G16B16A16_SFLOAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            array_layers: 6,
            is_cube: true,
            ..TextureCreateInfo::default()
        })?;

        let render_pass = device.create_render_pass(RenderPassDescriptor {
            colors: vec![ColorAttachmentDesc {
                format: vk::Format::R16G16B16A16_SFLOAT,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                clear_color: [0.0; 4],
            }],
            depth: None,
        })?;

        let layer_views = device.get_texture(texture)?.layer_views.clone();
        let descriptor_set_layout = device.get_descriptor_set_layout(self.environment_set_layout)?.handle;
        let pipeline = device.create_pipeline(
            &PipelineCreateInfo {
                name: "ibl_irradiance_convolution".to_string(),
                vertex_shader_spirv: self.cubemap_vertex_spirv.clone(),
                fragment_shader_spirv: self.irradiance_fragment_spirv.clone(),
                vertex_input: Some(cube_mesh_layout()),
                cull_mode: vk::CullModeFlags::BACK,
                polygon_mode: vk::PolygonMode::FILL,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_test_enable: false,
                depth_write_enable: false,
                depth_compare_op: vk::CompareOp::ALWAYS,
                color_blend: vec![None],
                descriptor_set_layouts: vec![descriptor_set_layout],
                push_constant_range: Some(vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    offset: 0,
                    size: std::mem::size_of::<TransformPushConstants>() as u32,
                }),
                color_attachment_formats: vec![vk::Format::R16G16B16A16_SFLOAT],
                depth_format: None,
            },
            render_pass,
            extent,
        )?;

        let descriptor_set = self.environment_descriptor_set(device, environment)?;
        let render_pass_handle = device.get_render_pass(render_pass)?.handle;
        let pipeline_handle = device.get_pipeline(pipeline)?.handle;
        let pipeline_layout = device.get_pipeline(pipeline)?.layout;
        let vertex_buffer = device.get_buffer(self.cube_vertex_buffer)?.buffer;
        let index_buffer = device.get_buffer(self.cube_index_buffer)?.buffer;
        let projection = capture_projection();
        let views = capture_views();

        let mut framebuffers = Vec::with_capacity(6);
        for &view in &layer_views {
            framebuffers.push(device.create_framebuffer(render_pass, extent, vec![view])?);
        }

        for (face, &view) in views.iter().enumerate() {
            let framebuffer_handle = device.get_framebuffer(framebuffers[face])?.handle;
            let push = TransformPushConstants { projection, view };
            device.immediate_submit(&|cmd| unsafe {
                crate::passes::set_viewport_scissor(device, cmd, extent);
                crate::passes::begin_render_pass(
                    device,
                    cmd,
                    render_pass_handle,
                    framebuffer_handle,
                    extent,
                    &[vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }],
                );
                crate::passes::bind_pipeline(device, cmd, pipeline_handle);
                crate::passes::bind_descriptor_set(device, cmd, pipeline_layout, descriptor_set);
                device.device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                device.device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
                device.device.cmd_push_constants(
                    cmd,
                    pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.device.cmd_draw_indexed(cmd, CUBE_INDICES.len() as u32, 1, 0, 0, 0);
                crate::passes::end_render_pass(device, cmd);
            })?;
        }

        for framebuffer in framebuffers {
            device.destroy_framebuffer(framebuffer);
        }
        device.destroy_pipeline(pipeline);
        debug!("baked irradiance map");
        Ok(texture)
    }

    /// Bakes the roughness-swept specular prefilter cube: one single-mip
    /// cube per roughness level, each rendered six times (once per face),
    /// at halved resolution per level (spec: `PrefilterMapPass`/
    /// `ReflectionProbeGenerator::ComputePrefilterMap`, `roughness = mip /
    /// (PREFILTER_MIP_COUNT - 1)`).
    pub fn bake_prefiltered_environment(
        &self,
        device: &mut GpuDevice,
        environment: Handle<Texture>,
    ) -> Result<PrefilteredEnvironmentMap> {
        // Every mip level targets this same render pass: format is fixed,
        // only the framebuffer extent changes per level.
        let render_pass = device.create_render_pass(RenderPassDescriptor {
            colors: vec![ColorAttachmentDesc {
                format: vk::Format::R16G16B16A16_SFLOAT,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                clear_color: [0.0; 4],
            }],
            depth: None,
        })?;

        let descriptor_set_layout = device.get_descriptor_set_layout(self.environment_set_layout)?.handle;
        let pipeline = device.create_pipeline(
            &PipelineCreateInfo {
                name: "ibl_prefilter".to_string(),
                vertex_shader_spirv: self.cubemap_vertex_spirv.clone(),
                fragment_shader_spirv: self.prefilter_fragment_spirv.clone(),
                vertex_input: Some(cube_mesh_layout()),
                cull_mode: vk::CullModeFlags::BACK,
                polygon_mode: vk::PolygonMode::FILL,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_test_enable: false,
                depth_write_enable: false,
                depth_compare_op: vk::CompareOp::ALWAYS,
                color_blend: vec![None],
                descriptor_set_layouts: vec![descriptor_set_layout],
                push_constant_range: Some(vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    offset: 0,
                    size: std::mem::size_of::<PrefilterPushConstants>() as u32,
                }),
                color_attachment_formats: vec![vk::Format::R16G16B16A16_SFLOAT],
                depth_format: None,
            },
            render_pass,
            vk::Extent2D { width: PREFILTER_MAP_SIZE, height: PREFILTER_MAP_SIZE },
        )?;

        let descriptor_set = self.environment_descriptor_set(device, environment)?;
        let render_pass_handle = device.get_render_pass(render_pass)?.handle;
        let pipeline_handle = device.get_pipeline(pipeline)?.handle;
        let pipeline_layout = device.get_pipeline(pipeline)?.layout;
        let vertex_buffer = device.get_buffer(self.cube_vertex_buffer)?.buffer;
        let index_buffer = device.get_buffer(self.cube_index_buffer)?.buffer;
        let projection = capture_projection();
        let views = capture_views();

        let mut levels = Vec::with_capacity(PREFILTER_MIP_COUNT as usize);
        for mip in 0..PREFILTER_MIP_COUNT {
            let resolution = (PREFILTER_MAP_SIZE >> mip).max(1);
            let extent = vk::Extent2D { width: resolution, height: resolution };
            let roughness = mip as f32 / (PREFILTER_MIP_COUNT - 1) as f32;

            let level_texture = device.create_texture(&TextureCreateInfo {
                width: resolution,
                height: resolution,
                format: vk::Format::R16G16B16A16_SFLOAT,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                array_layers: 6,
                is_cube: true,
                ..TextureCreateInfo::default()
            })?;
            let layer_views = device.get_texture(level_texture)?.layer_views.clone();

            let mut framebuffers = Vec::with_capacity(6);
            for &view in &layer_views {
                framebuffers.push(device.create_framebuffer(render_pass, extent, vec![view])?);
            }

            for (face, &view) in views.iter().enumerate() {
                let framebuffer_handle = device.get_framebuffer(framebuffers[face])?.handle;
                let push = PrefilterPushConstants {
                    projection,
                    view,
                    roughness,
                    resolution: resolution as f32,
                    _pad: [0.0; 2],
                };
                device.immediate_submit(&|cmd| unsafe {
                    crate::passes::set_viewport_scissor(device, cmd, extent);
                    crate::passes::begin_render_pass(
                        device,
                        cmd,
                        render_pass_handle,
                        framebuffer_handle,
                        extent,
                        &[vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }],
                    );
                    crate::passes::bind_pipeline(device, cmd, pipeline_handle);
                    crate::passes::bind_descriptor_set(device, cmd, pipeline_layout, descriptor_set);
                    device.device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                    device.device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
                    device.device.cmd_push_constants(
                        cmd,
                        pipeline_layout,
                        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                        0,
                        bytemuck::bytes_of(&push),
                    );
                    device.device.cmd_draw_indexed(cmd, CUBE_INDICES.len() as u32, 1, 0, 0, 0);
                    crate::passes::end_render_pass(device, cmd);
                })?;
            }

            for framebuffer in framebuffers {
                device.destroy_framebuffer(framebuffer);
            }
            levels.push(level_texture);
        }

        device.destroy_pipeline(pipeline);
        debug!(levels = PREFILTER_MIP_COUNT, "baked prefiltered environment map");
        Ok(PrefilteredEnvironmentMap { levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_views_each_look_along_a_distinct_cube_face() {
        let views = capture_views();
        for view in &views {
            // Each view matrix has no translation component (captures are
            // taken from the cube's centre).
            assert_eq!(view.w_axis.truncate(), Vec3::ZERO);
        }
    }

    #[test]
    fn capture_projection_is_a_symmetric_ninety_degree_frustum() {
        let projection = capture_projection();
        // A 90 degree fov with aspect 1.0 gives equal x/y scale terms.
        assert!((projection.x_axis.x - projection.y_axis.y).abs() < 1e-5);
    }

    #[test]
    fn cube_mesh_layout_matches_the_raw_position_buffer_stride() {
        let layout = cube_mesh_layout();
        assert_eq!(layout.stride, 12);
        assert_eq!(layout.attributes.len(), 1);
        assert_eq!(layout.attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn cube_mesh_has_eight_vertices_and_twelve_triangles() {
        assert_eq!(CUBE_POSITIONS.len(), 8 * 3);
        assert_eq!(CUBE_INDICES.len(), 12 * 3);
        assert!(CUBE_INDICES.iter().all(|&i| (i as usize) < 8));
    }
}
