//! Directional shadow-map pass (spec §4.6): renders depth-only geometry
//! into one cascade layer per framebuffer. Grounded in the original's
//! `ShadowMapPass` (`shadow_map_pass.h`/`.cpp`): fixed resolution
//! independent of the swapchain, one framebuffer per array layer, a
//! per-cascade view-projection pushed as a constant rather than read from
//! `"camera_buffer"`.

use std::collections::HashMap;

use ash::vk;
use bytemuck::bytes_of;
use tracing::debug;

use crate::config::{SHADOW_CASCADE_COUNT, SHADOW_MAP_RESOLUTION};
use crate::device::texture::{SamplerParams, TextureCreateInfo};
use crate::device::GpuDevice;
use crate::error::Result;
use crate::graph::node::{FrameGraphNode, LogicalResource};
use crate::graph::pass::{init_pass_objects, DerivedPassObjects, Pass, PipelineConfig};
use crate::graph::GraphState;
use crate::scene::SceneSource;

use super::ShadowPushConstants;

const RESOURCE_NAME: &str = "directional_shadow_map";

pub struct ShadowMapPass {
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
    objects: Option<DerivedPassObjects>,
}

impl ShadowMapPass {
    pub fn new(vertex_spirv: Vec<u32>, fragment_spirv: Vec<u32>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            objects: None,
        }
    }

    fn resolution_extent() -> vk::Extent2D {
        vk::Extent2D {
            width: SHADOW_MAP_RESOLUTION,
            height: SHADOW_MAP_RESOLUTION,
        }
    }
}

impl Pass for ShadowMapPass {
    fn name(&self) -> &str {
        "shadow_map"
    }

    fn setup(&mut self, device: &mut GpuDevice, state: &mut GraphState) -> Result<()> {
        let info = TextureCreateInfo {
            width: SHADOW_MAP_RESOLUTION,
            height: SHADOW_MAP_RESOLUTION,
            array_layers: SHADOW_CASCADE_COUNT as u32,
            mip_levels: 1,
            format: vk::Format::D32_SFLOAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            is_cube: false,
            // Clamp-to-border with an opaque-white border so fragments
            // outside the cascade frustum read as lit rather than wrapping
            // (REPEAT) or reading black (the sampler default).
            sampler: SamplerParams {
                compare_enabled: true,
                compare_op: vk::CompareOp::LESS,
                address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
                border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
                ..SamplerParams::default()
            },
            data: None,
        };
        state.create_texture_resource(device, RESOURCE_NAME, &info, vk::AttachmentLoadOp::CLEAR)
    }

    fn load_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            vertex_shader_spirv: self.vertex_spirv.clone(),
            fragment_shader_spirv: self.fragment_spirv.clone(),
            vertex_input: Some(super::scene_vertex_layout()),
            cull_mode: vk::CullModeFlags::FRONT,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend: Vec::new(),
            extra_descriptor_set_layouts: Vec::new(),
            push_constant_range: Some(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: std::mem::size_of::<ShadowPushConstants>() as u32,
            }),
        }
    }

    fn init(
        &mut self,
        device: &mut GpuDevice,
        node: &FrameGraphNode,
        resources: &HashMap<String, LogicalResource>,
        _extent: vk::Extent2D,
    ) -> Result<()> {
        let resource = resources.get(RESOURCE_NAME).expect("shadow_map resource missing");
        let texture_handle = resource.texture.expect("shadow_map has no physical texture");
        let layer_views = device.get_texture(texture_handle)?.layer_views.clone();

        let objects = init_pass_objects(
            device,
            node,
            resources,
            Self::resolution_extent(),
            SHADOW_CASCADE_COUNT,
            |i| vec![layer_views[i]],
            true,
            self.load_pipeline(),
        )?;
        self.objects = Some(objects);
        debug!("shadow map pass initialized");
        Ok(())
    }

    fn record(
        &mut self,
        device: &GpuDevice,
        node: &FrameGraphNode,
        _resources: &HashMap<String, LogicalResource>,
        cmd: vk::CommandBuffer,
        scene: &dyn SceneSource,
    ) -> Result<()> {
        let objects = self.objects.as_ref().expect("shadow map pass not initialized");
        let render_pass = device.get_render_pass(objects.render_pass)?.handle;
        let extent = Self::resolution_extent();
        let light = scene.directional_light();
        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        }];

        let pipeline_layout = device.get_pipeline(objects.pipeline)?.layout;
        super::bind_pipeline(device, cmd, device.get_pipeline(objects.pipeline)?.handle);
        for (cascade_index, &framebuffer_handle) in objects.framebuffers.iter().enumerate() {
            let framebuffer = device.get_framebuffer(framebuffer_handle)?.handle;
            super::begin_render_pass(device, cmd, render_pass, framebuffer, extent, &clear_values);

            let view_projection = light.cascades[cascade_index].view_projection;
            for item in scene.draw_items() {
                if item.alpha_tested {
                    continue;
                }
                let push = ShadowPushConstants {
                    view_projection,
                    model: item.model_matrix,
                };
                super::draw_item(device, cmd, pipeline_layout, item, bytes_of(&push));
            }

            super::end_render_pass(device, cmd);
        }
        let _ = node;
        Ok(())
    }

    fn reset(&mut self, device: &mut GpuDevice) {
        if let Some(mut objects) = self.objects.take() {
            objects.reset(device);
        }
    }

    /// Fixed resolution; independent of the swapchain (spec §4.6), so a
    /// host resize never needs to recreate this pass's objects.
    fn resize(&mut self, _device: &mut GpuDevice, _node: &FrameGraphNode, _resources: &HashMap<String, LogicalResource>, _extent: vk::Extent2D) -> Result<()> {
        Ok(())
    }
}
