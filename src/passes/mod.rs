//! Concrete passes (spec §4.6): each one composes [`crate::graph::pass`]'s
//! shared derivation helper and supplies only what's specific to it —
//! shader bytecode, fixed-function state, and the draw calls themselves.

pub mod gbuffer;
pub mod grid;
pub mod lighting;
pub mod shadow_map;
pub mod skybox;
pub mod ssao;
pub mod tonemap;
pub mod ui;

use ash::vk;
use glam::Mat4;

use crate::device::GpuDevice;
use crate::scene::DrawItem;

/// Per-draw push constant shared by every pass that draws scene geometry
/// (spec §4.6 gbuffer/lighting/shadow-map contracts: "model matrix and
/// material index via push constant").
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawPushConstants {
    pub model: Mat4,
    pub material_index: u32,
    pub _pad: [u32; 3],
}

/// Push constant for the shadow-map pass: the cascade's view-projection
/// replaces the camera, since the shadow map never reads `"camera_buffer"`.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowPushConstants {
    pub view_projection: Mat4,
    pub model: Mat4,
}

/// Vertex layout shared by every pass that rasterizes scene meshes
/// (G-buffer, shadow map): position, normal, uv, tangent, matching the
/// mesh format the host's asset pipeline uploads into `DrawItem`'s vertex
/// buffer.
pub fn scene_vertex_layout() -> crate::device::pipeline::VertexInputLayout {
    use crate::device::pipeline::{VertexAttribute, VertexInputLayout};
    VertexInputLayout {
        stride: 48,
        attributes: vec![
            VertexAttribute { location: 0, format: vk::Format::R32G32B32_SFLOAT, offset: 0 },
            VertexAttribute { location: 1, format: vk::Format::R32G32B32_SFLOAT, offset: 12 },
            VertexAttribute { location: 2, format: vk::Format::R32G32_SFLOAT, offset: 24 },
            VertexAttribute { location: 3, format: vk::Format::R32G32B32A32_SFLOAT, offset: 32 },
        ],
    }
}

pub fn set_viewport_scissor(device: &GpuDevice, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
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
    unsafe {
        device.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        device.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
    }
}

#[allow(clippy::too_many_arguments)]
pub fn begin_render_pass(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_values: &[vk::ClearValue],
) {
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(clear_values);
    unsafe {
        device
            .device
            .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
    }
    set_viewport_scissor(device, cmd, extent);
}

pub fn end_render_pass(device: &GpuDevice, cmd: vk::CommandBuffer) {
    unsafe { device.device.cmd_end_render_pass(cmd) };
}

pub fn bind_pipeline(device: &GpuDevice, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
    unsafe {
        device
            .device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }
}

/// No-op when `descriptor_set` is null, i.e. a pass with zero declared
/// inputs (spec §4.4: `descriptor_set_layout` is only created when
/// `node.inputs` is non-empty).
pub fn bind_descriptor_set(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set: vk::DescriptorSet,
) {
    if descriptor_set == vk::DescriptorSet::null() {
        return;
    }
    unsafe {
        device.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipeline_layout,
            0,
            &[descriptor_set],
            &[],
        );
    }
}

/// Draws a vertex-shader-generated full-screen triangle (spec §4.6: the
/// lighting/tonemap/SSAO passes have no vertex buffer, they reconstruct UVs
/// from `gl_VertexIndex`).
pub fn draw_fullscreen_triangle(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
    push_constants: &[u8],
) {
    unsafe {
        if !push_constants.is_empty() {
            device.device.cmd_push_constants(
                cmd,
                pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push_constants,
            );
        }
        device.device.cmd_draw(cmd, 3, 1, 0, 0);
    }
}

/// Binds `item`'s vertex/index buffers, pushes `push_constants`, and issues
/// the indexed draw (spec §4.6: every geometry pass iterates
/// `scene.draw_items()` the same way).
pub fn draw_item(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
    item: &DrawItem,
    push_constants: &[u8],
) {
    unsafe {
        device
            .device
            .cmd_bind_vertex_buffers(cmd, 0, &[item.vertex_buffer], &[0]);
        device
            .device
            .cmd_bind_index_buffer(cmd, item.index_buffer, 0, vk::IndexType::UINT32);
        device.device.cmd_push_constants(
            cmd,
            pipeline_layout,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            push_constants,
        );
        device.device.cmd_draw_indexed(cmd, item.index_count, 1, 0, 0, 0);
    }
}
