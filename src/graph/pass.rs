//! Pass Base (spec §4.4): the capability set every concrete pass
//! implements, plus [`init_pass_objects`], the shared helper that derives a
//! pass's render pass, descriptor-set layout/set, framebuffer(s), and
//! pipeline from its declared inputs/outputs — replacing the "deep virtual
//! inheritance of passes" the source used (spec §9) with one free function
//! each pass composes, rather than a base-class method each overrides.

use std::collections::HashMap;

use ash::vk;

use crate::device::{
    BindingKind, DescriptorBindingDesc, DescriptorSetLayoutObject, Framebuffer, GpuDevice,
    PipelineCreateInfo, PipelineObject, RenderPassDescriptor, RenderPassObject,
};
use crate::error::{FrameGraphError, Result};
use crate::handle::Handle;
use crate::registry::LogicalResourceKind;
use crate::scene::SceneSource;

use super::node::{FrameGraphNode, LogicalResource};

pub trait Pass {
    fn name(&self) -> &str;

    /// Declarative only: `graph.create_*_resource`/`write_resource`/
    /// `read_resource` calls, no GPU commands (spec §4.4 `Setup`).
    fn setup(&mut self, device: &mut GpuDevice, state: &mut super::GraphState) -> Result<()>;

    /// Fills in shader paths and fixed-function state beyond what the
    /// derivation rule can infer from declared inputs/outputs (spec §4.4
    /// `LoadPipeline` hook).
    fn load_pipeline(&self) -> PipelineConfig;

    /// Derives render pass/descriptor set/framebuffer(s)/pipeline and
    /// stores the resulting handles on the concrete pass (spec §4.4
    /// `Init`). Most passes implement this by calling [`init_pass_objects`]
    /// with their own framebuffer count and per-framebuffer attachment
    /// selector.
    fn init(&mut self, device: &mut GpuDevice, node: &FrameGraphNode, resources: &HashMap<String, LogicalResource>, extent: vk::Extent2D) -> Result<()>;

    fn record(&mut self, device: &GpuDevice, node: &FrameGraphNode, resources: &HashMap<String, LogicalResource>, cmd: vk::CommandBuffer, scene: &dyn SceneSource) -> Result<()>;

    /// Runs before `record`, outside the render pass (e.g. the shadow-map
    /// pass has nothing to do here; the lighting pass uses it to upload IBL
    /// state once). Default no-op.
    fn pre_render(&mut self, _device: &GpuDevice, _node: &FrameGraphNode, _resources: &HashMap<String, LogicalResource>, _scene: &dyn SceneSource) -> Result<()> {
        Ok(())
    }

    /// Destroys pipeline, framebuffer(s), render pass, descriptor-set
    /// layout, frees the descriptor set. Idempotent (spec §4.4 `Reset`).
    fn reset(&mut self, device: &mut GpuDevice);

    /// Stores the new extent, destroys framebuffer(s), recreates them
    /// against the unchanged render pass (spec §4.4 `Resize`).
    fn resize(&mut self, device: &mut GpuDevice, node: &FrameGraphNode, resources: &HashMap<String, LogicalResource>, extent: vk::Extent2D) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub vertex_shader_spirv: Vec<u32>,
    pub fragment_shader_spirv: Vec<u32>,
    pub vertex_input: Option<crate::device::pipeline::VertexInputLayout>,
    pub cull_mode: vk::CullModeFlags,
    pub polygon_mode: vk::PolygonMode,
    pub front_face: vk::FrontFace,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub color_blend: Vec<Option<crate::device::pipeline::BlendConfig>>,
    pub extra_descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_range: Option<vk::PushConstantRange>,
}

/// Everything [`init_pass_objects`] hands back so the concrete pass can
/// bind/draw during `Record` and tear down during `Reset`.
pub struct DerivedPassObjects {
    pub descriptor_set_layout: Handle<DescriptorSetLayoutObject>,
    pub descriptor_set: vk::DescriptorSet,
    pub render_pass: Handle<RenderPassObject>,
    pub framebuffers: Vec<Handle<Framebuffer>>,
    pub pipeline: Handle<PipelineObject>,
}

fn binding_kind_for(resource: &LogicalResource, explicit: Option<BindingKind>) -> Result<BindingKind> {
    if let Some(kind) = explicit {
        return Ok(kind);
    }
    match resource.kind {
        Some(LogicalResourceKind::Buffer) => Ok(BindingKind::UniformBuffer),
        Some(LogicalResourceKind::Texture) | Some(LogicalResourceKind::TextureCube) => {
            Ok(BindingKind::CombinedImageSampler)
        }
        None => Err(FrameGraphError::resource_not_found(&resource.name)),
    }
}

/// Derivation rule for render-pass attachments (spec §4.4): for each
/// declared output, depth formats become the depth attachment, everything
/// else becomes an ordered colour attachment, initial layout taken from the
/// texture's usage-derived layout, final layout `SHADER_READ_ONLY_OPTIMAL`
/// (or `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` for a depth output nothing
/// downstream samples — callers needing a sampled depth output, i.e. the
/// shadow map, pass `depth_sampled = true`).
fn derive_render_pass_descriptor(
    outputs: &[super::node::PassOutputBinding],
    resources: &HashMap<String, LogicalResource>,
    depth_sampled: bool,
) -> Result<RenderPassDescriptor> {
    use crate::device::render_pass::{ColorAttachmentDesc, DepthAttachmentDesc};
    use crate::device::texture::{is_depth_format, layout_for_usage};

    let mut colors = Vec::new();
    let mut depth = None;
    for output in outputs {
        let resource = resources
            .get(&output.resource_name)
            .ok_or_else(|| FrameGraphError::resource_not_found(&output.resource_name))?;
        let format = resource
            .format
            .ok_or_else(|| FrameGraphError::resource_not_found(&output.resource_name))?;
        if is_depth_format(format) {
            depth = Some(DepthAttachmentDesc {
                format,
                load_op: output.load_op,
                clear_depth: 1.0,
                final_layout: if depth_sampled {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                } else {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                },
            });
        } else {
            colors.push(ColorAttachmentDesc {
                format,
                load_op: output.load_op,
                store_op: output.store_op,
                initial_layout: layout_for_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT, format),
                final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                clear_color: [0.0, 0.0, 0.0, 0.0],
            });
        }
    }
    Ok(RenderPassDescriptor { colors, depth })
}

/// Derives and creates every GPU object a pass needs from its declared
/// node (spec §4.4 `Init`). `framebuffer_attachments(i)` returns the image
/// views for framebuffer `i` of `framebuffer_count` (almost always 1; the
/// shadow-map pass uses one per cascade layer).
pub fn init_pass_objects(
    device: &mut GpuDevice,
    node: &FrameGraphNode,
    resources: &HashMap<String, LogicalResource>,
    extent: vk::Extent2D,
    framebuffer_count: usize,
    framebuffer_attachments: impl Fn(usize) -> Vec<vk::ImageView>,
    depth_sampled: bool,
    config: PipelineConfig,
) -> Result<DerivedPassObjects> {
    // Descriptor-set layout: one binding per declared input, in order
    // (spec §4.4 Init, invariant 5).
    let mut bindings = Vec::with_capacity(node.inputs.len());
    for (i, input) in node.inputs.iter().enumerate() {
        let resource = resources
            .get(&input.resource_name)
            .ok_or_else(|| FrameGraphError::resource_not_found(&input.resource_name))?;
        let kind = binding_kind_for(resource, input.explicit_kind)?;
        bindings.push(DescriptorBindingDesc {
            binding: i as u32,
            kind,
            stage_flags: input.stage_flags,
            count: 1,
        });
    }

    let descriptor_set_layout = if bindings.is_empty() {
        None
    } else {
        Some(device.create_descriptor_set_layout(bindings.clone())?)
    };

    let descriptor_set = match descriptor_set_layout {
        Some(layout) => {
            let set = device.allocate_descriptor_set(layout)?;
            for (binding, input) in bindings.iter().zip(node.inputs.iter()) {
                let resource = resources.get(&input.resource_name).unwrap();
                match binding.kind {
                    BindingKind::UniformBuffer => {
                        let buffer_handle = resource.buffer.ok_or_else(|| {
                            FrameGraphError::resource_not_found(&input.resource_name)
                        })?;
                        let buffer = device.get_buffer(buffer_handle)?;
                        device.descriptor_pool.write_uniform_buffer(set, binding.binding, buffer.buffer, buffer.size);
                    }
                    BindingKind::CombinedImageSampler | BindingKind::StorageImage => {
                        let texture_handle = resource.texture.ok_or_else(|| {
                            FrameGraphError::resource_not_found(&input.resource_name)
                        })?;
                        let texture = device.get_texture(texture_handle)?;
                        device.descriptor_pool.write_combined_image_sampler(
                            set,
                            binding.binding,
                            texture.aggregate_view,
                            texture.sampler,
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        );
                    }
                }
            }
            set
        }
        None => vk::DescriptorSet::null(),
    };

    let render_pass_descriptor = derive_render_pass_descriptor(&node.outputs, resources, depth_sampled)?;
    let render_pass = device.create_render_pass(render_pass_descriptor.clone())?;

    let mut framebuffers = Vec::with_capacity(framebuffer_count);
    for i in 0..framebuffer_count {
        let attachments = framebuffer_attachments(i);
        framebuffers.push(device.create_framebuffer(render_pass, extent, attachments)?);
    }

    let color_attachment_formats = render_pass_descriptor.colors.iter().map(|c| c.format).collect();
    let depth_format = render_pass_descriptor.depth.as_ref().map(|d| d.format);

    let mut descriptor_set_layouts = Vec::new();
    if let Some(layout) = descriptor_set_layout {
        descriptor_set_layouts.push(device.get_descriptor_set_layout(layout)?.handle);
    }
    descriptor_set_layouts.extend(config.extra_descriptor_set_layouts);

    let pipeline_info = PipelineCreateInfo {
        name: node.name.clone(),
        vertex_shader_spirv: config.vertex_shader_spirv,
        fragment_shader_spirv: config.fragment_shader_spirv,
        vertex_input: config.vertex_input,
        cull_mode: config.cull_mode,
        polygon_mode: config.polygon_mode,
        front_face: config.front_face,
        depth_test_enable: config.depth_test_enable,
        depth_write_enable: config.depth_write_enable,
        depth_compare_op: config.depth_compare_op,
        color_blend: config.color_blend,
        descriptor_set_layouts,
        push_constant_range: config.push_constant_range,
        color_attachment_formats,
        depth_format,
    };
    let pipeline = device.create_pipeline(&pipeline_info, render_pass, extent)?;

    Ok(DerivedPassObjects {
        descriptor_set_layout: descriptor_set_layout.unwrap_or_default(),
        descriptor_set,
        render_pass,
        framebuffers,
        pipeline,
    })
}

impl DerivedPassObjects {
    /// Reset is idempotent (spec testable property 6): each handle is
    /// guarded, and this clears them so a second call is a no-op.
    pub fn reset(&mut self, device: &mut GpuDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        if self.pipeline.is_valid() {
            device.destroy_pipeline(self.pipeline);
            self.pipeline = Handle::default();
        }
        if self.render_pass.is_valid() {
            // Render passes are deduped/shared (spec §4.2 `CreateRenderPass`);
            // destroying one here would invalidate sibling passes still
            // using the identical config, so only pipeline/framebuffer/
            // descriptor-set-layout objects are owned exclusively by this
            // pass and destroyed on `Reset`.
            self.render_pass = Handle::default();
        }
        if self.descriptor_set_layout.is_valid() {
            device.destroy_descriptor_set_layout(self.descriptor_set_layout);
            self.descriptor_set_layout = Handle::default();
        }
        self.descriptor_set = vk::DescriptorSet::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::PassOutputBinding;

    fn resource(name: &str, kind: Option<LogicalResourceKind>, format: Option<vk::Format>) -> LogicalResource {
        let mut resource = LogicalResource::placeholder(name);
        resource.kind = kind;
        resource.format = format;
        resource
    }

    #[test]
    fn binding_kind_prefers_explicit_override() {
        let texture = resource("gbuffer_normal", Some(LogicalResourceKind::Texture), Some(vk::Format::R16G16B16A16_SFLOAT));
        let kind = binding_kind_for(&texture, Some(BindingKind::StorageImage)).unwrap();
        assert_eq!(kind, BindingKind::StorageImage);
    }

    #[test]
    fn binding_kind_infers_from_resource_kind() {
        let buffer = resource("camera_buffer", Some(LogicalResourceKind::Buffer), None);
        assert_eq!(binding_kind_for(&buffer, None).unwrap(), BindingKind::UniformBuffer);

        let cube = resource("environment_cube", Some(LogicalResourceKind::TextureCube), Some(vk::Format::R16G16B16A16_SFLOAT));
        assert_eq!(binding_kind_for(&cube, None).unwrap(), BindingKind::CombinedImageSampler);
    }

    #[test]
    fn binding_kind_errors_on_unproduced_resource() {
        let placeholder = LogicalResource::placeholder("never_written");
        assert!(binding_kind_for(&placeholder, None).is_err());
    }

    #[test]
    fn render_pass_derivation_splits_color_and_depth_outputs() {
        let mut resources = HashMap::new();
        resources.insert(
            "gbuffer_albedo".to_string(),
            resource("gbuffer_albedo", Some(LogicalResourceKind::Texture), Some(vk::Format::R8G8B8A8_UNORM)),
        );
        resources.insert(
            "gbuffer_depth".to_string(),
            resource("gbuffer_depth", Some(LogicalResourceKind::Texture), Some(vk::Format::D32_SFLOAT)),
        );
        let outputs = vec![
            PassOutputBinding {
                resource_name: "gbuffer_albedo".to_string(),
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
            },
            PassOutputBinding {
                resource_name: "gbuffer_depth".to_string(),
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
            },
        ];

        let descriptor = derive_render_pass_descriptor(&outputs, &resources, false).unwrap();
        assert_eq!(descriptor.colors.len(), 1);
        assert_eq!(descriptor.colors[0].format, vk::Format::R8G8B8A8_UNORM);
        let depth = descriptor.depth.expect("depth attachment derived");
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn depth_sampled_flag_picks_shader_read_only_final_layout() {
        let mut resources = HashMap::new();
        resources.insert(
            "shadow_cascade_0".to_string(),
            resource("shadow_cascade_0", Some(LogicalResourceKind::Texture), Some(vk::Format::D32_SFLOAT)),
        );
        let outputs = vec![PassOutputBinding {
            resource_name: "shadow_cascade_0".to_string(),
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
        }];

        let descriptor = derive_render_pass_descriptor(&outputs, &resources, true).unwrap();
        assert_eq!(descriptor.depth.unwrap().final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn render_pass_derivation_errors_on_undeclared_output() {
        let resources = HashMap::new();
        let outputs = vec![PassOutputBinding {
            resource_name: "missing".to_string(),
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
        }];
        assert!(derive_render_pass_descriptor(&outputs, &resources, false).is_err());
    }
}
