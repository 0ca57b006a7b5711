//! Render-pass data model (spec §3 "RenderPassDescriptor", §4.2
//! `CreateRenderPass`: "hashes config; may return an existing identical
//! render pass").

use std::sync::Arc;

use ash::vk;

use crate::error::{FrameGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachmentDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachmentDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub clear_depth: f32,
    /// `SHADER_READ_ONLY_OPTIMAL` for depth outputs a later pass samples
    /// (the shadow map), `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` otherwise
    /// (spec §4.4 render-pass derivation rule).
    pub final_layout: vk::ImageLayout,
}

/// Hashable/comparable config key, used by `GpuDevice::create_render_pass`
/// to dedupe identical render passes rather than recreating one per pass
/// per compile.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub colors: Vec<ColorAttachmentDesc>,
    pub depth: Option<DepthAttachmentDesc>,
}

impl Eq for RenderPassDescriptor {}

impl std::hash::Hash for RenderPassDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for c in &self.colors {
            c.format.hash(state);
            c.load_op.hash(state);
            c.store_op.hash(state);
            c.initial_layout.hash(state);
            c.final_layout.hash(state);
            for v in c.clear_color {
                v.to_bits().hash(state);
            }
        }
        if let Some(d) = &self.depth {
            d.format.hash(state);
            d.load_op.hash(state);
            d.clear_depth.to_bits().hash(state);
            d.final_layout.hash(state);
        }
    }
}

pub struct RenderPassObject {
    device: Arc<ash::Device>,
    pub handle: vk::RenderPass,
    pub descriptor: RenderPassDescriptor,
}

impl RenderPassObject {
    pub fn new(device: Arc<ash::Device>, descriptor: RenderPassDescriptor) -> Result<Self> {
        if descriptor.colors.is_empty() && descriptor.depth.is_none() {
            return Err(FrameGraphError::invalid_config(
                "render pass needs at least one attachment",
            ));
        }

        let mut attachments = Vec::new();
        let mut color_refs = Vec::new();
        for color in &descriptor.colors {
            color_refs.push(vk::AttachmentReference::builder()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build());
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(color.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(color.load_op)
                    .store_op(color.store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(color.initial_layout)
                    .final_layout(color.final_layout)
                    .build(),
            );
        }

        let depth_ref = descriptor.depth.as_ref().map(|depth| {
            let reference = vk::AttachmentReference::builder()
                .attachment(attachments.len() as u32)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build();
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(depth.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(depth.load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(depth.final_layout)
                    .build(),
            );
            reference
        });

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpass = subpass.build();

        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let handle = unsafe { device.create_render_pass(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_render_pass failed: {e:?}")))?;

        Ok(Self {
            device,
            handle,
            descriptor,
        })
    }
}

impl Drop for RenderPassObject {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}
