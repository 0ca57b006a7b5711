//! Framebuffer data model (spec §3 "Framebuffer", §4.2 `CreateFramebuffer`:
//! "rejects mismatched attachment counts or extents").

use std::sync::Arc;

use ash::vk;

use crate::error::{FrameGraphError, Result};
use crate::handle::Handle;

use super::render_pass::RenderPassObject;

pub struct Framebuffer {
    device: Arc<ash::Device>,
    pub handle: vk::Framebuffer,
    pub render_pass: Handle<RenderPassObject>,
    pub extent: vk::Extent2D,
    pub attachments: Vec<vk::ImageView>,
}

impl Framebuffer {
    pub fn new(
        device: Arc<ash::Device>,
        render_pass: Handle<RenderPassObject>,
        render_pass_handle: vk::RenderPass,
        extent: vk::Extent2D,
        attachments: Vec<vk::ImageView>,
        expected_attachment_count: usize,
    ) -> Result<Self> {
        if attachments.len() != expected_attachment_count {
            return Err(FrameGraphError::invalid_config(format!(
                "framebuffer attachment count mismatch: expected {expected_attachment_count}, got {}",
                attachments.len()
            )));
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(FrameGraphError::invalid_config(
                "framebuffer extent must be non-zero",
            ));
        }

        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass_handle)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = unsafe { device.create_framebuffer(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_framebuffer failed: {e:?}")))?;

        Ok(Self {
            device,
            handle,
            render_pass,
            extent,
            attachments,
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}
