//! Presentation surface (spec §6 `Swapchain`: `Acquire`/`Present`/
//! `OnResize`). Grounded in the teacher's `Swapchain`, with the
//! render-pass/framebuffer coupling dropped: the frame graph itself never
//! renders directly into a swapchain image (its terminal pass writes the
//! `"main_frame_color"` offscreen texture, per spec §9's note that the
//! compiled graph has no present pass of its own); the host blits that
//! texture into whatever image `acquire` hands back, then calls `present`.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::error::{FrameGraphError, Result};

pub struct Swapchain {
    device: Arc<ash::Device>,
    pub loader: ash::extensions::khr::Swapchain,
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        graphics_family: u32,
        present_family: u32,
        requested_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("surface capabilities query failed: {e:?}")))?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("surface format query failed: {e:?}")))?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("surface present mode query failed: {e:?}")))?;

        if formats.is_empty() || present_modes.is_empty() {
            return Err(FrameGraphError::invalid_config(
                "no surface formats/present modes available",
            ));
        }

        let chosen_format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(formats[0]);

        let present_mode = present_modes
            .iter()
            .copied()
            .find(|m| *m == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: requested_extent
                    .width
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: requested_extent
                    .height
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
            image_count = capabilities.max_image_count;
        }

        let loader = ash::extensions::khr::Swapchain::new(instance, &device);

        let queue_family_indices = [graphics_family, present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(chosen_format.format)
            .image_color_space(chosen_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        if graphics_family != present_family {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_swapchain failed: {e:?}")))?;

        let images = unsafe { loader.get_swapchain_images(handle) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("get_swapchain_images failed: {e:?}")))?;

        let mut image_views = Vec::with_capacity(images.len());
        for image in &images {
            let view_create_info = vk::ImageViewCreateInfo::builder()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(chosen_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_create_info, None) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_image_view failed: {e:?}")))?;
            image_views.push(view);
        }

        info!(width = extent.width, height = extent.height, images = images.len(), "swapchain created");

        Ok(Self {
            device,
            loader,
            handle,
            format: chosen_format.format,
            color_space: chosen_format.color_space,
            extent,
            images,
            image_views,
        })
    }

    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, vk::ImageView, vk::Extent2D)> {
        let (index, _suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        }
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("acquire_next_image failed: {e:?}")))?;
        Ok((index, self.image_views[index as usize], self.extent))
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<()> {
        let indices = [image_index];
        let swapchains = [self.handle];
        let wait = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.loader.queue_present(queue, &present_info) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("queue_present failed: {e:?}")))?;
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in &self.image_views {
                self.device.destroy_image_view(*view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}
