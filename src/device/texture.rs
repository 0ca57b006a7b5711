//! Texture data model and creation (spec §3 "Texture", §4.2
//! `CreateTexture`).

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use tracing::{debug, trace};

use crate::device::buffer::{AllocatedBuffer, MemoryLocation};
use crate::error::{FrameGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    pub compare_enabled: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            compare_enabled: false,
            compare_op: vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureCreateInfo {
    pub width: u32,
    pub height: u32,
    /// `6` with `is_cube = true` denotes a cube map; `>1` with
    /// `is_cube = false` denotes a 2D array (e.g. shadow-map cascades).
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub is_cube: bool,
    pub sampler: SamplerParams,
    /// Initial texel data to upload via a staging buffer; `None` leaves the
    /// image `UNDEFINED` for the caller (or the render pass) to fill.
    pub data: Option<Vec<u8>>,
}

impl Default for TextureCreateInfo {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            array_layers: 1,
            mip_levels: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            is_cube: false,
            sampler: SamplerParams::default(),
            data: None,
        }
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Layout a freshly-created texture of a given usage should transition
/// into for its first render-pass attachment reference (spec §4.4
/// render-pass derivation rule: "initial layout taken from the texture's
/// usage-derived layout").
pub fn layout_for_usage(usage: vk::ImageUsageFlags, format: vk::Format) -> vk::ImageLayout {
    if is_depth_format(format) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::UNDEFINED
    }
}

pub struct Texture {
    device: Arc<ash::Device>,
    pub image: vk::Image,
    allocation: Option<Allocation>,
    /// One view per array layer, in layer order.
    pub layer_views: Vec<vk::ImageView>,
    /// Aggregate view: a cube view when `array_layers == 6 && is_cube`, an
    /// array view when `array_layers > 1`, else identical to `layer_views[0]`.
    pub aggregate_view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

impl Texture {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<ash::Device>,
        allocator: &mut Allocator,
        immediate_submit: impl FnOnce(&dyn Fn(vk::CommandBuffer)) -> Result<()>,
        graphics_queue_family: u32,
        info: &TextureCreateInfo,
    ) -> Result<Self> {
        if info.mip_levels == 0 || info.array_layers == 0 {
            return Err(FrameGraphError::invalid_config(
                "texture mip_levels and array_layers must be >= 1",
            ));
        }
        if info.is_cube && info.array_layers != 6 {
            return Err(FrameGraphError::invalid_config(
                "cube textures must have array_layers == 6",
            ));
        }

        let mut usage = info.usage | vk::ImageUsageFlags::TRANSFER_SRC;
        if info.data.is_some() {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        if info.mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: 1,
            })
            .mip_levels(info.mip_levels)
            .array_layers(info.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(std::slice::from_ref(&graphics_queue_family))
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .flags(if info.is_cube {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            });

        let image = unsafe { device.create_image(&image_create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_image failed: {e:?}")))?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = allocator
            .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                name: "frame-graph-texture",
                requirements,
                location: gpu_allocator::MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("texture allocation failed: {e}")))?;

        unsafe {
            device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("bind_image_memory failed: {e:?}")))?;
        }

        let aspect_mask = if is_depth_format(info.format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let mut layer_views = Vec::with_capacity(info.array_layers as usize);
        for layer in 0..info.array_layers {
            let view_create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(info.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: info.mip_levels,
                    base_array_layer: layer,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_create_info, None) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_image_view failed: {e:?}")))?;
            layer_views.push(view);
        }

        let aggregate_view_type = if info.is_cube {
            vk::ImageViewType::CUBE
        } else if info.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let aggregate_view = if aggregate_view_type == vk::ImageViewType::TYPE_2D {
            layer_views[0]
        } else {
            let view_create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(aggregate_view_type)
                .format(info.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: info.mip_levels,
                    base_array_layer: 0,
                    layer_count: info.array_layers,
                });
            unsafe { device.create_image_view(&view_create_info, None) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_image_view failed: {e:?}")))?
        };

        let sampler_create_info = vk::SamplerCreateInfo::builder()
            .min_filter(info.sampler.min_filter)
            .mag_filter(info.sampler.mag_filter)
            .address_mode_u(info.sampler.address_mode)
            .address_mode_v(info.sampler.address_mode)
            .address_mode_w(info.sampler.address_mode)
            .border_color(info.sampler.border_color)
            .compare_enable(info.sampler.compare_enabled)
            .compare_op(info.sampler.compare_op)
            .min_lod(0.0)
            .max_lod(info.mip_levels as f32)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
        let sampler = unsafe { device.create_sampler(&sampler_create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_sampler failed: {e:?}")))?;

        let mut texture = Self {
            device,
            image,
            allocation: Some(allocation),
            layer_views,
            aggregate_view,
            sampler,
            width: info.width,
            height: info.height,
            array_layers: info.array_layers,
            mip_levels: info.mip_levels,
            format: info.format,
            usage: info.usage,
        };

        if let Some(data) = &info.data {
            texture.upload(allocator, immediate_submit, data)?;
            debug!(width = info.width, height = info.height, "texture upload complete");
        }

        trace!(?image, "texture created");
        Ok(texture)
    }

    /// Hands the allocation back to the caller so it can be freed through
    /// the shared `Allocator` before this `Texture` is dropped (freeing
    /// needs `&mut Allocator`, which `Drop` can't borrow).
    pub(crate) fn take_allocation(&mut self) -> Option<Allocation> {
        self.allocation.take()
    }

    /// Stages `data` into the image via a temporary host-mappable buffer,
    /// copies it into mip 0 across every array layer, then either blits a
    /// full mip chain (mirroring the teacher's `generate_mipmaps_internal`)
    /// or transitions straight to `SHADER_READ_ONLY_OPTIMAL` when there's
    /// only one mip level. `immediate_submit` is a single one-shot command
    /// buffer (spec §4.2), so the whole barrier/copy/blit sequence has to be
    /// recorded inside the one closure it accepts.
    fn upload(
        &mut self,
        allocator: &mut Allocator,
        immediate_submit: impl FnOnce(&dyn Fn(vk::CommandBuffer)) -> Result<()>,
        data: &[u8],
    ) -> Result<()> {
        let staging = AllocatedBuffer::new(
            &self.device,
            allocator,
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::HostMappable,
        )?;
        unsafe {
            let slice = staging
                .mapped_slice()
                .ok_or_else(|| FrameGraphError::Gpu(anyhow::anyhow!("staging buffer is not mapped")))?;
            slice[..data.len()].copy_from_slice(data);
        }

        let image = self.image;
        let staging_buffer = staging.buffer;
        let aspect_mask = if is_depth_format(self.format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let mip_levels = self.mip_levels;
        let array_layers = self.array_layers;
        let width = self.width;
        let height = self.height;
        let device = self.device.clone();

        let result = immediate_submit(&move |cmd| {
            let to_transfer_dst = vk::ImageMemoryBarrier::builder()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: array_layers,
                })
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_transfer_dst),
                );
            }

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: array_layers,
                })
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D { width, height, depth: 1 });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&region),
                );
            }

            if mip_levels > 1 {
                let mut mip_width = width as i32;
                let mut mip_height = height as i32;
                for level in 1..mip_levels {
                    let prev_range = vk::ImageSubresourceRange {
                        aspect_mask,
                        base_mip_level: level - 1,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: array_layers,
                    };
                    let to_transfer_src = vk::ImageMemoryBarrier::builder()
                        .image(image)
                        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .subresource_range(prev_range);
                    unsafe {
                        device.cmd_pipeline_barrier(
                            cmd,
                            vk::PipelineStageFlags::TRANSFER,
                            vk::PipelineStageFlags::TRANSFER,
                            vk::DependencyFlags::empty(),
                            &[],
                            &[],
                            std::slice::from_ref(&to_transfer_src),
                        );
                    }

                    let next_width = if mip_width > 1 { mip_width / 2 } else { 1 };
                    let next_height = if mip_height > 1 { mip_height / 2 } else { 1 };
                    let blit = vk::ImageBlit::builder()
                        .src_subresource(vk::ImageSubresourceLayers {
                            aspect_mask,
                            mip_level: level - 1,
                            base_array_layer: 0,
                            layer_count: array_layers,
                        })
                        .src_offsets([vk::Offset3D::default(), vk::Offset3D { x: mip_width, y: mip_height, z: 1 }])
                        .dst_subresource(vk::ImageSubresourceLayers {
                            aspect_mask,
                            mip_level: level,
                            base_array_layer: 0,
                            layer_count: array_layers,
                        })
                        .dst_offsets([vk::Offset3D::default(), vk::Offset3D { x: next_width, y: next_height, z: 1 }]);
                    unsafe {
                        device.cmd_blit_image(
                            cmd,
                            image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            std::slice::from_ref(&blit),
                            vk::Filter::LINEAR,
                        );
                    }

                    let to_shader_read = vk::ImageMemoryBarrier::builder()
                        .image(image)
                        .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                        .dst_access_mask(vk::AccessFlags::SHADER_READ)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .subresource_range(prev_range);
                    unsafe {
                        device.cmd_pipeline_barrier(
                            cmd,
                            vk::PipelineStageFlags::TRANSFER,
                            vk::PipelineStageFlags::FRAGMENT_SHADER,
                            vk::DependencyFlags::empty(),
                            &[],
                            &[],
                            std::slice::from_ref(&to_shader_read),
                        );
                    }

                    mip_width = next_width;
                    mip_height = next_height;
                }

                let last_mip_range = vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: mip_levels - 1,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: array_layers,
                };
                let last_to_shader_read = vk::ImageMemoryBarrier::builder()
                    .image(image)
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .subresource_range(last_mip_range);
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        std::slice::from_ref(&last_to_shader_read),
                    );
                }
            } else {
                let to_shader_read = vk::ImageMemoryBarrier::builder()
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask,
                        base_mip_level: 0,
                        level_count: mip_levels,
                        base_array_layer: 0,
                        layer_count: array_layers,
                    })
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ);
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        std::slice::from_ref(&to_shader_read),
                    );
                }
            }
        });

        // `immediate_submit` blocks on the one-shot fence before returning, so
        // the staging buffer is safe to tear down here regardless of `result`.
        allocator
            .free(staging.allocation)
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("staging buffer free failed: {e}")))?;
        unsafe { self.device.destroy_buffer(staging.buffer, None) };

        result
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            if self.aggregate_view != self.layer_views[0] {
                self.device.destroy_image_view(self.aggregate_view, None);
            }
            for view in &self.layer_views {
                self.device.destroy_image_view(*view, None);
            }
            self.device.destroy_image(self.image, None);
        }
        // `allocation` is freed by the allocator via `GpuDevice::destroy_texture`
        // (it needs `&mut Allocator`, which a `Drop` impl can't borrow).
        let _ = self.allocation.take();
    }
}
