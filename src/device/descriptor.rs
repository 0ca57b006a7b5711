//! Descriptor set layout/pool data model (spec §4.4 "binding kind chosen by
//! input kind": a pass's declared resource inputs each resolve to one
//! descriptor binding of a kind derived from how the resource is used).

use std::sync::Arc;

use ash::vk;

use crate::error::{FrameGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    CombinedImageSampler,
    StorageImage,
}

impl BindingKind {
    fn to_vk(self) -> vk::DescriptorType {
        match self {
            BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindingKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            BindingKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorBindingDesc {
    pub binding: u32,
    pub kind: BindingKind,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

pub struct DescriptorSetLayoutObject {
    device: Arc<ash::Device>,
    pub handle: vk::DescriptorSetLayout,
    pub bindings: Vec<DescriptorBindingDesc>,
}

impl DescriptorSetLayoutObject {
    pub fn new(device: Arc<ash::Device>, bindings: Vec<DescriptorBindingDesc>) -> Result<Self> {
        if bindings.is_empty() {
            return Err(FrameGraphError::invalid_config(
                "descriptor set layout needs at least one binding",
            ));
        }
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(b.binding)
                    .descriptor_type(b.kind.to_vk())
                    .descriptor_count(b.count)
                    .stage_flags(b.stage_flags)
                    .build()
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);
        let handle = unsafe { device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_descriptor_set_layout failed: {e:?}")))?;
        Ok(Self {
            device,
            handle,
            bindings,
        })
    }
}

impl Drop for DescriptorSetLayoutObject {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

/// Shared pool every pass allocates its per-pass descriptor set from,
/// mirroring the teacher's single-pool approach rather than one pool per
/// pass; sized generously at device creation (spec §4.2, `RendererConfig`).
pub struct DescriptorPool {
    device: Arc<ash::Device>,
    pub handle: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(device: Arc<ash::Device>, max_sets: u32) -> Result<Self> {
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: max_sets * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: max_sets * 8,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: max_sets * 2,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
        let handle = unsafe { device.create_descriptor_pool(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_descriptor_pool failed: {e:?}")))?;
        Ok(Self { device, handle })
    }

    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("allocate_descriptor_sets failed: {e:?}")))?;
        Ok(sets[0])
    }

    pub fn write_uniform_buffer(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: u64,
    ) {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info))
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    pub fn write_combined_image_sampler(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        let image_info = vk::DescriptorImageInfo {
            sampler,
            image_view,
            image_layout: layout,
        };
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info))
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.handle, None);
        }
    }
}
