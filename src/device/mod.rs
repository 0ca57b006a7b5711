//! Vulkan device wrapper (spec §4.2): instance/device bring-up, the
//! allocator, and the six pools every `Handle<T>` in this crate resolves
//! through. Grounded in the teacher's `VulkanContext`, generalized from one
//! hardcoded triangle pipeline to arbitrary texture/buffer/render-pass/
//! framebuffer/pipeline/descriptor-set-layout creation through pools.

pub mod buffer;
pub mod descriptor;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod texture;

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{info, warn};

use crate::config::RendererConfig;
use crate::error::{FrameGraphError, Result};
use crate::handle::{Handle, Pool};

pub use buffer::{AllocatedBuffer, MemoryLocation};
pub use descriptor::{BindingKind, DescriptorBindingDesc, DescriptorPool, DescriptorSetLayoutObject};
pub use framebuffer::Framebuffer;
pub use pipeline::{PipelineCreateInfo, PipelineObject};
pub use render_pass::{RenderPassDescriptor, RenderPassObject};
pub use surface::SurfaceFactory;
pub use swapchain::Swapchain;
pub use texture::{Texture, TextureCreateInfo};

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", "[{:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", "[{:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "vulkan", "[{:?}] {}", message_type, message);
        }
        _ => tracing::trace!(target: "vulkan", "[{:?}] {}", message_type, message),
    }
    vk::FALSE
}

#[derive(Debug, Clone, Copy)]
struct QueueFamilyIndices {
    graphics_family: Option<u32>,
    present_family: Option<u32>,
}

impl QueueFamilyIndices {
    fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }
}

pub struct GpuDevice {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: Arc<ash::Instance>,
    debug_utils_loader: Option<ash::extensions::ext::DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,

    pub device: Arc<ash::Device>,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    surface_loader: ash::extensions::khr::Surface,
    surface: vk::SurfaceKHR,

    allocator: Allocator,
    pub descriptor_pool: DescriptorPool,

    immediate_command_pool: vk::CommandPool,
    immediate_command_buffer: vk::CommandBuffer,
    immediate_fence: vk::Fence,

    textures: Pool<Texture>,
    buffers: Pool<AllocatedBuffer>,
    render_passes: Pool<RenderPassObject>,
    render_pass_cache: HashMap<RenderPassDescriptor, Handle<RenderPassObject>>,
    framebuffers: Pool<Framebuffer>,
    pipelines: Pool<PipelineObject>,
    descriptor_set_layouts: Pool<DescriptorSetLayoutObject>,
}

impl GpuDevice {
    pub fn new(config: &RendererConfig, surface_factory: &dyn SurfaceFactory) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("failed to load Vulkan loader: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| FrameGraphError::invalid_config(e.to_string()))?;
        let eng_name = CString::new(config.engine_name.as_str())
            .map_err(|e| FrameGraphError::invalid_config(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&eng_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut instance_extensions: Vec<*const c_char> =
            vec![ash::extensions::khr::Surface::name().as_ptr()];
        for ext in surface_factory.required_instance_extensions() {
            instance_extensions.push(ext.as_ptr());
        }
        if config.enable_validation_layers {
            instance_extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let validation_layer_name = CString::new("VK_LAYER_KHRONOS_validation").unwrap();
        let mut enabled_layer_names: Vec<*const c_char> = Vec::new();
        if config.enable_validation_layers {
            enabled_layer_names.push(validation_layer_name.as_ptr());
        }

        let mut instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions)
            .enabled_layer_names(&enabled_layer_names);

        let mut debug_messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));
        if config.enable_validation_layers {
            instance_create_info = instance_create_info.push_next(&mut debug_messenger_create_info);
        }

        let instance = Arc::new(
            unsafe { entry.create_instance(&instance_create_info, None) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_instance failed: {e:?}")))?,
        );
        info!("Vulkan instance created");

        let (debug_utils_loader, debug_messenger) = if config.enable_validation_layers {
            let loader = ash::extensions::ext::DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                loader.create_debug_utils_messenger(&debug_messenger_create_info, None)
            }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_debug_utils_messenger failed: {e:?}")))?;
            (Some(loader), Some(messenger))
        } else {
            (None, None)
        };

        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);
        let surface = surface_factory.create_surface(&entry, &instance)?;

        let (physical_device, indices) =
            Self::select_physical_device(&instance, &surface_loader, surface)?;
        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, &indices)?;
        let device = Arc::new(device);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: (*instance).clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("allocator creation failed: {e}")))?;

        let descriptor_pool = DescriptorPool::new(device.clone(), config.pool_reserve_capacity as u32 * 4)?;

        let graphics_family = indices.graphics_family.unwrap();
        let present_family = indices.present_family.unwrap();

        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let immediate_command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_command_pool failed: {e:?}")))?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(immediate_command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let immediate_command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("allocate_command_buffers failed: {e:?}")))?[0];

        let fence_create_info = vk::FenceCreateInfo::builder();
        let immediate_fence = unsafe { device.create_fence(&fence_create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_fence failed: {e:?}")))?;

        Ok(Self {
            entry,
            instance,
            debug_utils_loader,
            debug_messenger,
            physical_device,
            graphics_family,
            present_family,
            device,
            graphics_queue,
            present_queue,
            surface_loader,
            surface,
            allocator,
            descriptor_pool,
            immediate_command_pool,
            immediate_command_buffer,
            immediate_fence,
            textures: Pool::new(config.pool_reserve_capacity),
            buffers: Pool::new(config.pool_reserve_capacity),
            render_passes: Pool::new(config.pool_reserve_capacity),
            render_pass_cache: HashMap::new(),
            framebuffers: Pool::new(config.pool_reserve_capacity),
            pipelines: Pool::new(config.pool_reserve_capacity),
            descriptor_set_layouts: Pool::new(config.pool_reserve_capacity),
        })
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("enumerate_physical_devices failed: {e:?}")))?;
        info!(count = physical_devices.len(), "physical devices found");

        let mut best_device = None;
        let mut best_score = 0;
        let mut best_indices = QueueFamilyIndices {
            graphics_family: None,
            present_family: None,
        };

        for pdevice in physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(pdevice) };
            let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
            let mut indices = QueueFamilyIndices {
                graphics_family: None,
                present_family: None,
            };
            for (i, queue_family) in queue_families.iter().enumerate() {
                if queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    indices.graphics_family = Some(i as u32);
                }
                let present_support = unsafe {
                    surface_loader.get_physical_device_surface_support(pdevice, i as u32, surface)
                }
                .unwrap_or(false);
                if present_support && indices.present_family.is_none() {
                    indices.present_family = Some(i as u32);
                }
                if indices.is_complete() {
                    break;
                }
            }

            let required_extensions = [ash::extensions::khr::Swapchain::name()];
            let available_extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("enumerate_device_extension_properties failed: {e:?}")))?;
            let all_supported = required_extensions.iter().all(|required| {
                available_extensions.iter().any(|ext| {
                    let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                    name == *required
                })
            });
            if !all_supported {
                info!(device = %device_name, "missing required device extensions, skipping");
                continue;
            }

            if !indices.is_complete() {
                info!(device = %device_name, "incomplete queue families, skipping");
                continue;
            }

            let mut score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
                _ => 1,
            };
            if indices.graphics_family == indices.present_family {
                score += 10;
            }

            if score > best_score {
                best_score = score;
                best_device = Some(pdevice);
                best_indices = indices;
            }
        }

        match best_device {
            Some(pdevice) => {
                let props = unsafe { instance.get_physical_device_properties(pdevice) };
                let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();
                info!(device = %name, "selected physical device");
                Ok((pdevice, best_indices))
            }
            None => Err(FrameGraphError::Gpu(anyhow::anyhow!(
                "no suitable physical device found"
            ))),
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        indices: &QueueFamilyIndices,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let graphics_family = indices
            .graphics_family
            .ok_or_else(|| FrameGraphError::Gpu(anyhow::anyhow!("graphics queue family not found")))?;
        let present_family = indices
            .present_family
            .ok_or_else(|| FrameGraphError::Gpu(anyhow::anyhow!("present queue family not found")))?;

        let mut unique_families = std::collections::HashSet::new();
        unique_families.insert(graphics_family);
        unique_families.insert(present_family);

        let queue_priority = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*family)
                    .queue_priorities(&queue_priority)
                    .build()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);
        let device_extensions: Vec<*const c_char> = vec![ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&features)
            .enabled_extension_names(&device_extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_device failed: {e:?}")))?;
        info!("logical device created");

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        Ok((device, graphics_queue, present_queue))
    }

    pub fn create_swapchain(&self, requested_extent: vk::Extent2D) -> Result<Swapchain> {
        Swapchain::new(
            &self.instance,
            self.device.clone(),
            self.physical_device,
            &self.surface_loader,
            self.surface,
            self.graphics_family,
            self.present_family,
            requested_extent,
            vk::SwapchainKHR::null(),
        )
    }

    /// Records `f` into a one-shot command buffer, submits it to the
    /// graphics queue, and blocks until it completes (spec §4.2
    /// `ImmediateSubmit`). Only ever called from the single render thread
    /// (spec §5), so the one shared command buffer/fence pair is safe to
    /// reuse across calls. A free function rather than a `&self` method so
    /// it can be handed to `Texture::new` without borrowing the whole
    /// `GpuDevice` (which would conflict with the `&mut Allocator` borrow
    /// that call also needs).
    fn run_immediate_submit(
        device: &ash::Device,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
        f: &dyn Fn(vk::CommandBuffer),
    ) -> Result<()> {
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("reset_command_buffer failed: {e:?}")))?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("begin_command_buffer failed: {e:?}")))?;

            f(command_buffer);

            device
                .end_command_buffer(command_buffer)
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("end_command_buffer failed: {e:?}")))?;

            let buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
            device
                .queue_submit(queue, &[submit_info.build()], fence)
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("queue_submit failed: {e:?}")))?;
            device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("wait_for_fences failed: {e:?}")))?;
            device
                .reset_fences(&[fence])
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("reset_fences failed: {e:?}")))?;
        }
        Ok(())
    }

    pub fn immediate_submit(&self, f: &dyn Fn(vk::CommandBuffer)) -> Result<()> {
        Self::run_immediate_submit(
            &self.device,
            self.graphics_queue,
            self.immediate_command_buffer,
            self.immediate_fence,
            f,
        )
    }

    pub fn create_texture(&mut self, info: &TextureCreateInfo) -> Result<Handle<Texture>> {
        let device = self.device.clone();
        let graphics_family = self.graphics_family;
        let immediate_device = self.device.clone();
        let graphics_queue = self.graphics_queue;
        let command_buffer = self.immediate_command_buffer;
        let fence = self.immediate_fence;
        let texture = Texture::new(
            device,
            &mut self.allocator,
            |f| Self::run_immediate_submit(&immediate_device, graphics_queue, command_buffer, fence, f),
            graphics_family,
            info,
        )?;
        Ok(self.textures.obtain(texture))
    }

    pub fn destroy_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        if let Some(mut texture) = self.textures.release(handle) {
            if let Some(allocation) = texture.take_allocation() {
                self.allocator
                    .free(allocation)
                    .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("texture free failed: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn get_texture(&self, handle: Handle<Texture>) -> Result<&Texture> {
        self.textures.get(handle)
    }

    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Handle<AllocatedBuffer>> {
        let buffer = AllocatedBuffer::new(&self.device, &mut self.allocator, size, usage, location)?;
        Ok(self.buffers.obtain(buffer))
    }

    pub fn destroy_buffer(&mut self, handle: Handle<AllocatedBuffer>) -> Result<()> {
        if let Some(buffer) = self.buffers.release(handle) {
            let AllocatedBuffer { buffer: raw, allocation, .. } = buffer;
            self.allocator
                .free(allocation)
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("buffer free failed: {e}")))?;
            unsafe { self.device.destroy_buffer(raw, None) };
        }
        Ok(())
    }

    pub fn get_buffer(&self, handle: Handle<AllocatedBuffer>) -> Result<&AllocatedBuffer> {
        self.buffers.get(handle)
    }

    /// Hashes `descriptor` and returns the existing render pass if an
    /// identical one was already created (spec §4.2 `CreateRenderPass`
    /// dedup contract).
    pub fn create_render_pass(&mut self, descriptor: RenderPassDescriptor) -> Result<Handle<RenderPassObject>> {
        if let Some(existing) = self.render_pass_cache.get(&descriptor) {
            return Ok(*existing);
        }
        let object = RenderPassObject::new(self.device.clone(), descriptor.clone())?;
        let handle = self.render_passes.obtain(object);
        self.render_pass_cache.insert(descriptor, handle);
        Ok(handle)
    }

    pub fn get_render_pass(&self, handle: Handle<RenderPassObject>) -> Result<&RenderPassObject> {
        self.render_passes.get(handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_framebuffer(
        &mut self,
        render_pass: Handle<RenderPassObject>,
        extent: vk::Extent2D,
        attachments: Vec<vk::ImageView>,
    ) -> Result<Handle<Framebuffer>> {
        let render_pass_object = self.render_passes.get(render_pass)?;
        let expected = render_pass_object.descriptor.colors.len()
            + render_pass_object.descriptor.depth.is_some() as usize;
        let framebuffer = Framebuffer::new(
            self.device.clone(),
            render_pass,
            render_pass_object.handle,
            extent,
            attachments,
            expected,
        )?;
        Ok(self.framebuffers.obtain(framebuffer))
    }

    pub fn destroy_framebuffer(&mut self, handle: Handle<Framebuffer>) {
        self.framebuffers.release(handle);
    }

    pub fn get_framebuffer(&self, handle: Handle<Framebuffer>) -> Result<&Framebuffer> {
        self.framebuffers.get(handle)
    }

    pub fn create_pipeline(
        &mut self,
        info: &PipelineCreateInfo,
        render_pass: Handle<RenderPassObject>,
        extent: vk::Extent2D,
    ) -> Result<Handle<PipelineObject>> {
        let render_pass_object = self.render_passes.get(render_pass)?;
        info.validate_against(&render_pass_object.descriptor)?;
        let pipeline = PipelineObject::new(self.device.clone(), info, render_pass_object.handle, extent)?;
        Ok(self.pipelines.obtain(pipeline))
    }

    pub fn destroy_pipeline(&mut self, handle: Handle<PipelineObject>) {
        self.pipelines.release(handle);
    }

    pub fn get_pipeline(&self, handle: Handle<PipelineObject>) -> Result<&PipelineObject> {
        self.pipelines.get(handle)
    }

    pub fn create_descriptor_set_layout(
        &mut self,
        bindings: Vec<DescriptorBindingDesc>,
    ) -> Result<Handle<DescriptorSetLayoutObject>> {
        let layout = DescriptorSetLayoutObject::new(self.device.clone(), bindings)?;
        Ok(self.descriptor_set_layouts.obtain(layout))
    }

    pub fn destroy_descriptor_set_layout(&mut self, handle: Handle<DescriptorSetLayoutObject>) {
        self.descriptor_set_layouts.release(handle);
    }

    pub fn get_descriptor_set_layout(
        &self,
        handle: Handle<DescriptorSetLayoutObject>,
    ) -> Result<&DescriptorSetLayoutObject> {
        self.descriptor_set_layouts.get(handle)
    }

    pub fn allocate_descriptor_set(
        &self,
        layout: Handle<DescriptorSetLayoutObject>,
    ) -> Result<vk::DescriptorSet> {
        let layout_object = self.descriptor_set_layouts.get(layout)?;
        self.descriptor_pool.allocate(layout_object.handle)
    }

    /// Destroys every pooled GPU object (spec §4.5 `Cleanup`); called before
    /// the device itself tears down, e.g. on `FrameGraph` drop or a full
    /// `Resize`-driven rebuild.
    pub fn free_all_resources(&mut self) {
        let allocator = &mut self.allocator;
        self.textures.free_all_resources(|mut texture| {
            if let Some(allocation) = texture.take_allocation() {
                let _ = allocator.free(allocation);
            }
        });
        let allocator = &mut self.allocator;
        let device = &self.device;
        self.buffers.free_all_resources(|buffer| {
            let _ = allocator.free(buffer.allocation);
            unsafe { device.destroy_buffer(buffer.buffer, None) };
        });
        self.render_pass_cache.clear();
        self.render_passes.free_all_resources(|_| {});
        self.framebuffers.free_all_resources(|_| {});
        self.pipelines.free_all_resources(|_| {});
        self.descriptor_set_layouts.free_all_resources(|_| {});
    }
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            warn!("device_wait_idle failed during teardown: {e:?}");
        }
        self.free_all_resources();
        unsafe {
            self.device.destroy_fence(self.immediate_fence, None);
            self.device.destroy_command_pool(self.immediate_command_pool, None);
            self.device.destroy_device(None);
            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        info!("Vulkan device torn down");
    }
}
