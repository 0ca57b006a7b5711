//! Buffer data model (spec §3 "Buffer"). Sizes are immutable after
//! creation; host-mappable buffers expose a stable mapped pointer.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};

use crate::error::{FrameGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local only; not host visible.
    Device,
    /// Host-visible, not guaranteed cached; used for staging uploads.
    Host,
    /// Host-visible and persistently mapped for the buffer's lifetime
    /// (spec invariant: "expose a stable mapped pointer").
    HostMappable,
}

impl From<MemoryLocation> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryLocation) -> Self {
        match value {
            MemoryLocation::Device => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryLocation::Host => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryLocation::HostMappable => gpu_allocator::MemoryLocation::CpuToGpu,
        }
    }
}

/// A device buffer plus its allocation, mirroring the original's
/// `AllocatedBuffer`.
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Allocation,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    /// Present only for `HostMappable` buffers; stable for the buffer's
    /// lifetime.
    pub mapped_ptr: Option<*mut u8>,
    pub device_address: Option<vk::DeviceAddress>,
}

// `Allocation` is not `Send`/`Sync` by default in some gpu-allocator
// versions because of the raw mapped pointer; the pool that owns this
// buffer is only ever touched from the single render thread (spec §5).
unsafe impl Send for AllocatedBuffer {}

impl AllocatedBuffer {
    pub fn new(
        device: &ash::Device,
        allocator: &mut Allocator,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        if size == 0 {
            return Err(FrameGraphError::invalid_config("buffer size must be > 0"));
        }

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&create_info, None) }
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_buffer failed: {e:?}")))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let mut allocation = allocator
            .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                name: "frame-graph-buffer",
                requirements,
                location: location.into(),
                linear: true,
                allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("buffer allocation failed: {e}")))?;

        unsafe {
            device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("bind_buffer_memory failed: {e:?}")))?;
        }

        let mapped_ptr = if location == MemoryLocation::HostMappable {
            allocation.mapped_ptr().map(|p| p.as_ptr() as *mut u8)
        } else {
            None
        };

        let device_address = if usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
            Some(unsafe { device.get_buffer_device_address(&info) })
        } else {
            None
        };

        Ok(Self {
            buffer,
            allocation,
            size,
            usage,
            location,
            mapped_ptr,
            device_address,
        })
    }

    /// # Safety
    /// Only valid for `HostMappable` buffers; caller must not read past
    /// `size` bytes.
    pub unsafe fn mapped_slice(&self) -> Option<&mut [u8]> {
        self.mapped_ptr
            .map(|ptr| std::slice::from_raw_parts_mut(ptr, self.size as usize))
    }
}
