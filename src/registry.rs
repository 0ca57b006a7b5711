//! Resource Registry (spec §4.3): a process-lifetime string → logical
//! resource map, plus the replace-destroys-old-physical-object tie-break for
//! duplicate names. Kept as a thin, standalone layer the host can use to
//! register external resources before a `FrameGraph` exists; the graph's
//! own `GraphState` duplicates the same map internally for passes that
//! create/write/read resources during `Setup` (spec §4.5).

use std::collections::HashMap;

use ash::vk;

use crate::device::{AllocatedBuffer, GpuDevice, Texture, TextureCreateInfo};
use crate::error::{FrameGraphError, Result};
use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalResourceKind {
    Texture,
    TextureCube,
    Buffer,
}

#[derive(Debug, Clone, Copy)]
pub enum PhysicalResource {
    Texture(Handle<Texture>),
    Buffer(Handle<AllocatedBuffer>),
}

pub struct RegisteredResource {
    pub kind: LogicalResourceKind,
    pub physical: PhysicalResource,
    pub format: Option<vk::Format>,
    /// External resources are never destroyed by the registry (spec §4.3
    /// `AddExternalResource`).
    pub external: bool,
}

#[derive(Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, RegisteredResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new physical texture and binds it to `name`, destroying
    /// whatever was previously bound to that name (duplicate-name
    /// tie-break: creation replaces, spec §4.3).
    pub fn create_texture_resource(
        &mut self,
        device: &mut GpuDevice,
        name: &str,
        info: &TextureCreateInfo,
    ) -> Result<Handle<Texture>> {
        self.replace_physical(device, name)?;
        let handle = device.create_texture(info)?;
        let kind = if info.is_cube {
            LogicalResourceKind::TextureCube
        } else {
            LogicalResourceKind::Texture
        };
        self.resources.insert(
            name.to_string(),
            RegisteredResource {
                kind,
                physical: PhysicalResource::Texture(handle),
                format: Some(info.format),
                external: false,
            },
        );
        Ok(handle)
    }

    pub fn create_buffer_resource(
        &mut self,
        device: &mut GpuDevice,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: crate::device::MemoryLocation,
    ) -> Result<Handle<AllocatedBuffer>> {
        self.replace_physical(device, name)?;
        let handle = device.create_buffer(size, usage, location)?;
        self.resources.insert(
            name.to_string(),
            RegisteredResource {
                kind: LogicalResourceKind::Buffer,
                physical: PhysicalResource::Buffer(handle),
                format: None,
                external: false,
            },
        );
        Ok(handle)
    }

    fn replace_physical(&mut self, device: &mut GpuDevice, name: &str) -> Result<()> {
        if let Some(existing) = self.resources.remove(name) {
            if !existing.external {
                match existing.physical {
                    PhysicalResource::Texture(handle) => device.destroy_texture(handle)?,
                    PhysicalResource::Buffer(handle) => device.destroy_buffer(handle)?,
                }
            }
        }
        Ok(())
    }

    pub fn add_external_texture(&mut self, name: &str, handle: Handle<Texture>, format: vk::Format, is_cube: bool) {
        self.resources.insert(
            name.to_string(),
            RegisteredResource {
                kind: if is_cube {
                    LogicalResourceKind::TextureCube
                } else {
                    LogicalResourceKind::Texture
                },
                physical: PhysicalResource::Texture(handle),
                format: Some(format),
                external: true,
            },
        );
    }

    pub fn add_external_buffer(&mut self, name: &str, handle: Handle<AllocatedBuffer>) {
        self.resources.insert(
            name.to_string(),
            RegisteredResource {
                kind: LogicalResourceKind::Buffer,
                physical: PhysicalResource::Buffer(handle),
                format: None,
                external: true,
            },
        );
    }

    pub fn get_resource(&self, name: &str) -> Result<&RegisteredResource> {
        self.resources
            .get(name)
            .ok_or_else(|| FrameGraphError::resource_not_found(name))
    }

    /// Destroys every non-external physical resource (called by
    /// `FrameGraph::resize`/teardown; spec §4.5 `Resize` teardown step).
    pub fn clear_owned(&mut self, device: &mut GpuDevice) -> Result<()> {
        let names: Vec<String> = self.resources.keys().cloned().collect();
        for name in names {
            if self.resources.get(&name).map(|r| r.external) == Some(false) {
                self.replace_physical(device, &name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_texture_is_registered_and_marked_non_owned() {
        let mut registry = ResourceRegistry::new();
        registry.add_external_texture("swapchain_image", Handle::default(), vk::Format::B8G8R8A8_UNORM, false);

        let resource = registry.get_resource("swapchain_image").unwrap();
        assert!(resource.external);
        assert_eq!(resource.kind, LogicalResourceKind::Texture);
        assert_eq!(resource.format, Some(vk::Format::B8G8R8A8_UNORM));
        assert!(matches!(resource.physical, PhysicalResource::Texture(_)));
    }

    #[test]
    fn external_cube_texture_is_tagged_texture_cube() {
        let mut registry = ResourceRegistry::new();
        registry.add_external_texture("environment_cube", Handle::default(), vk::Format::R16G16B16A16_SFLOAT, true);
        assert_eq!(registry.get_resource("environment_cube").unwrap().kind, LogicalResourceKind::TextureCube);
    }

    #[test]
    fn external_buffer_is_registered() {
        let mut registry = ResourceRegistry::new();
        registry.add_external_buffer("camera_buffer", Handle::default());
        let resource = registry.get_resource("camera_buffer").unwrap();
        assert!(resource.external);
        assert_eq!(resource.kind, LogicalResourceKind::Buffer);
    }

    #[test]
    fn get_resource_errors_for_an_unregistered_name() {
        let registry = ResourceRegistry::new();
        assert!(registry.get_resource("nonexistent").is_err());
    }
}
