//! Surface bring-up is the one place the windowing non-goal (spec §1) has
//! to touch real Vulkan objects: something has to hand the device wrapper a
//! `VkSurfaceKHR` before a swapchain can exist. `SurfaceFactory` keeps that
//! a pluggable seam instead of a hard dependency, the same way the teacher
//! crate gates its Wayland surface creation behind the `wayland` feature.

use ash::vk;

use crate::error::Result;

pub trait SurfaceFactory {
    /// Required instance extensions this factory needs enabled (e.g.
    /// `VK_KHR_wayland_surface`), beyond `VK_KHR_surface` which the device
    /// wrapper always enables.
    fn required_instance_extensions(&self) -> Vec<&'static std::ffi::CStr>;

    /// Creates the `VkSurfaceKHR`. Called once, after instance creation.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR>;
}

#[cfg(feature = "wayland")]
pub mod wayland {
    use std::os::raw::c_void;

    use ash::vk;

    use super::SurfaceFactory;
    use crate::error::{FrameGraphError, Result};

    /// Wraps raw Wayland `wl_display`/`wl_surface` pointers handed to us by
    /// the windowing collaborator (mirrors the teacher's
    /// `init_surface_wayland`).
    pub struct WaylandSurfaceFactory {
        display: *mut c_void,
        surface: *mut c_void,
    }

    impl WaylandSurfaceFactory {
        /// # Safety
        /// `display` and `surface` must be valid, live Wayland handles for
        /// the lifetime of the returned `VkSurfaceKHR`.
        pub unsafe fn new(display: *mut c_void, surface: *mut c_void) -> Self {
            Self { display, surface }
        }
    }

    impl SurfaceFactory for WaylandSurfaceFactory {
        fn required_instance_extensions(&self) -> Vec<&'static std::ffi::CStr> {
            vec![ash::extensions::khr::WaylandSurface::name()]
        }

        fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
            if self.display.is_null() || self.surface.is_null() {
                return Err(FrameGraphError::invalid_config(
                    "Wayland display or surface pointer is null",
                ));
            }
            let loader = ash::extensions::khr::WaylandSurface::new(entry, instance);
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(self.display)
                .surface(self.surface);
            unsafe { loader.create_wayland_surface(&create_info, None) }
                .map_err(|e| FrameGraphError::Gpu(anyhow::anyhow!("create_wayland_surface failed: {e:?}")))
        }
    }
}
