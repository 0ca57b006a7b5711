//! Renderer-wide configuration, threaded explicitly through constructors
//! instead of the teacher's implicit globals (per spec §9's "replace global
//! singletons with explicit context objects" redesign flag).

use ash::vk;

/// Fixed resolution the shadow-map pass renders its cascades at,
/// independent of swapchain/window size (spec §4.6).
pub const SHADOW_MAP_RESOLUTION: u32 = 4096;

/// Number of cascades the shadow-map pass and lights UBO agree on.
pub const SHADOW_CASCADE_COUNT: usize = 4;

/// Side length of the irradiance convolution cubemap (spec §4.7).
pub const IRRADIANCE_MAP_SIZE: u32 = 32;

/// Side length (mip 0) of the prefiltered specular cubemap (spec §4.7).
pub const PREFILTER_MAP_SIZE: u32 = 128;

/// Number of mips in the prefiltered specular cubemap, one per roughness
/// step in `[0, 1]`.
pub const PREFILTER_MIP_COUNT: u32 = 6;

/// Side length of the BRDF LUT (spec §4.7).
pub const BRDF_LUT_SIZE: u32 = 512;

/// Number of hemisphere samples baked into the SSAO pass's private uniform
/// buffer (spec §4.6).
pub const SSAO_KERNEL_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub application_name: String,
    pub engine_name: String,
    pub enable_validation_layers: bool,
    /// Initial swapchain-sized resolution; every size-dependent pass output
    /// is derived from this until the first `Resize`.
    pub initial_resolution: vk::Extent2D,
    /// Reserve capacity passed to every `Pool::new` (spec §4.1, "typical:
    /// 128").
    pub pool_reserve_capacity: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "vk-frame-graph-app".to_string(),
            engine_name: "vk-frame-graph".to_string(),
            enable_validation_layers: cfg!(debug_assertions),
            initial_resolution: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            pool_reserve_capacity: 128,
        }
    }
}
