//! External interfaces the frame graph core consumes (spec §6). These are
//! the types a host application implements/fills in; the core never
//! constructs them, only reads from them during `Record`/`Execute`.

use ash::vk;
use glam::{Mat4, Vec3, Vec4};

use crate::error::Result;

/// One draw-ready mesh instance, as the host's scene representation exposes
/// it to `FrameGraph::execute`.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub material_index: u32,
    pub model_matrix: Mat4,
    /// Passes that skip alpha-tested geometry (G-buffer, shadow map) check
    /// this flag rather than reaching into the material table themselves.
    pub alpha_tested: bool,
}

/// One cascade of the directional shadow map: the view-projection matrix
/// used to render it, and the depth at which the next cascade takes over.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ShadowCascade {
    pub view_projection: Mat4,
    pub split_depth: f32,
    pub _pad: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub cascades: [ShadowCascade; crate::config::SHADOW_CASCADE_COUNT],
}

/// What `FrameGraph::execute`/`pre_render` read each frame. Implemented by
/// the host's scene graph; the core only ever borrows it.
pub trait SceneSource {
    fn draw_items(&self) -> &[DrawItem];
    fn directional_light(&self) -> &DirectionalLight;
    /// UI overlay geometry for the current frame (spec §4.6 UI pass
    /// contract); empty when nothing is being drawn this frame.
    fn ui_draw_data(&self) -> &UiDrawData;
}

/// Layout of the `"camera_buffer"` external resource (spec §6).
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CameraUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection_inverse: Mat4,
    pub position: Vec4,
}

/// Layout of the `"lights_buffer"` external resource (spec §6).
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct LightsUniforms {
    pub direction: Vec4,
    pub color: Vec4,
    pub cascades: [ShadowCascade; crate::config::SHADOW_CASCADE_COUNT],
}

/// Host-owned swapchain/presentation surface (spec §6). The core calls
/// `acquire` at the start of a frame and `present` at the end; `OnResize`
/// is not a method here because it is simply the host calling
/// `FrameGraph::resize` with the new extent once its swapchain has been
/// rebuilt.
pub trait SwapchainSource {
    fn acquire(&mut self) -> Result<(vk::ImageView, u32, vk::Extent2D)>;
    fn present(&mut self, image_index: u32) -> Result<()>;
}

/// One immediate-mode UI draw command: a contiguous index range to draw
/// with a given clip rect and bound texture, matching the shape both
/// Dear ImGui and egui backends expose (spec §4.6 UI pass contract).
#[derive(Debug, Clone, Copy)]
pub struct UiDrawCommand {
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub clip_rect: [f32; 4],
    pub texture_id: u32,
}

#[derive(Debug, Default)]
pub struct UiDrawData {
    pub vertex_buffer: Option<vk::Buffer>,
    pub index_buffer: Option<vk::Buffer>,
    pub commands: Vec<UiDrawCommand>,
}

/// Maps shader path strings to SPIR-V words loaded at startup (spec §6).
/// Loading/watching shader files from disk is the host's job; the core
/// only ever calls `get`.
#[derive(Debug, Default)]
pub struct ShaderCache {
    modules: std::collections::HashMap<String, Vec<u32>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, spirv: Vec<u32>) {
        self.modules.insert(path.into(), spirv);
    }

    pub fn get(&self, path: &str) -> Result<&[u32]> {
        self.modules
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| crate::error::FrameGraphError::resource_not_found(path))
    }
}

/// Bindless material table: a sampled-image array plus a per-material
/// uniform buffer, indexed by `DrawItem::material_index` via push constant
/// (spec §6).
pub trait MaterialTable {
    fn bindless_descriptor_set(&self) -> vk::DescriptorSet;
    fn material_descriptor_set(&self, material_index: u32) -> vk::DescriptorSet;
}
