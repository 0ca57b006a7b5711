//! `LogicalResource` and `FrameGraphNode` (spec §3): the frame-graph-level
//! data model layered on top of the [`crate::registry::ResourceRegistry`]'s
//! plain name → physical-handle map, adding the graph-topology fields
//! (`producer`, `last_writer`, `ref_count`, per-node `edges`) needed to
//! validate and order a compile.

use std::collections::HashMap;

use ash::vk;

use crate::device::{AllocatedBuffer, BindingKind, Texture};
use crate::handle::Handle;
use crate::registry::LogicalResourceKind;

/// A node's view of one logical resource: which physical object backs it
/// (if any yet), who produced it, and who wrote it most recently.
pub struct LogicalResource {
    pub name: String,
    pub kind: Option<LogicalResourceKind>,
    pub texture: Option<Handle<Texture>>,
    pub buffer: Option<Handle<AllocatedBuffer>>,
    pub format: Option<vk::Format>,
    /// Node index (into `GraphState::nodes`) of the pass that first wrote
    /// this resource.
    pub producer: Option<usize>,
    /// Node index of the most recent writer; used for edge resolution.
    pub last_writer: Option<usize>,
    pub ref_count: u32,
    pub external: bool,
}

impl LogicalResource {
    pub(crate) fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            texture: None,
            buffer: None,
            format: None,
            producer: None,
            last_writer: None,
            ref_count: 0,
            external: false,
        }
    }

    /// A node is "produced" once either `Compile`'s Setup phase created it
    /// or the host registered it externally before `Compile` ran.
    pub fn is_satisfied(&self) -> bool {
        self.kind.is_some() || self.external
    }
}

#[derive(Debug, Clone)]
pub struct PassOutputBinding {
    pub resource_name: String,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

#[derive(Debug, Clone)]
pub struct PassInputBinding {
    pub resource_name: String,
    /// `None` means "infer from the resource's kind" (buffer → uniform
    /// buffer, texture → combined image sampler) once the resource is
    /// known to exist, per spec §4.4's "type chosen by input kind".
    pub explicit_kind: Option<BindingKind>,
    pub stage_flags: vk::ShaderStageFlags,
}

pub struct FrameGraphNode {
    pub name: String,
    pub pass_index: usize,
    pub inputs: Vec<PassInputBinding>,
    pub outputs: Vec<PassOutputBinding>,
    pub enabled: bool,
    /// resource name → predecessor node index, built during the Edge phase.
    pub edges: HashMap<String, usize>,
}

impl FrameGraphNode {
    pub(crate) fn new(name: String, pass_index: usize) -> Self {
        Self {
            name,
            pass_index,
            inputs: Vec::new(),
            outputs: Vec::new(),
            enabled: true,
            edges: HashMap::new(),
        }
    }
}
