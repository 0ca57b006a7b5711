//! Frame Graph (spec §4.5): the compiled pass DAG. `GraphState` is the
//! mutable state passes declare resources against during `Setup`;
//! `FrameGraph` owns the device, the state, and the passes themselves, kept
//! as disjoint top-level fields so `Compile`/`Execute` can borrow e.g.
//! `self.device` and `self.state` independently while indexing
//! `self.passes`.

pub mod node;
pub mod pass;

use std::collections::{BTreeSet, HashMap, HashSet};

use ash::vk;
use tracing::{debug, info};

use crate::device::{GpuDevice, MemoryLocation, TextureCreateInfo};
use crate::error::{FrameGraphError, Result};
use crate::handle::Handle;
use crate::registry::LogicalResourceKind;
use crate::scene::SceneSource;

pub use node::{FrameGraphNode, LogicalResource, PassInputBinding, PassOutputBinding};
pub use pass::{DerivedPassObjects, Pass, PipelineConfig, init_pass_objects};

/// The state passes read and mutate during `Setup`/`Init`/`Record` (spec
/// §3, §4.5). Lives separately from `Vec<Box<dyn Pass>>` so a pass's
/// `&mut self` never aliases this.
pub struct GraphState {
    resources: HashMap<String, LogicalResource>,
    nodes: Vec<FrameGraphNode>,
    node_index_by_name: HashMap<String, usize>,
    selected_node: Option<usize>,
    extent: vk::Extent2D,
    execution_order: Vec<usize>,
}

impl GraphState {
    fn new(extent: vk::Extent2D) -> Self {
        Self {
            resources: HashMap::new(),
            nodes: Vec::new(),
            node_index_by_name: HashMap::new(),
            selected_node: None,
            extent,
            execution_order: Vec::new(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn resources(&self) -> &HashMap<String, LogicalResource> {
        &self.resources
    }

    pub fn node(&self, index: usize) -> &FrameGraphNode {
        &self.nodes[index]
    }

    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_index_by_name.get(name).copied()
    }

    fn current_node(&self) -> usize {
        self.selected_node
            .expect("resource declared outside of a pass's Setup call")
    }

    fn entry(&mut self, name: &str) -> &mut LogicalResource {
        self.resources
            .entry(name.to_string())
            .or_insert_with(|| LogicalResource::placeholder(name))
    }

    /// Creates a new physical texture, binds it to `name`, and records this
    /// pass as an output (spec §4.3 duplicate-name tie-break: creation
    /// replaces and destroys whatever was previously bound to `name`).
    pub fn create_texture_resource(
        &mut self,
        device: &mut GpuDevice,
        name: &str,
        info: &TextureCreateInfo,
        load_op: vk::AttachmentLoadOp,
    ) -> Result<()> {
        let node_index = self.current_node();
        if let Some(existing) = self.resources.get(name) {
            if let Some(texture) = existing.texture {
                device.destroy_texture(texture)?;
            }
        }
        let handle = device.create_texture(info)?;
        let kind = if info.is_cube {
            LogicalResourceKind::TextureCube
        } else {
            LogicalResourceKind::Texture
        };
        let resource = self.entry(name);
        resource.kind = Some(kind);
        resource.texture = Some(handle);
        resource.format = Some(info.format);
        if resource.producer.is_none() {
            resource.producer = Some(node_index);
        }
        resource.last_writer = Some(node_index);
        self.nodes[node_index].outputs.push(PassOutputBinding {
            resource_name: name.to_string(),
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
        });
        Ok(())
    }

    /// Creates a new physical buffer and binds it to `name`. Buffers never
    /// participate in render-pass attachment derivation, so this does not
    /// touch the node's `outputs` — only `producer`/`last_writer`, so a
    /// later `read_resource` of the same name can still resolve an edge.
    pub fn create_buffer_resource(
        &mut self,
        device: &mut GpuDevice,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<()> {
        let node_index = self.current_node();
        if let Some(existing) = self.resources.get(name) {
            if let Some(buffer) = existing.buffer {
                device.destroy_buffer(buffer)?;
            }
        }
        let handle = device.create_buffer(size, usage, location)?;
        let resource = self.entry(name);
        resource.kind = Some(LogicalResourceKind::Buffer);
        resource.buffer = Some(handle);
        resource.format = None;
        if resource.producer.is_none() {
            resource.producer = Some(node_index);
        }
        resource.last_writer = Some(node_index);
        Ok(())
    }

    /// Declares that this pass writes an already-registered texture
    /// resource as a render-pass output without recreating its physical
    /// backing (e.g. the lighting pass writing into a G-buffer-sized
    /// colour target the G-buffer pass itself allocated).
    pub fn write_resource(
        &mut self,
        name: &str,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) {
        let node_index = self.current_node();
        {
            let resource = self.entry(name);
            if resource.producer.is_none() {
                resource.producer = Some(node_index);
            }
            resource.last_writer = Some(node_index);
        }
        self.nodes[node_index].outputs.push(PassOutputBinding {
            resource_name: name.to_string(),
            load_op,
            store_op,
        });
    }

    /// Declares a resource input, binding kind inferred from the resource's
    /// declared kind once it is known (spec §4.4).
    pub fn read_resource(&mut self, name: &str, stage_flags: vk::ShaderStageFlags) {
        self.read_resource_inner(name, None, stage_flags)
    }

    /// Like [`Self::read_resource`] but overrides the inferred binding kind
    /// (e.g. a storage-image read rather than a sampled read).
    pub fn read_resource_as(
        &mut self,
        name: &str,
        kind: crate::device::BindingKind,
        stage_flags: vk::ShaderStageFlags,
    ) {
        self.read_resource_inner(name, Some(kind), stage_flags)
    }

    fn read_resource_inner(
        &mut self,
        name: &str,
        explicit_kind: Option<crate::device::BindingKind>,
        stage_flags: vk::ShaderStageFlags,
    ) {
        let node_index = self.current_node();
        self.entry(name).ref_count += 1;
        self.nodes[node_index].inputs.push(PassInputBinding {
            resource_name: name.to_string(),
            explicit_kind,
            stage_flags,
        });
    }

    /// Binds a resource the host created outside the frame graph (e.g. the
    /// camera/lights uniform buffers, an IBL environment cubemap) so passes
    /// can `read_resource` it like any other (spec §4.3
    /// `AddExternalResource`).
    pub fn add_external_texture(&mut self, name: &str, handle: Handle<crate::device::Texture>, format: vk::Format, is_cube: bool) {
        let kind = if is_cube {
            LogicalResourceKind::TextureCube
        } else {
            LogicalResourceKind::Texture
        };
        let resource = self.entry(name);
        resource.kind = Some(kind);
        resource.texture = Some(handle);
        resource.format = Some(format);
        resource.external = true;
    }

    pub fn add_external_buffer(&mut self, name: &str, handle: Handle<crate::device::AllocatedBuffer>) {
        let resource = self.entry(name);
        resource.kind = Some(LogicalResourceKind::Buffer);
        resource.buffer = Some(handle);
        resource.external = true;
    }

    /// Destroys every non-external physical resource this graph owns,
    /// leaving `resources`/`nodes` to be rebuilt by the next `Setup` pass
    /// (spec §4.5 `Resize` teardown step).
    fn clear_owned(&mut self, device: &mut GpuDevice) -> Result<()> {
        for resource in self.resources.values() {
            if resource.external {
                continue;
            }
            if let Some(texture) = resource.texture {
                device.destroy_texture(texture)?;
            }
            if let Some(buffer) = resource.buffer {
                device.destroy_buffer(buffer)?;
            }
        }
        self.resources.clear();
        self.nodes.clear();
        self.node_index_by_name.clear();
        self.execution_order.clear();
        Ok(())
    }
}

/// The compiled pass graph itself (spec §4.5 `FrameGraph`).
pub struct FrameGraph {
    device: GpuDevice,
    state: GraphState,
    passes: Vec<Box<dyn Pass>>,
}

impl FrameGraph {
    pub fn new(device: GpuDevice, extent: vk::Extent2D) -> Self {
        Self {
            device,
            state: GraphState::new(extent),
            passes: Vec::new(),
        }
    }

    pub fn device(&self) -> &GpuDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut GpuDevice {
        &mut self.device
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    /// Registers a pass. Passes run `Setup` in registration order (spec
    /// §4.5); execution order is determined separately by `Compile`'s
    /// topological sort over the resulting dependency edges.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Three-phase compile (spec §4.5 `Compile`):
    /// 1. Setup — every pass declares its resources, in registration order.
    /// 2. Edge — every input resolves to the resource's last writer (or
    ///    producer, if never re-written), erroring if the resource was
    ///    never produced.
    /// 3. Materialize — render pass/descriptor set/framebuffer/pipeline
    ///    objects are derived in execution order (a topological sort of the
    ///    edges, Kahn's algorithm, ties broken by registration order).
    pub fn compile(&mut self) -> Result<()> {
        self.setup_phase()?;
        self.edge_phase()?;
        self.toposort_phase()?;
        self.materialize_phase()?;
        info!(passes = self.passes.len(), "frame graph compiled");
        Ok(())
    }

    fn setup_phase(&mut self) -> Result<()> {
        for (index, pass) in self.passes.iter().enumerate() {
            let node = FrameGraphNode::new(pass.name().to_string(), index);
            self.state.node_index_by_name.insert(node.name.clone(), index);
            self.state.nodes.push(node);
        }
        for index in 0..self.passes.len() {
            self.state.selected_node = Some(index);
            self.passes[index].setup(&mut self.device, &mut self.state)?;
            self.state.selected_node = None;
        }
        Ok(())
    }

    fn edge_phase(&mut self) -> Result<()> {
        let resources = &self.state.resources;
        let mut edges_by_node: Vec<HashMap<String, usize>> = Vec::with_capacity(self.state.nodes.len());
        for node in &self.state.nodes {
            let mut edges = HashMap::new();
            for input in &node.inputs {
                let resource = resources.get(&input.resource_name).ok_or_else(|| {
                    FrameGraphError::compile(format!(
                        "pass '{}' reads undeclared resource '{}'",
                        node.name, input.resource_name
                    ))
                })?;
                if !resource.is_satisfied() {
                    return Err(FrameGraphError::compile(format!(
                        "pass '{}' reads resource '{}' with no producer",
                        node.name, input.resource_name
                    )));
                }
                if let Some(writer) = resource.last_writer.or(resource.producer) {
                    edges.insert(input.resource_name.clone(), writer);
                }
            }
            edges_by_node.push(edges);
        }
        for (node, edges) in self.state.nodes.iter_mut().zip(edges_by_node) {
            node.edges = edges;
        }
        Ok(())
    }

    /// Kahn's algorithm; ties (multiple nodes simultaneously ready) broken
    /// by lowest registration index so execution order is deterministic
    /// across otherwise-equivalent compiles (spec §9 supplemented decision).
    fn toposort_phase(&mut self) -> Result<()> {
        let order = topological_order(&self.state.nodes)?;
        debug!(?order, "execution order resolved");
        self.state.execution_order = order;
        Ok(())
    }

    fn materialize_phase(&mut self) -> Result<()> {
        let extent = self.state.extent;
        for &index in &self.state.execution_order.clone() {
            let node = &self.state.nodes[index];
            self.passes[index].init(&mut self.device, node, &self.state.resources, extent)?;
        }
        Ok(())
    }

    /// Runs every pass's `pre_render` hook, then records each pass's work
    /// into `cmd` in execution order (spec §4.5 `Execute`).
    pub fn execute(&mut self, cmd: vk::CommandBuffer, scene: &dyn SceneSource) -> Result<()> {
        for &index in &self.state.execution_order.clone() {
            let node = &self.state.nodes[index];
            self.passes[index].pre_render(&self.device, node, &self.state.resources, scene)?;
        }
        for &index in &self.state.execution_order.clone() {
            let node = &self.state.nodes[index];
            self.passes[index].record(&self.device, node, &self.state.resources, cmd, scene)?;
        }
        Ok(())
    }

    /// Tears down every pass's derived objects and owned resources, then
    /// recompiles against `new_extent` (spec §4.5 `Resize`: "invalidates
    /// every handle obtained before the call").
    pub fn resize(&mut self, new_extent: vk::Extent2D) -> Result<()> {
        for pass in &mut self.passes {
            pass.reset(&mut self.device);
        }
        self.state.clear_owned(&mut self.device)?;
        self.state.extent = new_extent;
        self.compile()
    }
}

/// Kahn's algorithm over each node's resolved `edges` map, ties broken by
/// lowest registration index. Pulled out of [`FrameGraph::toposort_phase`]
/// since it only touches node topology, not the device or pass objects.
fn topological_order(nodes: &[FrameGraphNode]) -> Result<Vec<usize>> {
    let n = nodes.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0u32; n];
    for (index, node) in nodes.iter().enumerate() {
        let unique_predecessors: HashSet<usize> = node.edges.values().copied().collect();
        in_degree[index] = unique_predecessors.len() as u32;
        for predecessor in unique_predecessors {
            dependents[predecessor].push(index);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != n {
        return Err(FrameGraphError::compile("cycle detected among pass dependencies"));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, index: usize, edges: &[(&str, usize)]) -> FrameGraphNode {
        let mut node = FrameGraphNode::new(name.to_string(), index);
        for (resource, predecessor) in edges {
            node.edges.insert(resource.to_string(), *predecessor);
        }
        node
    }

    #[test]
    fn topological_order_respects_dependencies() {
        // 0 (gbuffer) -> 1 (lighting) -> 2 (tone mapping); 1 also depends on
        // an external camera buffer (no predecessor node, so not an edge).
        let nodes = vec![
            node("gbuffer", 0, &[]),
            node("lighting", 1, &[("gbuffer_albedo", 0)]),
            node("tone_mapping", 2, &[("hdr_image", 1)]),
        ];
        let order = topological_order(&nodes).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn topological_order_breaks_ties_by_registration_index() {
        // Both 1 and 2 depend only on 0 and become ready simultaneously;
        // the lower index must run first regardless of edge insertion order.
        let nodes = vec![
            node("gbuffer", 0, &[]),
            node("ssao", 1, &[("gbuffer_normal", 0)]),
            node("shadow_map", 2, &[("gbuffer_depth", 0)]),
        ];
        let order = topological_order(&nodes).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn topological_order_detects_cycles() {
        let nodes = vec![node("a", 0, &[("b_out", 1)]), node("b", 1, &[("a_out", 0)])];
        assert!(topological_order(&nodes).is_err());
    }

    #[test]
    fn logical_resource_is_satisfied_requires_kind_or_external() {
        let mut resource = LogicalResource::placeholder("never_written");
        assert!(!resource.is_satisfied());
        resource.external = true;
        assert!(resource.is_satisfied());
    }

    fn state_with_node(name: &str) -> GraphState {
        let mut state = GraphState::new(vk::Extent2D { width: 1920, height: 1080 });
        let node = FrameGraphNode::new(name.to_string(), 0);
        state.node_index_by_name.insert(name.to_string(), 0);
        state.nodes.push(node);
        state.selected_node = Some(0);
        state
    }

    #[test]
    fn write_resource_records_producer_and_last_writer_without_a_device() {
        let mut state = state_with_node("tone_mapping");
        state.write_resource("main_frame_color", vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE);

        let resource = state.resources().get("main_frame_color").unwrap();
        assert_eq!(resource.producer, Some(0));
        assert_eq!(resource.last_writer, Some(0));
        assert_eq!(state.nodes[0].outputs.len(), 1);
        assert_eq!(state.nodes[0].outputs[0].resource_name, "main_frame_color");
    }

    #[test]
    fn read_resource_increments_ref_count_and_records_input() {
        let mut state = state_with_node("lighting");
        state.read_resource("camera_buffer", vk::ShaderStageFlags::VERTEX);
        state.read_resource("camera_buffer", vk::ShaderStageFlags::FRAGMENT);

        assert_eq!(state.resources().get("camera_buffer").unwrap().ref_count, 2);
        assert_eq!(state.nodes[0].inputs.len(), 2);
        assert!(state.nodes[0].inputs[0].explicit_kind.is_none());
    }

    #[test]
    fn read_resource_as_overrides_the_inferred_binding_kind() {
        let mut state = state_with_node("ssao");
        state.read_resource_as("gbuffer_depth", crate::device::BindingKind::StorageImage, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(state.nodes[0].inputs[0].explicit_kind, Some(crate::device::BindingKind::StorageImage));
    }

    #[test]
    fn external_resources_are_satisfied_without_a_producer() {
        let mut state = state_with_node("lighting");
        let handle: Handle<crate::device::AllocatedBuffer> = Handle::default();
        state.add_external_buffer("lights_buffer", handle);
        let resource = state.resources().get("lights_buffer").unwrap();
        assert!(resource.is_satisfied());
        assert!(resource.producer.is_none());
    }
}
