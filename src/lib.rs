//! A Vulkan frame graph: a declarative pass DAG that derives its own render
//! passes, framebuffers, pipelines and descriptor sets from each pass's
//! declared resource inputs/outputs, then compiles them into a fixed
//! execution order once per `Compile`/`Resize` (spec §1).
//!
//! [`graph::FrameGraph`] is the entry point: register [`graph::Pass`]
//! implementations (see [`passes`] for the concrete ones this crate ships),
//! call [`graph::FrameGraph::compile`], then [`graph::FrameGraph::execute`]
//! once per frame. [`ibl`] precomputes the environment-lighting textures the
//! lighting pass reads; [`scene`] defines the host-implemented interfaces
//! the graph pulls scene data through.

pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod handle;
pub mod ibl;
pub mod passes;
pub mod registry;
pub mod scene;

pub use config::RendererConfig;
pub use device::GpuDevice;
pub use error::{FrameGraphError, Result};
pub use graph::{FrameGraph, Pass};
pub use handle::Handle;
