//! Error taxonomy (spec §7). Every fallible entry point in this crate
//! returns `Result<_, FrameGraphError>`; nothing in here retries — a
//! `FrameGraphError` either means programmer error (`ResourceNotFound`,
//! `InvalidHandle`, `CompileError`, `InvalidConfig`) or device loss
//! (`Gpu`), and both are unrecoverable from within the core.

use crate::handle::RawHandle;

#[derive(thiserror::Error, Debug)]
pub enum FrameGraphError {
    /// A Vulkan call returned a non-success `vk::Result`, or a lower-level
    /// allocator/instance-bringup step failed.
    #[error("vulkan operation failed: {0}")]
    Gpu(#[from] anyhow::Error),

    /// `ResourceRegistry::get_resource` or `FrameGraph::get_resource` missed.
    #[error("resource not found: {name}")]
    ResourceNotFound { name: String },

    /// `Pool::get` of a released or sentinel handle.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(RawHandle),

    /// A pass declares an input no producer writes, or the compiled
    /// dependency graph contains a cycle.
    #[error("compile error: {0}")]
    CompileError(String),

    /// A pipeline's attachment formats don't match its target render pass.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl FrameGraphError {
    pub fn resource_not_found(name: impl Into<String>) -> Self {
        Self::ResourceNotFound { name: name.into() }
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::CompileError(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FrameGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_not_found_formats_the_name() {
        let err = FrameGraphError::resource_not_found("hdr_image");
        assert_eq!(err.to_string(), "resource not found: hdr_image");
    }

    #[test]
    fn compile_and_invalid_config_carry_their_message() {
        assert_eq!(
            FrameGraphError::compile("cycle detected").to_string(),
            "compile error: cycle detected"
        );
        assert_eq!(
            FrameGraphError::invalid_config("format mismatch").to_string(),
            "invalid pipeline configuration: format mismatch"
        );
    }
}
