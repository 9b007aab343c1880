use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Runtime limits and diagnostics switches shared by all processes of a
/// [`World`](crate::vm::World).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct VmConfig {
    /// Maximum number of values on a process' value stack.
    pub max_stack_depth: usize,
    /// Maximum number of active frames per process.
    pub max_call_depth: usize,
    /// Maximum number of dimensions of an array.
    pub max_array_dimensions: usize,
    /// Maximum number of elements of an array.
    pub max_array_elements: usize,
    /// Emit a `trace` event for every dispatched instruction.
    pub trace_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 10_000,
            max_call_depth: 1_000,
            max_array_dimensions: 10,
            max_array_elements: 10_000_000,
            trace_instructions: false,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid VM configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }
}
