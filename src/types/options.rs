use serde::{Deserialize, Serialize};

use crate::tool::Definition;

/// Per-call generation options.
///
/// Passed by shared reference to every provider call and never mutated by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Name of a vendor-side context cache to reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Definition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference a precomputed context cache by name.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// Add a tool definition.
    pub fn tool(mut self, tool: Definition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Replace the tool definitions.
    pub fn tools(mut self, tools: Vec<Definition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: Option<u32>,
}
