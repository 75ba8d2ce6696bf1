//! Provider implementations for different LLM services.

pub mod openai;
pub mod vertex;

// Re-export commonly used provider types
pub use openai::OpenAIProvider;
pub use vertex::{AnthropicViaVertexProvider, GoogleProvider, VertexAuth};
