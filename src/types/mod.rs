//! Core types used throughout the library.

pub mod message;
pub mod options;
pub mod part;

// Re-export commonly used types
pub use message::*;
pub use options::*;
pub use part::{Blob, Part, ToolCall, ToolResult};
