//! A provider-agnostic conversation model over multiple LLM vendors.
//!
//! Conversations are built from [`Message`]s made of [`Part`]s and sent through
//! a [`Provider`]: OpenAI, Google Gemini (via Vertex AI) or Anthropic Claude
//! (via Vertex AI). A [`Session`] keeps the history of one conversation and
//! commits each model reply to it, including streamed replies.

pub mod accumulator;
pub(crate) mod cancel;
pub mod chat;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod response;
pub mod sse_stream;
pub mod tool;
pub(crate) mod translate;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::ResponseAccumulator;
pub use chat::{ChatStream, FailurePolicy, Session};
pub use error::Error;
pub use factory::{ProviderConfig, ProviderFactory, ProviderType};
pub use provider::{ContextCache, ContextCacher, Provider};
pub use providers::*;
pub use response::{Response, StreamItem, StreamResponse};
pub use sse_stream::SseEvent;
pub use tool::Definition;
pub use types::*;

// Cancellation is part of every provider call.
pub use tokio_util::sync::CancellationToken;
