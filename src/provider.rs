//! The provider contract every vendor adapter implements.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::response::{Response, StreamResponse};
use crate::types::{Message, Options};
use crate::Error;

/// A vendor-neutral LLM backend.
///
/// Implementations translate `history` into the vendor's wire format, never
/// mutate it, and normalize the vendor's output back into [`Part`]s.
/// Every call observes `cancel`: once it fires, in-flight requests are
/// abandoned and [`Error::Cancelled`] is returned.
///
/// [`Part`]: crate::types::Part
#[async_trait::async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Short vendor tag used in errors and logs.
    fn name(&self) -> &'static str;

    /// Generate one complete response.
    async fn generate_content(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<Response, Error>;

    /// Start a streamed response.
    ///
    /// Fails immediately with a translation error if the history cannot be
    /// expressed for this vendor, before any request is sent.
    async fn generate_content_stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<StreamResponse, Error>;

    /// Vendor-side context caching, when the vendor supports it.
    fn context_cacher(&self) -> Option<&dyn ContextCacher> {
        None
    }
}

/// A precomputed vendor-side context that later calls reference by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextCache {
    /// Fully qualified resource name, passed back through [`Options::cache_name`].
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub model: String,
    pub expire_time: DateTime<Utc>,
}

/// Optional capability for creating and managing context caches.
///
/// Discover it through [`Provider::context_cacher`].
#[async_trait::async_trait]
pub trait ContextCacher: Send + Sync {
    /// Cache `history` for `model`. System messages become the cached system
    /// instruction.
    async fn create_cache(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        display_name: &str,
        ttl: Duration,
    ) -> Result<ContextCache, Error>;

    async fn get_cache(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ContextCache, Error>;

    async fn delete_cache(&self, cancel: &CancellationToken, name: &str) -> Result<(), Error>;

    async fn list_caches(&self, cancel: &CancellationToken) -> Result<Vec<ContextCache>, Error>;
}
