//! Normalized provider output: complete responses, stream deltas and the
//! stream handle that yields them.

use crate::types::{FinishReason, Message, Part, Role, ToolCall, Usage};
use crate::Error;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Output of a provider call, or one delta of a streamed call.
///
/// Vendor output is normalized into ordered [`Part`]s, so text, reasoning and
/// tool calls are read from disjoint subsets of the same sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub parts: Vec<Part>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl Response {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            parts,
            ..Default::default()
        }
    }

    /// Concatenated non-reasoning text, in part order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated reasoning text, in part order.
    pub fn thought(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Thought(thought) => Some(thought.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls requested by the model, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Whether this carries neither parts nor metadata.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.finish_reason.is_none() && self.usage.is_none()
    }

    /// The model message a chat session records for this response:
    /// reasoning first (when present), then the text, then any blobs in
    /// the order received, then any tool calls.
    pub fn to_model_message(&self) -> Message {
        let mut parts = Vec::new();
        let thought = self.thought();
        if !thought.is_empty() {
            parts.push(Part::Thought(thought));
        }
        parts.push(Part::Text(self.text()));
        parts.extend(
            self.parts
                .iter()
                .filter(|part| matches!(part, Part::Blob(_)))
                .cloned(),
        );
        parts.extend(
            self.tool_calls()
                .into_iter()
                .map(|call| Part::ToolCall(call.clone())),
        );
        Message::new(Role::Model, parts)
    }
}

/// One step of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// An incremental fragment, not the running total.
    Delta(Response),
    /// The vendor has no more deltas to send.
    EndOfStream,
}

impl StreamItem {
    pub fn is_end(&self) -> bool {
        matches!(self, StreamItem::EndOfStream)
    }
}

type DeltaStream = Pin<Box<dyn Stream<Item = Result<Response, Error>> + Send>>;

/// A streaming provider response.
///
/// Owns the underlying transport. [`close`](Self::close) releases it and may be
/// called any number of times, including after the stream is exhausted.
pub struct StreamResponse {
    inner: Option<DeltaStream>,
    cancel: CancellationToken,
}

impl StreamResponse {
    /// Create a new response from a stream of deltas.
    pub fn from_stream<S>(stream: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Response, Error>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(stream)),
            cancel,
        }
    }

    /// Wait for the next delta.
    ///
    /// Returns [`StreamItem::EndOfStream`] once the vendor is done, and on every
    /// call after that. A transport error or cancellation releases the stream.
    pub async fn next(&mut self) -> Result<StreamItem, Error> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(StreamItem::EndOfStream);
        };

        let cancel = self.cancel.clone();
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = inner.next() => Some(item),
        };

        match polled {
            None => {
                self.close();
                Err(Error::Cancelled)
            }
            Some(Some(Ok(delta))) => {
                tracing::trace!(?delta, "stream delta");
                Ok(StreamItem::Delta(delta))
            }
            Some(Some(Err(error))) => {
                self.close();
                Err(error)
            }
            Some(None) => {
                self.close();
                Ok(StreamItem::EndOfStream)
            }
        }
    }

    /// Release the underlying transport.
    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the stream and merge every delta into one response.
    pub async fn collect(mut self) -> Result<Response, Error> {
        let mut accumulator = crate::accumulator::ResponseAccumulator::new();
        while let StreamItem::Delta(delta) = self.next().await? {
            accumulator.process(&delta);
        }
        Ok(accumulator.finalize())
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("closed", &self.is_closed())
            .finish()
    }
}
