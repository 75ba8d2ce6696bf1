//! Turn-taking chat sessions on top of a [`Provider`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::accumulator::ResponseAccumulator;
use crate::provider::Provider;
use crate::response::{Response, StreamItem, StreamResponse};
use crate::types::message::MessageRepr;
use crate::types::{Message, Options, Part, Role};
use crate::Error;

/// What happens to the just-appended user message when a turn fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the user message in history; [`Session::retry`] repeats the call.
    #[default]
    KeepUserMessage,
    /// Remove the user message again, leaving history as it was before the turn.
    /// A failed retry leaves the message it repeated in place.
    RollBack,
}

/// A conversation with one model: its history and the provider that answers.
///
/// Serializes as `{"model": ..., "history": [...]}`. The provider binding and
/// failure policy are runtime configuration and are not persisted.
#[derive(Serialize, Deserialize, Default)]
pub struct Session {
    model: String,
    history: Vec<Message>,
    #[serde(skip)]
    provider: Option<Arc<dyn Provider>>,
    #[serde(skip)]
    failure_policy: FailurePolicy,
}

#[derive(Deserialize)]
struct SessionRepr {
    model: String,
    #[serde(default)]
    history: Vec<MessageRepr>,
}

impl Session {
    /// Create an empty session for `model` with no provider bound.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Bind the provider that answers this session's turns.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Start from an existing transcript.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Bind or replace the provider, e.g. after restoring from JSON.
    pub fn set_provider(&mut self, provider: Arc<dyn Provider>) {
        self.provider = Some(provider);
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Restore a session persisted as JSON. No provider is bound.
    ///
    /// Fails with [`Error::UnknownPartType`] or [`Error::MalformedMessage`]
    /// when the transcript holds content this crate cannot represent.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let repr: SessionRepr =
            serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))?;
        let history = repr
            .history
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(repr.model).with_history(history))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    fn bound_provider(&self) -> Result<Arc<dyn Provider>, Error> {
        self.provider
            .clone()
            .ok_or_else(|| Error::config("no provider bound to chat session"))
    }

    fn begin_turn(&mut self, parts: impl IntoIterator<Item = Part>) {
        self.history
            .push(Message::new(Role::User, parts.into_iter().collect()));
    }

    fn commit(&mut self, response: &Response) {
        let message = response.to_model_message();
        tracing::debug!(
            model = %self.model,
            parts = message.parts.len(),
            history = self.history.len() + 1,
            "committing model turn"
        );
        self.history.push(message);
    }

    /// `appended` is false for retries, whose user message predates the call.
    fn abort_turn(&mut self, error: &Error, appended: bool) {
        tracing::debug!(model = %self.model, %error, policy = ?self.failure_policy, "turn failed");
        if appended && self.failure_policy == FailurePolicy::RollBack {
            self.history.pop();
        }
    }

    fn ensure_pending_user_turn(&self) -> Result<(), Error> {
        match self.history.last() {
            Some(message) if message.role == Role::User => Ok(()),
            _ => Err(Error::config(
                "nothing to retry: history does not end with a user message",
            )),
        }
    }

    async fn complete(
        &mut self,
        provider: Arc<dyn Provider>,
        cancel: &CancellationToken,
        options: &Options,
        appended: bool,
    ) -> Result<Response, Error> {
        match provider
            .generate_content(cancel, &self.model, &self.history, options)
            .await
        {
            Ok(response) => {
                self.commit(&response);
                Ok(response)
            }
            Err(error) => {
                self.abort_turn(&error, appended);
                Err(error)
            }
        }
    }

    async fn open_stream(
        &mut self,
        provider: Arc<dyn Provider>,
        cancel: &CancellationToken,
        options: &Options,
        appended: bool,
    ) -> Result<ChatStream<'_>, Error> {
        match provider
            .generate_content_stream(cancel, &self.model, &self.history, options)
            .await
        {
            Ok(stream) => Ok(ChatStream {
                session: self,
                stream,
                accumulator: ResponseAccumulator::new(),
                state: TurnState::Streaming,
                appended,
            }),
            Err(error) => {
                self.abort_turn(&error, appended);
                Err(error)
            }
        }
    }

    /// Send one user turn and wait for the complete reply.
    pub async fn send(
        &mut self,
        cancel: &CancellationToken,
        parts: impl IntoIterator<Item = Part>,
    ) -> Result<Response, Error> {
        self.send_with_options(cancel, parts, &Options::default())
            .await
    }

    /// Like [`send`](Self::send), with per-call options such as tools or a cache name.
    pub async fn send_with_options(
        &mut self,
        cancel: &CancellationToken,
        parts: impl IntoIterator<Item = Part>,
        options: &Options,
    ) -> Result<Response, Error> {
        let provider = self.bound_provider()?;
        self.begin_turn(parts);
        self.complete(provider, cancel, options, true).await
    }

    /// Send one user turn and stream the reply.
    ///
    /// The reply is committed to history when the returned stream reports its
    /// end. The stream borrows the session, so no other turn can start while
    /// it is alive.
    pub async fn send_stream(
        &mut self,
        cancel: &CancellationToken,
        parts: impl IntoIterator<Item = Part>,
    ) -> Result<ChatStream<'_>, Error> {
        self.send_stream_with_options(cancel, parts, &Options::default())
            .await
    }

    /// Like [`send_stream`](Self::send_stream), with per-call options.
    pub async fn send_stream_with_options(
        &mut self,
        cancel: &CancellationToken,
        parts: impl IntoIterator<Item = Part>,
        options: &Options,
    ) -> Result<ChatStream<'_>, Error> {
        let provider = self.bound_provider()?;
        self.begin_turn(parts);
        self.open_stream(provider, cancel, options, true).await
    }

    /// Ask again for a reply to the user message that ends the history,
    /// typically after a failed [`send`](Self::send).
    ///
    /// Nothing is appended before the call. Fails with [`Error::Config`] when
    /// the last message is not from the user.
    pub async fn retry(&mut self, cancel: &CancellationToken) -> Result<Response, Error> {
        self.retry_with_options(cancel, &Options::default()).await
    }

    pub async fn retry_with_options(
        &mut self,
        cancel: &CancellationToken,
        options: &Options,
    ) -> Result<Response, Error> {
        let provider = self.bound_provider()?;
        self.ensure_pending_user_turn()?;
        self.complete(provider, cancel, options, false).await
    }

    /// Streaming form of [`retry`](Self::retry).
    pub async fn retry_stream(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ChatStream<'_>, Error> {
        self.retry_stream_with_options(cancel, &Options::default())
            .await
    }

    pub async fn retry_stream_with_options(
        &mut self,
        cancel: &CancellationToken,
        options: &Options,
    ) -> Result<ChatStream<'_>, Error> {
        let provider = self.bound_provider()?;
        self.ensure_pending_user_turn()?;
        self.open_stream(provider, cancel, options, false).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("model", &self.model)
            .field("history", &self.history)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Streaming,
    Committed,
    Closed,
    Failed,
}

/// A streamed reply that commits itself to its session's history.
///
/// Deltas are accumulated as they are read. The first
/// [`StreamItem::EndOfStream`] appends the model message exactly once;
/// closing the stream earlier discards the partial reply.
pub struct ChatStream<'a> {
    session: &'a mut Session,
    stream: StreamResponse,
    accumulator: ResponseAccumulator,
    state: TurnState,
    appended: bool,
}

impl ChatStream<'_> {
    /// Wait for the next delta.
    pub async fn next(&mut self) -> Result<StreamItem, Error> {
        if self.state != TurnState::Streaming {
            return Ok(StreamItem::EndOfStream);
        }

        match self.stream.next().await {
            Ok(StreamItem::Delta(delta)) => {
                self.accumulator.process(&delta);
                Ok(StreamItem::Delta(delta))
            }
            Ok(StreamItem::EndOfStream) => {
                self.session.commit(self.accumulator.response());
                self.state = TurnState::Committed;
                Ok(StreamItem::EndOfStream)
            }
            Err(error) => {
                self.stream.close();
                self.state = TurnState::Failed;
                self.session.abort_turn(&error, self.appended);
                Err(error)
            }
        }
    }

    /// Release the stream. Before the end has been reached, nothing is
    /// committed to history. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.stream.close();
        if self.state == TurnState::Streaming {
            self.state = TurnState::Closed;
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> String {
        self.accumulator.current_text()
    }

    /// Reasoning accumulated so far.
    pub fn thought(&self) -> String {
        self.accumulator.current_thought()
    }

    /// Everything accumulated so far.
    pub fn response(&self) -> &Response {
        self.accumulator.response()
    }

    pub fn is_committed(&self) -> bool {
        self.state == TurnState::Committed
    }

    /// Read the stream to its end and return the committed reply.
    pub async fn collect(mut self) -> Result<Response, Error> {
        while let StreamItem::Delta(_) = self.next().await? {}
        Ok(self.accumulator.finalize())
    }
}

impl std::fmt::Debug for ChatStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("model", &self.session.model)
            .field("state", &self.state)
            .finish()
    }
}
