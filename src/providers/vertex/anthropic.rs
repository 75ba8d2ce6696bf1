use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::anthropic_types::*;
use super::{VertexAuth, VertexClient};
use crate::provider::Provider;
use crate::sse_stream::SseEvent;
use crate::tool::Definition;
use crate::translate::{
    base64_encode, decode_frame, parse_arguments, post_json, read_json, split_system, sse_deltas,
    RoleMap,
};
use crate::types::{FinishReason, Message, Options, Part, Role, ToolCall, Usage};
use crate::{Error, Response, StreamResponse};

const PROVIDER: &str = "Anthropic";

const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// Claude requires an explicit output budget on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

const ROLES: RoleMap = RoleMap {
    user: "user",
    model: "assistant",
    tool: "user",
};

/// Anthropic Claude provider implementation via Vertex AI.
///
/// System messages become the top-level `system` string. Thoughts are not
/// sent back, since Claude only accepts signed thinking blocks. Blobs are only
/// accepted in user turns, as `image` blocks for `image/*` and `document`
/// blocks for `application/pdf`. Tool results become `tool_result` blocks in a
/// user turn, and consecutive turns with the same vendor role are merged.
/// Empty text parts are omitted.
pub struct AnthropicViaVertexProvider {
    vertex: VertexClient,
}

/// State for tracking in-progress tool calls during streaming.
#[derive(Debug, Default)]
struct StreamState {
    /// Tool calls indexed by content block index, completed on block stop.
    tool_calls: HashMap<u32, ToolCall>,
    input_tokens: Option<u32>,
    cached_tokens: Option<u32>,
}

impl AnthropicViaVertexProvider {
    /// Create a new Anthropic provider with access token authentication.
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let vertex = VertexClient::with_token(
            project_id.into(),
            location.into(),
            access_token.into(),
            None,
        )?;
        Ok(Self { vertex })
    }

    /// Create a new Anthropic provider with custom base URL (for testing).
    pub fn new_with_base_url(
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let vertex = VertexClient::with_token(
            project_id.into(),
            location.into(),
            access_token.into(),
            Some(base_url.into()),
        )?;
        Ok(Self { vertex })
    }

    /// Create a new Anthropic provider with Application Default Credentials.
    pub async fn with_adc(
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_auth(project_id, location, VertexAuth::ApplicationDefault).await
    }

    /// Create a new Anthropic provider with a specific authentication method.
    pub async fn with_auth(
        project_id: impl Into<String>,
        location: impl Into<String>,
        auth: VertexAuth,
    ) -> Result<Self, Error> {
        let vertex =
            VertexClient::connect(PROVIDER, project_id.into(), location.into(), auth, None).await?;
        Ok(Self { vertex })
    }

    fn convert_request(
        history: &[Message],
        options: &Options,
        stream: bool,
    ) -> Result<AnthropicRequest, Error> {
        let (system, turns) = split_system(PROVIDER, history)?;

        let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(turns.len());
        for message in turns {
            let Some(role) = ROLES.vendor_role(message.role) else {
                continue;
            };
            let mut blocks = Vec::with_capacity(message.parts.len());
            for part in &message.parts {
                if let Some(block) = Self::convert_part(message.role, part)? {
                    blocks.push(block);
                }
            }
            if blocks.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(AnthropicMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        Ok(AnthropicRequest {
            messages,
            max_tokens: options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            anthropic_version: ANTHROPIC_VERSION,
            system,
            temperature: options.temperature,
            tools: Self::convert_tools(&options.tools),
            stream,
        })
    }

    fn convert_part(role: Role, part: &Part) -> Result<Option<AnthropicContentBlock>, Error> {
        let block = match part {
            Part::Text(text) if text.is_empty() => return Ok(None),
            Part::Text(text) => AnthropicContentBlock::Text { text: text.clone() },
            Part::Thought(_) => return Ok(None),
            Part::Blob(blob) => {
                if role != Role::User {
                    return Err(Error::translation(
                        PROVIDER,
                        format!("blob part in {role} message"),
                    ));
                }
                let source = AnthropicSource {
                    kind: "base64".to_string(),
                    media_type: blob.mime_type.clone(),
                    data: base64_encode(&blob.data),
                };
                if blob.mime_type.starts_with("image/") {
                    AnthropicContentBlock::Image { source }
                } else if blob.mime_type == "application/pdf" {
                    AnthropicContentBlock::Document { source }
                } else {
                    return Err(Error::translation(
                        PROVIDER,
                        format!("unsupported blob mime type {}", blob.mime_type),
                    ));
                }
            }
            Part::ToolCall(call) => AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: parse_arguments(PROVIDER, call)?,
            },
            Part::ToolResult(result) => AnthropicContentBlock::ToolResult {
                tool_use_id: result.id.clone(),
                content: result.content.clone(),
            },
        };
        Ok(Some(block))
    }

    fn convert_tools(tools: &[Definition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    fn convert_response(response: AnthropicResponse) -> Result<Response, Error> {
        let mut parts = Vec::with_capacity(response.content.len());
        for block in response.content {
            if let Some(part) = Self::convert_output_block(block)? {
                parts.push(part);
            }
        }

        Ok(Response {
            parts,
            finish_reason: response.stop_reason.as_deref().map(convert_stop_reason),
            usage: response.usage.map(Usage::from),
        })
    }

    /// Empty text and redacted reasoning carry nothing a [`Part`] can hold.
    fn convert_output_block(block: AnthropicContentBlock) -> Result<Option<Part>, Error> {
        match block {
            AnthropicContentBlock::Text { text } if text.is_empty() => Ok(None),
            AnthropicContentBlock::Text { text } => Ok(Some(Part::Text(text))),
            AnthropicContentBlock::Thinking { thinking, .. } if thinking.is_empty() => Ok(None),
            AnthropicContentBlock::Thinking { thinking, .. } => Ok(Some(Part::Thought(thinking))),
            AnthropicContentBlock::RedactedThinking { .. } => Ok(None),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                Ok(Some(Part::tool_call(id, name, input.to_string())))
            }
            other => Err(Error::malformed(format!(
                "{PROVIDER}: unexpected content block in response: {}",
                block_type(&other)
            ))),
        }
    }

    fn convert_stream_event(
        state: &mut StreamState,
        event: SseEvent,
    ) -> Result<Vec<Response>, Error> {
        let event = decode_frame::<AnthropicStreamEvent>(PROVIDER, &event)?;

        let delta = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    state.input_tokens = usage.input_tokens;
                    state.cached_tokens = usage.cache_read_input_tokens;
                }
                None
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    // Input is normally streamed afterwards; a non-empty start value is kept.
                    let arguments = match &input {
                        serde_json::Value::Object(map) if map.is_empty() => String::new(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    state.tool_calls.insert(
                        index,
                        ToolCall {
                            id,
                            name,
                            arguments,
                        },
                    );
                    None
                }
                AnthropicContentBlock::Text { text } if !text.is_empty() => {
                    Some(Part::Text(text))
                }
                AnthropicContentBlock::Thinking { thinking, .. } if !thinking.is_empty() => {
                    Some(Part::Thought(thinking))
                }
                AnthropicContentBlock::Text { .. }
                | AnthropicContentBlock::Thinking { .. }
                | AnthropicContentBlock::RedactedThinking { .. } => None,
                other => {
                    return Err(Error::malformed(format!(
                        "{PROVIDER}: unexpected content block in stream: {}",
                        block_type(&other)
                    )));
                }
            }
            .map(|part| Response::new(vec![part])),
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicContentDelta::TextDelta { text } if !text.is_empty() => {
                    Some(Response::new(vec![Part::Text(text)]))
                }
                AnthropicContentDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    Some(Response::new(vec![Part::Thought(thinking)]))
                }
                AnthropicContentDelta::InputJsonDelta { partial_json } => {
                    if let Some(call) = state.tool_calls.get_mut(&index) {
                        call.arguments.push_str(&partial_json);
                    }
                    None
                }
                _ => None,
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                state.tool_calls.remove(&index).map(|mut call| {
                    if call.arguments.trim().is_empty() {
                        call.arguments = "{}".to_string();
                    }
                    Response::new(vec![Part::ToolCall(call)])
                })
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => Some(Response {
                parts: Vec::new(),
                finish_reason: delta.stop_reason.as_deref().map(convert_stop_reason),
                usage: usage.map(|usage| Usage {
                    input_tokens: usage.input_tokens.or(state.input_tokens).unwrap_or(0),
                    output_tokens: usage.output_tokens.unwrap_or(0),
                    cached_tokens: usage.cache_read_input_tokens.or(state.cached_tokens),
                }),
            }),
            AnthropicStreamEvent::MessageStop | AnthropicStreamEvent::Ping => None,
            AnthropicStreamEvent::Error { error } => {
                return Err(Error::provider(
                    PROVIDER,
                    format!("{}: {}", error.kind, error.message),
                ))
            }
        };

        Ok(delta.into_iter().collect())
    }
}

fn block_type(block: &AnthropicContentBlock) -> &'static str {
    match block {
        AnthropicContentBlock::Text { .. } => "text",
        AnthropicContentBlock::Image { .. } => "image",
        AnthropicContentBlock::Document { .. } => "document",
        AnthropicContentBlock::ToolUse { .. } => "tool_use",
        AnthropicContentBlock::ToolResult { .. } => "tool_result",
        AnthropicContentBlock::Thinking { .. } => "thinking",
        AnthropicContentBlock::RedactedThinking { .. } => "redacted_thinking",
        AnthropicContentBlock::Unknown => "unknown",
    }
}

fn convert_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicViaVertexProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_content(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<Response, Error> {
        let request = Self::convert_request(history, options, false)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            messages = request.messages.len(),
            stream = false,
            "sending request"
        );

        let url = self.vertex.model_url("anthropic", model, "rawPredict");
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.post(&url)).await?;
        let response = post_json(PROVIDER, cancel, builder, &request).await?;
        let body: AnthropicResponse = read_json(PROVIDER, cancel, response).await?;
        Self::convert_response(body)
    }

    async fn generate_content_stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<StreamResponse, Error> {
        let request = Self::convert_request(history, options, true)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            messages = request.messages.len(),
            stream = true,
            "sending request"
        );

        let url = self
            .vertex
            .model_url("anthropic", model, "streamRawPredict?alt=sse");
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.post(&url)).await?;
        let response = post_json(PROVIDER, cancel, builder, &request).await?;
        let deltas = sse_deltas(response, StreamState::default(), Self::convert_stream_event);
        Ok(StreamResponse::from_stream(deltas, cancel.clone()))
    }
}
