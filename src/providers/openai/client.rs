use super::types::{
    ChatChunk, ChatContent, ChatMessage, ChatRequest, ChatResponse, ChatTool, ChatToolCall,
    ChatUsage, ContentPart, FileData, FunctionCall, FunctionDefinition, ImageUrl, StreamOptions,
};
use crate::provider::Provider;
use crate::sse_stream::SseEvent;
use crate::tool::Definition;
use crate::translate::{
    data_uri, decode_frame, parse_arguments, post_json, read_json, sse_deltas, text_only, RoleMap,
};
use crate::types::{FinishReason, Message, Options, Part, Role, ToolCall, Usage};
use crate::{Error, Response, StreamResponse};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PROVIDER: &str = "OpenAI";

const ROLES: RoleMap = RoleMap {
    user: "user",
    model: "assistant",
    tool: "tool",
};

/// OpenAI provider implementation, speaking the Chat Completions API.
///
/// System messages stay in place as `system` turns. Thoughts are never sent
/// back. Blobs are only accepted in user turns: images become `image_url`
/// parts, anything else a `file` part, both as base64 data URIs. Tool results
/// become separate `tool` messages.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Tool call fragments collected by stream index until the vendor finishes the choice.
#[derive(Debug, Default)]
struct StreamState {
    tool_calls: BTreeMap<u32, ToolCall>,
}

impl StreamState {
    fn take_tool_calls(&mut self) -> Vec<Part> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(Part::ToolCall)
            .collect()
    }
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, "https://api.openai.com/v1")
    }

    /// Create a new OpenAI provider with custom base URL.
    pub fn new_with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn completions(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
    }

    fn convert_request(
        model: &str,
        history: &[Message],
        options: &Options,
        stream: bool,
    ) -> Result<ChatRequest, Error> {
        let mut messages = Vec::with_capacity(history.len());
        for message in history {
            Self::convert_message(message, &mut messages)?;
        }

        Ok(ChatRequest {
            model: model.to_string(),
            messages,
            tools: Self::convert_tools(&options.tools),
            max_completion_tokens: options.max_output_tokens,
            temperature: options.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        })
    }

    fn convert_message(message: &Message, out: &mut Vec<ChatMessage>) -> Result<(), Error> {
        match message.role {
            Role::System => {
                out.push(ChatMessage::text("system", text_only(PROVIDER, message)?));
            }
            Role::Model => out.push(Self::convert_model_message(message)?),
            Role::User | Role::Tool => {
                let mut content = Vec::new();
                let mut has_blob = false;

                for part in &message.parts {
                    match part {
                        Part::Text(text) => content.push(ContentPart::Text { text: text.clone() }),
                        Part::Thought(_) => {}
                        Part::Blob(blob) if message.role == Role::User => {
                            has_blob = true;
                            let url = data_uri(&blob.mime_type, &blob.data);
                            content.push(if blob.mime_type.starts_with("image/") {
                                ContentPart::ImageUrl {
                                    image_url: ImageUrl { url },
                                }
                            } else {
                                ContentPart::File {
                                    file: FileData { file_data: url },
                                }
                            });
                        }
                        Part::ToolResult(result) => out.push(ChatMessage {
                            role: ROLES.tool,
                            content: Some(ChatContent::Text(result.content.clone())),
                            tool_calls: Vec::new(),
                            tool_call_id: Some(result.id.clone()),
                        }),
                        other => {
                            return Err(Error::translation(
                                PROVIDER,
                                format!("{} part in {} message", other.kind(), message.role),
                            ))
                        }
                    }
                }

                if content.is_empty() {
                    return Ok(());
                }
                if message.role == Role::Tool {
                    return Err(Error::translation(
                        PROVIDER,
                        "tool message content must be tool results",
                    ));
                }

                let content = if has_blob {
                    ChatContent::Parts(content)
                } else {
                    ChatContent::Text(
                        content
                            .into_iter()
                            .filter_map(|part| match part {
                                ContentPart::Text { text } => Some(text),
                                _ => None,
                            })
                            .collect(),
                    )
                };
                out.push(ChatMessage {
                    role: ROLES.user,
                    content: Some(content),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                });
            }
        }
        Ok(())
    }

    fn convert_model_message(message: &Message) -> Result<ChatMessage, Error> {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in &message.parts {
            match part {
                Part::Text(delta) => text.push_str(delta),
                Part::Thought(_) => {}
                Part::ToolCall(call) => {
                    parse_arguments(PROVIDER, call)?;
                    tool_calls.push(ChatToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: if call.arguments.trim().is_empty() {
                                "{}".to_string()
                            } else {
                                call.arguments.clone()
                            },
                        },
                    });
                }
                other => {
                    return Err(Error::translation(
                        PROVIDER,
                        format!("{} part in model message", other.kind()),
                    ))
                }
            }
        }

        Ok(ChatMessage {
            role: ROLES.model,
            content: (!text.is_empty() || tool_calls.is_empty()).then_some(ChatContent::Text(text)),
            tool_calls,
            tool_call_id: None,
        })
    }

    fn convert_tools(tools: &[Definition]) -> Vec<ChatTool> {
        tools
            .iter()
            .map(|tool| ChatTool {
                kind: "function",
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect()
    }

    fn convert_response(response: ChatResponse) -> Result<Response, Error> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider(PROVIDER, "response contained no choices"))?;

        let mut parts = Vec::new();
        if let Some(reasoning) = choice.message.reasoning_content.filter(|r| !r.is_empty()) {
            parts.push(Part::Thought(reasoning));
        }
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            parts.push(Part::Text(content));
        }
        parts.extend(choice.message.tool_calls.into_iter().map(|call| {
            Part::tool_call(call.id, call.function.name, call.function.arguments)
        }));

        Ok(Response {
            parts,
            finish_reason: choice.finish_reason.as_deref().map(convert_finish_reason),
            usage: response.usage.map(convert_usage),
        })
    }

    fn convert_stream_event(
        state: &mut StreamState,
        event: SseEvent,
    ) -> Result<Vec<Response>, Error> {
        if event.is_done() {
            let parts = state.take_tool_calls();
            return Ok(if parts.is_empty() {
                Vec::new()
            } else {
                vec![Response::new(parts)]
            });
        }
        let chunk = decode_frame::<ChatChunk>(PROVIDER, &event)?;
        Ok(Self::convert_chunk(state, chunk))
    }

    fn convert_chunk(state: &mut StreamState, chunk: ChatChunk) -> Vec<Response> {
        let mut deltas = Vec::new();

        for choice in chunk.choices {
            let mut parts = Vec::new();
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                parts.push(Part::Thought(reasoning));
            }
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                parts.push(Part::Text(content));
            }

            for fragment in delta.tool_calls {
                let call = state.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                        call.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }

            let finish_reason = choice.finish_reason.as_deref().map(convert_finish_reason);
            if finish_reason.is_some() {
                parts.extend(state.take_tool_calls());
            }
            if !parts.is_empty() || finish_reason.is_some() {
                deltas.push(Response {
                    parts,
                    finish_reason,
                    usage: None,
                });
            }
        }

        if let Some(usage) = chunk.usage {
            deltas.push(Response {
                usage: Some(convert_usage(usage)),
                ..Default::default()
            });
        }
        deltas
    }
}

fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

fn convert_usage(usage: ChatUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cached_tokens: usage.prompt_tokens_details.and_then(|d| d.cached_tokens),
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
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
        let request = Self::convert_request(model, history, options, false)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            messages = request.messages.len(),
            stream = false,
            "sending request"
        );

        let response = post_json(PROVIDER, cancel, self.completions(), &request).await?;
        let body: ChatResponse = read_json(PROVIDER, cancel, response).await?;
        Self::convert_response(body)
    }

    async fn generate_content_stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<StreamResponse, Error> {
        let request = Self::convert_request(model, history, options, true)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            messages = request.messages.len(),
            stream = true,
            "sending request"
        );

        let response = post_json(PROVIDER, cancel, self.completions(), &request).await?;
        let deltas = sse_deltas(response, StreamState::default(), Self::convert_stream_event);
        Ok(StreamResponse::from_stream(deltas, cancel.clone()))
    }
}
