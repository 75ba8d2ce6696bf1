use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::google_types::*;
use super::{VertexAuth, VertexClient};
use crate::provider::{ContextCache, ContextCacher, Provider};
use crate::sse_stream::SseEvent;
use crate::tool::Definition;
use crate::translate::{
    base64_decode, base64_encode, decode_frame, parse_arguments, post_json, read_json,
    result_object, send, split_system, sse_deltas, RoleMap,
};
use crate::types::{FinishReason, Message, Options, Part, Usage};
use crate::{Error, Response, StreamResponse};

const PROVIDER: &str = "Google";

const ROLES: RoleMap = RoleMap {
    user: "user",
    model: "model",
    tool: "user",
};

/// Google provider implementation via Vertex AI (for Gemini models).
///
/// System messages become `system_instruction`. Thoughts round-trip as text
/// parts flagged `thought: true`. Blobs are sent inline in any role. Tool
/// results become `functionResponse` parts. Empty text parts are omitted.
/// Also implements [`ContextCacher`] on top of `cachedContents`.
pub struct GoogleProvider {
    vertex: VertexClient,
}

impl GoogleProvider {
    /// Create a new Google provider with access token authentication.
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

    /// Create a new Google provider with custom base URL (for testing).
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

    /// Create a new Google provider with Application Default Credentials.
    pub async fn with_adc(
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_auth(project_id, location, VertexAuth::ApplicationDefault).await
    }

    /// Create a new Google provider with a specific authentication method.
    pub async fn with_auth(
        project_id: impl Into<String>,
        location: impl Into<String>,
        auth: VertexAuth,
    ) -> Result<Self, Error> {
        let vertex =
            VertexClient::connect(PROVIDER, project_id.into(), location.into(), auth, None).await?;
        Ok(Self { vertex })
    }

    fn convert_request(history: &[Message], options: &Options) -> Result<GoogleRequest, Error> {
        let (system_instruction, contents) = Self::convert_contents(history)?;

        let generation_config = (options.temperature.is_some()
            || options.max_output_tokens.is_some())
        .then(|| GoogleGenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
        });

        Ok(GoogleRequest {
            contents,
            generation_config,
            tools: Self::convert_tools(&options.tools)?,
            system_instruction,
            cached_content: options.cache_name.clone(),
        })
    }

    /// Split `history` into a system instruction and Gemini contents.
    fn convert_contents(
        history: &[Message],
    ) -> Result<(Option<GoogleContent>, Vec<GoogleContent>), Error> {
        let (system, turns) = split_system(PROVIDER, history)?;
        let system_instruction = system.map(|text| GoogleContent {
            role: String::new(),
            parts: vec![GooglePart {
                text: Some(text),
                ..Default::default()
            }],
        });

        // Tool results may omit the function name; recover it from the matching call.
        let call_names: HashMap<&str, &str> = turns
            .iter()
            .flat_map(|message| message.tool_calls())
            .map(|call| (call.id.as_str(), call.name.as_str()))
            .collect();

        let mut contents = Vec::with_capacity(turns.len());
        for message in turns {
            let Some(role) = ROLES.vendor_role(message.role) else {
                continue;
            };
            let mut parts = Vec::with_capacity(message.parts.len());
            for part in &message.parts {
                if let Some(part) = Self::convert_part(part, &call_names)? {
                    parts.push(part);
                }
            }
            if !parts.is_empty() {
                contents.push(GoogleContent {
                    role: role.to_string(),
                    parts,
                });
            }
        }

        Ok((system_instruction, contents))
    }

    fn convert_part(
        part: &Part,
        call_names: &HashMap<&str, &str>,
    ) -> Result<Option<GooglePart>, Error> {
        let converted = match part {
            Part::Text(text) if text.is_empty() => return Ok(None),
            Part::Text(text) => GooglePart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::Thought(thought) if thought.is_empty() => return Ok(None),
            Part::Thought(thought) => GooglePart {
                text: Some(thought.clone()),
                thought: true,
                ..Default::default()
            },
            Part::Blob(blob) => GooglePart {
                inline_data: Some(GoogleBlob {
                    mime_type: blob.mime_type.clone(),
                    data: base64_encode(&blob.data),
                }),
                ..Default::default()
            },
            Part::ToolCall(call) => GooglePart {
                function_call: Some(GoogleFunctionCall {
                    id: None,
                    name: call.name.clone(),
                    args: serde_json::from_value(parse_arguments(PROVIDER, call)?)?,
                }),
                ..Default::default()
            },
            Part::ToolResult(result) => {
                let name = if result.name.is_empty() {
                    call_names
                        .get(result.id.as_str())
                        .map(|name| name.to_string())
                        .ok_or_else(|| {
                            Error::translation(
                                PROVIDER,
                                format!("tool result {} has no matching tool call", result.id),
                            )
                        })?
                } else {
                    result.name.clone()
                };
                GooglePart {
                    function_response: Some(GoogleFunctionResponse {
                        name,
                        response: serde_json::from_value(result_object(&result.content))?,
                    }),
                    ..Default::default()
                }
            }
        };
        Ok(Some(converted))
    }

    fn convert_tools(tools: &[Definition]) -> Result<Vec<GoogleTool>, Error> {
        if tools.is_empty() {
            return Ok(Vec::new());
        }
        let function_declarations = tools
            .iter()
            .map(|tool| {
                Ok(GoogleFunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: serde_json::value::to_raw_value(&tool.input_schema)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(vec![GoogleTool {
            function_declarations,
        }])
    }

    fn convert_response(response: GoogleResponse) -> Result<Response, Error> {
        if let Some(error) = response.error {
            return Err(Error::provider(
                PROVIDER,
                format!("API error ({}): {}", error.code, error.message),
            ));
        }

        let usage = response.usage_metadata.map(Usage::from);
        let Some(candidate) = response.candidates.into_iter().next() else {
            return Ok(Response {
                usage,
                ..Default::default()
            });
        };

        let mut parts = Vec::with_capacity(candidate.content.parts.len());
        for part in candidate.content.parts {
            if let Some(part) = Self::convert_output_part(part)? {
                parts.push(part);
            }
        }

        let has_tool_calls = parts.iter().any(|part| matches!(part, Part::ToolCall(_)));
        let finish_reason = candidate
            .finish_reason
            .as_deref()
            .map(|reason| convert_finish_reason(reason, has_tool_calls));

        Ok(Response {
            parts,
            finish_reason,
            usage,
        })
    }

    fn convert_output_part(part: GooglePart) -> Result<Option<Part>, Error> {
        if let Some(call) = part.function_call {
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            let arguments = if call.args.is_null() {
                "{}".to_string()
            } else {
                serde_json::to_string(&call.args)?
            };
            return Ok(Some(Part::tool_call(id, call.name, arguments)));
        }
        if let Some(blob) = part.inline_data {
            let data = base64_decode(PROVIDER, &blob.data)?;
            return Ok(Some(Part::blob(blob.mime_type, data)));
        }
        match part.text {
            Some(text) if text.is_empty() => Ok(None),
            Some(text) if part.thought => Ok(Some(Part::Thought(text))),
            Some(text) => Ok(Some(Part::Text(text))),
            // A bare signature carries no content of its own.
            None if part.thought_signature.is_some() && part.function_response.is_none() => {
                Ok(None)
            }
            None => Err(Error::malformed(format!(
                "{PROVIDER}: response part without text, inline data or function call"
            ))),
        }
    }

    fn convert_stream_event(_state: &mut (), event: SseEvent) -> Result<Vec<Response>, Error> {
        if event.is_done() {
            return Ok(Vec::new());
        }
        let frame = decode_frame::<GoogleResponse>(PROVIDER, &event)?;
        let delta = Self::convert_response(frame)?;
        Ok(if delta.is_empty() { Vec::new() } else { vec![delta] })
    }

    fn convert_cache(cache: CachedContent) -> ContextCache {
        let model = cache
            .model
            .rsplit_once("/models/")
            .map(|(_, model)| model.to_string())
            .unwrap_or(cache.model);
        ContextCache {
            name: cache.name,
            display_name: cache.display_name.filter(|name| !name.is_empty()),
            model,
            expire_time: cache.expire_time,
        }
    }

    /// Accept either a full `projects/...` resource name or a bare cache id.
    fn cache_resource(&self, name: &str) -> String {
        if name.starts_with("projects/") {
            name.to_string()
        } else {
            format!("{}/cachedContents/{name}", self.vertex.parent())
        }
    }
}

fn convert_finish_reason(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "STOP" if has_tool_calls => FinishReason::ToolCalls,
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        other => FinishReason::Other(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Provider for GoogleProvider {
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
        let request = Self::convert_request(history, options)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            contents = request.contents.len(),
            cached = request.cached_content.is_some(),
            stream = false,
            "sending request"
        );

        let url = self.vertex.model_url("google", model, "generateContent");
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.post(&url)).await?;
        let response = post_json(PROVIDER, cancel, builder, &request).await?;
        let body: GoogleResponse = read_json(PROVIDER, cancel, response).await?;
        Self::convert_response(body)
    }

    async fn generate_content_stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        options: &Options,
    ) -> Result<StreamResponse, Error> {
        let request = Self::convert_request(history, options)?;
        tracing::debug!(
            provider = PROVIDER,
            model,
            contents = request.contents.len(),
            cached = request.cached_content.is_some(),
            stream = true,
            "sending request"
        );

        let url = self
            .vertex
            .model_url("google", model, "streamGenerateContent?alt=sse");
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.post(&url)).await?;
        let response = post_json(PROVIDER, cancel, builder, &request).await?;
        let deltas = sse_deltas(response, (), Self::convert_stream_event);
        Ok(StreamResponse::from_stream(deltas, cancel.clone()))
    }

    fn context_cacher(&self) -> Option<&dyn ContextCacher> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl ContextCacher for GoogleProvider {
    async fn create_cache(
        &self,
        cancel: &CancellationToken,
        model: &str,
        history: &[Message],
        display_name: &str,
        ttl: Duration,
    ) -> Result<ContextCache, Error> {
        let (system_instruction, contents) = Self::convert_contents(history)?;
        let request = CachedContentRequest {
            model: self.vertex.model_resource("google", model),
            display_name: display_name.to_string(),
            contents,
            system_instruction,
            ttl: format!("{}s", ttl.as_secs()),
        };
        tracing::debug!(
            provider = PROVIDER,
            model,
            display_name,
            ttl = ?ttl,
            "creating context cache"
        );

        let url = self
            .vertex
            .resource_url(&format!("{}/cachedContents", self.vertex.parent()));
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.post(&url)).await?;
        let response = post_json(PROVIDER, cancel, builder, &request).await?;
        let cache: CachedContent = read_json(PROVIDER, cancel, response).await?;
        Ok(Self::convert_cache(cache))
    }

    async fn get_cache(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ContextCache, Error> {
        let url = self.vertex.resource_url(&self.cache_resource(name));
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.get(&url)).await?;
        let response = send(PROVIDER, cancel, builder).await?;
        let cache: CachedContent = read_json(PROVIDER, cancel, response).await?;
        Ok(Self::convert_cache(cache))
    }

    async fn delete_cache(&self, cancel: &CancellationToken, name: &str) -> Result<(), Error> {
        tracing::debug!(provider = PROVIDER, name, "deleting context cache");
        let url = self.vertex.resource_url(&self.cache_resource(name));
        let builder = self.vertex.authorize(PROVIDER, cancel, self.vertex.delete(&url)).await?;
        send(PROVIDER, cancel, builder).await?;
        Ok(())
    }

    async fn list_caches(&self, cancel: &CancellationToken) -> Result<Vec<ContextCache>, Error> {
        let url = self
            .vertex
            .resource_url(&format!("{}/cachedContents", self.vertex.parent()));
        let mut caches = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.vertex.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let builder = self.vertex.authorize(PROVIDER, cancel, request).await?;
            let response = send(PROVIDER, cancel, builder).await?;
            let page: ListCachedContentsResponse = read_json(PROVIDER, cancel, response).await?;

            caches.extend(page.cached_contents.into_iter().map(Self::convert_cache));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(caches),
            }
        }
    }
}
