//! Pieces shared by the vendor adapters: role tables, system extraction,
//! tool argument handling, HTTP dispatch and SSE-to-delta plumbing.

use base64::Engine;
use futures_util::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::cancel::with_cancel;
use crate::sse_stream::{SseEvent, SseStreamExt};
use crate::types::{Message, Part, Role, ToolCall};
use crate::{Error, Response};

/// How a vendor names each non-system role.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RoleMap {
    pub user: &'static str,
    pub model: &'static str,
    pub tool: &'static str,
}

impl RoleMap {
    /// `None` for system messages, which every vendor routes separately.
    pub fn vendor_role(&self, role: Role) -> Option<&'static str> {
        match role {
            Role::System => None,
            Role::User => Some(self.user),
            Role::Model => Some(self.model),
            Role::Tool => Some(self.tool),
        }
    }
}

/// Pull the system instruction out of `history`.
///
/// Text of every system message is joined with blank lines. Any other part
/// kind in a system message cannot be expressed by any vendor.
pub(crate) fn split_system<'a>(
    provider: &str,
    history: &'a [Message],
) -> Result<(Option<String>, Vec<&'a Message>), Error> {
    let mut system = Vec::new();
    let mut turns = Vec::new();

    for message in history {
        if message.role != Role::System {
            turns.push(message);
            continue;
        }
        for part in &message.parts {
            match part {
                Part::Text(text) => system.push(text.as_str()),
                other => {
                    return Err(Error::translation(
                        provider,
                        format!("{} part in system message", other.kind()),
                    ))
                }
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    Ok((system, turns))
}

/// Text of a message that may only carry text, e.g. a system message for
/// vendors that keep system turns in place.
pub(crate) fn text_only(provider: &str, message: &Message) -> Result<String, Error> {
    let mut out = String::new();
    for part in &message.parts {
        match part {
            Part::Text(text) => out.push_str(text),
            other => {
                return Err(Error::translation(
                    provider,
                    format!("{} part in {} message", other.kind(), message.role),
                ))
            }
        }
    }
    Ok(out)
}

/// Parse opaque tool call arguments into the JSON object vendors expect.
/// Empty arguments mean "no arguments".
pub(crate) fn parse_arguments(provider: &str, call: &ToolCall) -> Result<Value, Error> {
    if call.arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(Error::translation(
            provider,
            format!("arguments of tool call {} are not a JSON object", call.name),
        )),
        Err(e) => Err(Error::translation(
            provider,
            format!("malformed arguments for tool call {}: {e}", call.name),
        )),
    }
}

/// A tool result as a JSON object: JSON object content is used as is,
/// anything else is wrapped as `{"result": content}`.
pub(crate) fn result_object(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "result": content }),
    }
}

pub(crate) fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub(crate) fn base64_decode(provider: &str, data: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::provider(provider, format!("invalid base64 payload: {e}")))
}

pub(crate) fn data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", base64_encode(data))
}

/// Send a JSON request, racing it against `cancel`, and fail on non-2xx.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    provider: &str,
    cancel: &CancellationToken,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<reqwest::Response, Error> {
    send(provider, cancel, request.json(body)).await
}

/// Send a prepared request, racing it against `cancel`, and fail on non-2xx.
pub(crate) async fn send(
    provider: &str,
    cancel: &CancellationToken,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, Error> {
    with_cancel(cancel, async {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::provider(provider, format!("API error ({status}): {body}")))
    })
    .await
}

/// Read and decode a complete JSON response body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    cancel: &CancellationToken,
    response: reqwest::Response,
) -> Result<T, Error> {
    let body = with_cancel(cancel, async { Ok(response.bytes().await?) }).await?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::malformed(format!("{provider}: unrecognized response body: {e}")))
}

/// Decode one SSE payload. A frame that does not match the vendor's shape
/// fails the stream.
pub(crate) fn decode_frame<T: DeserializeOwned>(
    provider: &str,
    event: &SseEvent,
) -> Result<T, Error> {
    serde_json::from_str(&event.data).map_err(|e| {
        tracing::warn!(provider, error = %e, data = %event.data, "unparseable stream frame");
        Error::malformed(format!("{provider}: unrecognized stream frame: {e}"))
    })
}

/// Turn an SSE response body into a stream of normalized deltas.
///
/// `convert` sees every event in order together with the adapter's mutable
/// stream state, and may emit any number of deltas per event.
pub(crate) fn sse_deltas<S, F>(
    response: reqwest::Response,
    mut state: S,
    mut convert: F,
) -> impl Stream<Item = Result<Response, Error>> + Send + 'static
where
    S: Send + 'static,
    F: FnMut(&mut S, SseEvent) -> Result<Vec<Response>, Error> + Send + 'static,
{
    Box::pin(response.bytes_stream())
        .sse_events()
        .map(move |event| match event.and_then(|event| convert(&mut state, event)) {
            Ok(deltas) => deltas.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
        .flat_map(stream::iter)
}
