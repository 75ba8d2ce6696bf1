//! The closed set of content parts a message is made of.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::Error;

/// One unit of message content.
///
/// Every adapter matches on this enum exhaustively, so a new variant has to be
/// handled by each vendor translation before the crate compiles again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PartRepr", into = "PartRepr")]
pub enum Part {
    /// Plain user-visible text.
    Text(String),
    /// Binary attachment such as an image.
    Blob(Blob),
    /// Private reasoning text. Never counted as user-visible text.
    Thought(String),
    /// A tool invocation requested by the model.
    ToolCall(ToolCall),
    /// The result of executing a previous tool call, correlated by id.
    ToolResult(ToolResult),
}

/// Binary content with its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A requested tool invocation. `arguments` is an opaque JSON object string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Output of a tool call, passed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub content: String,
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Create a reasoning part.
    pub fn thought(thought: impl Into<String>) -> Self {
        Part::Thought(thought.into())
    }

    /// Create a binary part.
    pub fn blob(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Part::Blob(Blob {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }

    /// Create a tool call part.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Part::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    /// Create a tool result part.
    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Part::ToolResult(ToolResult {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        })
    }

    /// The serialized `type` discriminator of this part.
    pub fn kind(&self) -> &'static str {
        match self {
            Part::Text(_) => "text",
            Part::Blob(_) => "blob",
            Part::Thought(_) => "thought",
            Part::ToolCall(_) => "tool_call",
            Part::ToolResult(_) => "tool_result",
        }
    }

    /// Decode a single part from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let repr: PartRepr =
            serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))?;
        Part::try_from(repr)
    }
}

/// Flat wire shape of a part: a `type` tag plus the fields of every variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PartRepr {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
}

impl From<Part> for PartRepr {
    fn from(part: Part) -> Self {
        let kind = part.kind().to_string();
        match part {
            Part::Text(text) => PartRepr {
                kind,
                text: Some(text),
                ..Default::default()
            },
            Part::Blob(blob) => PartRepr {
                kind,
                mime_type: Some(blob.mime_type),
                data: Some(BASE64.encode(&blob.data)),
                ..Default::default()
            },
            Part::Thought(thought) => PartRepr {
                kind,
                thought: Some(thought),
                ..Default::default()
            },
            Part::ToolCall(call) => PartRepr {
                kind,
                id: Some(call.id),
                name: Some(call.name),
                arguments: Some(call.arguments),
                ..Default::default()
            },
            Part::ToolResult(result) => PartRepr {
                kind,
                id: Some(result.id),
                name: Some(result.name),
                content: Some(serde_json::Value::String(result.content)),
                ..Default::default()
            },
        }
    }
}

impl TryFrom<PartRepr> for Part {
    type Error = Error;

    fn try_from(repr: PartRepr) -> Result<Self, Error> {
        match repr.kind.as_str() {
            "text" => Ok(Part::Text(repr.text.unwrap_or_default())),
            "blob" => {
                let mime_type = repr
                    .mime_type
                    .ok_or_else(|| Error::malformed("blob part without mime_type"))?;
                let data = match repr.data {
                    Some(encoded) => BASE64
                        .decode(encoded.as_bytes())
                        .map_err(|e| Error::malformed(format!("invalid blob data: {e}")))?,
                    None => Vec::new(),
                };
                Ok(Part::Blob(Blob { mime_type, data }))
            }
            "thought" => Ok(Part::Thought(repr.thought.unwrap_or_default())),
            "tool_call" => Ok(Part::ToolCall(ToolCall {
                id: repr.id.unwrap_or_default(),
                name: repr.name.unwrap_or_default(),
                arguments: repr.arguments.unwrap_or_default(),
            })),
            "tool_result" => {
                // Structured results are flattened to their JSON text.
                let content = match repr.content {
                    None | Some(serde_json::Value::Null) => String::new(),
                    Some(serde_json::Value::String(text)) => text,
                    Some(other) => other.to_string(),
                };
                Ok(Part::ToolResult(ToolResult {
                    id: repr.id.unwrap_or_default(),
                    name: repr.name.unwrap_or_default(),
                    content,
                }))
            }
            other => Err(Error::UnknownPartType(other.to_string())),
        }
    }
}
