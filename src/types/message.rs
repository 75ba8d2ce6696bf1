use serde::{Deserialize, Serialize};

use super::part::{Part, PartRepr, ToolCall};
use crate::Error;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    System,
    User,
    /// The model's turn. Read from either `"model"` or `"assistant"`.
    Model,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(role: String) -> Result<Self, Error> {
        match role.as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "model" | "assistant" => Ok(Role::Model),
            "tool" => Ok(Role::Tool),
            other => Err(Error::malformed(format!("unknown role: {other}"))),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation: a role and its ordered parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a new message with role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Message { role, parts }
    }

    /// Create a system message with a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Message::new(Role::System, vec![Part::text(text)])
    }

    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Message::new(Role::User, vec![Part::text(text)])
    }

    /// Create a model message with a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Message::new(Role::Model, vec![Part::text(text)])
    }

    /// Append a part.
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenated user-visible text, in part order.
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

    /// Tool calls carried by this message.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Decode a message from JSON with typed errors.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let repr: MessageRepr =
            serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))?;
        Message::try_from(repr)
    }
}

/// Wire shape of a message before part tags are checked.
#[derive(Debug, Deserialize)]
pub(crate) struct MessageRepr {
    role: String,
    #[serde(default)]
    parts: Vec<PartRepr>,
}

impl TryFrom<MessageRepr> for Message {
    type Error = Error;

    fn try_from(repr: MessageRepr) -> Result<Self, Error> {
        let role = Role::try_from(repr.role)?;
        let parts = repr
            .parts
            .into_iter()
            .map(Part::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Message { role, parts })
    }
}

/// Reason why generation finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}
