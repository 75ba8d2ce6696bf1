use thiserror::Error;

/// Errors that can occur when using the unichat library.
///
/// End of a stream is not an error: it is reported as
/// [`StreamItem::EndOfStream`](crate::StreamItem::EndOfStream).
#[derive(Error, Debug)]
pub enum Error {
    /// An adapter could not map a part or role onto the vendor's request shape.
    #[error("Translation failed for {provider}: {message}")]
    Translation { provider: String, message: String },

    /// The underlying HTTP call failed.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The vendor answered with an error status.
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Unknown part type: {0}")]
    UnknownPartType(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Schema reflection met a field type it cannot represent.
    #[error("Unsupported type in tool schema: {0}")]
    UnsupportedType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn translation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Translation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedMessage(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedType(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    /// Whether the failure came from the transport or the vendor and may
    /// succeed if the caller retries the turn.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Provider { .. } | Error::Streaming(_)
        )
    }
}
