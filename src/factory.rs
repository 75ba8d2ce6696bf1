use crate::providers::vertex::{AnthropicViaVertexProvider, GoogleProvider, VertexAuth};
use crate::{Error, OpenAIProvider, Provider};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_REGION: &str = "europe-west1";

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Google,
    Anthropic,
}

impl ProviderType {
    /// Check if this provider type is supported via Vertex AI.
    pub fn is_supported_via_vertex(&self) -> bool {
        matches!(self, ProviderType::Google | ProviderType::Anthropic)
    }
}

impl FromStr for ProviderType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        match value.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "google" | "gemini" => Ok(ProviderType::Google),
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            other => Err(Error::config(format!(
                "Invalid PROVIDER_TYPE '{other}'. Valid values are: openai, google, anthropic"
            ))),
        }
    }
}

/// Configuration for creating providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    /// Overrides the vendor endpoint, e.g. an OpenAI-compatible gateway.
    pub base_url: Option<String>,
    pub project_id: Option<String>,
    pub location: Option<String>,
    /// Vertex access token; Application Default Credentials are used when unset.
    pub access_token: Option<String>,
}

impl ProviderConfig {
    /// Create configuration for OpenAI provider.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: None,
            project_id: None,
            location: None,
            access_token: None,
        }
    }

    /// Create configuration for any Vertex AI provider with access token.
    ///
    /// Fails with [`Error::Config`] if `provider_type` is not served by Vertex AI.
    pub fn vertex(
        provider_type: ProviderType,
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let mut config = Self::vertex_with_adc(provider_type, project_id, location)?;
        config.access_token = Some(access_token.into());
        Ok(config)
    }

    /// Create configuration for any Vertex AI provider with Application Default Credentials.
    pub fn vertex_with_adc(
        provider_type: ProviderType,
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Self, Error> {
        if !provider_type.is_supported_via_vertex() {
            return Err(Error::config(format!(
                "{provider_type:?} is not a Vertex AI provider, use ProviderConfig::openai()"
            )));
        }

        Ok(Self {
            provider_type,
            api_key: None,
            base_url: None,
            project_id: Some(project_id.into()),
            location: Some(location.into()),
            access_token: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Create configuration from environment variables.
    ///
    /// `PROVIDER_TYPE` selects the vendor explicitly. Without it, an
    /// `OPENAI_API_KEY` selects OpenAI and a `GOOGLE_CLOUD_PROJECT` selects
    /// Gemini on Vertex AI.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let provider_type = match lookup("PROVIDER_TYPE") {
            Some(value) => value.parse()?,
            None if lookup("OPENAI_API_KEY").is_some() => ProviderType::OpenAI,
            None if lookup("GOOGLE_CLOUD_PROJECT").is_some() => ProviderType::Google,
            None => {
                return Err(Error::config(
                    "no provider credentials in environment: set PROVIDER_TYPE \
                     (openai/google/anthropic) and its credentials",
                ))
            }
        };

        if provider_type == ProviderType::OpenAI {
            let api_key = lookup("OPENAI_API_KEY").ok_or_else(|| {
                Error::config("OPENAI_API_KEY environment variable is required for OpenAI provider")
            })?;
            let mut config = Self::openai(api_key);
            config.base_url = lookup("OPENAI_BASE_URL");
            return Ok(config);
        }

        let project_id = lookup("GOOGLE_CLOUD_PROJECT").ok_or_else(|| {
            Error::config(format!(
                "GOOGLE_CLOUD_PROJECT is required for the {provider_type:?} provider"
            ))
        })?;
        let location = lookup("GOOGLE_CLOUD_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());

        match lookup("VERTEX_ACCESS_TOKEN") {
            Some(access_token) => Self::vertex(provider_type, project_id, location, access_token),
            None => Self::vertex_with_adc(provider_type, project_id, location),
        }
    }
}

/// Factory for creating LLM providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from configuration.
    pub async fn create(config: &ProviderConfig) -> Result<Arc<dyn Provider>, Error> {
        tracing::debug!(provider = ?config.provider_type, "creating provider");

        if config.provider_type == ProviderType::OpenAI {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| Error::config("API key required for OpenAI provider"))?;
            let provider = match &config.base_url {
                Some(base_url) => OpenAIProvider::new_with_base_url(api_key, base_url.clone())?,
                None => OpenAIProvider::new(api_key)?,
            };
            return Ok(Arc::new(provider));
        }

        let project_id = config.project_id.clone().ok_or_else(|| {
            Error::config(format!("Project ID required for {:?} provider", config.provider_type))
        })?;
        let location = config
            .location
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let credentials = (
            config.provider_type,
            &config.access_token,
            &config.base_url,
        );
        let provider: Arc<dyn Provider> = match credentials {
            (ProviderType::Google, Some(token), Some(base_url)) => {
                Arc::new(GoogleProvider::new_with_base_url(
                    project_id,
                    location,
                    token.clone(),
                    base_url.clone(),
                )?)
            }
            (ProviderType::Google, Some(token), None) => {
                Arc::new(GoogleProvider::new(project_id, location, token.clone())?)
            }
            (ProviderType::Google, None, _) => Arc::new(
                GoogleProvider::with_auth(project_id, location, VertexAuth::ApplicationDefault)
                    .await?,
            ),
            (ProviderType::Anthropic, Some(token), Some(base_url)) => {
                Arc::new(AnthropicViaVertexProvider::new_with_base_url(
                    project_id,
                    location,
                    token.clone(),
                    base_url.clone(),
                )?)
            }
            (ProviderType::Anthropic, Some(token), None) => Arc::new(
                AnthropicViaVertexProvider::new(project_id, location, token.clone())?,
            ),
            (ProviderType::Anthropic, None, _) => Arc::new(
                AnthropicViaVertexProvider::with_auth(
                    project_id,
                    location,
                    VertexAuth::ApplicationDefault,
                )
                .await?,
            ),
            (ProviderType::OpenAI, _, _) => {
                return Err(Error::config("OpenAI is not a Vertex AI provider"))
            }
        };
        Ok(provider)
    }

    /// Create a provider from environment variables.
    pub async fn from_env() -> Result<Arc<dyn Provider>, Error> {
        let config = ProviderConfig::from_env()?;
        Self::create(&config).await
    }
}
