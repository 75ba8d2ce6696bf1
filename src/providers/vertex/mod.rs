//! Providers served through Google Cloud Vertex AI.

pub mod anthropic;
pub mod anthropic_types;
pub mod google;
pub mod google_types;

pub use anthropic::AnthropicViaVertexProvider;
pub use google::GoogleProvider;

use gcp_auth::TokenProvider;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cancel::with_cancel;
use crate::Error;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// How requests to Vertex AI are authenticated.
#[derive(Debug, Clone)]
pub enum VertexAuth {
    /// A pre-fetched OAuth access token, sent as a Bearer header.
    AccessToken(String),
    /// Application Default Credentials, refreshed through `gcp_auth`.
    ApplicationDefault,
}

enum Credentials {
    Token(String),
    Adc(Arc<dyn TokenProvider>),
}

/// HTTP client, credentials and URL layout shared by the Vertex providers.
pub(crate) struct VertexClient {
    client: Client,
    project_id: String,
    location: String,
    base_url: String,
    credentials: Credentials,
}

impl VertexClient {
    pub(crate) async fn connect(
        provider: &str,
        project_id: String,
        location: String,
        auth: VertexAuth,
        base_url: Option<String>,
    ) -> Result<Self, Error> {
        let credentials = match auth {
            VertexAuth::AccessToken(token) => Credentials::Token(token),
            VertexAuth::ApplicationDefault => {
                let provider_handle = gcp_auth::provider().await.map_err(|e| {
                    Error::auth(format!("{provider}: failed to load default credentials: {e}"))
                })?;
                Credentials::Adc(provider_handle)
            }
        };
        Self::build(project_id, location, credentials, base_url)
    }

    pub(crate) fn with_token(
        project_id: String,
        location: String,
        access_token: String,
        base_url: Option<String>,
    ) -> Result<Self, Error> {
        Self::build(project_id, location, Credentials::Token(access_token), base_url)
    }

    fn build(
        project_id: String,
        location: String,
        credentials: Credentials,
        base_url: Option<String>,
    ) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if location == "global" => "https://aiplatform.googleapis.com".to_string(),
            None => format!("https://{location}-aiplatform.googleapis.com"),
        };

        Ok(Self {
            client,
            project_id,
            location,
            base_url,
            credentials,
        })
    }

    /// `projects/{project}/locations/{location}`
    pub(crate) fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }

    /// Absolute URL of a resource path relative to the API version root.
    pub(crate) fn resource_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Full resource name of a publisher model.
    pub(crate) fn model_resource(&self, publisher: &str, model: &str) -> String {
        format!("{}/publishers/{publisher}/models/{model}", self.parent())
    }

    /// URL of a model method, e.g. `generateContent` or `streamRawPredict?alt=sse`.
    pub(crate) fn model_url(&self, publisher: &str, model: &str, method: &str) -> String {
        self.resource_url(&format!("{}:{method}", self.model_resource(publisher, model)))
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub(crate) fn delete(&self, url: &str) -> RequestBuilder {
        self.client.delete(url)
    }

    /// Attach a Bearer token, fetching a fresh one for ADC.
    pub(crate) async fn authorize(
        &self,
        provider: &str,
        cancel: &CancellationToken,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, Error> {
        let token = match &self.credentials {
            Credentials::Token(token) => token.clone(),
            Credentials::Adc(token_provider) => {
                with_cancel(cancel, async {
                    let token = token_provider
                        .token(&[CLOUD_PLATFORM_SCOPE])
                        .await
                        .map_err(|e| {
                            Error::auth(format!("{provider}: failed to get ADC token: {e}"))
                        })?;
                    Ok(token.as_str().to_string())
                })
                .await?
            }
        };
        Ok(request.bearer_auth(token))
    }
}
