pub mod anthropic;
pub mod google;

use std::sync::Arc;
use unichat::{Definition, Provider};
use wiremock::MockServer;

pub const SYSTEM_PROMPT: &str =
    "You have access to weather data. Use the get_weather function when asked about weather.";
pub const USER_PROMPT: &str = "What's the weather like in Paris?";
pub const WEATHER_RESULT: &str =
    "The weather in Paris is sunny with a temperature of 22°C (72°F). Perfect weather for sightseeing!";
pub const FINAL_ANSWER: &str = "It's sunny in Paris right now, 22°C. Enjoy your sightseeing!";

/// Create a weather function tool for testing
pub fn create_weather_tool() -> Definition {
    Definition::new(
        "get_weather",
        "Get the current weather for a location",
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                }
            },
            "required": ["location"]
        }),
    )
}

/// Per-vendor setup for the shared scenarios.
#[async_trait::async_trait]
pub trait ProviderTestSetup {
    const NAME: &'static str;
    const MODEL: &'static str;

    /// Create the provider instance pointed at the mock server
    fn create_provider(base_url: &str) -> Arc<dyn Provider>;

    /// Path of the streaming endpoint for `MODEL`.
    fn stream_path() -> String;

    /// Mount the two turns of the weather conversation: the tool call and the
    /// answer given the tool result.
    async fn mount_function_calling_mocks(mock_server: &MockServer);

    /// Serve `body` as an SSE stream for any request to the streaming endpoint.
    async fn mount_stream(mock_server: &MockServer, body: &str) {
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path(Self::stream_path()))
            .respond_with(sse_response(body))
            .mount(mock_server)
            .await;
    }
}

pub fn sse_response(body: &str) -> wiremock::ResponseTemplate {
    wiremock::ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .insert_header("cache-control", "no-cache")
        .set_body_string(body)
}

/// Join SSE `data:` payloads into a well-formed event stream body.
pub fn sse_body<'a>(frames: impl IntoIterator<Item = &'a str>) -> String {
    frames
        .into_iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect()
}
