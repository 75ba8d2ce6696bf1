use super::{
    create_weather_tool, sse_response, ProviderTestSetup, SYSTEM_PROMPT, USER_PROMPT,
    WEATHER_RESULT,
};
use serde_json::json;
use std::sync::Arc;
use unichat::{AnthropicViaVertexProvider, Provider};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer};

pub struct AnthropicTestSetup;

pub const MODEL_PATH: &str =
    "/v1/projects/test-project/locations/us-east5/publishers/anthropic/models/claude-sonnet-4";
pub const TOOL_USE_ID: &str = "toolu_01A09q90qw90lq917835lq9";

/// Format `(event, data)` pairs the way Anthropic names its SSE events.
pub fn anthropic_sse(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
        .collect()
}

pub fn function_call_stream() -> String {
    anthropic_sse(&[
        ("message_start", r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","content":[],"model":"claude-sonnet-4","stop_reason":null,"usage":{"input_tokens":82,"output_tokens":1}}}"#),
        ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
        ("ping", r#"{"type":"ping"}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"I'll check the weather. "}}"#),
        ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
        ("content_block_start", r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_01A09q90qw90lq917835lq9","name":"get_weather","input":{}}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":""}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"location\":"}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":" \"Paris\"}"}}"#),
        ("content_block_stop", r#"{"type":"content_block_stop","index":1}"#),
        ("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":17}}"#),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ])
}

pub fn final_answer_stream() -> String {
    anthropic_sse(&[
        ("message_start", r#"{"type":"message_start","message":{"id":"msg_02","type":"message","role":"assistant","content":[],"usage":{"input_tokens":120,"output_tokens":1}}}"#),
        ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"It's sunny in Paris right now, "}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"22°C. Enjoy your sightseeing!"}}"#),
        ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
        ("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":14}}"#),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ])
}

#[async_trait::async_trait]
impl ProviderTestSetup for AnthropicTestSetup {
    const NAME: &'static str = "Anthropic";
    const MODEL: &'static str = "claude-sonnet-4";

    fn create_provider(base_url: &str) -> Arc<dyn Provider> {
        Arc::new(
            AnthropicViaVertexProvider::new_with_base_url(
                "test-project",
                "us-east5",
                "test-access-token",
                base_url,
            )
            .expect("Failed to create Anthropic provider"),
        )
    }

    fn stream_path() -> String {
        format!("{MODEL_PATH}:streamRawPredict")
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let tools = json!([{
            "name": weather_tool.name,
            "description": weather_tool.description,
            "input_schema": weather_tool.input_schema
        }]);

        let initial_request = json!({
            "anthropic_version": "vertex-2023-10-16",
            "system": SYSTEM_PROMPT,
            "max_tokens": 150,
            "temperature": 0.7,
            "stream": true,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": USER_PROMPT}]}
            ],
            "tools": tools
        });

        let followup_request = json!({
            "anthropic_version": "vertex-2023-10-16",
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": USER_PROMPT}]},
                {
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "I'll check the weather. "},
                        {
                            "type": "tool_use",
                            "id": TOOL_USE_ID,
                            "name": "get_weather",
                            "input": {"location": "Paris"}
                        }
                    ]
                },
                {
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": TOOL_USE_ID,
                        "content": WEATHER_RESULT
                    }]
                }
            ],
            "tools": tools
        });

        // The follow-up body extends the initial one, so it must be matched first.
        Mock::given(method("POST"))
            .and(path(Self::stream_path()))
            .and(query_param("alt", "sse"))
            .and(header("authorization", "Bearer test-access-token"))
            .and(body_partial_json(followup_request))
            .respond_with(sse_response(&final_answer_stream()))
            .with_priority(1)
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(Self::stream_path()))
            .and(query_param("alt", "sse"))
            .and(header("authorization", "Bearer test-access-token"))
            .and(body_partial_json(initial_request))
            .respond_with(sse_response(&function_call_stream()))
            .expect(1)
            .mount(mock_server)
            .await;
    }
}
