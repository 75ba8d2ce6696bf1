use super::{
    create_weather_tool, sse_body, sse_response, ProviderTestSetup, SYSTEM_PROMPT, USER_PROMPT,
    WEATHER_RESULT,
};
use serde_json::json;
use std::sync::Arc;
use unichat::{GoogleProvider, Provider};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer};

pub struct GoogleTestSetup;

pub const MODEL_PATH: &str =
    "/v1/projects/test-project/locations/europe-west1/publishers/google/models/gemini-2.5-flash";

pub fn function_call_stream() -> String {
    sse_body([
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"I'll check the weather. "}]}}],"usageMetadata":{"promptTokenCount":82,"candidatesTokenCount":6}}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_weather","args":{"location":"Paris"}}}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":82,"candidatesTokenCount":17,"totalTokenCount":99}}"#,
    ])
}

pub fn final_answer_stream() -> String {
    sse_body([
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"It's sunny in Paris right now, "}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"22°C. Enjoy your sightseeing!"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":120,"candidatesTokenCount":14}}"#,
    ])
}

#[async_trait::async_trait]
impl ProviderTestSetup for GoogleTestSetup {
    const NAME: &'static str = "Google";
    const MODEL: &'static str = "gemini-2.5-flash";

    fn create_provider(base_url: &str) -> Arc<dyn Provider> {
        Arc::new(
            GoogleProvider::new_with_base_url(
                "test-project",
                "europe-west1",
                "test-access-token",
                base_url,
            )
            .expect("Failed to create Google provider"),
        )
    }

    fn stream_path() -> String {
        format!("{MODEL_PATH}:streamGenerateContent")
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let tools = json!([{
            "function_declarations": [{
                "name": weather_tool.name,
                "description": weather_tool.description,
                "parameters": weather_tool.input_schema
            }]
        }]);
        let system_instruction = json!({"parts": [{"text": SYSTEM_PROMPT}]});
        let generation_config = json!({"temperature": 0.7, "max_output_tokens": 150});

        let initial_request = json!({
            "contents": [
                {"role": "user", "parts": [{"text": USER_PROMPT}]}
            ],
            "system_instruction": system_instruction,
            "generation_config": generation_config,
            "tools": tools
        });

        let followup_request = json!({
            "contents": [
                {"role": "user", "parts": [{"text": USER_PROMPT}]},
                {
                    "role": "model",
                    "parts": [
                        {"text": "I'll check the weather. "},
                        {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}}
                    ]
                },
                {
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": "get_weather",
                            "response": {"result": WEATHER_RESULT}
                        }
                    }]
                }
            ],
            "system_instruction": system_instruction,
            "generation_config": generation_config,
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
