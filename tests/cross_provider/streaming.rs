//! Non-streaming calls, vendor errors, usage and cancellation per adapter.

use std::time::Duration;

use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use unichat::{
    CancellationToken, Error, FinishReason, Message, Options, Part, Response, StreamItem, Usage,
};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::providers::{
    anthropic::{self, AnthropicTestSetup},
    google::{self, GoogleTestSetup},
    openai::{self, OpenAITestSetup},
    sse_body, ProviderTestSetup,
};

fn hello() -> Vec<Message> {
    vec![Message::user("hi")]
}

#[tokio::test]
async fn test_openai_generate_content() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 9,
                "completion_tokens": 1,
                "prompt_tokens_details": {"cached_tokens": 0}
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAITestSetup::create_provider(&mock_server.uri());
    let response = assert_ok!(
        provider
            .generate_content(&CancellationToken::new(), "gpt-4o", &hello(), &Options::new())
            .await
    );

    assert_eq!(response.parts, vec![Part::text("hello")]);
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(
        response.usage,
        Some(Usage {
            input_tokens: 9,
            output_tokens: 1,
            cached_tokens: Some(0),
        })
    );
}

#[tokio::test]
async fn test_google_generate_content_with_thoughts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:generateContent", google::MODEL_PATH)))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
            "cached_content": "projects/test-project/locations/europe-west1/cachedContents/123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "The user greets me.", "thought": true},
                        {"text": "hello"}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 1200,
                "candidatesTokenCount": 3,
                "cachedContentTokenCount": 1100
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let options = Options::new()
        .cache_name("projects/test-project/locations/europe-west1/cachedContents/123");
    let response = assert_ok!(
        provider
            .generate_content(&CancellationToken::new(), GoogleTestSetup::MODEL, &hello(), &options)
            .await
    );

    assert_eq!(response.thought(), "The user greets me.");
    assert_eq!(response.text(), "hello");
    assert_eq!(response.usage.and_then(|usage| usage.cached_tokens), Some(1100));
}

#[tokio::test]
async fn test_anthropic_generate_content() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:rawPredict", anthropic::MODEL_PATH)))
        .and(body_partial_json(json!({
            "anthropic_version": "vertex-2023-10-16",
            "max_tokens": 4096,
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "A greeting.", "signature": "sig"},
                {"type": "text", "text": "hello"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 8, "output_tokens": 12, "cache_read_input_tokens": 0}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = AnthropicTestSetup::create_provider(&mock_server.uri());
    let response = assert_ok!(
        provider
            .generate_content(
                &CancellationToken::new(),
                AnthropicTestSetup::MODEL,
                &hello(),
                &Options::new()
            )
            .await
    );

    assert_eq!(
        response.parts,
        vec![Part::thought("A greeting."), Part::text("hello")]
    );
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
}

async fn assert_vendor_error<T: ProviderTestSetup>(mock_server: &MockServer) {
    let provider = T::create_provider(&mock_server.uri());
    let error = assert_err!(
        provider
            .generate_content_stream(&CancellationToken::new(), T::MODEL, &hello(), &Options::new())
            .await
    );
    match error {
        Error::Provider { provider, message } => {
            assert_eq!(provider, T::NAME);
            assert!(message.contains("429"), "{}: {message}", T::NAME);
            assert!(message.contains("quota exceeded"), "{}: {message}", T::NAME);
        }
        other => panic!("{}: expected provider error, got {other:?}", T::NAME),
    }
}

#[tokio::test]
async fn test_error_status_becomes_provider_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "quota exceeded"}})),
        )
        .mount(&mock_server)
        .await;

    assert_vendor_error::<OpenAITestSetup>(&mock_server).await;
    assert_vendor_error::<GoogleTestSetup>(&mock_server).await;
    assert_vendor_error::<AnthropicTestSetup>(&mock_server).await;
}

#[tokio::test]
async fn test_translation_error_never_reaches_the_wire() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let history = vec![Message::new(
        unichat::Role::Model,
        vec![Part::blob("image/png", vec![0x89, 0x50])],
    )];

    for provider in [
        OpenAITestSetup::create_provider(&mock_server.uri()),
        AnthropicTestSetup::create_provider(&mock_server.uri()),
    ] {
        let error = assert_err!(
            provider
                .generate_content(&CancellationToken::new(), "m", &history, &Options::new())
                .await
        );
        assert!(matches!(error, Error::Translation { .. }), "{error:?}");
    }
}

#[tokio::test]
async fn test_cancel_while_waiting_for_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&mock_server)
        .await;

    let provider = OpenAITestSetup::create_provider(&mock_server.uri());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let error = assert_err!(
        provider
            .generate_content(&cancel, "gpt-4o", &hello(), &Options::new())
            .await
    );
    assert!(matches!(error, Error::Cancelled));
}

#[tokio::test]
async fn test_cancelled_stream_is_released() {
    let mock_server = MockServer::start().await;
    GoogleTestSetup::mount_stream(&mock_server, &google::final_answer_stream()).await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let cancel = CancellationToken::new();
    let mut stream = assert_ok!(
        provider
            .generate_content_stream(&cancel, GoogleTestSetup::MODEL, &hello(), &Options::new())
            .await
    );

    cancel.cancel();
    assert!(matches!(stream.next().await, Err(Error::Cancelled)));
    assert!(stream.is_closed());
    assert_eq!(assert_ok!(stream.next().await), StreamItem::EndOfStream);
}

#[tokio::test]
async fn test_streamed_usage_is_reported() {
    let mock_server = MockServer::start().await;
    OpenAITestSetup::mount_stream(&mock_server, &openai::function_call_stream()).await;
    let provider = OpenAITestSetup::create_provider(&mock_server.uri());
    let response = assert_ok!(
        assert_ok!(
            provider
                .generate_content_stream(
                    &CancellationToken::new(),
                    OpenAITestSetup::MODEL,
                    &hello(),
                    &Options::new()
                )
                .await
        )
        .collect()
        .await
    );
    assert_eq!(response.usage.as_ref().map(|usage| usage.input_tokens), Some(82));
    assert_eq!(
        response.tool_calls()[0].arguments,
        r#"{"location":"Paris"}"#
    );

    let mock_server = MockServer::start().await;
    AnthropicTestSetup::mount_stream(&mock_server, &anthropic::function_call_stream()).await;
    let provider = AnthropicTestSetup::create_provider(&mock_server.uri());
    let response = assert_ok!(
        assert_ok!(
            provider
                .generate_content_stream(
                    &CancellationToken::new(),
                    AnthropicTestSetup::MODEL,
                    &hello(),
                    &Options::new()
                )
                .await
        )
        .collect()
        .await
    );
    assert_eq!(
        response.usage,
        Some(Usage {
            input_tokens: 82,
            output_tokens: 17,
            cached_tokens: None,
        })
    );
}

#[tokio::test]
async fn test_unparseable_frame_fails_the_stream() {
    let mock_server = MockServer::start().await;
    let body = sse_body([
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"a"}]}}]}"#,
        "{not json",
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"b"}]}}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path(GoogleTestSetup::stream_path()))
        .and(query_param("alt", "sse"))
        .respond_with(super::providers::sse_response(&body))
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let mut stream = assert_ok!(
        provider
            .generate_content_stream(
                &CancellationToken::new(),
                GoogleTestSetup::MODEL,
                &hello(),
                &Options::new()
            )
            .await
    );

    let first = assert_ok!(stream.next().await);
    assert_eq!(
        first,
        StreamItem::Delta(Response::new(vec![Part::text("a")]))
    );
    let error = assert_err!(stream.next().await);
    assert!(matches!(error, Error::MalformedMessage(_)));
    assert_eq!(assert_ok!(stream.next().await), StreamItem::EndOfStream);
}
