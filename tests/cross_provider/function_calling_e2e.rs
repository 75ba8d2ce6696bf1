use tokio_test::assert_ok;
use unichat::{
    CancellationToken, FinishReason, Message, Options, Part, Role, Session, StreamItem,
};
use wiremock::MockServer;

use super::providers::{
    anthropic::AnthropicTestSetup, create_weather_tool, google::GoogleTestSetup,
    openai::OpenAITestSetup, ProviderTestSetup, FINAL_ANSWER, SYSTEM_PROMPT, USER_PROMPT,
    WEATHER_RESULT,
};

/// Run the weather conversation against one provider: a streamed tool call,
/// the tool result sent back, and the streamed final answer.
async fn run_function_calling_test<T: ProviderTestSetup>() {
    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;

    let cancel = CancellationToken::new();
    let options = Options::new()
        .temperature(0.7)
        .max_output_tokens(150)
        .tool(create_weather_tool());
    let mut session = Session::new(T::MODEL)
        .with_history(vec![Message::system(SYSTEM_PROMPT)])
        .with_provider(T::create_provider(&mock_server.uri()));

    // Turn 1: the model asks for the weather tool.
    let mut stream = assert_ok!(
        session
            .send_stream_with_options(&cancel, [Part::text(USER_PROMPT)], &options)
            .await
    );
    let mut deltas = 0;
    while let StreamItem::Delta(_) = assert_ok!(stream.next().await) {
        deltas += 1;
    }
    assert!(deltas >= 2, "{}: expected several deltas, got {deltas}", T::NAME);
    assert!(stream.is_committed(), "{}: turn should be committed", T::NAME);

    let response = stream.response().clone();
    assert_eq!(
        response.finish_reason,
        Some(FinishReason::ToolCalls),
        "{}: finish reason",
        T::NAME
    );
    assert_eq!(response.text(), "I'll check the weather. ");
    drop(stream);

    let calls = response.tool_calls();
    assert_eq!(calls.len(), 1, "{}: exactly one tool call", T::NAME);
    let call = calls[0].clone();
    assert_eq!(call.name, "get_weather");
    assert!(!call.id.is_empty(), "{}: tool call id must be set", T::NAME);
    let arguments: serde_json::Value = assert_ok!(serde_json::from_str(&call.arguments));
    assert_eq!(arguments["location"], "Paris", "{}: tool arguments", T::NAME);

    let model_turn = &session.history()[2];
    assert_eq!(model_turn.role, Role::Model);
    assert_eq!(model_turn.tool_calls(), vec![&call]);

    // Turn 2: send the tool result back and stream the answer.
    let response = assert_ok!(
        assert_ok!(
            session
                .send_stream_with_options(
                    &cancel,
                    [Part::tool_result(call.id.clone(), call.name.clone(), WEATHER_RESULT)],
                    &options,
                )
                .await
        )
        .collect()
        .await
    );
    assert_eq!(response.text(), FINAL_ANSWER, "{}: final answer", T::NAME);
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));

    let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Model, Role::User, Role::Model]
    );
    assert_eq!(session.history()[4], Message::model(FINAL_ANSWER));
}

#[tokio::test]
async fn test_openai_function_calling() {
    run_function_calling_test::<OpenAITestSetup>().await;
}

#[tokio::test]
async fn test_google_function_calling() {
    run_function_calling_test::<GoogleTestSetup>().await;
}

#[tokio::test]
async fn test_anthropic_function_calling() {
    run_function_calling_test::<AnthropicTestSetup>().await;
}
