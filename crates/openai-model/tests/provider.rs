use std::future::poll_fn;
use std::pin::pin;

use coach_relay_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponseEvent, ModelStream,
};
use coach_relay_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAIProvider {
    let config = OpenAIConfigBuilder::with_api_key("test-key")
        .with_base_url(format!("{}/v1", server.uri()))
        .with_model("gpt-4.1-mini")
        .build();
    OpenAIProvider::new(config)
}

fn request() -> ModelRequest {
    ModelRequest {
        model: "gpt-4.1-mini".to_owned(),
        messages: vec![
            ModelMessage::System("You are a supportive mental coach.".to_owned()),
            ModelMessage::User("I feel stuck.".to_owned()),
        ],
        tools: vec![],
    }
}

#[tokio::test]
async fn test_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4.1-mini",
            "stream": false,
            "messages": [
                { "role": "system", "content": "You are a supportive mental coach." },
                { "role": "user", "content": "I feel stuck." }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Take a breath." },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(completion.content.as_deref(), Some("Take a breath."));
    assert!(completion.tool_calls.is_empty());
    assert_eq!(completion.finish_reason, Some(ModelFinishReason::Stop));
}

#[tokio::test]
async fn test_provider_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Incorrect API key provided: test-key.",
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let err = provider.complete(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.message(), "Incorrect API key provided: test-key.");

    let err = provider.stream(&request()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_rate_limited_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert!(err.message().contains("429"));
}

#[tokio::test]
async fn test_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            include_str!("../fixtures/text_response.txt"),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let stream = provider(&server).stream(&request()).await.unwrap();
    let mut stream = pin!(stream);
    let mut text = String::new();
    while let Some(event) = poll_fn(|cx| stream.as_mut().poll_next_event(cx))
        .await
        .unwrap()
    {
        if let ModelResponseEvent::MessageDelta(delta) = event {
            text.push_str(&delta);
        }
    }
    assert_eq!(text, "Keep going, you've got this!");
}

#[tokio::test]
async fn test_stream_rejects_non_event_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })),
        )
        .mount(&server)
        .await;

    let err = provider(&server).stream(&request()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidResponse);
}
