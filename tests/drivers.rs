//! HTTP adapters against mock provider endpoints.

use std::sync::Arc;
use std::time::Duration;

use bug_oracle::clock::ManualClock;
use bug_oracle::config::{BackendSettings, CacheStoreKind, Config};
use bug_oracle::drivers::{AdapterSettings, HttpAdapter};
use bug_oracle::ingest::Incident;
use bug_oracle::prompt::ProcessingPromptBuilder;
use bug_oracle::resilience::RetryConfig;
use bug_oracle::{BackendAdapter, BackendKind, Error, FailureClass, Mediator, Request};
use mockito::Matcher;
use serde_json::json;

fn settings(kind: BackendKind, base_url: &str) -> AdapterSettings {
    AdapterSettings::for_kind(kind)
        .with_base_url(base_url)
        .with_api_key("test-key")
        .with_timeout(Duration::from_secs(5))
}

fn request(backend_id: &str, model_id: &str) -> Request {
    Request::new(backend_id, model_id)
        .with_role("You classify e-commerce incidents.")
        .with_context("**Platform context**:\nSFCC storefront")
        .with_instructions("Reply with JSON only.")
        .with_payload("Checkout button unresponsive on mobile")
}

#[tokio::test]
async fn test_openai_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({"model": "gpt-4o"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Functional Error"}}]}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let req = request("openai", "gpt-4o");
    let text = adapter.generate(&req.prompt()).await.unwrap();
    assert_eq!(text, "Functional Error");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_grok_uses_openai_wire_format() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::Grok, settings(BackendKind::Grok, &server.url())).unwrap();
    assert_eq!(adapter.backend_id(), "grok");
    let text = adapter.generate(&request("grok", "").prompt()).await.unwrap();
    assert_eq!(text, "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_anthropic_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", Matcher::Any)
        .match_body(Matcher::PartialJson(json!({"model": "claude-3-5-haiku-latest"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":[{"type":"text","text":"Functional "},{"type":"text","text":"Error"}]}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(
        BackendKind::Anthropic,
        settings(BackendKind::Anthropic, &server.url()),
    )
    .unwrap();
    let text = adapter
        .generate(&request("anthropic", "claude-3-5-haiku-latest").prompt())
        .await
        .unwrap();
    assert_eq!(text, "Functional Error");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Performance"}]}}]}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::Gemini, settings(BackendKind::Gemini, &server.url())).unwrap();
    let text = adapter
        .generate(&request("gemini", "gemini-1.5-flash").prompt())
        .await
        .unwrap();
    assert_eq!(text, "Performance");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_success_without_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(json!({"stream": false})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":{"role":"assistant","content":"UI Error"},"done":true}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(
        BackendKind::Ollama,
        AdapterSettings::for_kind(BackendKind::Ollama).with_base_url(server.url()),
    )
    .unwrap();
    let text = adapter.generate(&request("ollama", "").prompt()).await.unwrap();
    assert_eq!(text, "UI Error");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_quota_exhaustion_is_rate_limited_with_hint() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_header("retry-after", "3")
        .with_body(r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let err = adapter
        .generate(&request("openai", "gpt-4o").prompt())
        .await
        .unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::RateLimited));
    assert_eq!(err.retry_after_ms(), Some(3000));
    assert_eq!(err.backend_ids(), Some(("openai", "gpt-4o")));
    assert!(err.to_string().contains("exceeded your current quota"));
}

#[tokio::test]
async fn test_gemini_resource_exhausted_is_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .with_status(429)
        .with_body(r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::Gemini, settings(BackendKind::Gemini, &server.url())).unwrap();
    let err = adapter.generate(&request("gemini", "").prompt()).await.unwrap_err();
    assert_eq!(err.kind(), "rate_limited");
}

#[tokio::test]
async fn test_unavailable_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/messages")
        .with_status(529)
        .with_body(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(
        BackendKind::Anthropic,
        settings(BackendKind::Anthropic, &server.url()),
    )
    .unwrap();
    let err = adapter.generate(&request("anthropic", "").prompt()).await.unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::Transient));
}

#[tokio::test]
async fn test_server_error_without_body_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let err = adapter.generate(&request("openai", "").prompt()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bad_credentials_are_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#)
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let err = adapter.generate(&request("openai", "").prompt()).await.unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::Fatal));
    assert!(err.to_string().contains("Incorrect API key"));
}

#[tokio::test]
async fn test_malformed_body_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let err = adapter.generate(&request("openai", "").prompt()).await.unwrap_err();
    assert_eq!(err.kind(), "fatal");
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let adapter = HttpAdapter::for_kind(
        BackendKind::Ollama,
        AdapterSettings::for_kind(BackendKind::Ollama)
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let err = adapter.generate(&request("ollama", "").prompt()).await.unwrap_err();
    assert_eq!(err.kind(), "transient");
}

#[tokio::test]
async fn test_mediator_retries_rate_limits_using_hint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "2")
        .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#)
        .expect(3)
        .create_async()
        .await;

    let clock = Arc::new(ManualClock::new());
    let adapter = HttpAdapter::for_kind(BackendKind::OpenAi, settings(BackendKind::OpenAi, &server.url())).unwrap();
    let mediator = Mediator::builder()
        .with_adapter(Arc::new(adapter))
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(60)),
        )
        .with_clock(clock.clone())
        .build()
        .unwrap();

    let err = mediator.invoke(&request("openai", "gpt-4o")).await.unwrap_err();
    assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(2)]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_mixed_case_backend_id_reaches_configured_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({"model": "gpt-4o"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"{\"functional_area\":\"Checkout\"}"}}]}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = Config::default();
    config.backends.insert(
        "OpenAI".into(),
        BackendSettings {
            api_key: Some("sk-test".into()),
            model: Some("gpt-4o".into()),
            base_url: Some(server.url()),
            ..Default::default()
        },
    );
    config.cache.store = CacheStoreKind::Memory;
    // As passed on the command line.
    config.backend = "OpenAI".into();
    config.normalize().unwrap();
    config.validate().unwrap();

    let mediator = Mediator::from_config(&config).unwrap();
    let request = ProcessingPromptBuilder::from_config(&config)
        .unwrap()
        .build(&Incident {
            subject: "Broken checkout".into(),
            changed: "05/mar/24 09:15 AM".into(),
            description: "The checkout page hangs".into(),
        });
    assert_eq!(request.backend_id(), "openai");
    assert_eq!(request.model_id(), "gpt-4o");

    let text = mediator.invoke(&request).await.unwrap();
    assert!(text.contains("Checkout"));
    // Served from the cache the second time.
    mediator.invoke(&request).await.unwrap();
    mock.assert_async().await;
}
