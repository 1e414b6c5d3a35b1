//! HTTP AI client tests against a mock endpoint

use grantflow::ai::{AiClient, CompletionRequest, HttpAiClient};
use grantflow::config::AiConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, key_env: &str) -> AiConfig {
    AiConfig {
        api_base: server.uri(),
        model: "test-model".to_string(),
        timeout_seconds: 5,
        api_key_env: key_env.to_string(),
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [
            {"message": {"role": "assistant", "content": content}}
        ]
    })
}

#[tokio::test]
async fn test_complete_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("mapped answer")))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_UNSET")).unwrap();
    let content = client
        .complete(&CompletionRequest::new("system prompt", "user prompt"))
        .await
        .unwrap();
    assert_eq!(content, "mapped answer");
}

#[tokio::test]
async fn test_bearer_auth_from_env() {
    let server = MockServer::start().await;
    std::env::set_var("GRANTFLOW_TEST_KEY_AUTH", "secret-token");
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_AUTH")).unwrap();
    let content = client
        .complete(&CompletionRequest::new("s", "u"))
        .await
        .unwrap();
    assert_eq!(content, "ok");
}

#[tokio::test]
async fn test_retries_once_after_server_error() {
    let server = MockServer::start().await;
    // First attempt fails, the single retry succeeds.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_UNSET")).unwrap();
    let content = client
        .complete(&CompletionRequest::new("s", "u"))
        .await
        .unwrap();
    assert_eq!(content, "recovered");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    // A 4xx response is final; a second identical call cannot succeed.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_UNSET")).unwrap();
    let result = client.complete(&CompletionRequest::new("s", "u")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_gives_up_after_second_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_UNSET")).unwrap();
    let result = client.complete(&CompletionRequest::new("s", "u")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_choices_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = HttpAiClient::new(config(&server, "GRANTFLOW_TEST_KEY_UNSET")).unwrap();
    let result = client.complete(&CompletionRequest::new("s", "u")).await;
    assert!(result.is_err());
}
