//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use glimpse_engine::{ApiEndpoint, Gateway, GatewayConfig, RetryPolicy, Storage};
use glimpse_types::{BusRequest, ChatMessage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MODEL: &str = "openai/gpt-4o-mini";
pub const CREDENTIAL: &str = "sk-or-v1-integration-credential";

/// Gateway settings pointed at a mock upstream, with test-speed timings.
pub fn config_for(server: &MockServer, data_dir: &Path) -> GatewayConfig {
    GatewayConfig {
        endpoint: ApiEndpoint::new(server.uri()),
        request_timeout: Duration::from_secs(60),
        pricing_retry: RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(1),
        },
        data_dir: data_dir.to_path_buf(),
        ..GatewayConfig::default()
    }
}

/// In-memory gateway with a stored credential.
pub fn gateway_with_credential(config: &GatewayConfig) -> Gateway {
    let gateway = Gateway::new(config, Storage::in_memory(), reqwest::Client::new());
    gateway
        .secrets()
        .store_credential(CREDENTIAL)
        .expect("store credential");
    gateway
}

/// File-backed gateway rooted at `config.data_dir`.
pub fn file_gateway(config: &GatewayConfig) -> Gateway {
    let storage = Storage::open(&config.data_dir).expect("open storage");
    Gateway::new(config, storage, reqwest::Client::new())
}

pub fn chat_request(prompt: &str, expect_list: bool) -> BusRequest {
    BusRequest::LlmChatStream {
        model: MODEL.to_string(),
        messages: vec![
            ChatMessage::system("You summarize web pages.").expect("non-empty"),
            ChatMessage::user(prompt).expect("non-empty"),
        ],
        expect_list,
    }
}

pub fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "gen-test",
        "model": MODEL,
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": content}
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    })
}

/// Mount a chat/completions response.
pub async fn mount_chat_response(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .mount(server)
        .await;
}

/// Mount a chat/completions response that only arrives after `delay`.
pub async fn mount_slow_chat_response(server: &MockServer, content: &str, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body(content))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

pub fn catalog_body() -> serde_json::Value {
    serde_json::json!({
        "data": [
            {"id": MODEL, "pricing": {"prompt": "0.00000015", "completion": "0.0000006"}},
            {"id": "anthropic/claude-3.5-haiku", "pricing": {"prompt": 0.0000008, "completion": 0.000004}},
            {"id": "openrouter/auto", "pricing": {"prompt": "-1", "completion": "-1"}}
        ]
    })
}

/// Mount the models listing; `expected` pins how many times it may be hit.
pub async fn mount_catalog(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .expect(expected)
        .mount(server)
        .await;
}
