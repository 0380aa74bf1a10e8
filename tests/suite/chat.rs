//! Chat requests through the bus facade: completion, list recovery, abort, expiry.

use std::sync::Arc;
use std::time::Duration;

use glimpse_types::{BusRequest, BusStatus, ChatMessage};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    CREDENTIAL, chat_request, completion_body, config_for, gateway_with_credential,
    mount_chat_response, mount_slow_chat_response,
};

async fn wait_until_pending(gateway: &glimpse_engine::Gateway) {
    for _ in 0..200 {
        if gateway.broker().pending_count().await > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("chat request never became pending");
}

#[tokio::test]
async fn plain_chat_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", format!("Bearer {CREDENTIAL}").as_str()))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "You summarize web pages."},
                {"role": "user", "content": "Summarize: Rust is fast."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Rust is fast.")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));
    let response = gateway
        .dispatch(chat_request("Summarize: Rust is fast.", false))
        .await;

    assert_eq!(response.status, BusStatus::Success);
    assert_eq!(response.content.as_deref(), Some("Rust is fast."));
    assert!(response.items.is_none());
}

#[tokio::test]
async fn list_chat_recovers_items_from_prose_wrapped_array() {
    let server = MockServer::start().await;
    mount_chat_response(
        &server,
        "Here are the points:\n[\"*Speed:* very fast\", \"Safety: memory safe\"]\nLet me know if you need more.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));
    let response = gateway.dispatch(chat_request("List key points", true)).await;

    assert_eq!(response.status, BusStatus::Success);
    assert_eq!(
        response.items.unwrap(),
        vec![
            "**Speed:** very fast".to_string(),
            "**Safety:** memory safe".to_string(),
            "Let me know if you need more.".to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_credential_is_reported_without_calling_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());
    let gateway = glimpse_engine::Gateway::new(
        &config,
        glimpse_engine::Storage::in_memory(),
        reqwest::Client::new(),
    );

    let response = gateway.dispatch(chat_request("hi", false)).await;
    assert_eq!(response.status, BusStatus::Error);
    assert_eq!(response.message.as_deref(), Some("No API key is configured."));
}

#[tokio::test]
async fn empty_message_list_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));

    let response = gateway
        .dispatch(BusRequest::LlmChatStream {
            model: "openai/gpt-4o-mini".to_string(),
            messages: Vec::<ChatMessage>::new(),
            expect_list: false,
        })
        .await;
    assert_eq!(response.status, BusStatus::Error);
}

#[tokio::test]
async fn upstream_error_body_is_redacted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string(format!("{{\"error\":\"bad key {CREDENTIAL}\"}}")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));
    let response = gateway.dispatch(chat_request("hi", false)).await;

    assert_eq!(response.status, BusStatus::Error);
    let message = response.message.unwrap();
    assert!(message.contains("401"), "{message}");
    assert!(!message.contains(CREDENTIAL), "{message}");
}

#[tokio::test]
async fn abort_cancels_in_flight_chat() {
    let server = MockServer::start().await;
    mount_slow_chat_response(&server, "late", Duration::from_secs(5)).await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(gateway_with_credential(&config_for(&server, dir.path())));

    let chat = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.dispatch(chat_request("slow one", false)).await })
    };
    wait_until_pending(&gateway).await;

    let ack = gateway.dispatch(BusRequest::AbortChatRequest).await;
    assert_eq!(ack.status, BusStatus::Aborted);

    let outcome = tokio::time::timeout(Duration::from_secs(2), chat)
        .await
        .expect("aborted chat resolves promptly")
        .unwrap();
    assert_eq!(outcome.status, BusStatus::Aborted);

    let again = gateway.dispatch(BusRequest::AbortChatRequest).await;
    assert_eq!(again.status, BusStatus::NoActiveRequest);
}

#[tokio::test]
async fn abort_after_completion_is_no_active_request() {
    let server = MockServer::start().await;
    mount_chat_response(&server, "fast answer").await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));
    let response = gateway.dispatch(chat_request("quick", false)).await;
    assert_eq!(response.status, BusStatus::Success);

    let ack = gateway.dispatch(BusRequest::AbortChatRequest).await;
    assert_eq!(ack.status, BusStatus::NoActiveRequest);
}

#[tokio::test]
async fn expired_chat_reports_aborted() {
    let server = MockServer::start().await;
    mount_slow_chat_response(&server, "late", Duration::from_secs(5)).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server, dir.path());
    config.request_timeout = Duration::from_millis(100);
    let gateway = gateway_with_credential(&config);

    let response = tokio::time::timeout(
        Duration::from_secs(3),
        gateway.dispatch(chat_request("never answered", false)),
    )
    .await
    .expect("expiry resolves the call");

    assert_eq!(response.status, BusStatus::Aborted);
    assert_eq!(response.message.as_deref(), Some("Request timed out."));
    assert_eq!(gateway.broker().pending_count().await, 0);
}
